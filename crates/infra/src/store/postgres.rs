//! Postgres-backed catalog store.
//!
//! Every unit of work is a database transaction; dropping a [`PgCatalogTx`]
//! without committing rolls it back. Constraints (uniqueness, foreign keys,
//! restrict/cascade on delete) live in `schema.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation` |
//! | Database (foreign key violation) on product/link writes | `23503` | `MissingReference` |
//! | Database (foreign key violation) on delete | `23503` | `ForeignKeyViolation` |
//! | Database (other) | Any other | `Backend` |
//! | ColumnDecode / ColumnNotFound | N/A | `Decode` |
//! | Other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use diecast_catalog::{NamedEntity, NamedKind, Product, ProductCategoryLink};
use diecast_core::{CategoryId, PageWindow, ProductId, TrademarkId};

use super::r#trait::{CatalogStore, CatalogTx, LookupField, SearchFilter, StoreError, StoreResult};
use crate::config::DatabaseConfig;

const SCHEMA: &str = include_str!("schema.sql");

const PRODUCT_COLUMNS: &str = "id, name, description, image, price, slug, stock, is_available, sku, \
     trademark_id, created_at, updated_at";

const NAMED_SEARCH: &str = "($1::text IS NULL OR strpos(id::text, $1) > 0 OR strpos(name, $1) > 0)";

const PRODUCT_SEARCH: &str = "($1::text IS NULL OR strpos(id::text, $1) > 0 OR strpos(name, $1) > 0 \
     OR strpos(COALESCE(sku, ''), $1) > 0)";

/// Postgres-backed catalog store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresCatalogStore {
    pool: Arc<PgPool>,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool sized by `config`.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables, constraints and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        debug!("catalog schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    type Tx = PgCatalogTx;

    async fn begin(&self) -> StoreResult<PgCatalogTx> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        Ok(PgCatalogTx { tx })
    }

    async fn snapshot(&self) -> StoreResult<PgCatalogTx> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("snapshot", e))?;
        // Count and page must observe the same state.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("snapshot", e))?;
        Ok(PgCatalogTx { tx })
    }
}

/// One database transaction.
pub struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn find_named_by(
        &mut self,
        kind: NamedKind,
        field: LookupField,
        value: &str,
    ) -> StoreResult<Option<NamedEntity>> {
        let sql = format!(
            "SELECT id, name, slug, created_at, updated_at FROM {} WHERE {} = $1",
            kind.table(),
            field.column()
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_named_by", e))?;
        row.as_ref().map(named_from_row).transpose()
    }

    async fn find_named(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<Option<NamedEntity>> {
        let sql = format!(
            "SELECT id, name, slug, created_at, updated_at FROM {} WHERE id = $1",
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_named", e))?;
        row.as_ref().map(named_from_row).transpose()
    }

    async fn find_named_many(&mut self, kind: NamedKind, ids: &[Uuid]) -> StoreResult<Vec<NamedEntity>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT id, name, slug, created_at, updated_at FROM {} WHERE id = ANY($1)",
            kind.table()
        );
        let rows = sqlx::query(&sql)
            .bind(ids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_named_many", e))?;
        rows.iter().map(named_from_row).collect()
    }

    async fn count_named(&mut self, kind: NamedKind, filter: &SearchFilter) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {NAMED_SEARCH}", kind.table());
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(filter.term())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_named", e))?;
        to_unsigned("count", count)
    }

    async fn page_named(
        &mut self,
        kind: NamedKind,
        filter: &SearchFilter,
        window: PageWindow,
    ) -> StoreResult<Vec<NamedEntity>> {
        let sql = format!(
            "SELECT id, name, slug, created_at, updated_at FROM {} WHERE {NAMED_SEARCH} \
             ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3",
            kind.table()
        );
        let rows = sqlx::query(&sql)
            .bind(filter.term())
            .bind(to_signed("offset", window.offset)?)
            .bind(to_signed("limit", window.limit)?)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("page_named", e))?;
        rows.iter().map(named_from_row).collect()
    }

    async fn insert_named(&mut self, kind: NamedKind, entity: &NamedEntity) -> StoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (id, name, slug, created_at, updated_at) VALUES ($1, $2, $3, $4, $5)",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(entity.id)
            .bind(&entity.name)
            .bind(&entity.slug)
            .bind(entity.created_at)
            .bind(entity.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_named", e))?;
        Ok(())
    }

    async fn update_named(&mut self, kind: NamedKind, entity: &NamedEntity) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE {} SET name = $2, slug = $3, updated_at = $4 WHERE id = $1",
            kind.table()
        );
        let result = sqlx::query(&sql)
            .bind(entity.id)
            .bind(&entity.name)
            .bind(&entity.slug)
            .bind(entity.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_named", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_named(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_named", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_dependents(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<u64> {
        let sql = match kind {
            NamedKind::Category => "SELECT COUNT(*) FROM product_categories WHERE category_id = $1",
            NamedKind::Trademark => "SELECT COUNT(*) FROM products WHERE trademark_id = $1",
            NamedKind::Brand => return Ok(0),
        };
        let count: i64 = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_dependents", e))?;
        to_unsigned("count", count)
    }

    async fn find_product_by(&mut self, field: LookupField, value: &str) -> StoreResult<Option<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE {} = $1",
            field.column()
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_product_by", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn find_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_product", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn count_products(&mut self, filter: &SearchFilter) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM products WHERE {PRODUCT_SEARCH}");
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(filter.term())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("count_products", e))?;
        to_unsigned("count", count)
    }

    async fn page_products(&mut self, filter: &SearchFilter, window: PageWindow) -> StoreResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE {PRODUCT_SEARCH} \
             ORDER BY created_at DESC, id DESC OFFSET $2 LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.term())
            .bind(to_signed("offset", window.offset)?)
            .bind(to_signed("limit", window.limit)?)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("page_products", e))?;
        rows.iter().map(product_from_row).collect()
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, description, image, price, slug, stock,
                is_available, sku, trademark_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.image)
        .bind(to_signed("price", product.price)?)
        .bind(&product.slug)
        .bind(i64::from(product.stock))
        .bind(product.is_available)
        .bind(&product.sku)
        .bind(product.trademark_id.as_uuid())
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| missing_trademark_or("insert_product", e, product))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, image = $4, price = $5, slug = $6, stock = $7,
                is_available = $8, sku = $9, trademark_id = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.image)
        .bind(to_signed("price", product.price)?)
        .bind(&product.slug)
        .bind(i64::from(product.stock))
        .bind(product.is_available)
        .bind(&product.sku)
        .bind(product.trademark_id.as_uuid())
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| missing_trademark_or("update_product", e, product))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_product(&mut self, id: ProductId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_links(&mut self, product_id: ProductId, category_ids: &[CategoryId]) -> StoreResult<()> {
        if category_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = category_ids.iter().map(|id| *id.as_uuid()).collect();
        // Only existing categories are selected; whatever is not returned is missing.
        let inserted: Vec<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO product_categories (product_id, category_id)
            SELECT $1, c.id FROM categories c WHERE c.id = ANY($2)
            RETURNING category_id
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| match foreign_key_constraint(&e).as_deref() {
            Some("product_categories_product_id_fkey") => StoreError::MissingReference {
                entity: "product",
                missing: vec![*product_id.as_uuid()],
            },
            Some(_) => StoreError::MissingReference {
                entity: "category",
                missing: ids.clone(),
            },
            None => map_sqlx_error("insert_links", e),
        })?;

        let missing: Vec<Uuid> = ids.into_iter().filter(|id| !inserted.contains(id)).collect();
        if !missing.is_empty() {
            return Err(StoreError::MissingReference {
                entity: "category",
                missing,
            });
        }
        Ok(())
    }

    async fn delete_links(&mut self, product_id: ProductId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
            .bind(product_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_links", e))?;
        Ok(result.rows_affected())
    }

    async fn links_for(&mut self, product_ids: &[ProductId]) -> StoreResult<Vec<ProductCategoryLink>> {
        if product_ids.is_empty() {
            return Ok(vec![]);
        }
        let ids: Vec<Uuid> = product_ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT product_id, category_id FROM product_categories WHERE product_id = ANY($1) \
             ORDER BY product_id, category_id",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("links_for", e))?;

        rows.iter()
            .map(|row| {
                let product_id: Uuid = row.try_get("product_id").map_err(decode_error)?;
                let category_id: Uuid = row.try_get("category_id").map_err(decode_error)?;
                Ok(ProductCategoryLink {
                    product_id: product_id.into(),
                    category_id: category_id.into(),
                })
            })
            .collect()
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }
}

fn named_from_row(row: &PgRow) -> StoreResult<NamedEntity> {
    Ok(NamedEntity {
        id: row.try_get("id").map_err(decode_error)?,
        name: row.try_get("name").map_err(decode_error)?,
        slug: row.try_get("slug").map_err(decode_error)?,
        created_at: row.try_get("created_at").map_err(decode_error)?,
        updated_at: row.try_get("updated_at").map_err(decode_error)?,
    })
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    let id: Uuid = row.try_get("id").map_err(decode_error)?;
    let trademark_id: Uuid = row.try_get("trademark_id").map_err(decode_error)?;
    let price: i64 = row.try_get("price").map_err(decode_error)?;
    let stock: i64 = row.try_get("stock").map_err(decode_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(decode_error)?;

    Ok(Product {
        id: ProductId::from_uuid(id),
        name: row.try_get("name").map_err(decode_error)?,
        description: row.try_get("description").map_err(decode_error)?,
        image: row.try_get("image").map_err(decode_error)?,
        price: to_unsigned("price", price)?,
        slug: row.try_get("slug").map_err(decode_error)?,
        stock: u32::try_from(stock)
            .map_err(|_| StoreError::Decode(format!("stock out of range: {stock}")))?,
        is_available: row.try_get("is_available").map_err(decode_error)?,
        sku: row.try_get("sku").map_err(decode_error)?,
        trademark_id: TrademarkId::from_uuid(trademark_id),
        created_at,
        updated_at,
    })
}

fn to_signed(what: &str, value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Backend(format!("{what} out of range: {value}")))
}

fn to_unsigned(what: &str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| StoreError::Decode(format!("{what} out of range: {value}")))
}

/// Constraint name of a foreign key violation (`23503`), if `err` is one.
fn foreign_key_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503") => {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

/// The only foreign key on `products` is its trademark.
fn missing_trademark_or(operation: &str, err: sqlx::Error, product: &Product) -> StoreError {
    if foreign_key_constraint(&err).is_some() {
        return StoreError::MissingReference {
            entity: "trademark",
            missing: vec![*product.trademark_id.as_uuid()],
        };
    }
    map_sqlx_error(operation, err)
}

fn decode_error(err: sqlx::Error) -> StoreError {
    StoreError::Decode(err.to_string())
}

/// Map SQLx errors to store errors.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("23503") => StoreError::ForeignKeyViolation(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Decode(format!("{} in {}", err, operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_closed_is_a_backend_error() {
        let err = map_sqlx_error("begin", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("begin")));
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(matches!(to_unsigned("count", -1), Err(StoreError::Decode(_))));
        assert_eq!(to_unsigned("count", 7).unwrap(), 7);
    }

    #[test]
    fn schema_declares_every_catalog_table() {
        for kind in NamedKind::ALL {
            assert!(SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {}", kind.table())));
        }
        assert!(SCHEMA.contains("CREATE TABLE IF NOT EXISTS products"));
        assert!(SCHEMA.contains("ON DELETE CASCADE"));
    }
}
