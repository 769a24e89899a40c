use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use diecast_catalog::{CreateProduct, NamedEntity, NamedKind, NamedSummary, Product, ProductView, UpdateProduct};
use diecast_core::{CatalogError, CatalogResult, Envelope, Page, PageLimits, PaginationQuery, ProductId, slugify};

use super::{duplicate_name, write_error};
use crate::integrity::ReferentialIntegrityChecker;
use crate::listing::{PaginatedQueryEngine, ProductListing};
use crate::relationships::RelationshipSynchronizer;
use crate::store::{CatalogStore, CatalogTx, LookupField};

const LABEL: &str = "Product";
const ENTITY_KEY: &str = "product";

/// Product operations.
///
/// Product writes touch three tables (products, links, and reads of
/// trademarks/categories); each call is one transaction.
#[derive(Debug)]
pub struct ProductService<S> {
    store: Arc<S>,
    limits: PageLimits,
    engine: PaginatedQueryEngine,
    integrity: ReferentialIntegrityChecker,
    relationships: RelationshipSynchronizer,
}

impl<S> Clone for ProductService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            limits: self.limits,
            engine: self.engine,
            integrity: self.integrity,
            relationships: self.relationships,
        }
    }
}

impl<S: CatalogStore> ProductService<S> {
    pub fn new(store: Arc<S>, limits: PageLimits) -> Self {
        Self {
            store,
            limits,
            engine: PaginatedQueryEngine::new(),
            integrity: ReferentialIntegrityChecker::new(),
            relationships: RelationshipSynchronizer::new(),
        }
    }

    /// Insert the product and its category links atomically.
    #[instrument(skip(self, cmd), fields(name = %cmd.name, trademark_id = %cmd.trademark_id), err)]
    pub async fn create(&self, cmd: CreateProduct) -> CatalogResult<Envelope<ProductView>> {
        cmd.validate()?;

        let mut tx = self.store.begin().await?;
        let product = cmd.to_product(Utc::now());
        ensure_unique(&mut tx, &product).await?;

        let categories = cmd.category_set();
        self.integrity.require_trademark(&mut tx, product.trademark_id).await?;
        self.integrity.require_categories(&mut tx, &categories).await?;

        tx.insert_product(&product).await.map_err(write_error(LABEL))?;
        self.relationships.attach(&mut tx, product.id, &categories).await?;

        let view = expand_one(&mut tx, product).await?;
        tx.commit().await?;

        info!(id = %view.product.id, categories = view.categories.len(), "product created");
        Ok(Envelope::new("Product created successfully", ENTITY_KEY, view))
    }

    #[instrument(skip(self, query), err)]
    pub async fn find_all(&self, query: PaginationQuery) -> CatalogResult<Page<ProductView>> {
        let request = query.resolve(self.limits)?;
        let mut tx = self.store.snapshot().await?;

        let page = self.engine.run(&mut tx, &ProductListing, &request).await?;
        let items = expand(&mut tx, page.items).await?;
        Ok(Page {
            items,
            meta: page.meta,
        })
    }

    /// Resolve by id or slug. An id match takes precedence.
    #[instrument(skip(self), err)]
    pub async fn find_one(&self, term: &str) -> CatalogResult<Envelope<ProductView>> {
        let mut tx = self.store.snapshot().await?;

        let mut found = None;
        if let Ok(id) = Uuid::parse_str(term) {
            found = tx.find_product(ProductId::from_uuid(id)).await?;
        }
        if found.is_none() {
            found = tx.find_product_by(LookupField::Slug, term).await?;
        }

        let product = found.ok_or_else(not_found)?;
        let view = expand_one(&mut tx, product).await?;
        Ok(Envelope::new("Product found", ENTITY_KEY, view))
    }

    /// Apply the present fields. A non-empty category list replaces the
    /// product's links wholesale; an absent or empty one leaves them alone.
    #[instrument(skip(self, cmd), fields(id = %id), err)]
    pub async fn update(&self, id: ProductId, cmd: UpdateProduct) -> CatalogResult<Envelope<ProductView>> {
        cmd.validate()?;

        let mut tx = self.store.begin().await?;
        let mut product = tx.find_product(id).await?.ok_or_else(not_found)?;

        if let Some(name) = cmd.name.as_deref().filter(|name| *name != product.name) {
            let mut renamed = product.clone();
            renamed.name = name.to_string();
            renamed.slug = slugify(name);
            ensure_unique(&mut tx, &renamed).await?;
        }
        if let Some(trademark_id) = cmd.trademark_id {
            self.integrity.require_trademark(&mut tx, trademark_id).await?;
        }

        let replacement = cmd.category_replacement();
        if let Some(categories) = &replacement {
            self.integrity.require_categories(&mut tx, categories).await?;
        }

        let now = Utc::now();
        let changed = cmd.apply_to(&mut product, now);
        if !changed && replacement.is_none() {
            debug!("no changes");
            let view = expand_one(&mut tx, product).await?;
            return Ok(Envelope::new("Product updated", ENTITY_KEY, view));
        }
        if !changed {
            product.updated_at = now;
        }

        if !tx.update_product(&product).await.map_err(write_error(LABEL))? {
            return Err(not_found());
        }
        if let Some(categories) = &replacement {
            self.relationships.replace(&mut tx, product.id, categories).await?;
        }

        let view = expand_one(&mut tx, product).await?;
        tx.commit().await?;

        info!(categories_replaced = replacement.is_some(), "product updated");
        Ok(Envelope::new("Product updated", ENTITY_KEY, view))
    }

    /// Delete the product and its category links in one unit.
    #[instrument(skip(self), fields(id = %id), err)]
    pub async fn remove(&self, id: ProductId) -> CatalogResult<Envelope<ProductView>> {
        let mut tx = self.store.begin().await?;
        let product = tx.find_product(id).await?.ok_or_else(not_found)?;
        let view = expand_one(&mut tx, product).await?;

        let unlinked = self.relationships.detach_all(&mut tx, id).await?;
        if !tx.delete_product(id).await? {
            return Err(not_found());
        }
        tx.commit().await?;

        info!(unlinked, "product removed");
        Ok(Envelope::new(
            format!("Product with ID {id} has been removed successfully"),
            ENTITY_KEY,
            view,
        ))
    }
}

async fn ensure_unique<T: CatalogTx>(tx: &mut T, product: &Product) -> CatalogResult<()> {
    for (field, value) in [
        (LookupField::Name, product.name.as_str()),
        (LookupField::Slug, product.slug.as_str()),
    ] {
        if let Some(existing) = tx.find_product_by(field, value).await? {
            if existing.id != product.id {
                return Err(duplicate_name(LABEL));
            }
        }
    }
    Ok(())
}

async fn expand_one<T: CatalogTx>(tx: &mut T, product: Product) -> CatalogResult<ProductView> {
    expand(tx, vec![product])
        .await?
        .pop()
        .ok_or_else(|| CatalogError::persistence("product vanished while resolving references"))
}

/// Resolve trademark and category summaries for a batch of products.
///
/// Three lookups regardless of batch size: the links of every product, then
/// every referenced trademark and every referenced category.
async fn expand<T: CatalogTx>(tx: &mut T, products: Vec<Product>) -> CatalogResult<Vec<ProductView>> {
    if products.is_empty() {
        return Ok(vec![]);
    }

    let product_ids: Vec<ProductId> = products.iter().map(|p| p.id).collect();
    let links = tx.links_for(&product_ids).await?;

    let trademark_ids = distinct(products.iter().map(|p| *p.trademark_id.as_uuid()));
    let category_ids = distinct(links.iter().map(|link| *link.category_id.as_uuid()));

    let trademarks = summaries(tx.find_named_many(NamedKind::Trademark, &trademark_ids).await?);
    let categories = summaries(tx.find_named_many(NamedKind::Category, &category_ids).await?);

    let mut by_product: HashMap<ProductId, Vec<NamedSummary>> = HashMap::new();
    for link in &links {
        if let Some(summary) = categories.get(link.category_id.as_uuid()) {
            by_product.entry(link.product_id).or_default().push(summary.clone());
        }
    }

    Ok(products
        .into_iter()
        .map(|product| ProductView {
            trademark: trademarks.get(product.trademark_id.as_uuid()).cloned(),
            categories: by_product.remove(&product.id).unwrap_or_default(),
            product,
        })
        .collect())
}

fn distinct(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

fn summaries(entities: Vec<NamedEntity>) -> HashMap<Uuid, NamedSummary> {
    entities
        .into_iter()
        .map(|entity| (entity.id, entity.summary()))
        .collect()
}

fn not_found() -> CatalogError {
    CatalogError::not_found("Product not found")
}
