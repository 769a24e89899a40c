use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use diecast_catalog::{NamedEntity, NamedKind, Product, ProductCategoryLink};
use diecast_core::{CatalogError, CategoryId, PageRequest, PageWindow, ProductId};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation error.
///
/// These are **infrastructure errors**. Constraint violations are kept
/// distinct because the service layer gives them catalog meaning (a unique
/// violation is the store-side half of name uniqueness); everything else is
/// surfaced as a persistence failure without interpretation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A delete blocked by rows that still reference the target.
    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    /// A write referenced rows that do not exist.
    #[error("{entity} reference(s) missing: {missing:?}")]
    MissingReference {
        entity: &'static str,
        missing: Vec<Uuid>,
    },

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(msg) => CatalogError::conflict(msg),
            StoreError::ForeignKeyViolation(msg) => CatalogError::conflict(msg),
            StoreError::MissingReference { entity, missing } => CatalogError::referential(entity, missing),
            StoreError::Decode(msg) | StoreError::Backend(msg) => CatalogError::persistence(msg),
        }
    }
}

/// Exact-match lookup column.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LookupField {
    Name,
    Slug,
}

impl LookupField {
    pub fn column(self) -> &'static str {
        match self {
            LookupField::Name => "name",
            LookupField::Slug => "slug",
        }
    }
}

/// Row filter for counts and pages.
///
/// `term: None` selects every row; otherwise a row matches when the term is a
/// substring of its id, name or (products only) sku. Matching is
/// case-sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    pub term: Option<String>,
}

impl SearchFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn contains(term: impl Into<String>) -> Self {
        Self {
            term: Some(term.into()),
        }
    }

    pub fn from_request(request: &PageRequest) -> Self {
        Self {
            term: request.search.clone(),
        }
    }

    pub fn term(&self) -> Option<&str> {
        self.term.as_deref()
    }
}

/// Entry point to a catalog store.
///
/// `begin` opens a read-write unit of work; `snapshot` opens a read-only one
/// that takes no lock and sees either the pre- or post-state of concurrent
/// writes.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    type Tx: CatalogTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;

    async fn snapshot(&self) -> StoreResult<Self::Tx>;
}

#[async_trait]
impl<S> CatalogStore for Arc<S>
where
    S: CatalogStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self) -> StoreResult<Self::Tx> {
        (**self).begin().await
    }

    async fn snapshot(&self) -> StoreResult<Self::Tx> {
        (**self).snapshot().await
    }
}

/// One atomic unit of work against the catalog tables.
///
/// Implementations must:
/// - apply every write of the unit or none of them (`commit` publishes,
///   dropping the handle discards)
/// - enforce per-kind uniqueness of `name` and `slug` on insert and update
/// - reject products whose trademark does not exist and links whose product or
///   category does not exist (`MissingReference`, naming the missing ids)
/// - reject deletes of referenced categories/trademarks (`ForeignKeyViolation`)
/// - order pages by `created_at` descending, newest insert first on ties
#[async_trait]
pub trait CatalogTx: Send {
    // -- named entities (categories, trademarks, brands) --

    async fn find_named_by(
        &mut self,
        kind: NamedKind,
        field: LookupField,
        value: &str,
    ) -> StoreResult<Option<NamedEntity>>;

    async fn find_named(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<Option<NamedEntity>>;

    /// Batched lookup; ids that do not exist are simply absent from the result.
    async fn find_named_many(&mut self, kind: NamedKind, ids: &[Uuid]) -> StoreResult<Vec<NamedEntity>>;

    async fn count_named(&mut self, kind: NamedKind, filter: &SearchFilter) -> StoreResult<u64>;

    async fn page_named(
        &mut self,
        kind: NamedKind,
        filter: &SearchFilter,
        window: PageWindow,
    ) -> StoreResult<Vec<NamedEntity>>;

    async fn insert_named(&mut self, kind: NamedKind, entity: &NamedEntity) -> StoreResult<()>;

    /// Returns `false` when no row with that id exists.
    async fn update_named(&mut self, kind: NamedKind, entity: &NamedEntity) -> StoreResult<bool>;

    /// Returns `false` when no row with that id exists.
    async fn delete_named(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<bool>;

    /// Number of rows that would block deleting this entity: links for a
    /// category, products for a trademark, always zero for a brand.
    async fn count_dependents(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<u64>;

    // -- products --

    async fn find_product_by(&mut self, field: LookupField, value: &str) -> StoreResult<Option<Product>>;

    async fn find_product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;

    async fn count_products(&mut self, filter: &SearchFilter) -> StoreResult<u64>;

    async fn page_products(&mut self, filter: &SearchFilter, window: PageWindow) -> StoreResult<Vec<Product>>;

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;

    async fn update_product(&mut self, product: &Product) -> StoreResult<bool>;

    async fn delete_product(&mut self, id: ProductId) -> StoreResult<bool>;

    // -- product/category links --

    async fn insert_links(&mut self, product_id: ProductId, category_ids: &[CategoryId]) -> StoreResult<()>;

    /// Removes every link of the product; returns how many were removed.
    async fn delete_links(&mut self, product_id: ProductId) -> StoreResult<u64>;

    async fn links_for(&mut self, product_ids: &[ProductId]) -> StoreResult<Vec<ProductCategoryLink>>;

    /// Make every write of this unit visible.
    async fn commit(self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err: CatalogError = StoreError::UniqueViolation("categories_name_key".into()).into();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[test]
    fn missing_reference_maps_to_referential() {
        let id = Uuid::now_v7();
        let err: CatalogError = StoreError::MissingReference {
            entity: "trademark",
            missing: vec![id],
        }
        .into();
        assert_eq!(err, CatalogError::referential("trademark", [id]));
    }

    #[test]
    fn restricted_delete_maps_to_conflict() {
        let err: CatalogError = StoreError::ForeignKeyViolation("categories row is still referenced".into()).into();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[test]
    fn backend_failure_maps_to_persistence() {
        let err: CatalogError = StoreError::Backend("connection reset".into()).into();
        assert!(matches!(err, CatalogError::Persistence(_)));
    }
}
