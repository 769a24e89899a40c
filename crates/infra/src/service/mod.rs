//! Catalog operations: the public entry points of the workspace.
//!
//! Every write runs in one store transaction that is committed only after all
//! checks and writes succeeded; any early return drops (rolls back) it.

mod named;
mod product;

use std::sync::Arc;

use diecast_catalog::NamedKind;
use diecast_core::{CatalogError, PageLimits};

use crate::store::{CatalogStore, StoreError};

pub use named::NamedEntityService;
pub use product::ProductService;

/// All four services over one shared store.
#[derive(Debug)]
pub struct CatalogService<S> {
    pub products: ProductService<S>,
    pub categories: NamedEntityService<S>,
    pub trademarks: NamedEntityService<S>,
    pub brands: NamedEntityService<S>,
}

impl<S: CatalogStore> CatalogService<S> {
    pub fn new(store: Arc<S>, limits: PageLimits) -> Self {
        Self {
            products: ProductService::new(store.clone(), limits),
            categories: NamedEntityService::new(store.clone(), NamedKind::Category, limits),
            trademarks: NamedEntityService::new(store.clone(), NamedKind::Trademark, limits),
            brands: NamedEntityService::new(store, NamedKind::Brand, limits),
        }
    }

    pub fn named(&self, kind: NamedKind) -> &NamedEntityService<S> {
        match kind {
            NamedKind::Category => &self.categories,
            NamedKind::Trademark => &self.trademarks,
            NamedKind::Brand => &self.brands,
        }
    }
}

impl<S> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        Self {
            products: self.products.clone(),
            categories: self.categories.clone(),
            trademarks: self.trademarks.clone(),
            brands: self.brands.clone(),
        }
    }
}

fn duplicate_name(label: &str) -> CatalogError {
    CatalogError::conflict(format!("{label} with that name has already been registered"))
}

/// A unique violation from the store means a concurrent writer won the race
/// past our pre-check; report it exactly like the pre-check would have.
pub(crate) fn write_error(label: &'static str) -> impl Fn(StoreError) -> CatalogError {
    move |err| match err {
        StoreError::UniqueViolation(_) => duplicate_name(label),
        other => other.into(),
    }
}
