//! Product/category link maintenance.

use tracing::debug;

use diecast_core::{CatalogError, CatalogResult, CategoryId, ProductId};

use crate::store::CatalogTx;

/// Writes the join rows between a product and its categories.
///
/// Every method borrows an open transaction, so links are only ever persisted
/// together with the product write that owns them.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelationshipSynchronizer;

impl RelationshipSynchronizer {
    pub fn new() -> Self {
        Self
    }

    /// One link per category for a freshly inserted product.
    pub async fn attach<T: CatalogTx>(
        &self,
        tx: &mut T,
        product_id: ProductId,
        category_ids: &[CategoryId],
    ) -> CatalogResult<()> {
        if category_ids.is_empty() {
            return Err(CatalogError::validation("a product needs at least one category"));
        }
        tx.insert_links(product_id, category_ids).await?;
        debug!(product_id = %product_id, links = category_ids.len(), "attached categories");
        Ok(())
    }

    /// Full replace: drop every existing link, then insert the new set.
    pub async fn replace<T: CatalogTx>(
        &self,
        tx: &mut T,
        product_id: ProductId,
        category_ids: &[CategoryId],
    ) -> CatalogResult<()> {
        if category_ids.is_empty() {
            return Err(CatalogError::validation("a product needs at least one category"));
        }
        let removed = tx.delete_links(product_id).await?;
        tx.insert_links(product_id, category_ids).await?;
        debug!(
            product_id = %product_id,
            removed,
            inserted = category_ids.len(),
            "replaced categories"
        );
        Ok(())
    }

    pub async fn detach_all<T: CatalogTx>(&self, tx: &mut T, product_id: ProductId) -> CatalogResult<u64> {
        Ok(tx.delete_links(product_id).await?)
    }
}
