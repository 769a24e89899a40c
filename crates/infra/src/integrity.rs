//! Existence checks for the records a product references.

use std::collections::HashSet;

use tracing::debug;
use uuid::Uuid;

use diecast_catalog::NamedKind;
use diecast_core::{CatalogError, CatalogResult, CategoryId, TrademarkId};

use crate::store::CatalogTx;

/// Verifies trademark and category references before a product write.
///
/// Category checks are a single batched lookup regardless of how many ids are
/// requested.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferentialIntegrityChecker;

impl ReferentialIntegrityChecker {
    pub fn new() -> Self {
        Self
    }

    pub async fn check_trademark<T: CatalogTx>(&self, tx: &mut T, id: TrademarkId) -> CatalogResult<bool> {
        let found = tx.find_named(NamedKind::Trademark, *id.as_uuid()).await?;
        Ok(found.is_some())
    }

    /// Returns the requested ids that do not exist, in request order without
    /// duplicates. Empty means every reference is valid.
    pub async fn check_categories<T: CatalogTx>(
        &self,
        tx: &mut T,
        ids: &[CategoryId],
    ) -> CatalogResult<Vec<CategoryId>> {
        let requested = dedup(ids);
        if requested.is_empty() {
            return Ok(vec![]);
        }

        let lookup: Vec<Uuid> = requested.iter().map(|id| *id.as_uuid()).collect();
        let found: HashSet<Uuid> = tx
            .find_named_many(NamedKind::Category, &lookup)
            .await?
            .into_iter()
            .map(|entity| entity.id)
            .collect();

        let missing: Vec<CategoryId> = requested
            .into_iter()
            .filter(|id| !found.contains(id.as_uuid()))
            .collect();
        debug!(requested = lookup.len(), missing = missing.len(), "checked category references");
        Ok(missing)
    }

    pub async fn require_trademark<T: CatalogTx>(&self, tx: &mut T, id: TrademarkId) -> CatalogResult<()> {
        if self.check_trademark(tx, id).await? {
            Ok(())
        } else {
            Err(CatalogError::referential("trademark", [*id.as_uuid()]))
        }
    }

    pub async fn require_categories<T: CatalogTx>(&self, tx: &mut T, ids: &[CategoryId]) -> CatalogResult<()> {
        let missing = self.check_categories(tx, ids).await?;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::referential(
                "category",
                missing.iter().map(|id| *id.as_uuid()),
            ))
        }
    }
}

fn dedup(ids: &[CategoryId]) -> Vec<CategoryId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use diecast_catalog::NamedEntity;

    use super::*;
    use crate::store::{CatalogStore, InMemoryCatalogStore};

    async fn seed_category(store: &InMemoryCatalogStore, name: &str) -> CategoryId {
        let entity = NamedEntity::new(name, Utc::now());
        let mut tx = store.begin().await.unwrap();
        tx.insert_named(NamedKind::Category, &entity).await.unwrap();
        tx.commit().await.unwrap();
        CategoryId::from_uuid(entity.id)
    }

    #[tokio::test]
    async fn reports_only_missing_categories() {
        let store = InMemoryCatalogStore::new();
        let a = seed_category(&store, "Trucks").await;
        let b = CategoryId::new();

        let mut tx = store.snapshot().await.unwrap();
        let missing = ReferentialIntegrityChecker::new()
            .check_categories(&mut tx, &[a, b, b])
            .await
            .unwrap();
        assert_eq!(missing, vec![b]);
    }

    #[tokio::test]
    async fn require_categories_lists_every_missing_id() {
        let store = InMemoryCatalogStore::new();
        let a = seed_category(&store, "Trucks").await;
        let (b, c) = (CategoryId::new(), CategoryId::new());

        let mut tx = store.snapshot().await.unwrap();
        let err = ReferentialIntegrityChecker::new()
            .require_categories(&mut tx, &[a, b, c])
            .await
            .unwrap_err();
        assert_eq!(err.missing_ids(), &[*b.as_uuid(), *c.as_uuid()]);
    }

    #[tokio::test]
    async fn unknown_trademark_is_referential() {
        let store = InMemoryCatalogStore::new();
        let id = TrademarkId::new();
        let mut tx = store.snapshot().await.unwrap();
        let err = ReferentialIntegrityChecker::new()
            .require_trademark(&mut tx, id)
            .await
            .unwrap_err();
        assert_eq!(err, CatalogError::referential("trademark", [*id.as_uuid()]));
    }
}
