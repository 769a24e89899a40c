use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use diecast_catalog::{NamedEntity, NamedKind, Product, ProductCategoryLink};
use diecast_core::{CategoryId, PageWindow, ProductId};

use super::r#trait::{CatalogStore, CatalogTx, LookupField, SearchFilter, StoreError, StoreResult};

/// Operations that can be made to fail on demand (rollback tests).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    InsertProduct,
    UpdateProduct,
    InsertLinks,
    DeleteLinks,
}

/// A stored row plus its insertion sequence (tie-breaker for ordering).
#[derive(Debug, Clone)]
struct Stored<T> {
    seq: u64,
    record: T,
}

#[derive(Debug, Clone, Default)]
struct CatalogState {
    next_seq: u64,
    named: HashMap<NamedKind, HashMap<Uuid, Stored<NamedEntity>>>,
    products: HashMap<ProductId, Stored<Product>>,
    links: BTreeSet<ProductCategoryLink>,
}

impl CatalogState {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn named(&self, kind: NamedKind) -> impl Iterator<Item = &Stored<NamedEntity>> {
        self.named.get(&kind).into_iter().flat_map(|rows| rows.values())
    }

    fn named_mut(&mut self, kind: NamedKind) -> &mut HashMap<Uuid, Stored<NamedEntity>> {
        self.named.entry(kind).or_default()
    }

    fn ensure_named_unique(&self, kind: NamedKind, entity: &NamedEntity) -> StoreResult<()> {
        for row in self.named(kind) {
            if row.record.id == entity.id {
                continue;
            }
            if row.record.name == entity.name {
                return Err(StoreError::UniqueViolation(format!("{}_name_key", kind.table())));
            }
            if row.record.slug == entity.slug {
                return Err(StoreError::UniqueViolation(format!("{}_slug_key", kind.table())));
            }
        }
        Ok(())
    }

    fn ensure_product_valid(&self, product: &Product) -> StoreResult<()> {
        for row in self.products.values() {
            if row.record.id == product.id {
                continue;
            }
            if row.record.name == product.name {
                return Err(StoreError::UniqueViolation("products_name_key".to_string()));
            }
            if row.record.slug == product.slug {
                return Err(StoreError::UniqueViolation("products_slug_key".to_string()));
            }
        }

        let trademark_exists = self
            .named
            .get(&NamedKind::Trademark)
            .is_some_and(|rows| rows.contains_key(product.trademark_id.as_uuid()));
        if !trademark_exists {
            return Err(StoreError::MissingReference {
                entity: "trademark",
                missing: vec![*product.trademark_id.as_uuid()],
            });
        }
        Ok(())
    }

    fn count_dependents(&self, kind: NamedKind, id: Uuid) -> u64 {
        match kind {
            NamedKind::Category => self
                .links
                .iter()
                .filter(|link| *link.category_id.as_uuid() == id)
                .count() as u64,
            NamedKind::Trademark => self
                .products
                .values()
                .filter(|row| *row.record.trademark_id.as_uuid() == id)
                .count() as u64,
            NamedKind::Brand => 0,
        }
    }
}

/// Newest first: `created_at` descending, later insert first on ties.
fn newest_first<T>(rows: &mut [&Stored<T>], created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) {
    rows.sort_by(|a, b| {
        created_at(&b.record)
            .cmp(&created_at(&a.record))
            .then(b.seq.cmp(&a.seq))
    });
}

fn window_of<T: Clone>(rows: Vec<&Stored<T>>, window: PageWindow) -> Vec<T> {
    let offset = usize::try_from(window.offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);
    rows.into_iter()
        .skip(offset)
        .take(limit)
        .map(|row| row.record.clone())
        .collect()
}

/// In-memory catalog store.
///
/// Intended for tests/dev. Write transactions are serialized by an async
/// writer mutex and operate on a private copy of the committed state, which
/// `commit` publishes. Snapshots only copy the committed state and never wait
/// for an open writer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalogStore {
    committed: Arc<RwLock<CatalogState>>,
    writer: Arc<Mutex<()>>,
    faults: Arc<RwLock<HashSet<FaultPoint>>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `point` fail with a backend error.
    pub fn fail_on(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.faults.write() {
            faults.insert(point);
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.write() {
            faults.clear();
        }
    }

    /// Every committed link, in `(product, category)` order.
    pub fn all_links(&self) -> StoreResult<Vec<ProductCategoryLink>> {
        Ok(self.read_committed()?.links.into_iter().collect())
    }

    fn read_committed(&self) -> StoreResult<CatalogState> {
        let state = self
            .committed
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(state.clone())
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<InMemoryTx> {
        let guard = self.writer.clone().lock_owned().await;
        // Copied after taking the writer lock, so no commit can land in between.
        let working = self.read_committed()?;
        Ok(InMemoryTx {
            writer: Some(guard),
            working,
            committed: self.committed.clone(),
            faults: self.faults.clone(),
        })
    }

    async fn snapshot(&self) -> StoreResult<InMemoryTx> {
        let working = self.read_committed()?;
        Ok(InMemoryTx {
            writer: None,
            working,
            committed: self.committed.clone(),
            faults: self.faults.clone(),
        })
    }
}

/// Unit of work over [`InMemoryCatalogStore`].
///
/// Holds the writer lock for its whole lifetime when opened with `begin`.
#[derive(Debug)]
pub struct InMemoryTx {
    writer: Option<OwnedMutexGuard<()>>,
    working: CatalogState,
    committed: Arc<RwLock<CatalogState>>,
    faults: Arc<RwLock<HashSet<FaultPoint>>>,
}

impl InMemoryTx {
    fn check_fault(&self, point: FaultPoint) -> StoreResult<()> {
        let faults = self
            .faults
            .read()
            .map_err(|_| StoreError::Backend("fault registry lock poisoned".to_string()))?;
        if faults.contains(&point) {
            return Err(StoreError::Backend(format!("injected fault at {point:?}")));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> StoreResult<()> {
        if self.writer.is_none() {
            return Err(StoreError::Backend(
                "write attempted on a read-only snapshot".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for InMemoryTx {
    async fn find_named_by(
        &mut self,
        kind: NamedKind,
        field: LookupField,
        value: &str,
    ) -> StoreResult<Option<NamedEntity>> {
        Ok(self
            .working
            .named(kind)
            .map(|row| &row.record)
            .find(|entity| match field {
                LookupField::Name => entity.name == value,
                LookupField::Slug => entity.slug == value,
            })
            .cloned())
    }

    async fn find_named(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<Option<NamedEntity>> {
        Ok(self
            .working
            .named
            .get(&kind)
            .and_then(|rows| rows.get(&id))
            .map(|row| row.record.clone()))
    }

    async fn find_named_many(&mut self, kind: NamedKind, ids: &[Uuid]) -> StoreResult<Vec<NamedEntity>> {
        let Some(rows) = self.working.named.get(&kind) else {
            return Ok(vec![]);
        };
        let wanted: HashSet<&Uuid> = ids.iter().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|id| rows.get(id))
            .map(|row| row.record.clone())
            .collect())
    }

    async fn count_named(&mut self, kind: NamedKind, filter: &SearchFilter) -> StoreResult<u64> {
        Ok(self
            .working
            .named(kind)
            .filter(|row| filter.term().is_none_or(|term| row.record.matches_search(term)))
            .count() as u64)
    }

    async fn page_named(
        &mut self,
        kind: NamedKind,
        filter: &SearchFilter,
        window: PageWindow,
    ) -> StoreResult<Vec<NamedEntity>> {
        let mut rows: Vec<_> = self
            .working
            .named(kind)
            .filter(|row| filter.term().is_none_or(|term| row.record.matches_search(term)))
            .collect();
        newest_first(&mut rows, |entity| entity.created_at);
        Ok(window_of(rows, window))
    }

    async fn insert_named(&mut self, kind: NamedKind, entity: &NamedEntity) -> StoreResult<()> {
        self.ensure_writable()?;
        if self.working.named(kind).any(|row| row.record.id == entity.id) {
            return Err(StoreError::UniqueViolation(format!("{}_pkey", kind.table())));
        }
        self.working.ensure_named_unique(kind, entity)?;

        let seq = self.working.next_seq();
        self.working.named_mut(kind).insert(
            entity.id,
            Stored {
                seq,
                record: entity.clone(),
            },
        );
        Ok(())
    }

    async fn update_named(&mut self, kind: NamedKind, entity: &NamedEntity) -> StoreResult<bool> {
        self.ensure_writable()?;
        self.working.ensure_named_unique(kind, entity)?;
        match self.working.named_mut(kind).get_mut(&entity.id) {
            Some(row) => {
                row.record = entity.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_named(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<bool> {
        self.ensure_writable()?;
        if self.working.count_dependents(kind, id) > 0 {
            return Err(StoreError::ForeignKeyViolation(format!(
                "{} row {id} is still referenced",
                kind.table()
            )));
        }
        Ok(self.working.named_mut(kind).remove(&id).is_some())
    }

    async fn count_dependents(&mut self, kind: NamedKind, id: Uuid) -> StoreResult<u64> {
        Ok(self.working.count_dependents(kind, id))
    }

    async fn find_product_by(&mut self, field: LookupField, value: &str) -> StoreResult<Option<Product>> {
        Ok(self
            .working
            .products
            .values()
            .map(|row| &row.record)
            .find(|product| match field {
                LookupField::Name => product.name == value,
                LookupField::Slug => product.slug == value,
            })
            .cloned())
    }

    async fn find_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(&id).map(|row| row.record.clone()))
    }

    async fn count_products(&mut self, filter: &SearchFilter) -> StoreResult<u64> {
        Ok(self
            .working
            .products
            .values()
            .filter(|row| filter.term().is_none_or(|term| row.record.matches_search(term)))
            .count() as u64)
    }

    async fn page_products(&mut self, filter: &SearchFilter, window: PageWindow) -> StoreResult<Vec<Product>> {
        let mut rows: Vec<_> = self
            .working
            .products
            .values()
            .filter(|row| filter.term().is_none_or(|term| row.record.matches_search(term)))
            .collect();
        newest_first(&mut rows, |product| product.created_at);
        Ok(window_of(rows, window))
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        self.ensure_writable()?;
        self.check_fault(FaultPoint::InsertProduct)?;
        if self.working.products.contains_key(&product.id) {
            return Err(StoreError::UniqueViolation("products_pkey".to_string()));
        }
        self.working.ensure_product_valid(product)?;

        let seq = self.working.next_seq();
        self.working.products.insert(
            product.id,
            Stored {
                seq,
                record: product.clone(),
            },
        );
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<bool> {
        self.ensure_writable()?;
        self.check_fault(FaultPoint::UpdateProduct)?;
        if !self.working.products.contains_key(&product.id) {
            return Ok(false);
        }
        self.working.ensure_product_valid(product)?;
        if let Some(row) = self.working.products.get_mut(&product.id) {
            row.record = product.clone();
        }
        Ok(true)
    }

    async fn delete_product(&mut self, id: ProductId) -> StoreResult<bool> {
        self.ensure_writable()?;
        let removed = self.working.products.remove(&id).is_some();
        // Links cascade with their product, as in the SQL schema.
        self.working.links.retain(|link| link.product_id != id);
        Ok(removed)
    }

    async fn insert_links(&mut self, product_id: ProductId, category_ids: &[CategoryId]) -> StoreResult<()> {
        self.ensure_writable()?;
        self.check_fault(FaultPoint::InsertLinks)?;
        if !self.working.products.contains_key(&product_id) {
            return Err(StoreError::MissingReference {
                entity: "product",
                missing: vec![*product_id.as_uuid()],
            });
        }

        let categories = self.working.named.get(&NamedKind::Category);
        let missing: Vec<Uuid> = category_ids
            .iter()
            .map(|id| *id.as_uuid())
            .filter(|id| !categories.is_some_and(|rows| rows.contains_key(id)))
            .collect();
        if !missing.is_empty() {
            return Err(StoreError::MissingReference {
                entity: "category",
                missing,
            });
        }

        for category_id in category_ids {
            let link = ProductCategoryLink {
                product_id,
                category_id: *category_id,
            };
            if !self.working.links.insert(link) {
                return Err(StoreError::UniqueViolation(
                    "product_categories_pkey".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn delete_links(&mut self, product_id: ProductId) -> StoreResult<u64> {
        self.ensure_writable()?;
        self.check_fault(FaultPoint::DeleteLinks)?;
        let before = self.working.links.len();
        self.working.links.retain(|link| link.product_id != product_id);
        Ok((before - self.working.links.len()) as u64)
    }

    async fn links_for(&mut self, product_ids: &[ProductId]) -> StoreResult<Vec<ProductCategoryLink>> {
        let wanted: HashSet<&ProductId> = product_ids.iter().collect();
        Ok(self
            .working
            .links
            .iter()
            .filter(|link| wanted.contains(&link.product_id))
            .copied()
            .collect())
    }

    async fn commit(self) -> StoreResult<()> {
        // Snapshots have nothing to publish.
        let Some(_writer) = self.writer else {
            return Ok(());
        };
        let mut committed = self
            .committed
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        *committed = self.working;
        Ok(())
    }
}
