//! Count-then-page listing shared by every entity kind.

use async_trait::async_trait;
use tracing::debug;

use diecast_catalog::{NamedEntity, NamedKind, Product};
use diecast_core::{CatalogResult, Page, PageMeta, PageRequest, PageWindow};

use crate::store::{CatalogTx, SearchFilter, StoreResult};

/// A listable table: how to count the filtered rows and fetch one window.
#[async_trait]
pub trait ListSource<T: CatalogTx>: Send + Sync {
    type Item: Send;

    async fn count(&self, tx: &mut T, filter: &SearchFilter) -> StoreResult<u64>;

    async fn fetch(&self, tx: &mut T, filter: &SearchFilter, window: PageWindow) -> StoreResult<Vec<Self::Item>>;
}

/// Listing over one named-entity kind.
#[derive(Debug, Clone, Copy)]
pub struct NamedListing(pub NamedKind);

#[async_trait]
impl<T: CatalogTx> ListSource<T> for NamedListing {
    type Item = NamedEntity;

    async fn count(&self, tx: &mut T, filter: &SearchFilter) -> StoreResult<u64> {
        tx.count_named(self.0, filter).await
    }

    async fn fetch(&self, tx: &mut T, filter: &SearchFilter, window: PageWindow) -> StoreResult<Vec<NamedEntity>> {
        tx.page_named(self.0, filter, window).await
    }
}

/// Listing over products (search also matches sku).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProductListing;

#[async_trait]
impl<T: CatalogTx> ListSource<T> for ProductListing {
    type Item = Product;

    async fn count(&self, tx: &mut T, filter: &SearchFilter) -> StoreResult<u64> {
        tx.count_products(filter).await
    }

    async fn fetch(&self, tx: &mut T, filter: &SearchFilter, window: PageWindow) -> StoreResult<Vec<Product>> {
        tx.page_products(filter, window).await
    }
}

/// Runs a listing: one count, then (unless the page lies past the end) one
/// window fetch ordered newest first.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaginatedQueryEngine;

impl PaginatedQueryEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn run<T, L>(&self, tx: &mut T, source: &L, request: &PageRequest) -> CatalogResult<Page<L::Item>>
    where
        T: CatalogTx,
        L: ListSource<T>,
    {
        let filter = SearchFilter::from_request(request);
        let total = source.count(tx, &filter).await?;
        let meta = PageMeta::new(total, request.page, request.limit);

        if meta.is_past_end() {
            debug!(total, page = request.page, last_page = meta.last_page, "page past end");
            return Ok(Page::empty(meta));
        }

        let items = source.fetch(tx, &filter, request.window()).await?;
        debug!(total, page = request.page, returned = items.len(), "listed page");
        Ok(Page { items, meta })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use diecast_core::{PageLimits, PaginationQuery};

    use super::*;
    use crate::store::{CatalogStore, InMemoryCatalogStore};

    async fn seed(store: &InMemoryCatalogStore, count: usize) -> Vec<NamedEntity> {
        let base = Utc::now();
        let mut tx = store.begin().await.unwrap();
        let mut seeded = Vec::with_capacity(count);
        for i in 0..count {
            let entity = NamedEntity::new(format!("Series {i:02}"), base + Duration::seconds(i as i64));
            tx.insert_named(NamedKind::Category, &entity).await.unwrap();
            seeded.push(entity);
        }
        tx.commit().await.unwrap();
        seeded
    }

    fn request(page: u32, limit: u32) -> PageRequest {
        PaginationQuery::new(page, limit).resolve(PageLimits::default()).unwrap()
    }

    #[tokio::test]
    async fn second_page_holds_items_eleven_to_twenty() {
        let store = InMemoryCatalogStore::new();
        let seeded = seed(&store, 25).await;
        let mut tx = store.snapshot().await.unwrap();

        let page = PaginatedQueryEngine::new()
            .run(&mut tx, &NamedListing(NamedKind::Category), &request(2, 10))
            .await
            .unwrap();

        assert_eq!(page.meta, PageMeta { total: 25, page: 2, last_page: 3 });
        // newest first: seeded[24] is item 1, so item 11 is seeded[14]
        let expected: Vec<_> = seeded.iter().rev().skip(10).take(10).cloned().collect();
        assert_eq!(page.items, expected);
    }

    #[tokio::test]
    async fn page_past_end_is_empty_with_same_total() {
        let store = InMemoryCatalogStore::new();
        seed(&store, 25).await;
        let mut tx = store.snapshot().await.unwrap();

        let page = PaginatedQueryEngine::new()
            .run(&mut tx, &NamedListing(NamedKind::Category), &request(4, 10))
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.meta, PageMeta { total: 25, page: 4, last_page: 3 });
    }

    #[tokio::test]
    async fn search_restricts_total_and_items() {
        let store = InMemoryCatalogStore::new();
        seed(&store, 25).await;
        let mut tx = store.snapshot().await.unwrap();

        let req = PaginationQuery::new(1, 10)
            .with_search("Series 1")
            .resolve(PageLimits::default())
            .unwrap();
        let page = PaginatedQueryEngine::new()
            .run(&mut tx, &NamedListing(NamedKind::Category), &req)
            .await
            .unwrap();

        // "Series 10" through "Series 19"
        assert_eq!(page.meta.total, 10);
        assert!(page.items.iter().all(|e| e.name.starts_with("Series 1")));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 32,
                ..ProptestConfig::default()
            })]

            /// Property: walking every page yields each row exactly once, newest first.
            #[test]
            fn pages_partition_the_listing(total in 0usize..40, limit in 1u32..12) {
                let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let (walked, expected) = rt.block_on(async {
                    let store = InMemoryCatalogStore::new();
                    let seeded = seed(&store, total).await;
                    let mut tx = store.snapshot().await.unwrap();

                    let mut walked = Vec::new();
                    let mut page_no = 1;
                    loop {
                        let page = PaginatedQueryEngine::new()
                            .run(&mut tx, &NamedListing(NamedKind::Category), &request(page_no, limit))
                            .await
                            .unwrap();
                        if page.items.is_empty() {
                            assert!(page.meta.is_past_end());
                            break;
                        }
                        walked.extend(page.items);
                        page_no += 1;
                    }
                    let expected: Vec<_> = seeded.into_iter().rev().collect();
                    (walked, expected)
                });
                prop_assert_eq!(walked, expected);
            }
        }
    }
}
