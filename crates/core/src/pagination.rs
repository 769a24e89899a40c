//! Paging arithmetic shared by every listing.
//!
//! A listing request arrives as a loosely-shaped [`PaginationQuery`], is
//! resolved against [`PageLimits`] into a [`PageRequest`], and produces a
//! [`Page`] whose [`PageMeta`] describes the whole filtered result set.

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Caller-supplied listing parameters (all optional).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

impl PaginationQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
            search: None,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Apply defaults and bounds.
    ///
    /// `page` and `limit` must be at least 1; `limit` is clamped to
    /// `limits.max_limit`. An empty search string means "no search".
    pub fn resolve(self, limits: PageLimits) -> CatalogResult<PageRequest> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(limits.default_limit);

        if page == 0 {
            return Err(CatalogError::validation("page must be at least 1"));
        }
        if limit == 0 {
            return Err(CatalogError::validation("limit must be at least 1"));
        }

        Ok(PageRequest {
            page,
            limit: limit.min(limits.max_limit.max(1)),
            search: self.search.filter(|s| !s.is_empty()),
        })
    }
}

/// Default and maximum page sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

/// A validated listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
}

impl PageRequest {
    /// Row window for this page: `offset = (page - 1) * limit`.
    pub fn window(&self) -> PageWindow {
        PageWindow {
            offset: u64::from(self.page - 1) * u64::from(self.limit),
            limit: u64::from(self.limit),
        }
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }
}

/// Offset/limit pair handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

/// Totals describing the filtered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub last_page: u64,
}

impl PageMeta {
    pub fn new(total: u64, page: u32, limit: u32) -> Self {
        Self {
            total,
            page,
            last_page: total.div_ceil(u64::from(limit.max(1))),
        }
    }

    /// `true` when the requested page lies past the last one.
    pub fn is_past_end(&self) -> bool {
        u64::from(self.page) > self.last_page
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn empty(meta: PageMeta) -> Self {
        Self {
            items: Vec::new(),
            meta,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_missing() {
        let req = PaginationQuery::default().resolve(PageLimits::default()).unwrap();
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, 10);
        assert_eq!(req.search, None);
    }

    #[test]
    fn zero_page_or_limit_is_rejected() {
        let err = PaginationQuery::new(0, 10).resolve(PageLimits::default()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let err = PaginationQuery::new(1, 0).resolve(PageLimits::default()).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn limit_is_clamped_to_max() {
        let limits = PageLimits {
            default_limit: 10,
            max_limit: 50,
        };
        let req = PaginationQuery::new(1, 500).resolve(limits).unwrap();
        assert_eq!(req.limit, 50);
    }

    #[test]
    fn empty_search_means_no_search() {
        let req = PaginationQuery::new(1, 10)
            .with_search("")
            .resolve(PageLimits::default())
            .unwrap();
        assert_eq!(req.search(), None);
    }

    #[test]
    fn window_offsets_by_whole_pages() {
        let req = PaginationQuery::new(3, 10).resolve(PageLimits::default()).unwrap();
        assert_eq!(req.window(), PageWindow { offset: 20, limit: 10 });
    }

    #[test]
    fn meta_rounds_last_page_up() {
        let meta = PageMeta::new(25, 2, 10);
        assert_eq!(meta.last_page, 3);
        assert!(!meta.is_past_end());
        assert!(PageMeta::new(25, 4, 10).is_past_end());
        assert_eq!(PageMeta::new(0, 1, 10).last_page, 0);
    }

    #[test]
    fn meta_serializes_camel_case() {
        let json = serde_json::to_value(PageMeta::new(25, 2, 10)).unwrap();
        assert_eq!(json, serde_json::json!({ "total": 25, "page": 2, "lastPage": 3 }));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every row index below `total` lands on exactly one page
            /// in `1..=last_page`.
            #[test]
            fn pages_cover_total_exactly(total in 0u64..5_000, limit in 1u32..200) {
                let meta = PageMeta::new(total, 1, limit);
                let covered = meta.last_page * u64::from(limit);
                prop_assert!(covered >= total);
                prop_assert!(covered < total + u64::from(limit) || total == 0);
            }
        }
    }
}
