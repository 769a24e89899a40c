//! Catalog building blocks shared by every layer.
//!
//! Pure types and functions only: identifiers, the error taxonomy, slug
//! derivation, pagination arithmetic and the response envelope. Nothing in
//! here performs I/O.

pub mod envelope;
pub mod error;
pub mod id;
pub mod pagination;
pub mod slug;

pub use envelope::Envelope;
pub use error::{CatalogError, CatalogResult};
pub use id::{CategoryId, ProductId, TrademarkId};
pub use pagination::{Page, PageLimits, PageMeta, PageRequest, PageWindow, PaginationQuery};
pub use slug::slugify;
