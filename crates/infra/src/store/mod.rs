//! Catalog persistence boundary.
//!
//! Services talk to storage only through [`CatalogStore`] / [`CatalogTx`].
//! Every unit of work, read or write, runs inside a transaction handle;
//! dropping a handle without calling `commit` rolls it back.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{FaultPoint, InMemoryCatalogStore, InMemoryTx};
pub use postgres::{PgCatalogTx, PostgresCatalogStore};
pub use r#trait::{CatalogStore, CatalogTx, LookupField, SearchFilter, StoreError, StoreResult};
