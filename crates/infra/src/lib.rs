//! Infrastructure layer: stores, configuration and the catalog services.

/// Configuration loading and representation.
pub mod config;

/// Persistence boundary and its in-memory / Postgres adapters.
pub mod store;

pub mod integrity;
pub mod listing;
pub mod relationships;
pub mod service;


pub use config::{CatalogConfig, ConfigError, DatabaseConfig};
pub use integrity::ReferentialIntegrityChecker;
pub use listing::{ListSource, NamedListing, PaginatedQueryEngine, ProductListing};
pub use relationships::RelationshipSynchronizer;
pub use service::{CatalogService, NamedEntityService, ProductService};
pub use store::{CatalogStore, CatalogTx, InMemoryCatalogStore, PostgresCatalogStore};
