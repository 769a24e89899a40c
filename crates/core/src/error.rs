//! Catalog error model.

use thiserror::Error;
use uuid::Uuid;

/// Result type used across the catalog layers.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog-level error.
///
/// Every operation surfaces exactly one of these to its caller. Nothing is
/// retried and nothing is partially committed: by the time an error is
/// returned, the surrounding transaction has been rolled back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The command was malformed (missing/empty fields, bad paging input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A record with the same unique value already exists, or a delete would
    /// orphan dependent records.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An id or slug lookup matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// A command referenced records that do not exist.
    #[error("{entity} reference(s) not found: {}", join_ids(.missing))]
    Referential {
        entity: &'static str,
        missing: Vec<Uuid>,
    },

    /// The store failed in a way the catalog does not interpret.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl CatalogError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn referential(entity: &'static str, missing: impl IntoIterator<Item = Uuid>) -> Self {
        Self::Referential {
            entity,
            missing: missing.into_iter().collect(),
        }
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Ids carried by a `Referential` error (empty for every other variant).
    pub fn missing_ids(&self) -> &[Uuid] {
        match self {
            Self::Referential { missing, .. } => missing,
            _ => &[],
        }
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referential_message_lists_every_missing_id() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let err = CatalogError::referential("category", [a, b]);

        let msg = err.to_string();
        assert!(msg.starts_with("category reference(s) not found"));
        assert!(msg.contains(&a.to_string()));
        assert!(msg.contains(&b.to_string()));
        assert_eq!(err.missing_ids(), &[a, b]);
    }

    #[test]
    fn non_referential_errors_carry_no_ids() {
        assert!(CatalogError::conflict("dup").missing_ids().is_empty());
    }
}
