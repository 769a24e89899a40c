//! Environment-driven configuration.

use std::env;

use thiserror::Error;

use diecast_core::PageLimits;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogConfig {
    /// `None` when `DATABASE_URL` is unset (in-memory use).
    pub database: Option<DatabaseConfig>,
    pub listing: PageLimits,
}

impl CatalogConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests use a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = match lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            }),
            None => None,
        };

        let listing = PageLimits {
            default_limit: parse_or(&lookup, "CATALOG_DEFAULT_PAGE_LIMIT", 10)?,
            max_limit: parse_or(&lookup, "CATALOG_MAX_PAGE_LIMIT", 100)?,
        };
        if listing.default_limit == 0 || listing.max_limit == 0 {
            return Err(ConfigError::Inconsistent(
                "page limits must be at least 1".to_string(),
            ));
        }
        if listing.default_limit > listing.max_limit {
            return Err(ConfigError::Inconsistent(format!(
                "CATALOG_DEFAULT_PAGE_LIMIT ({}) exceeds CATALOG_MAX_PAGE_LIMIT ({})",
                listing.default_limit, listing.max_limit
            )));
        }

        Ok(Self { database, listing })
    }

    pub fn require_database(&self) -> Result<&DatabaseConfig, ConfigError> {
        self.database.as_ref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

fn parse_or<F>(lookup: &F, key: &'static str, default: u32) -> Result<u32, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = CatalogConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CatalogConfig::default());
        assert_eq!(
            config.require_database(),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn reads_database_and_listing_settings() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/diecast"),
            ("DB_MAX_CONNECTIONS", "4"),
            ("CATALOG_DEFAULT_PAGE_LIMIT", "20"),
            ("CATALOG_MAX_PAGE_LIMIT", "50"),
        ]))
        .unwrap();

        let db = config.require_database().unwrap();
        assert_eq!(db.url, "postgres://localhost/diecast");
        assert_eq!(db.max_connections, 4);
        assert_eq!(config.listing.default_limit, 20);
        assert_eq!(config.listing.max_limit, 50);
    }

    #[test]
    fn rejects_non_numeric_values() {
        let err = CatalogConfig::from_lookup(lookup(&[("CATALOG_MAX_PAGE_LIMIT", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "CATALOG_MAX_PAGE_LIMIT",
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn rejects_default_above_max() {
        let err = CatalogConfig::from_lookup(lookup(&[
            ("CATALOG_DEFAULT_PAGE_LIMIT", "200"),
            ("CATALOG_MAX_PAGE_LIMIT", "100"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }
}
