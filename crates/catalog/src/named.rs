//! Categories, trademarks and brands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use diecast_core::{CatalogError, CatalogResult, slugify};

/// A record with a unique name and a slug derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedEntity {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NamedEntity {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let name = name.into();
        Self {
            id: Uuid::now_v7(),
            slug: slugify(&name),
            name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Change the name; the slug follows.
    pub fn rename(&mut self, name: impl Into<String>, now: DateTime<Utc>) {
        self.name = name.into();
        self.slug = slugify(&self.name);
        self.updated_at = now;
    }

    pub fn summary(&self) -> NamedSummary {
        NamedSummary {
            id: self.id,
            name: self.name.clone(),
            slug: self.slug.clone(),
        }
    }

    /// Substring match against id or name (case-sensitive).
    pub fn matches_search(&self, term: &str) -> bool {
        self.id.to_string().contains(term) || self.name.contains(term)
    }
}

/// Compact form embedded in product views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSummary {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Command: create a named entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNamed {
    pub name: String,
}

impl CreateNamed {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn validate(&self) -> CatalogResult<()> {
        validate_name(&self.name)
    }
}

/// Command: update a named entity. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateNamed {
    pub name: Option<String>,
}

impl UpdateNamed {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn validate(&self) -> CatalogResult<()> {
        match &self.name {
            Some(name) => validate_name(name),
            None => Ok(()),
        }
    }
}

/// A name must be non-blank and produce a non-empty slug.
pub(crate) fn validate_name(name: &str) -> CatalogResult<()> {
    if name.trim().is_empty() {
        return Err(CatalogError::validation("name cannot be empty"));
    }
    if slugify(name).is_empty() {
        return Err(CatalogError::validation(
            "name must contain at least one letter or digit",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entity_derives_slug() {
        let entity = NamedEntity::new("Hot Wheels", Utc::now());
        assert_eq!(entity.slug, "hot-wheels");
        assert_eq!(entity.created_at, entity.updated_at);
    }

    #[test]
    fn rename_regenerates_slug() {
        let mut entity = NamedEntity::new("Hot Wheels", Utc::now());
        entity.rename("Matchbox Classics", Utc::now());
        assert_eq!(entity.name, "Matchbox Classics");
        assert_eq!(entity.slug, "matchbox-classics");
    }

    #[test]
    fn search_matches_name_or_id() {
        let entity = NamedEntity::new("Majorette", Utc::now());
        assert!(entity.matches_search("jore"));
        assert!(entity.matches_search(&entity.id.to_string()[..8]));
        assert!(!entity.matches_search("majorette"));
    }

    #[test]
    fn blank_or_symbol_only_names_are_rejected() {
        assert!(matches!(
            CreateNamed::new("   ").validate(),
            Err(CatalogError::Validation(_))
        ));
        assert!(matches!(
            CreateNamed::new("!!!").validate(),
            Err(CatalogError::Validation(_))
        ));
        assert!(CreateNamed::new("Tomica").validate().is_ok());
        assert!(UpdateNamed::default().validate().is_ok());
    }
}
