//! Products and their category links.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use diecast_core::{CatalogError, CatalogResult, CategoryId, ProductId, TrademarkId, slugify};

use crate::named::{NamedSummary, validate_name};

/// A catalog product.
///
/// Category references are not stored on the record itself; they live in
/// [`ProductCategoryLink`] rows owned by the product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub image: String,
    /// Price in the smallest currency unit (e.g. cents).
    pub price: u64,
    pub slug: String,
    pub stock: u32,
    pub is_available: bool,
    pub sku: Option<String>,
    pub trademark_id: TrademarkId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Substring match against id, name or sku (case-sensitive).
    pub fn matches_search(&self, term: &str) -> bool {
        self.id.to_string().contains(term)
            || self.name.contains(term)
            || self.sku.as_deref().is_some_and(|sku| sku.contains(term))
    }
}

/// Join row between a product and one of its categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCategoryLink {
    pub product_id: ProductId,
    pub category_id: CategoryId,
}

/// A product with its trademark and categories resolved to summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub trademark: Option<NamedSummary>,
    pub categories: Vec<NamedSummary>,
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    pub name: String,
    pub description: String,
    pub image: String,
    pub price: u64,
    pub stock: u32,
    pub is_available: bool,
    pub sku: Option<String>,
    pub trademark_id: TrademarkId,
    pub categories: Vec<CategoryId>,
}

impl CreateProduct {
    pub fn validate(&self) -> CatalogResult<()> {
        validate_name(&self.name)?;
        require_text("description", &self.description)?;
        require_text("image", &self.image)?;
        if self.categories.is_empty() {
            return Err(CatalogError::validation("categories cannot be empty"));
        }
        Ok(())
    }

    /// Requested categories with duplicates removed, first occurrence wins.
    pub fn category_set(&self) -> Vec<CategoryId> {
        dedup_ids(&self.categories)
    }

    /// Build the record this command describes (slug derived from name).
    pub fn to_product(&self, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::new(),
            name: self.name.clone(),
            description: self.description.clone(),
            image: self.image.clone(),
            price: self.price,
            slug: slugify(&self.name),
            stock: self.stock,
            is_available: self.is_available,
            sku: self.sku.clone(),
            trademark_id: self.trademark_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Command: UpdateProduct. Absent fields are left unchanged.
///
/// `sku` distinguishes an absent field (keep) from an explicit `null`
/// (clear) from a value (replace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub price: Option<u64>,
    pub stock: Option<u32>,
    pub is_available: Option<bool>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub sku: Option<Option<String>>,
    pub trademark_id: Option<TrademarkId>,
    pub categories: Option<Vec<CategoryId>>,
}

impl UpdateProduct {
    pub fn validate(&self) -> CatalogResult<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        if let Some(image) = &self.image {
            require_text("image", image)?;
        }
        Ok(())
    }

    /// Category set that should replace the current links.
    ///
    /// `None` when categories are absent *or* empty: an empty list never
    /// clears a product's links.
    pub fn category_replacement(&self) -> Option<Vec<CategoryId>> {
        self.categories
            .as_deref()
            .filter(|ids| !ids.is_empty())
            .map(dedup_ids)
    }

    /// Apply the scalar field changes to `product`. Returns whether anything
    /// changed; `updated_at` only moves when it did.
    pub fn apply_to(&self, product: &mut Product, now: DateTime<Utc>) -> bool {
        let before = product.clone();

        if let Some(name) = &self.name {
            product.name = name.clone();
            product.slug = slugify(name);
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(image) = &self.image {
            product.image = image.clone();
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(is_available) = self.is_available {
            product.is_available = is_available;
        }
        if let Some(sku) = &self.sku {
            product.sku = sku.clone();
        }
        if let Some(trademark_id) = self.trademark_id {
            product.trademark_id = trademark_id;
        }

        let changed = *product != before;
        if changed {
            product.updated_at = now;
        }
        changed
    }
}

/// A field that is present in the payload, even as `null`, is `Some`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn require_text(field: &str, value: &str) -> CatalogResult<()> {
    if value.trim().is_empty() {
        return Err(CatalogError::validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn dedup_ids(ids: &[CategoryId]) -> Vec<CategoryId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_cmd() -> CreateProduct {
        CreateProduct {
            name: "Hot Wheels '67 Camaro".to_string(),
            description: "1:64 die-cast".to_string(),
            image: "https://img.example/camaro.png".to_string(),
            price: 499,
            stock: 12,
            is_available: true,
            sku: Some("HW-67-CAM".to_string()),
            trademark_id: TrademarkId::new(),
            categories: vec![CategoryId::new()],
        }
    }

    #[test]
    fn to_product_derives_slug_and_copies_fields() {
        let cmd = create_cmd();
        let now = Utc::now();
        let product = cmd.to_product(now);

        assert_eq!(product.slug, "hot-wheels-67-camaro");
        assert_eq!(product.price, 499);
        assert_eq!(product.trademark_id, cmd.trademark_id);
        assert_eq!(product.created_at, now);
    }

    #[test]
    fn create_requires_at_least_one_category() {
        let mut cmd = create_cmd();
        cmd.categories.clear();
        assert!(matches!(cmd.validate(), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn create_rejects_blank_description() {
        let mut cmd = create_cmd();
        cmd.description = "  ".to_string();
        assert!(matches!(cmd.validate(), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn category_set_drops_duplicates_in_order() {
        let a = CategoryId::new();
        let b = CategoryId::new();
        let mut cmd = create_cmd();
        cmd.categories = vec![a, b, a, b];
        assert_eq!(cmd.category_set(), vec![a, b]);
    }

    #[test]
    fn empty_category_update_is_not_a_replacement() {
        let update = UpdateProduct {
            categories: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(update.category_replacement(), None);
        assert_eq!(UpdateProduct::default().category_replacement(), None);
    }

    #[test]
    fn apply_to_reslugs_on_rename_and_bumps_updated_at() {
        let created = Utc::now() - chrono::Duration::minutes(5);
        let mut product = create_cmd().to_product(created);
        let now = Utc::now();

        let update = UpdateProduct {
            name: Some("Camaro Z28".to_string()),
            stock: Some(0),
            ..Default::default()
        };
        assert!(update.apply_to(&mut product, now));
        assert_eq!(product.slug, "camaro-z28");
        assert_eq!(product.stock, 0);
        assert_eq!(product.updated_at, now);
        assert_eq!(product.created_at, created);
    }

    #[test]
    fn apply_to_without_changes_keeps_updated_at() {
        let created = Utc::now();
        let mut product = create_cmd().to_product(created);
        let update = UpdateProduct {
            price: Some(product.price),
            ..Default::default()
        };
        assert!(!update.apply_to(&mut product, Utc::now()));
        assert_eq!(product.updated_at, created);
    }

    #[test]
    fn sku_update_can_replace_clear_or_keep() {
        let mut product = create_cmd().to_product(Utc::now());

        let keep = UpdateProduct {
            stock: Some(1),
            ..Default::default()
        };
        keep.apply_to(&mut product, Utc::now());
        assert_eq!(product.sku.as_deref(), Some("HW-67-CAM"));

        let replace = UpdateProduct {
            sku: Some(Some("HW-67-Z28".to_string())),
            ..Default::default()
        };
        assert!(replace.apply_to(&mut product, Utc::now()));
        assert_eq!(product.sku.as_deref(), Some("HW-67-Z28"));

        let clear = UpdateProduct {
            sku: Some(None),
            ..Default::default()
        };
        assert!(clear.apply_to(&mut product, Utc::now()));
        assert_eq!(product.sku, None);
    }

    #[test]
    fn sku_null_in_payload_differs_from_absent() {
        let absent: UpdateProduct = serde_json::from_str(r#"{"stock": 3}"#).unwrap();
        assert_eq!(absent.sku, None);

        let null: UpdateProduct = serde_json::from_str(r#"{"sku": null}"#).unwrap();
        assert_eq!(null.sku, Some(None));

        let value: UpdateProduct = serde_json::from_str(r#"{"sku": "HW-1"}"#).unwrap();
        assert_eq!(value.sku, Some(Some("HW-1".to_string())));

        let json = serde_json::to_value(&absent).unwrap();
        assert!(json.get("sku").is_none());
    }

    #[test]
    fn search_covers_id_name_and_sku() {
        let product = create_cmd().to_product(Utc::now());
        assert!(product.matches_search("Camaro"));
        assert!(product.matches_search("67-CAM"));
        assert!(product.matches_search(&product.id.to_string()[..8]));
        assert!(!product.matches_search("camaro"));
    }

    #[test]
    fn view_flattens_product_fields() {
        let product = create_cmd().to_product(Utc::now());
        let view = ProductView {
            product: product.clone(),
            trademark: None,
            categories: vec![],
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["slug"], "hot-wheels-67-camaro");
        assert_eq!(json["isAvailable"], true);
        assert!(json["categories"].as_array().unwrap().is_empty());
    }
}
