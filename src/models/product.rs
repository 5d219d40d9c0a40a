use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ProductId;

/// A published catalog product
///
/// Products are owned by the catalog; the recommendation core only reads them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique identifier for the product
    pub id: ProductId,
    /// Catalog category (e.g., "cafe", "kids", "classes")
    pub category: String,
    /// Listed price in cents (e.g., 1299 = $12.99)
    pub price_cents: u64,
    /// Free-form attributes such as condition or size
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// When the product was published
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Creates a product with no attributes
    pub fn new(
        id: ProductId,
        category: impl Into<String>,
        price_cents: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            category: category.into(),
            price_cents,
            attributes: BTreeMap::new(),
            created_at,
        }
    }

    /// Adds an attribute, returning the product for chaining
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Price closeness to another product in `[0, 1]`, 1 meaning equal prices
    pub fn price_proximity(&self, other: &Product) -> f64 {
        let (a, b) = (self.price_cents as f64, other.price_cents as f64);
        let max = a.max(b);
        if max == 0.0 {
            return 1.0;
        }
        1.0 - (a - b).abs() / max
    }

    /// Condition grade from 1 (poor) to 5 (new); unknown or missing grades count as good
    pub fn condition_grade(&self) -> u8 {
        match self.attributes.get("condition").map(String::as_str) {
            Some("new") => 5,
            Some("like-new") => 4,
            Some("fair") => 2,
            Some("poor") => 1,
            _ => 3,
        }
    }

    /// Condition closeness to another product in `[0, 1]`, 1 meaning the same grade
    pub fn condition_proximity(&self, other: &Product) -> f64 {
        let gap = self.condition_grade().abs_diff(other.condition_grade());
        1.0 - f64::from(gap) / 4.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: u64, price_cents: u64) -> Product {
        Product::new(ProductId(id), "kids", price_cents, Utc::now())
    }

    #[test]
    fn test_new_product() {
        let p = product(1, 1500).with_attribute("condition", "like-new");
        assert_eq!(p.id, ProductId(1));
        assert_eq!(p.category, "kids");
        assert_eq!(p.attributes.get("condition").map(String::as_str), Some("like-new"));
    }

    #[test]
    fn test_price_proximity() {
        assert_eq!(product(1, 1000).price_proximity(&product(2, 1000)), 1.0);
        assert_eq!(product(1, 1000).price_proximity(&product(2, 500)), 0.5);
        assert_eq!(product(1, 0).price_proximity(&product(2, 0)), 1.0);
    }

    #[test]
    fn test_condition_proximity() {
        let new = product(1, 100).with_attribute("condition", "new");
        let poor = product(2, 100).with_attribute("condition", "poor");
        let unknown = product(3, 100).with_attribute("condition", "vintage");

        assert_eq!(new.condition_grade(), 5);
        assert_eq!(unknown.condition_grade(), 3);
        assert_eq!(product(4, 100).condition_grade(), 3);
        assert_eq!(new.condition_proximity(&poor), 0.0);
        assert_eq!(new.condition_proximity(&unknown), 0.5);
        assert_eq!(unknown.condition_proximity(&product(4, 100)), 1.0);
    }

    #[test]
    fn test_product_serializes_camel_case() {
        let json = serde_json::to_value(product(7, 250)).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["priceCents"], 250);
        assert!(json.get("createdAt").is_some());
    }
}
