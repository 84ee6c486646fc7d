//! Product Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::Sku;

/// Catalog product. Every purchasable configuration lives in a variant;
/// the product itself only carries shared metadata and counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub brand: String,
    pub category: String,
    pub base_price: i64,
    pub sold_count: i64,
    pub is_active: bool,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchasable SKU-level configuration with its own price and stock.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Variant {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub price: i64,
    pub inventory: i64,
}

impl Product {
    pub fn create(
        name: impl Into<String>,
        brand: impl Into<String>,
        category: impl Into<String>,
        base_price: i64,
        variants: Vec<Variant>,
    ) -> Result<Self, ProductError> {
        if variants.len() < 2 {
            return Err(ProductError::TooFewVariants);
        }
        if base_price < 0 || variants.iter().any(|v| v.price < 0 || v.inventory < 0) {
            return Err(ProductError::NegativeAmount);
        }
        let name = name.into();
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            slug: slugify(&name),
            name,
            brand: brand.into(),
            category: category.into(),
            base_price,
            sold_count: 0,
            is_active: true,
            variants,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn variant(&self, variant_id: Uuid) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id == variant_id)
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

#[derive(Debug, Clone, Error)]
pub enum ProductError {
    #[error("product must have at least 2 variants")]
    TooFewVariants,
    #[error("prices and inventory must not be negative")]
    NegativeAmount,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(sku: &str, price: i64, inventory: i64) -> Variant {
        Variant {
            id: Uuid::now_v7(),
            sku: Sku::new(sku).unwrap(),
            name: sku.to_string(),
            price,
            inventory,
        }
    }

    #[test]
    fn test_requires_two_variants() {
        let err = Product::create("Laptop", "Acme", "laptops", 100, vec![variant("A-1", 100, 5)]);
        assert!(err.is_err());
        let ok = Product::create(
            "Laptop",
            "Acme",
            "laptops",
            100,
            vec![variant("A-1", 100, 5), variant("A-2", 120, 5)],
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_slug() {
        let p = Product::create(
            "Gaming Laptop 16GB!",
            "Acme",
            "laptops",
            100,
            vec![variant("B-1", 100, 5), variant("B-2", 120, 5)],
        )
        .unwrap();
        assert_eq!(p.slug, "gaming-laptop-16gb");
    }
}
