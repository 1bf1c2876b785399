//! Catalog product types.

use serde::{Deserialize, Serialize};

use camstore_core::{Price, ProductId};

use crate::error::StoreError;

/// A camera listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image_url: String,
    pub price: Price,
    #[serde(default)]
    pub stock: u32,
}

/// Product fields submitted by the admin console when creating or editing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub category: String,
    pub image_url: String,
    pub price: Price,
    pub stock: u32,
}

impl ProductInput {
    /// Check the fields the catalog cannot display without.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` naming every blank required field.
    pub fn validate(&self) -> Result<(), StoreError> {
        let missing: Vec<&'static str> = [
            ("name", self.name.as_str()),
            ("category", self.category.as_str()),
            ("imageUrl", self.image_url.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StoreError::Validation { missing })
        }
    }
}

impl From<&Product> for ProductInput {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            category: product.category.clone(),
            image_url: product.image_url.clone(),
            price: product.price,
            stock: product.stock,
        }
    }
}
