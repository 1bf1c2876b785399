//! Cart types.
//!
//! [`Cart`] is a read cache of the server-held cart. It is only ever built
//! from a full server snapshot ([`Cart::from_remote`]), never edited line by
//! line on the client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use camstore_core::{Price, ProductId};

use super::Product;

/// One product in the cart. `quantity` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
    pub image_ref: String,
    pub quantity: u32,
}

impl CartLine {
    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.unit_price * self.quantity
    }
}

/// A cart line as returned by `GET /cart`.
///
/// The quantity is signed because the service does not guarantee it is
/// positive; such lines are dropped when building a [`Cart`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCartLine {
    #[serde(alias = "cameraId")]
    pub product_id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "price")]
    pub unit_price: Price,
    #[serde(alias = "imageUrl", default)]
    pub image_ref: String,
    pub quantity: i64,
}

/// Body of `POST /cart/add`: one unit of a product, upserted by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLineInput {
    pub product_id: ProductId,
    pub quantity: u32,
    pub name: String,
    pub unit_price: Price,
    pub image_ref: String,
}

impl From<&Product> for CartLineInput {
    fn from(product: &Product) -> Self {
        Self {
            product_id: product.id.clone(),
            quantity: 1,
            name: product.name.clone(),
            unit_price: product.price,
            image_ref: product.image_url.clone(),
        }
    }
}

/// The client-visible cart, keyed by product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    lines: BTreeMap<ProductId, CartLine>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the cache from a server snapshot.
    ///
    /// Lines with a non-positive quantity are dropped. Repeated product ids
    /// are folded into one line whose quantity is the sum.
    #[must_use]
    pub fn from_remote(remote: Vec<RemoteCartLine>) -> Self {
        let mut lines: BTreeMap<ProductId, CartLine> = BTreeMap::new();
        for line in remote {
            let Ok(quantity) = u32::try_from(line.quantity) else {
                continue;
            };
            if quantity == 0 {
                continue;
            }
            lines
                .entry(line.product_id.clone())
                .and_modify(|existing| {
                    existing.quantity = existing.quantity.saturating_add(quantity);
                })
                .or_insert(CartLine {
                    product_id: line.product_id,
                    name: line.name,
                    unit_price: line.unit_price,
                    image_ref: line.image_ref,
                    quantity,
                });
        }
        Self { lines }
    }

    /// Lines ordered by product id.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    /// The line for `product_id`, if present.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.get(product_id)
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units, for the cart badge.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .values()
            .fold(0_u32, |acc, line| acc.saturating_add(line.quantity))
    }

    /// Sum of `unit_price * quantity` over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.lines.values().map(CartLine::line_total).sum()
    }
}
