//! Cached product catalog.
//!
//! Listings are cached with `moka`; the admin console drops the cache after
//! every product write.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};

use camstore_core::ProductId;

use crate::backend::CatalogService;
use crate::error::Result;
use crate::models::Product;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Products,
    Product(ProductId),
}

#[derive(Debug, Clone)]
enum CacheValue {
    Products(Arc<Vec<Product>>),
    Product(Box<Product>),
}

/// Product listing with a time-limited cache.
pub struct Catalog<S> {
    service: S,
    cache: Cache<CacheKey, CacheValue>,
}

impl<S: CatalogService> Catalog<S> {
    /// Create a catalog whose entries live for `ttl`.
    pub fn new(service: S, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(ttl)
            .build();
        Self { service, cache }
    }

    /// The backing service, for writes.
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// All products.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Remote` if the listing cannot be fetched.
    #[instrument(skip(self))]
    pub async fn products(&self) -> Result<Arc<Vec<Product>>> {
        if let Some(CacheValue::Products(products)) = self.cache.get(&CacheKey::Products).await {
            debug!("Cache hit for products");
            return Ok(products);
        }

        let products = Arc::new(self.service.list_products().await?);
        self.cache
            .insert(CacheKey::Products, CacheValue::Products(Arc::clone(&products)))
            .await;
        Ok(products)
    }

    /// The product with `id`, if listed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Remote` if the listing cannot be fetched.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: &ProductId) -> Result<Option<Product>> {
        let key = CacheKey::Product(id.clone());
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(Some(*product));
        }

        let found = self.products().await?.iter().find(|p| &p.id == id).cloned();
        if let Some(product) = &found {
            self.cache
                .insert(key, CacheValue::Product(Box::new(product.clone())))
                .await;
        }
        Ok(found)
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.cache.invalidate_all();
        debug!("Catalog cache invalidated");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use camstore_core::Price;
    use rust_decimal::Decimal;

    use super::*;
    use crate::testing::MemoryCatalogService;

    fn camera(id: &str) -> Product {
        Product {
            id: ProductId::parse(id).unwrap(),
            name: format!("Camera {id}"),
            description: String::new(),
            category: "bullet".to_string(),
            image_url: String::new(),
            price: Price::new(Decimal::new(1500, 0)).unwrap(),
            stock: 4,
        }
    }

    #[tokio::test]
    async fn test_listing_is_cached() {
        let service = MemoryCatalogService::with_products(vec![camera("cam1"), camera("cam2")]);
        let catalog = Catalog::new(service.clone(), Duration::from_secs(300));

        assert_eq!(catalog.products().await.unwrap().len(), 2);
        assert_eq!(catalog.products().await.unwrap().len(), 2);
        assert_eq!(service.listings(), 1);
    }

    #[tokio::test]
    async fn test_lookup_by_id() {
        let service = MemoryCatalogService::with_products(vec![camera("cam1")]);
        let catalog = Catalog::new(service, Duration::from_secs(300));

        let found = catalog.product(&ProductId::parse("cam1").unwrap()).await.unwrap();
        assert_eq!(found.unwrap().name, "Camera cam1");
        assert!(
            catalog
                .product(&ProductId::parse("nope").unwrap())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_invalidate_refetches() {
        let service = MemoryCatalogService::with_products(vec![camera("cam1")]);
        let catalog = Catalog::new(service.clone(), Duration::from_secs(300));

        catalog.products().await.unwrap();
        catalog.invalidate();
        catalog.products().await.unwrap();
        assert_eq!(service.listings(), 2);
    }
}
