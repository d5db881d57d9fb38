//! Product lookup collaborator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId, VariantId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Current price and stock of a product variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub unit_price: Money,
    pub available_stock: u32,
}

/// Source of product prices and stock.
///
/// The cart engine trusts the price and quantity it is given; callers use
/// the catalog to price an add and to check stock before it.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Looks up a product variant. Returns None if it is not sold.
    async fn lookup(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Option<ProductInfo>;
}

type CatalogKey = (ProductId, Option<VariantId>);

/// In-memory product catalog for tests and single-process deployments.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<CatalogKey, ProductInfo>>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product variant.
    pub async fn upsert(&self, info: ProductInfo) {
        let key = (info.product_id.clone(), info.variant_id.clone());
        self.products.write().await.insert(key, info);
    }

    /// Sets the stock of a product variant. Returns false if it is unknown.
    pub async fn set_stock(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        available_stock: u32,
    ) -> bool {
        let key = (product_id.clone(), variant_id.cloned());
        match self.products.write().await.get_mut(&key) {
            Some(info) => {
                info.available_stock = available_stock;
                true
            }
            None => false,
        }
    }

    /// Returns the number of product variants.
    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn lookup(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Option<ProductInfo> {
        let key = (product_id.clone(), variant_id.cloned());
        self.products.read().await.get(&key).cloned()
    }
}
