//! Loading the product catalog from a JSON file.
//!
//! The file holds an array of products:
//!
//! ```json
//! [{ "product_id": "SKU-1", "variant_id": null, "unit_price": 1500, "available_stock": 10 }]
//! ```

use std::path::{Path, PathBuf};

use domain::{InMemoryCatalog, ProductInfo};
use thiserror::Error;

/// Errors from loading a catalog file.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read catalog file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Parses a catalog document into products.
pub fn parse_products(json: &str) -> Result<Vec<ProductInfo>, serde_json::Error> {
    serde_json::from_str(json)
}

/// Adds products to a catalog.
pub async fn seed_catalog(catalog: &InMemoryCatalog, products: Vec<ProductInfo>) -> usize {
    let count = products.len();
    for product in products {
        catalog.upsert(product).await;
    }
    count
}

/// Reads a catalog file into a new in-memory catalog.
pub async fn load_catalog(path: impl AsRef<Path>) -> Result<InMemoryCatalog, SeedError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let products = parse_products(&json).map_err(|source| SeedError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let catalog = InMemoryCatalog::new();
    let count = seed_catalog(&catalog, products).await;
    tracing::info!(path = %path.display(), count, "loaded product catalog");
    Ok(catalog)
}
