//! HTTP handlers and the state they share.

pub mod addresses;
pub mod cart;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use domain::{AddressRegistry, CartEngine, ProductCatalog};
use record_store::{AddressStore, CartStore};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub carts: CartEngine<Arc<dyn CartStore>>,
    pub addresses: AddressRegistry<Arc<dyn AddressStore>>,
    pub catalog: Arc<dyn ProductCatalog>,
    /// Name of the storage backend, reported by the health check.
    pub storage: &'static str,
}

fn parse_uuid(kind: &str, id: &str) -> Result<uuid::Uuid, ApiError> {
    uuid::Uuid::parse_str(id).map_err(|e| ApiError::BadRequest(format!("Invalid {kind} id: {e}")))
}
