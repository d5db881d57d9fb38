//! HTTP API server for the storefront cart and address book.
//!
//! Provides REST endpoints for carts (guest and user), the guest-to-user
//! merge and saved addresses, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod seed;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use domain::{AddressRegistry, CartEngine, ProductCatalog};
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::{AddressStore, CartStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/cart",
            get(routes::cart::get).delete(routes::cart::clear),
        )
        .route("/cart/items", post(routes::cart::add_item))
        .route(
            "/cart/items/{id}",
            patch(routes::cart::update_item).delete(routes::cart::remove_item),
        )
        .route("/cart/merge", post(routes::cart::merge))
        .route(
            "/addresses",
            get(routes::addresses::list).post(routes::addresses::create),
        )
        .route("/addresses/default", get(routes::addresses::get_default))
        .route(
            "/addresses/{id}",
            get(routes::addresses::get)
                .put(routes::addresses::update)
                .delete(routes::addresses::delete),
        )
        .route(
            "/addresses/{id}/default",
            post(routes::addresses::set_default),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over one store holding both carts and
/// addresses.
pub fn create_default_state<S>(
    store: S,
    catalog: Arc<dyn ProductCatalog>,
    storage: &'static str,
) -> Arc<AppState>
where
    S: CartStore + AddressStore + 'static,
{
    let store = Arc::new(store);
    let cart_store: Arc<dyn CartStore> = store.clone();
    let address_store: Arc<dyn AddressStore> = store;

    Arc::new(AppState {
        carts: CartEngine::new(cart_store),
        addresses: AddressRegistry::new(address_store),
        catalog,
        storage,
    })
}
