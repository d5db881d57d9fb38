//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{Money, ProductId, VariantId};
use domain::{InMemoryCatalog, ProductInfo};
use metrics_exporter_prometheus::PrometheusHandle;
use record_store::InMemoryStore;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn product(sku: &str, variant: Option<&str>, price: i64, stock: u32) -> ProductInfo {
    ProductInfo {
        product_id: ProductId::new(sku),
        variant_id: variant.map(VariantId::new),
        unit_price: Money::from_minor(price),
        available_stock: stock,
    }
}

async fn setup() -> axum::Router {
    let catalog = InMemoryCatalog::new();
    catalog.upsert(product("SKU-1", None, 1500, 10)).await;
    catalog.upsert(product("SKU-1", Some("red"), 1700, 2)).await;
    catalog.upsert(product("SKU-2", None, 500, 3)).await;

    let state = api::create_default_state(InMemoryStore::new(), Arc::new(catalog), "memory");
    api::create_app(state, get_metrics_handle())
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, String)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

fn guest(session: &str) -> Vec<(&'static str, String)> {
    vec![("x-session-id", session.to_string())]
}

fn user(id: uuid::Uuid) -> Vec<(&'static str, String)> {
    vec![("x-user-id", id.to_string())]
}

fn address_body(label: &str) -> Value {
    json!({
        "label": label,
        "name": "Siti",
        "phone": "081234567890",
        "address": format!("Jl. {label} No. 10"),
        "city": "Bandung",
        "province": "Jawa Barat",
        "postal_code": "40132"
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = setup().await;

    let (status, json) = send(&app, "GET", "/health", &[], None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

mod cart {
    use super::*;

    #[tokio::test]
    async fn test_empty_cart_for_new_session() {
        let app = setup().await;

        let (status, json) = send(&app, "GET", "/cart", &guest("s-empty"), None).await;

        assert_eq!(status, StatusCode::OK);
        assert!(json["id"].is_null());
        assert_eq!(json["owner"], json!({"kind": "guest", "id": "s-empty"}));
        assert_eq!(json["items"].as_array().unwrap().len(), 0);
        assert_eq!(json["total_items"], 0);
        assert_eq!(json["total_price"], 0);
    }

    #[tokio::test]
    async fn test_add_item_uses_catalog_price() {
        let app = setup().await;
        let headers = guest("s-add");

        let (status, json) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-1", "quantity": 2})),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["item"]["product_id"], "SKU-1");
        assert_eq!(json["item"]["quantity"], 2);
        assert_eq!(json["item"]["price"], 1500);
        assert_eq!(json["item"]["line_total"], 3000);
        assert_eq!(json["total_items"], 2);
        assert_eq!(json["total_price"], 3000);

        let (status, json) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["item"]["quantity"], 3);

        let (_, cart) = send(&app, "GET", "/cart", &headers, None).await;
        assert!(cart["id"].is_string());
        assert_eq!(cart["items"].as_array().unwrap().len(), 1);
        assert_eq!(cart["total_price"], 4500);
    }

    #[tokio::test]
    async fn test_variants_are_separate_lines() {
        let app = setup().await;
        let headers = guest("s-variant");

        send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-1"})),
        )
        .await;
        let (status, json) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-1", "product_variant_id": "red"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["item"]["price"], 1700);

        let (_, cart) = send(&app, "GET", "/cart", &headers, None).await;
        assert_eq!(cart["items"].as_array().unwrap().len(), 2);
        assert_eq!(cart["total_price"], 3200);
    }

    #[tokio::test]
    async fn test_add_rejections() {
        let app = setup().await;
        let headers = guest("s-reject");

        let (status, _) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "UNKNOWN"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-1", "quantity": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(
            &app,
            "POST",
            "/cart/items",
            &[],
            Some(json!({"product_id": "SKU-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/cart/items",
            &[("x-user-id", "not-a-uuid".to_string())],
            Some(json!({"product_id": "SKU-1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, cart) = send(&app, "GET", "/cart", &headers, None).await;
        assert!(cart["id"].is_null());
    }

    #[tokio::test]
    async fn test_stock_counts_units_already_in_cart() {
        let app = setup().await;
        let headers = guest("s-stock");

        let (status, _) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-2", "quantity": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, json) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-2", "quantity": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("stock"));

        let (_, cart) = send(&app, "GET", "/cart", &headers, None).await;
        assert_eq!(cart["total_items"], 2);
    }

    #[tokio::test]
    async fn test_update_item_quantity_and_remove_by_zero() {
        let app = setup().await;
        let headers = guest("s-update");

        let (_, added) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-1"})),
        )
        .await;
        let item_id = added["item"]["id"].as_str().unwrap().to_string();

        let (status, json) = send(
            &app,
            "PATCH",
            &format!("/cart/items/{item_id}"),
            &headers,
            Some(json!({"quantity": 4})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "updated");
        assert_eq!(json["item"]["quantity"], 4);
        assert_eq!(json["total_price"], 6000);

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/cart/items/{item_id}"),
            &headers,
            Some(json!({"quantity": 11})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, json) = send(
            &app,
            "PATCH",
            &format!("/cart/items/{item_id}"),
            &headers,
            Some(json!({"quantity": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "removed");
        assert!(json["item"].is_null());
        assert_eq!(json["total_items"], 0);
    }

    #[tokio::test]
    async fn test_update_unknown_item_is_not_found() {
        let app = setup().await;
        let headers = guest("s-unknown");
        let missing = uuid::Uuid::new_v4();

        let (status, _) = send(
            &app,
            "PATCH",
            &format!("/cart/items/{missing}"),
            &headers,
            Some(json!({"quantity": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "PATCH",
            "/cart/items/not-a-uuid",
            &headers,
            Some(json!({"quantity": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_remove_item_and_clear() {
        let app = setup().await;
        let headers = guest("s-remove");

        let (_, first) = send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-1"})),
        )
        .await;
        send(
            &app,
            "POST",
            "/cart/items",
            &headers,
            Some(json!({"product_id": "SKU-2"})),
        )
        .await;
        let item_id = first["item"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/cart/items/{item_id}"),
            &headers,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/cart/items/{item_id}"),
            &headers,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = send(&app, "DELETE", "/cart", &headers, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["removed"], 1);

        let (_, cart) = send(&app, "GET", "/cart", &headers, None).await;
        assert!(cart["id"].is_string());
        assert_eq!(cart["total_items"], 0);
    }

    #[tokio::test]
    async fn test_item_of_another_cart_is_not_found() {
        let app = setup().await;

        let (_, added) = send(
            &app,
            "POST",
            "/cart/items",
            &guest("s-owner"),
            Some(json!({"product_id": "SKU-1"})),
        )
        .await;
        let item_id = added["item"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "DELETE",
            &format!("/cart/items/{item_id}"),
            &guest("s-intruder"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, cart) = send(&app, "GET", "/cart", &guest("s-owner"), None).await;
        assert_eq!(cart["total_items"], 1);
    }

    #[tokio::test]
    async fn test_merge_after_login() {
        let app = setup().await;
        let user_id = uuid::Uuid::new_v4();
        let session = guest("s-merge");

        send(
            &app,
            "POST",
            "/cart/items",
            &session,
            Some(json!({"product_id": "SKU-1", "quantity": 2})),
        )
        .await;
        send(
            &app,
            "POST",
            "/cart/items",
            &session,
            Some(json!({"product_id": "SKU-2"})),
        )
        .await;
        send(
            &app,
            "POST",
            "/cart/items",
            &user(user_id),
            Some(json!({"product_id": "SKU-1"})),
        )
        .await;

        let mut login = user(user_id);
        login.extend(guest("s-merge"));
        let (status, json) = send(&app, "POST", "/cart/merge", &login, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["merged_lines"], 1);
        assert_eq!(json["moved_lines"], 1);
        assert_eq!(json["guest_cart_deleted"], true);
        assert_eq!(json["cart"]["total_items"], 4);
        assert_eq!(json["cart"]["total_price"], 5000);

        // The user header wins, so this is the user's cart.
        let (_, cart) = send(&app, "GET", "/cart", &login, None).await;
        assert_eq!(cart["owner"]["kind"], "user");
        assert_eq!(cart["total_items"], 4);

        let (_, guest_cart) = send(&app, "GET", "/cart", &session, None).await;
        assert!(guest_cart["id"].is_null());
    }

    #[tokio::test]
    async fn test_merge_requires_user_and_session() {
        let app = setup().await;

        let (status, _) = send(&app, "POST", "/cart/merge", &guest("s-only"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            "POST",
            "/cart/merge",
            &user(uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod addresses {
    use super::*;

    #[tokio::test]
    async fn test_addresses_require_a_user() {
        let app = setup().await;

        let (status, _) = send(&app, "GET", "/addresses", &guest("s-addr"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            "POST",
            "/addresses",
            &[],
            Some(address_body("Home")),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_first_address_is_default() {
        let app = setup().await;
        let headers = user(uuid::Uuid::new_v4());

        let (status, home) = send(
            &app,
            "POST",
            "/addresses",
            &headers,
            Some(address_body("Home")),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(home["is_default"], true);
        assert_eq!(home["label"], "Home");
        assert_eq!(
            home["full_address"],
            "Jl. Home No. 10, Bandung, Jawa Barat, 40132"
        );

        let (_, office) = send(
            &app,
            "POST",
            "/addresses",
            &headers,
            Some(address_body("Office")),
        )
        .await;
        assert_eq!(office["is_default"], false);

        let (status, default) = send(&app, "GET", "/addresses/default", &headers, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(default["id"], home["id"]);
    }

    #[tokio::test]
    async fn test_set_default_switches_the_only_default() {
        let app = setup().await;
        let headers = user(uuid::Uuid::new_v4());

        let (_, home) = send(
            &app,
            "POST",
            "/addresses",
            &headers,
            Some(address_body("Home")),
        )
        .await;
        let (_, office) = send(
            &app,
            "POST",
            "/addresses",
            &headers,
            Some(address_body("Office")),
        )
        .await;
        let office_id = office["id"].as_str().unwrap();

        let (status, json) = send(
            &app,
            "POST",
            &format!("/addresses/{office_id}/default"),
            &headers,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["is_default"], true);

        let (_, list) = send(&app, "GET", "/addresses", &headers, None).await;
        let list = list.as_array().unwrap();
        assert_eq!(list.len(), 2);
        let defaults: Vec<_> = list.iter().filter(|a| a["is_default"] == true).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0]["id"], office["id"]);
        assert_ne!(defaults[0]["id"], home["id"]);
    }

    #[tokio::test]
    async fn test_update_get_and_delete() {
        let app = setup().await;
        let headers = user(uuid::Uuid::new_v4());

        let (_, home) = send(
            &app,
            "POST",
            "/addresses",
            &headers,
            Some(address_body("Home")),
        )
        .await;
        let id = home["id"].as_str().unwrap().to_string();

        let mut changed = address_body("Home");
        changed["postal_code"] = json!("40115");
        let (status, updated) = send(
            &app,
            "PUT",
            &format!("/addresses/{id}"),
            &headers,
            Some(changed),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["postal_code"], "40115");
        assert_eq!(updated["is_default"], true);

        let (status, fetched) =
            send(&app, "GET", &format!("/addresses/{id}"), &headers, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["postal_code"], "40115");

        let (status, _) =
            send(&app, "DELETE", &format!("/addresses/{id}"), &headers, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, "GET", &format!("/addresses/{id}"), &headers, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/addresses/default", &headers, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_validation_and_foreign_addresses() {
        let app = setup().await;
        let owner = user(uuid::Uuid::new_v4());
        let other = user(uuid::Uuid::new_v4());

        let mut incomplete = address_body("Home");
        incomplete["phone"] = json!("  ");
        let (status, json) = send(&app, "POST", "/addresses", &owner, Some(incomplete)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().unwrap().contains("phone"));

        let (_, home) = send(
            &app,
            "POST",
            "/addresses",
            &owner,
            Some(address_body("Home")),
        )
        .await;
        let id = home["id"].as_str().unwrap();

        let (status, _) = send(&app, "GET", &format!("/addresses/{id}"), &other, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/addresses/{id}/default"),
            &other,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/addresses/not-a-uuid", &owner, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
