//! Cart endpoints.
//!
//! Prices come from the catalog, never from the client. Stock is checked
//! here against the catalog before the engine is called; the engine itself
//! trusts the quantity it is given.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartId, CartItem, CartItemId, CartOwner, CartTotals, Money, ProductId, VariantId};
use domain::{
    AddItem, Aggregate, Cart, ClearCart, ItemUpdate, MergeCarts, ProductInfo, RemoveItem,
    UpdateItem,
};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_uuid};
use crate::error::ApiError;
use crate::identity::{CartIdentity, LoginIdentity};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: String,
    #[serde(default)]
    pub product_variant_id: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct CartItemResponse {
    #[serde(flatten)]
    pub item: CartItem,
    pub line_total: Money,
}

impl From<CartItem> for CartItemResponse {
    fn from(item: CartItem) -> Self {
        let line_total = item.line_total();
        Self { item, line_total }
    }
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    /// None until the first item is added.
    pub id: Option<CartId>,
    pub owner: CartOwner,
    pub items: Vec<CartItemResponse>,
    #[serde(flatten)]
    pub totals: CartTotals,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            id: cart.is_persisted().then(|| cart.id()),
            owner: cart.owner().clone(),
            items: cart.items().iter().cloned().map(Into::into).collect(),
            totals: cart.totals(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LineResponse {
    pub item: CartItemResponse,
    #[serde(flatten)]
    pub totals: CartTotals,
}

#[derive(Debug, Serialize)]
pub struct UpdateItemResponse {
    /// `"updated"` or `"removed"`.
    pub status: &'static str,
    pub item: Option<CartItemResponse>,
    #[serde(flatten)]
    pub totals: CartTotals,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
pub struct MergeResponse {
    pub merged_lines: usize,
    pub moved_lines: usize,
    pub guest_cart_deleted: bool,
    pub cart: CartResponse,
}

// -- Handlers --

/// GET /cart: The caller's cart. An owner without a cart gets an empty one.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
) -> Result<Json<CartResponse>, ApiError> {
    let cart = state.carts.get_cart(&owner).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /cart/items: Add units of a product at its current catalog price.
#[tracing::instrument(skip(state))]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<LineResponse>), ApiError> {
    let product_id = ProductId::new(req.product_id.trim());
    let variant_id = req
        .product_variant_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(VariantId::new);

    let product = lookup_product(&state, &product_id, variant_id.as_ref()).await?;

    if req.quantity > 0 {
        let cart = state.carts.get_cart(&owner).await?;
        let in_cart = cart
            .find_line(&product_id, variant_id.as_ref())
            .map_or(0, |line| i64::from(line.quantity));
        check_stock(&product, in_cart.saturating_add(req.quantity))?;
    }

    let mut cmd =
        AddItem::new(owner, product_id, product.unit_price).with_quantity(req.quantity);
    if let Some(variant_id) = variant_id {
        cmd = cmd.with_variant(variant_id);
    }
    let result = state.carts.add_item(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(LineResponse {
            item: result.item.into(),
            totals: result.totals,
        }),
    ))
}

/// PATCH /cart/items/{id}: Set a line's quantity; zero or less removes it.
#[tracing::instrument(skip(state))]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<UpdateItemResponse>, ApiError> {
    let item_id = CartItemId::from_uuid(parse_uuid("item", &id)?);

    if req.quantity > 0 {
        let line = state
            .carts
            .get_item(&owner, item_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Cart item {id} not found")))?;
        let product = lookup_product(
            &state,
            &line.product_id,
            line.product_variant_id.as_ref(),
        )
        .await?;
        check_stock(&product, req.quantity)?;
    }

    let response = match state
        .carts
        .update_item(UpdateItem::new(owner, item_id, req.quantity))
        .await?
    {
        ItemUpdate::Updated { item, totals } => UpdateItemResponse {
            status: "updated",
            item: Some(item.into()),
            totals,
        },
        ItemUpdate::Removed { totals } => UpdateItemResponse {
            status: "removed",
            item: None,
            totals,
        },
    };
    Ok(Json(response))
}

/// DELETE /cart/items/{id}: Remove a line.
#[tracing::instrument(skip(state))]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let item_id = CartItemId::from_uuid(parse_uuid("item", &id)?);

    if state
        .carts
        .remove_item(RemoveItem::new(owner, item_id))
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Cart item {id} not found")))
    }
}

/// DELETE /cart: Remove every line; the cart itself stays.
#[tracing::instrument(skip(state))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
) -> Result<Json<ClearResponse>, ApiError> {
    let removed = state.carts.clear(ClearCart::new(owner)).await?;
    Ok(Json(ClearResponse { removed }))
}

/// POST /cart/merge: Fold the guest session's cart into the user's cart
/// after login.
#[tracing::instrument(skip(state))]
pub async fn merge(
    State(state): State<Arc<AppState>>,
    login: LoginIdentity,
) -> Result<Json<MergeResponse>, ApiError> {
    let report = state
        .carts
        .merge_guest_into_user(MergeCarts::new(login.session_id, login.user_id))
        .await?;

    Ok(Json(MergeResponse {
        merged_lines: report.merged_lines,
        moved_lines: report.moved_lines,
        guest_cart_deleted: report.guest_cart_deleted,
        cart: CartResponse::from(&report.cart),
    }))
}

async fn lookup_product(
    state: &AppState,
    product_id: &ProductId,
    variant_id: Option<&VariantId>,
) -> Result<ProductInfo, ApiError> {
    state
        .catalog
        .lookup(product_id, variant_id)
        .await
        .ok_or_else(|| match variant_id {
            Some(variant_id) => {
                ApiError::NotFound(format!("Product {product_id} variant {variant_id} not found"))
            }
            None => ApiError::NotFound(format!("Product {product_id} not found")),
        })
}

fn check_stock(product: &ProductInfo, wanted: i64) -> Result<(), ApiError> {
    if wanted > i64::from(product.available_stock) {
        metrics::counter!("cart_stock_rejections_total").increment(1);
        return Err(ApiError::Conflict(format!(
            "Insufficient stock for {}: {} available, {} requested",
            product.product_id, product.available_stock, wanted
        )));
    }
    Ok(())
}
