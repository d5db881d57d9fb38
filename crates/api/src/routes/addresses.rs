//! Address book endpoints. All of them need an authenticated user, and an
//! address of another user answers as if it did not exist.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{AddressFields, AddressId, UserAddress};
use domain::{CreateAddress, UpdateAddress};
use serde::{Deserialize, Serialize};

use super::{AppState, parse_uuid};
use crate::error::ApiError;
use crate::identity::UserIdentity;

/// Body of a create or update. Every field is replaced on update.
#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    #[serde(flatten)]
    pub fields: AddressFields,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    #[serde(flatten)]
    pub address: UserAddress,
    pub full_address: String,
}

impl From<UserAddress> for AddressResponse {
    fn from(address: UserAddress) -> Self {
        let full_address = address.full_address();
        Self {
            address,
            full_address,
        }
    }
}

fn parse_address_id(id: &str) -> Result<AddressId, ApiError> {
    parse_uuid("address", id).map(AddressId::from_uuid)
}

/// GET /addresses: The user's addresses, oldest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
) -> Result<Json<Vec<AddressResponse>>, ApiError> {
    let addresses = state.addresses.list(user_id).await?;
    Ok(Json(addresses.into_iter().map(Into::into).collect()))
}

/// POST /addresses: Add an address. The user's first address becomes the
/// default.
#[tracing::instrument(skip(state))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
    Json(req): Json<AddressRequest>,
) -> Result<(StatusCode, Json<AddressResponse>), ApiError> {
    let mut cmd = CreateAddress::new(user_id, req.fields);
    if req.is_default {
        cmd = cmd.as_default();
    }
    let address = state.addresses.create(cmd).await?;
    Ok((StatusCode::CREATED, Json(address.into())))
}

/// GET /addresses/default: The user's default address.
#[tracing::instrument(skip(state))]
pub async fn get_default(
    State(state): State<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
) -> Result<Json<AddressResponse>, ApiError> {
    state
        .addresses
        .default_address(user_id)
        .await?
        .map(|address| Json(address.into()))
        .ok_or_else(|| ApiError::NotFound("No default address".to_string()))
}

/// GET /addresses/{id}: One address.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
    Path(id): Path<String>,
) -> Result<Json<AddressResponse>, ApiError> {
    let address_id = parse_address_id(&id)?;
    let address = state.addresses.get(user_id, address_id).await?;
    Ok(Json(address.into()))
}

/// PUT /addresses/{id}: Replace an address's fields.
#[tracing::instrument(skip(state))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
    Path(id): Path<String>,
    Json(req): Json<AddressRequest>,
) -> Result<Json<AddressResponse>, ApiError> {
    let address_id = parse_address_id(&id)?;
    let mut cmd = UpdateAddress::new(user_id, address_id, req.fields);
    if req.is_default {
        cmd = cmd.as_default();
    }
    let address = state.addresses.update(cmd).await?;
    Ok(Json(address.into()))
}

/// DELETE /addresses/{id}: Remove an address. No other address is promoted
/// to default.
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let address_id = parse_address_id(&id)?;
    state.addresses.delete(user_id, address_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /addresses/{id}/default: Make an address the only default.
#[tracing::instrument(skip(state))]
pub async fn set_default(
    State(state): State<Arc<AppState>>,
    UserIdentity(user_id): UserIdentity,
    Path(id): Path<String>,
) -> Result<Json<AddressResponse>, ApiError> {
    let address_id = parse_address_id(&id)?;
    let address = state.addresses.set_default(user_id, address_id).await?;
    Ok(Json(address.into()))
}
