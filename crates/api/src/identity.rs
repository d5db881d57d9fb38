//! Caller identity resolved from request headers.
//!
//! Token validation happens upstream; by the time a request reaches this
//! service the gateway has put the authenticated user id (if any) and the
//! guest session id (if any) into headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{CartOwner, SessionId, UserId};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the anonymous session id.
pub const SESSION_ID_HEADER: &str = "x-session-id";

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn user_id(parts: &Parts) -> Result<Option<UserId>, ApiError> {
    header(parts, USER_ID_HEADER)
        .map(|raw| {
            Uuid::parse_str(raw)
                .map(UserId::from_uuid)
                .map_err(|e| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER}: {e}")))
        })
        .transpose()
}

fn session_id(parts: &Parts) -> Option<SessionId> {
    header(parts, SESSION_ID_HEADER).map(SessionId::new)
}

/// The cart owner of a request: the user if authenticated, else the guest
/// session.
#[derive(Debug, Clone)]
pub struct CartIdentity(pub CartOwner);

impl<S> FromRequestParts<S> for CartIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user_id) = user_id(parts)? {
            return Ok(CartIdentity(CartOwner::User(user_id)));
        }
        session_id(parts)
            .map(|session| CartIdentity(CartOwner::Guest(session)))
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "Missing {USER_ID_HEADER} or {SESSION_ID_HEADER} header"
                ))
            })
    }
}

/// An authenticated user. Rejects guests with 401.
#[derive(Debug, Clone, Copy)]
pub struct UserIdentity(pub UserId);

impl<S> FromRequestParts<S> for UserIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id(parts)?
            .map(UserIdentity)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))
    }
}

/// A user who just logged in and still carries the guest session.
#[derive(Debug, Clone)]
pub struct LoginIdentity {
    pub user_id: UserId,
    pub session_id: SessionId,
}

impl<S> FromRequestParts<S> for LoginIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let UserIdentity(user_id) = UserIdentity::from_request_parts(parts, state).await?;
        let session_id = session_id(parts).ok_or_else(|| {
            ApiError::BadRequest(format!("Missing {SESSION_ID_HEADER} header"))
        })?;
        Ok(LoginIdentity {
            user_id,
            session_id,
        })
    }
}
