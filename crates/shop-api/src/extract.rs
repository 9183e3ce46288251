//! # Extractors
//!
//! Bearer-token authentication for customer routes.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header, request::Parts},
};
use shop_core::{ShopError, User};

/// Token from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

fn bearer(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer(parts)
            .map(BearerToken)
            .ok_or(ApiError(ShopError::Unauthenticated))
    }
}

/// The signed-in customer
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(parts).ok_or(ShopError::Unauthenticated)?;
        let user = state.accounts.authenticate(&token).await?;
        Ok(CurrentUser(user))
    }
}

/// Missing or stale tokens yield `None`; collaborator failures still reject
impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Option<Self>, Self::Rejection> {
        let Some(token) = bearer(parts) else {
            return Ok(None);
        };
        match state.accounts.authenticate(&token).await {
            Ok(user) => Ok(Some(CurrentUser(user))),
            Err(ShopError::Unauthenticated) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
