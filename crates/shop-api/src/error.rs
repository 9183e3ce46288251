//! # API Errors
//!
//! Every handler fails with [`ApiError`], which renders a `ShopError` as
//! `{ "Code": .., "Description": .. }` under the variant's status code.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shop_core::ShopError;
use tracing::{error, info};

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Description")]
    pub description: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug)]
pub struct ApiError(pub ShopError);

impl From<ShopError> for ApiError {
    fn from(err: ShopError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %err, "request failed");
        } else {
            info!(code = err.code(), error = %err, "request rejected");
        }

        let retry_after = match &err {
            ShopError::LockedOut { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let body = ErrorResponse::new(err.code(), err.to_string());
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_field_names() {
        let body = serde_json::to_value(ErrorResponse::new("Invalid Promo", "nope")).unwrap();
        assert_eq!(body["Code"], "Invalid Promo");
        assert_eq!(body["Description"], "nope");
    }

    #[test]
    fn test_status_mapping() {
        let response = ApiError(ShopError::EmptyCart).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(ShopError::external("email", "down")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = ApiError(ShopError::LockedOut {
            retry_after_secs: 300,
        })
        .into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "300");
    }
}
