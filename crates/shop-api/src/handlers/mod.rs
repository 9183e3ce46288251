//! # Request Handlers
//!
//! Axum request handlers, one module per route group.

pub mod account;
pub mod books;
pub mod cart;
pub mod checkout;

use axum::{response::IntoResponse, Json};
use serde::Serialize;

/// Body of every successful mutation
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "bookcart",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
