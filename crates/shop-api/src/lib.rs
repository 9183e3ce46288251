//! # shop-api
//!
//! Axum HTTP layer for the bookcart bookstore backend.
//!
//! | Group | Prefix |
//! |---|---|
//! | Accounts, login, password reset | `/identity/account` |
//! | Catalog, favorites, order history | `/api/customer/books` |
//! | Cart, promotions, payment | `/api/customer/cart` |
//! | Payment redirects | `/customer/checkout` |
//! | Payment webhooks | `/webhook/stripe` |
//!
//! Customer routes authenticate with `Authorization: Bearer <token>` from
//! `POST /identity/account/login`.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::{AppConfig, AppState};
