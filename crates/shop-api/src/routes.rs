//! # Routes
//!
//! Axum router configuration for the bookstore API.

use crate::handlers::{self, account, books, cart, checkout};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - Accounts (`/identity/account`):
///   - POST register, login, logout, forget-password, validate-otp,
///     resend-otp, new-password
///   - GET  confirm-email
///
/// - Catalog (`/api/customer/books`):
///   - GET  / (`?category_id=`), /home (`?search=`), /orders (`?status=`)
///   - GET/POST /favorites, DELETE /favorites/{book_id}
///
/// - Cart (`/api/customer/cart`):
///   - GET / and POST / (add)
///   - PUT /increment/{book_id}, /decrement/{book_id}
///   - DELETE /{book_id}
///   - POST /promotion, /pay
///
/// - Payment:
///   - GET  /customer/checkout/success, /customer/checkout/cancel
///   - POST /webhook/stripe
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let account_routes = Router::new()
        .route("/register", post(account::register))
        .route("/confirm-email", get(account::confirm_email))
        .route("/login", post(account::login))
        .route("/logout", post(account::logout))
        .route("/forget-password", post(account::forget_password))
        .route("/validate-otp", post(account::validate_otp))
        .route("/resend-otp", post(account::resend_otp))
        .route("/new-password", post(account::new_password));

    let book_routes = Router::new()
        .route("/", get(books::list_books))
        .route("/home", get(books::home))
        .route("/orders", get(books::list_orders))
        .route(
            "/favorites",
            get(books::list_favorites).post(books::add_favorite),
        )
        .route("/favorites/{book_id}", delete(books::remove_favorite));

    let cart_routes = Router::new()
        .route("/", get(cart::get_cart).post(cart::add_to_cart))
        .route("/increment/{book_id}", put(cart::increment))
        .route("/decrement/{book_id}", put(cart::decrement))
        .route("/promotion", post(cart::apply_promotion))
        .route("/pay", post(cart::pay))
        .route("/{book_id}", delete(cart::remove));

    let checkout_routes = Router::new()
        .route("/success", get(checkout::checkout_success))
        .route("/cancel", get(checkout::checkout_cancel));

    // Webhooks read the raw body for signature checks
    let webhook_routes = Router::new().route("/stripe", post(checkout::stripe_webhook));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/identity/account", account_routes)
        .nest("/api/customer/books", book_routes)
        .nest("/api/customer/cart", cart_routes)
        .nest("/customer/checkout", checkout_routes)
        .nest("/webhook", webhook_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
