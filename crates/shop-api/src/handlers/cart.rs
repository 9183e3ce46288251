//! Cart endpoints under `/api/customer/cart`. Every route needs a signed-in
//! customer and only ever touches that customer's lines.

use super::MessageResponse;
use crate::error::ApiResult;
use crate::extract::CurrentUser;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use shop_core::{AppliedDiscount, BookId, CartChange, CartEntry, DecrementOutcome};
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub book_id: BookId,
    /// Copies to add; must be at least 1
    pub count: i64,
}

#[derive(Debug, Deserialize)]
pub struct PromotionRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct PromotionResponse {
    pub message: String,
    #[serde(flatten)]
    pub applied: AppliedDiscount,
}

/// Where to send the customer to pay
#[derive(Debug, Serialize)]
pub struct PayResponse {
    pub session_id: String,
    pub checkout_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

/// The customer's cart lines ordered by book id, each with its book and line total
pub async fn get_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<CartEntry>>> {
    Ok(Json(state.cart.get_cart(user.id).await?.items))
}

#[instrument(skip(state, user, request), fields(user_id = %user.id, book_id = request.book_id))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<AddToCartRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    let (_, change) = state
        .cart
        .add_or_increment(user.id, request.book_id, request.count)
        .await?;
    let status = match change {
        CartChange::Created => StatusCode::CREATED,
        CartChange::Updated => StatusCode::OK,
    };
    Ok((status, MessageResponse::new("Add book to cart successfully.")))
}

pub async fn increment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(book_id): Path<BookId>,
) -> ApiResult<Json<MessageResponse>> {
    state.cart.increment(user.id, book_id).await?;
    Ok(MessageResponse::new(
        "The number of books in the shopping cart has been successfully updated.",
    ))
}

pub async fn decrement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(book_id): Path<BookId>,
) -> ApiResult<Json<MessageResponse>> {
    let message = match state.cart.decrement(user.id, book_id).await? {
        DecrementOutcome::Updated(_) => {
            "The number of books in the shopping cart has been successfully updated."
        }
        DecrementOutcome::Removed => "Book removed from cart successfully.",
    };
    Ok(MessageResponse::new(message))
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(book_id): Path<BookId>,
) -> ApiResult<Json<MessageResponse>> {
    state.cart.remove(user.id, book_id).await?;
    Ok(MessageResponse::new("Book removed from cart successfully."))
}

#[instrument(skip(state, user, request), fields(user_id = %user.id, code = %request.code))]
pub async fn apply_promotion(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<PromotionRequest>,
) -> ApiResult<Json<PromotionResponse>> {
    let applied = state.cart.apply_promotion(user.id, &request.code).await?;
    Ok(Json(PromotionResponse {
        message: "Promotion code applied successfully!".to_string(),
        applied,
    }))
}

/// Open a hosted payment session for the whole cart
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn pay(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<PayResponse>> {
    let session = state.checkout.create_payment_session(user.id).await?;
    Ok(Json(PayResponse {
        session_id: session.session_id,
        checkout_url: session.checkout_url,
        expires_at: session.expires_at.map(|t| t.to_rfc3339()),
    }))
}
