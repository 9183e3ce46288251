//! Catalog, favorites and order history under `/api/customer/books`.

use super::MessageResponse;
use crate::error::ApiResult;
use crate::extract::CurrentUser;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shop_core::{Book, BookId, BookListing, CategoryId, HomeRails, Order, OrderStatus};
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct HomeParams {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BooksParams {
    pub category_id: Option<CategoryId>,
}

#[derive(Debug, Deserialize)]
pub struct OrdersParams {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub book_id: BookId,
}

pub async fn home(
    State(state): State<AppState>,
    Query(params): Query<HomeParams>,
) -> ApiResult<Json<HomeRails>> {
    let rails = state.storefront.home(params.search.as_deref()).await?;
    Ok(Json(rails))
}

pub async fn list_books(
    State(state): State<AppState>,
    Query(params): Query<BooksParams>,
) -> ApiResult<Json<BookListing>> {
    Ok(Json(state.storefront.books(params.category_id).await?))
}

pub async fn list_favorites(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Book>>> {
    Ok(Json(state.storefront.favorites(user.id).await?))
}

#[instrument(skip(state, user, request), fields(user_id = %user.id, book_id = request.book_id))]
pub async fn add_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<FavoriteRequest>,
) -> ApiResult<(StatusCode, Json<MessageResponse>)> {
    state.storefront.add_favorite(user.id, request.book_id).await?;
    Ok((StatusCode::CREATED, MessageResponse::new("Added to favorites.")))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(book_id): Path<BookId>,
) -> ApiResult<Json<MessageResponse>> {
    state.storefront.remove_favorite(user.id, book_id).await?;
    Ok(MessageResponse::new("Removed from favorites."))
}

/// Order history, optionally filtered by `?status=paid|refunded`
pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<OrdersParams>,
) -> ApiResult<Json<Vec<Order>>> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()?;
    Ok(Json(state.storefront.orders(user.id, status).await?))
}
