//! Account, login and password-reset endpoints under `/identity/account`.

use super::MessageResponse;
use crate::error::ApiResult;
use crate::extract::BearerToken;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_core::{NewAccount, OtpVerdict, ShopError, UserId};
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmEmailParams {
    pub user_id: UserId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_name_or_email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ForgetPasswordRequest {
    pub user_name_or_email: String,
}

/// Identifies the user for the follow-up OTP calls
#[derive(Debug, Serialize)]
pub struct OtpIssuedResponse {
    pub message: String,
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct ValidateOtpRequest {
    pub user_id: UserId,
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateOtpResponse {
    pub user_id: UserId,
    pub reset_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendOtpRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct NewPasswordRequest {
    pub user_id: UserId,
    pub reset_token: String,
    pub password: String,
    pub confirm_password: String,
}

#[instrument(skip(state, account), fields(user_name = %account.user_name))]
pub async fn register(
    State(state): State<AppState>,
    Json(account): Json<NewAccount>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let user = state.accounts.register(account).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful, please check your email to confirm your account."
                .to_string(),
            user_id: user.id,
        }),
    ))
}

pub async fn confirm_email(
    State(state): State<AppState>,
    Query(params): Query<ConfirmEmailParams>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .accounts
        .confirm_email(params.user_id, &params.token)
        .await?;
    Ok(MessageResponse::new("Email confirmed successfully."))
}

#[instrument(skip(state, request), fields(user = %request.user_name_or_email))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let session = state
        .accounts
        .login(&request.user_name_or_email, &request.password)
        .await?;
    Ok(Json(LoginResponse {
        token: session.token,
        user_id: session.user_id,
        expires_at: session.expires_at,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> ApiResult<Json<MessageResponse>> {
    state.accounts.logout(&token).await?;
    Ok(MessageResponse::new("Logout successfully."))
}

#[instrument(skip(state, request), fields(user = %request.user_name_or_email))]
pub async fn forget_password(
    State(state): State<AppState>,
    Json(request): Json<ForgetPasswordRequest>,
) -> ApiResult<(StatusCode, Json<OtpIssuedResponse>)> {
    let (user, _code) = state
        .otp
        .forgot_password(&request.user_name_or_email)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(OtpIssuedResponse {
            message: "A one-time code has been sent to your email.".to_string(),
            user_id: user.id,
        }),
    ))
}

#[instrument(skip(state, request), fields(user_id = %request.user_id))]
pub async fn validate_otp(
    State(state): State<AppState>,
    Json(request): Json<ValidateOtpRequest>,
) -> ApiResult<Json<ValidateOtpResponse>> {
    match state.otp.validate(request.user_id, &request.otp).await? {
        OtpVerdict::Valid { reset_token } => Ok(Json(ValidateOtpResponse {
            user_id: request.user_id,
            reset_token,
        })),
        OtpVerdict::Invalid => Err(ShopError::InvalidOtp.into()),
    }
}

#[instrument(skip(state, request), fields(user_id = %request.user_id))]
pub async fn resend_otp(
    State(state): State<AppState>,
    Json(request): Json<ResendOtpRequest>,
) -> ApiResult<(StatusCode, Json<OtpIssuedResponse>)> {
    state.otp.resend(request.user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(OtpIssuedResponse {
            message: "A new one-time code has been sent to your email.".to_string(),
            user_id: request.user_id,
        }),
    ))
}

#[instrument(skip(state, request), fields(user_id = %request.user_id))]
pub async fn new_password(
    State(state): State<AppState>,
    Json(request): Json<NewPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if request.password != request.confirm_password {
        return Err(ShopError::InvalidRequest("passwords do not match".to_string()).into());
    }
    state
        .otp
        .reset_password(request.user_id, &request.reset_token, &request.password)
        .await?;
    Ok(MessageResponse::new("Password changed successfully."))
}
