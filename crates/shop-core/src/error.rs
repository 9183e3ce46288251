//! # Shop Error Types
//!
//! Typed error handling for the bookcart backend.
//! Every workflow returns `Result<T, ShopError>`; the HTTP layer turns each
//! variant into a status code and a short public code.

use thiserror::Error;

/// Core error type for all bookstore operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// No authenticated user on the request
    #[error("User is not authenticated")]
    Unauthenticated,

    /// Unknown user name/email or wrong password
    #[error("Invalid user name / email or password")]
    InvalidCredentials,

    /// Login attempted before the email address was confirmed
    #[error("Please confirm your email first")]
    EmailNotConfirmed,

    /// Too many failed logins
    #[error("Too many attempts, try again after {retry_after_secs} seconds")]
    LockedOut { retry_after_secs: u64 },

    #[error("User not found: {user}")]
    UserNotFound { user: String },

    /// User name or email already registered
    #[error("{field} is already taken")]
    DuplicateUser { field: &'static str },

    #[error("Book not found: {book_id}")]
    BookNotFound { book_id: u32 },

    /// Book is not in the user's cart
    #[error("Book {book_id} not found in cart")]
    LineNotFound { book_id: u32 },

    #[error("Book {book_id} not found in favorites")]
    FavoriteNotFound { book_id: u32 },

    #[error("Book {book_id} is already in favorites")]
    AlreadyFavorite { book_id: u32 },

    #[error("Quantity must be at least 1, got {count}")]
    InvalidQuantity { count: i64 },

    /// Promotion code unknown or switched off
    #[error("Invalid or expired promotion code")]
    InvalidOrExpiredCode,

    /// Promotion already redeemed by this user
    #[error("You have already used this promotion code")]
    AlreadyUsed,

    /// Promotion targets a book that is not in the cart
    #[error("This promotion code is not applicable to any items in your cart")]
    NotApplicable,

    /// One-time code issuance limit reached
    #[error("Too many attempts, try again later")]
    RateLimited,

    #[error("Invalid or expired one-time code")]
    InvalidOtp,

    /// Confirmation or password-reset token rejected
    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Your shopping cart is empty")]
    EmptyCart,

    /// Confirmation for a payment session this shop never opened
    #[error("Payment session not found: {session_id}")]
    PaymentSessionNotFound { session_id: String },

    #[error("Password policy violation: {0}")]
    PasswordPolicy(String),

    /// Email, payment or other collaborator unreachable or failing
    #[error("External service failure [{service}]: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
    },

    /// Unit of work could not be read or committed
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Webhook verification failed: {0}")]
    WebhookVerificationFailed(String),

    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    pub fn external(service: &'static str, message: impl Into<String>) -> Self {
        ShopError::ExternalService {
            service,
            message: message.into(),
        }
    }

    /// Returns true for failures a caller may retry after backing off.
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShopError::ExternalService { .. } | ShopError::Storage(_)
        )
    }

    /// Returns true when the error is a business-rule rejection rather than
    /// an infrastructure failure
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::Unauthenticated => 401,
            ShopError::InvalidCredentials => 404,
            ShopError::EmailNotConfirmed => 400,
            ShopError::LockedOut { .. } => 400,
            ShopError::UserNotFound { .. } => 404,
            ShopError::DuplicateUser { .. } => 409,
            ShopError::BookNotFound { .. } => 404,
            ShopError::LineNotFound { .. } => 404,
            ShopError::FavoriteNotFound { .. } => 404,
            ShopError::AlreadyFavorite { .. } => 409,
            ShopError::InvalidQuantity { .. } => 400,
            ShopError::InvalidOrExpiredCode => 404,
            ShopError::AlreadyUsed => 400,
            ShopError::NotApplicable => 400,
            ShopError::RateLimited => 429,
            ShopError::InvalidOtp => 400,
            ShopError::InvalidToken => 400,
            ShopError::EmptyCart => 400,
            ShopError::PaymentSessionNotFound { .. } => 404,
            ShopError::PasswordPolicy(_) => 400,
            ShopError::ExternalService { .. } => 502,
            ShopError::Storage(_) => 503,
            ShopError::Configuration(_) => 500,
            ShopError::InvalidRequest(_) => 400,
            ShopError::WebhookVerificationFailed(_) => 401,
            ShopError::WebhookParse(_) => 400,
            ShopError::Serialization(_) => 500,
            ShopError::Internal(_) => 500,
        }
    }

    /// Short public error code used in `{Code, Description}` bodies
    pub fn code(&self) -> &'static str {
        match self {
            ShopError::Unauthenticated => "Unauthenticated",
            ShopError::InvalidCredentials => "Invalid Cred.",
            ShopError::EmailNotConfirmed => "Confirm Your Email",
            ShopError::LockedOut { .. } | ShopError::RateLimited => "Too many attempts",
            ShopError::UserNotFound { .. } => "User Not Found",
            ShopError::DuplicateUser { .. } => "Duplicate User",
            ShopError::BookNotFound { .. }
            | ShopError::LineNotFound { .. }
            | ShopError::FavoriteNotFound { .. }
            | ShopError::PaymentSessionNotFound { .. } => "Not Found",
            ShopError::AlreadyFavorite { .. } => "Already Favorite",
            ShopError::InvalidQuantity { .. } => "Invalid Quantity",
            ShopError::InvalidOrExpiredCode => "Invalid Promo",
            ShopError::AlreadyUsed => "Already Used",
            ShopError::NotApplicable => "Not Applicable",
            ShopError::InvalidOtp => "Invalid OTP",
            ShopError::InvalidToken => "Invalid Token",
            ShopError::EmptyCart => "Empty Cart",
            ShopError::PasswordPolicy(_) => "Password Policy",
            ShopError::ExternalService { .. } => "External Service Failure",
            ShopError::Storage(_) => "Storage Failure",
            ShopError::InvalidRequest(_) => "Invalid Request",
            ShopError::WebhookVerificationFailed(_) | ShopError::WebhookParse(_) => {
                "Invalid Webhook"
            }
            ShopError::Configuration(_) | ShopError::Serialization(_) | ShopError::Internal(_) => {
                "Internal Error"
            }
        }
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(err: serde_json::Error) -> Self {
        ShopError::Serialization(err.to_string())
    }
}

/// Result type alias for bookstore operations
pub type ShopResult<T> = Result<T, ShopError>;
