//! # Identity Collaborator
//!
//! User lookup, credential checks, sessions and password resets are owned by
//! an external identity provider. The core only talks to it through
//! [`IdentityProvider`].

use crate::error::{ShopError, ShopResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub type UserId = Uuid;

/// Public view of a registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub user_name: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub email_confirmed: bool,
}

/// Registration form
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub email: String,
    pub password: String,
}

/// A freshly registered user and the token that confirms their email
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub confirmation_token: String,
}

/// Bearer session issued at login
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
}

/// Core trait for identity provider implementations
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn register(&self, account: NewAccount) -> ShopResult<Registration>;

    async fn confirm_email(&self, user_id: UserId, token: &str) -> ShopResult<()>;

    /// Check credentials and open a session
    async fn sign_in(&self, name_or_email: &str, password: &str) -> ShopResult<Session>;

    async fn sign_out(&self, session_token: &str) -> ShopResult<()>;

    /// Resolve the user behind a session token, if the session is live
    async fn current_user(&self, session_token: &str) -> ShopResult<Option<User>>;

    async fn find_by_id(&self, id: UserId) -> ShopResult<Option<User>>;

    async fn find_by_name_or_email(&self, name_or_email: &str) -> ShopResult<Option<User>>;

    /// Short-lived token authorizing one password reset
    async fn generate_reset_token(&self, user: &User) -> ShopResult<String>;

    async fn reset_password(&self, user: &User, token: &str, new_password: &str) -> ShopResult<()>;
}

/// Type alias for a shared identity provider (dynamic dispatch)
pub type BoxedIdentityProvider = Arc<dyn IdentityProvider>;

/// Password strength rules
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
        }
    }
}

impl PasswordPolicy {
    pub fn check(&self, password: &str) -> ShopResult<()> {
        if password.chars().count() < self.min_length {
            return Err(ShopError::PasswordPolicy(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }
        if self.require_uppercase && !password.chars().any(char::is_uppercase) {
            return Err(ShopError::PasswordPolicy(
                "password must contain an uppercase letter".to_string(),
            ));
        }
        if self.require_lowercase && !password.chars().any(char::is_lowercase) {
            return Err(ShopError::PasswordPolicy(
                "password must contain a lowercase letter".to_string(),
            ));
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(ShopError::PasswordPolicy(
                "password must contain a digit".to_string(),
            ));
        }
        Ok(())
    }
}

/// Opaque random token for sessions, confirmations and resets
pub fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_policy() {
        let policy = PasswordPolicy::default();
        assert!(policy.check("Secret123").is_ok());
        assert!(policy.check("Sh0rt").is_err());
        assert!(policy.check("alllowercase1").is_err());
        assert!(policy.check("ALLUPPERCASE1").is_err());
        assert!(policy.check("NoDigitsHere").is_err());
    }

    #[test]
    fn test_random_tokens_differ() {
        let a = random_token();
        let b = random_token();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }
}
