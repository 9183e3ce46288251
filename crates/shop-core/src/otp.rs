//! # One-Time Codes
//!
//! Issuance, rate limiting, invalidation and validation of the 4-digit codes
//! used for password reset.
//!
//! ```text
//!               issue / resend                validate (match)
//! NoActiveCode ───────────────► ActiveCode ─────────────────► Consumed
//!       ▲                           │
//!       ├──── resend invalidates ───┤  (replacement issued in the same unit of work)
//!       └── too many wrong guesses ─┘
//! ```
//!
//! A user holds at most one valid code. Rate limiting counts every code
//! issued in the trailing window, whatever its current state. Each wrong
//! guess counts against the active code, which is invalidated once
//! [`OtpPolicy::max_failed_attempts`] is reached.

use crate::email::{BoxedEmailSender, EmailMessage};
use crate::error::{ShopError, ShopResult};
use crate::identity::{BoxedIdentityProvider, User, UserId};
use crate::store::{within, Record, Store, UnitOfWork};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A one-time password-reset code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub id: Uuid,
    pub owner_user_id: UserId,
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
    #[serde(default)]
    pub consumed_at: Option<DateTime<Utc>>,
    /// Wrong codes submitted while this one was active
    #[serde(default)]
    pub failed_attempts: u32,
}

impl OneTimeCode {
    fn issue(owner_user_id: UserId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_user_id,
            code: generate_code(),
            issued_at: now,
            expires_at: now + ttl,
            is_valid: true,
            consumed_at: None,
            failed_attempts: 0,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.is_valid && self.expires_at > now
    }
}

/// Uniformly random code in 1000..=9999
fn generate_code() -> String {
    rand::thread_rng().gen_range(1000..=9999).to_string()
}

#[derive(Debug, Clone, Default)]
pub struct OtpQuery {
    pub user_id: Option<UserId>,
    pub code: Option<String>,
    pub valid_only: bool,
    /// Only codes whose `expires_at` is later than this instant
    pub unexpired_at: Option<DateTime<Utc>>,
    /// Only codes issued strictly after this instant
    pub issued_after: Option<DateTime<Utc>>,
}

impl Record for OneTimeCode {
    const KIND: &'static str = "one_time_codes";
    type Query = OtpQuery;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn matches(&self, query: &OtpQuery) -> bool {
        query.user_id.map_or(true, |u| u == self.owner_user_id)
            && query.code.as_deref().map_or(true, |c| c == self.code)
            && (!query.valid_only || self.is_valid)
            && query.unexpired_at.map_or(true, |t| self.expires_at > t)
            && query.issued_after.map_or(true, |t| self.issued_at > t)
    }
}

/// Issuance limits and lifetimes
#[derive(Debug, Clone)]
pub struct OtpPolicy {
    /// Codes a user may be issued within `window`
    pub max_per_window: usize,
    pub window: Duration,
    /// Lifetime of each code
    pub ttl: Duration,
    /// Wrong guesses that invalidate the active code
    pub max_failed_attempts: u32,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            max_per_window: 4,
            window: Duration::hours(24),
            ttl: Duration::days(1),
            max_failed_attempts: 5,
        }
    }
}

/// Result of checking a submitted code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpVerdict {
    /// Code matched and is now consumed; the token authorizes one reset
    Valid { reset_token: String },
    Invalid,
}

/// Where a user stands in the reset flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpState {
    NoActiveCode,
    ActiveCode,
    Consumed,
}

#[derive(Debug, Clone, Copy)]
enum Delivery {
    PasswordReset,
    Resend,
}

/// Issues and checks one-time codes
#[derive(Clone)]
pub struct OtpAuthority<S: Store> {
    store: S,
    identity: BoxedIdentityProvider,
    email: BoxedEmailSender,
    policy: OtpPolicy,
    timeout: std::time::Duration,
}

impl<S: Store> OtpAuthority<S> {
    pub fn new(
        store: S,
        identity: BoxedIdentityProvider,
        email: BoxedEmailSender,
        policy: OtpPolicy,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            identity,
            email,
            policy,
            timeout,
        }
    }

    async fn user(&self, user_id: UserId) -> ShopResult<User> {
        within(self.timeout, "identity", self.identity.find_by_id(user_id))
            .await?
            .ok_or_else(|| ShopError::UserNotFound {
                user: user_id.to_string(),
            })
    }

    /// Start a reset for the account named by user name or email
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, name_or_email: &str) -> ShopResult<(User, OneTimeCode)> {
        let user = within(
            self.timeout,
            "identity",
            self.identity.find_by_name_or_email(name_or_email),
        )
        .await?
        .ok_or_else(|| ShopError::UserNotFound {
            user: name_or_email.to_string(),
        })?;
        let code = self.issue_for(&user, Delivery::PasswordReset).await?;
        Ok((user, code))
    }

    /// Issue a fresh code to a user
    #[instrument(skip(self))]
    pub async fn issue(&self, user_id: UserId) -> ShopResult<OneTimeCode> {
        let user = self.user(user_id).await?;
        self.issue_for(&user, Delivery::PasswordReset).await
    }

    /// Replace the user's active code with a new one
    #[instrument(skip(self))]
    pub async fn resend(&self, user_id: UserId) -> ShopResult<OneTimeCode> {
        let user = self.user(user_id).await?;
        self.issue_for(&user, Delivery::Resend).await
    }

    async fn issue_for(&self, user: &User, delivery: Delivery) -> ShopResult<OneTimeCode> {
        let now = Utc::now();
        let mut tx = within(self.timeout, "storage", self.store.begin()).await?;

        let recent: Vec<OneTimeCode> = tx
            .query(&OtpQuery {
                user_id: Some(user.id),
                issued_after: Some(now - self.policy.window),
                ..OtpQuery::default()
            })
            .await?;
        if recent.len() >= self.policy.max_per_window {
            warn!(user_id = %user.id, issued = recent.len(), "one-time code rate limit reached");
            return Err(ShopError::RateLimited);
        }

        let active: Vec<OneTimeCode> = tx
            .query(&OtpQuery {
                user_id: Some(user.id),
                valid_only: true,
                ..OtpQuery::default()
            })
            .await?;
        let replaced = active.len();
        for mut previous in active {
            previous.is_valid = false;
            tx.update(previous).await?;
        }

        let code = OneTimeCode::issue(user.id, now, self.policy.ttl);
        tx.add(code.clone()).await?;
        tx.commit().await?;

        let message = match delivery {
            Delivery::PasswordReset => EmailMessage::password_reset_code(&user.email, &code.code),
            Delivery::Resend => EmailMessage::resent_code(&user.email, &code.code),
        };
        within(self.timeout, "email", self.email.send(message)).await?;

        info!(user_id = %user.id, replaced, ?delivery, "one-time code issued");
        Ok(code)
    }

    /// Check a submitted code. A match consumes it, so it cannot be replayed.
    /// A mismatch counts against the active code and invalidates it at the
    /// policy limit.
    #[instrument(skip(self, submitted))]
    pub async fn validate(&self, user_id: UserId, submitted: &str) -> ShopResult<OtpVerdict> {
        let now = Utc::now();
        let mut tx = within(self.timeout, "storage", self.store.begin()).await?;

        let active: Option<OneTimeCode> = tx
            .find_one(&OtpQuery {
                user_id: Some(user_id),
                valid_only: true,
                unexpired_at: Some(now),
                ..OtpQuery::default()
            })
            .await?;
        let Some(mut code) = active else {
            info!(%user_id, "one-time code rejected, none active");
            return Ok(OtpVerdict::Invalid);
        };

        if code.code != submitted {
            code.failed_attempts += 1;
            let exhausted = code.failed_attempts >= self.policy.max_failed_attempts;
            if exhausted {
                code.is_valid = false;
            }
            let failed_attempts = code.failed_attempts;
            tx.update(code).await?;
            tx.commit().await?;

            if exhausted {
                warn!(
                    %user_id,
                    failed_attempts,
                    "one-time code invalidated after repeated failures"
                );
            } else {
                info!(%user_id, failed_attempts, "one-time code rejected");
            }
            return Ok(OtpVerdict::Invalid);
        }

        let user = self.user(user_id).await?;

        code.is_valid = false;
        code.consumed_at = Some(now);
        tx.update(code).await?;
        tx.commit().await?;

        let reset_token = within(
            self.timeout,
            "identity",
            self.identity.generate_reset_token(&user),
        )
        .await?;
        info!(%user_id, "one-time code accepted");
        Ok(OtpVerdict::Valid { reset_token })
    }

    /// Replace the user's password. The caller must have validated a code
    /// first; the reset token from that validation is checked by the
    /// identity provider.
    #[instrument(skip(self, reset_token, new_password))]
    pub async fn reset_password(
        &self,
        user_id: UserId,
        reset_token: &str,
        new_password: &str,
    ) -> ShopResult<()> {
        let user = self.user(user_id).await?;
        within(
            self.timeout,
            "identity",
            self.identity.reset_password(&user, reset_token, new_password),
        )
        .await
    }

    /// Current position of the user in the reset flow
    pub async fn state(&self, user_id: UserId) -> ShopResult<OtpState> {
        let now = Utc::now();
        let tx = within(self.timeout, "storage", self.store.begin()).await?;
        let codes: Vec<OneTimeCode> = tx
            .query(&OtpQuery {
                user_id: Some(user_id),
                ..OtpQuery::default()
            })
            .await?;

        if codes.iter().any(|c| c.is_active(now)) {
            return Ok(OtpState::ActiveCode);
        }
        let latest = codes.iter().max_by_key(|c| c.issued_at);
        Ok(match latest {
            Some(c) if c.consumed_at.is_some() => OtpState::Consumed,
            _ => OtpState::NoActiveCode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::email::MemoryOutbox;
    use crate::identity::{IdentityProvider, NewAccount};
    use crate::memory::MemoryStore;
    use crate::store::insert_all;
    use std::sync::Arc;

    struct Fixture {
        otp: OtpAuthority<MemoryStore>,
        store: MemoryStore,
        outbox: MemoryOutbox,
        directory: Arc<InMemoryDirectory>,
        user: User,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let outbox = MemoryOutbox::new();
        let directory = Arc::new(InMemoryDirectory::new().with_fast_hashing());
        let registration = directory
            .register(NewAccount {
                first_name: "Mona".into(),
                last_name: "Adel".into(),
                user_name: "mona".into(),
                email: "mona@example.com".into(),
                password: "Secret123".into(),
            })
            .await
            .unwrap();
        directory
            .confirm_email(registration.user.id, &registration.confirmation_token)
            .await
            .unwrap();
        let user = registration.user;
        let otp = OtpAuthority::new(
            store.clone(),
            directory.clone(),
            Arc::new(outbox.clone()),
            OtpPolicy::default(),
            std::time::Duration::from_secs(5),
        );
        Fixture {
            otp,
            store,
            outbox,
            directory,
            user,
        }
    }

    #[tokio::test]
    async fn test_code_is_four_digits_and_emailed() {
        let f = fixture().await;
        let (_, code) = f.otp.forgot_password("mona@example.com").await.unwrap();

        assert_eq!(code.code.len(), 4);
        let n: u32 = code.code.parse().unwrap();
        assert!((1000..=9999).contains(&n));
        assert_eq!(code.expires_at - code.issued_at, Duration::days(1));

        let mail = f.outbox.last_to("mona@example.com").unwrap();
        assert_eq!(mail.subject, "Book Store - Reset Your Password");
        assert!(mail.html_body.contains(&code.code));
    }

    #[tokio::test]
    async fn test_unknown_user_is_reported() {
        let f = fixture().await;
        assert!(matches!(
            f.otp.forgot_password("nobody").await,
            Err(ShopError::UserNotFound { .. })
        ));
        assert!(matches!(
            f.otp.resend(Uuid::new_v4()).await,
            Err(ShopError::UserNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_fifth_issuance_in_a_day_is_rate_limited() {
        let f = fixture().await;
        for _ in 0..4 {
            f.otp.issue(f.user.id).await.unwrap();
        }
        assert!(matches!(
            f.otp.issue(f.user.id).await,
            Err(ShopError::RateLimited)
        ));
        assert!(matches!(
            f.otp.resend(f.user.id).await,
            Err(ShopError::RateLimited)
        ));
    }

    #[tokio::test]
    async fn test_codes_older_than_the_window_do_not_count() {
        let f = fixture().await;
        let old = Utc::now() - Duration::hours(25);
        let stale: Vec<OneTimeCode> = (0..4)
            .map(|_| OneTimeCode {
                is_valid: false,
                ..OneTimeCode::issue(f.user.id, old, Duration::days(1))
            })
            .collect();
        insert_all(&f.store, stale).await.unwrap();

        assert!(f.otp.issue(f.user.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_resend_invalidates_previous_code() {
        let f = fixture().await;
        let first = f.otp.issue(f.user.id).await.unwrap();
        let second = f.otp.resend(f.user.id).await.unwrap();

        let mail = f.outbox.last_to("mona@example.com").unwrap();
        assert_eq!(mail.subject, "Your OTP Code");

        if first.code != second.code {
            assert_eq!(
                f.otp.validate(f.user.id, &first.code).await.unwrap(),
                OtpVerdict::Invalid
            );
        }
        assert!(matches!(
            f.otp.validate(f.user.id, &second.code).await.unwrap(),
            OtpVerdict::Valid { .. }
        ));

        let tx = f.store.begin().await.unwrap();
        let valid: Vec<OneTimeCode> = tx
            .query(&OtpQuery {
                user_id: Some(f.user.id),
                valid_only: true,
                ..OtpQuery::default()
            })
            .await
            .unwrap();
        assert!(valid.is_empty());
    }

    #[tokio::test]
    async fn test_validation_consumes_the_code() {
        let f = fixture().await;
        let code = f.otp.issue(f.user.id).await.unwrap();
        assert_eq!(f.otp.state(f.user.id).await.unwrap(), OtpState::ActiveCode);

        let verdict = f.otp.validate(f.user.id, &code.code).await.unwrap();
        assert!(matches!(verdict, OtpVerdict::Valid { .. }));
        assert_eq!(f.otp.state(f.user.id).await.unwrap(), OtpState::Consumed);

        assert_eq!(
            f.otp.validate(f.user.id, &code.code).await.unwrap(),
            OtpVerdict::Invalid
        );
    }

    #[tokio::test]
    async fn test_repeated_wrong_guesses_invalidate_the_code() {
        let f = fixture().await;
        let (_, code) = f.otp.forgot_password("mona").await.unwrap();
        let wrong = if code.code == "1000" { "1001" } else { "1000" };

        for _ in 0..OtpPolicy::default().max_failed_attempts {
            assert_eq!(
                f.otp.validate(f.user.id, wrong).await.unwrap(),
                OtpVerdict::Invalid
            );
        }

        // The right code no longer works once the limit is hit
        assert_eq!(
            f.otp.validate(f.user.id, &code.code).await.unwrap(),
            OtpVerdict::Invalid
        );
        assert_eq!(f.otp.state(f.user.id).await.unwrap(), OtpState::NoActiveCode);

        // A fresh code starts with a clean count
        let fresh = f.otp.resend(f.user.id).await.unwrap();
        assert_eq!(fresh.failed_attempts, 0);
        assert!(matches!(
            f.otp.validate(f.user.id, &fresh.code).await.unwrap(),
            OtpVerdict::Valid { .. }
        ));
    }

    #[tokio::test]
    async fn test_guesses_below_the_limit_keep_the_code() {
        let f = fixture().await;
        let code = f.otp.issue(f.user.id).await.unwrap();
        let wrong = if code.code == "9999" { "9998" } else { "9999" };

        for _ in 1..OtpPolicy::default().max_failed_attempts {
            f.otp.validate(f.user.id, wrong).await.unwrap();
        }
        assert!(matches!(
            f.otp.validate(f.user.id, &code.code).await.unwrap(),
            OtpVerdict::Valid { .. }
        ));
    }

    #[tokio::test]
    async fn test_expired_code_is_invalid() {
        let f = fixture().await;
        let expired = OneTimeCode::issue(f.user.id, Utc::now() - Duration::days(2), Duration::days(1));
        let submitted = expired.code.clone();
        insert_all(&f.store, [expired]).await.unwrap();

        assert_eq!(
            f.otp.validate(f.user.id, &submitted).await.unwrap(),
            OtpVerdict::Invalid
        );
        assert_eq!(f.otp.state(f.user.id).await.unwrap(), OtpState::NoActiveCode);
    }

    #[tokio::test]
    async fn test_reset_password_after_validation() {
        let f = fixture().await;
        let code = f.otp.issue(f.user.id).await.unwrap();
        let OtpVerdict::Valid { reset_token } = f.otp.validate(f.user.id, &code.code).await.unwrap()
        else {
            panic!("code should validate");
        };

        f.otp
            .reset_password(f.user.id, &reset_token, "Brandnew123")
            .await
            .unwrap();

        assert!(f.directory.sign_in("mona", "Brandnew123").await.is_ok());
        assert!(matches!(
            f.otp.reset_password(f.user.id, &reset_token, "Again1234").await,
            Err(ShopError::InvalidToken)
        ));
    }
}
