//! # In-Memory Identity Provider
//!
//! Development and test implementation of [`IdentityProvider`]. Passwords
//! are stored as argon2 PHC strings; sessions, confirmation tokens and reset
//! tokens are opaque random strings.

use crate::error::{ShopError, ShopResult};
use crate::identity::{
    random_token, IdentityProvider, NewAccount, PasswordPolicy, Registration, Session, User,
    UserId,
};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

/// Failed logins before the account is locked
const MAX_FAILED_LOGINS: u32 = 5;

struct Account {
    user: User,
    password_hash: String,
    failed_logins: u32,
    locked_until: Option<DateTime<Utc>>,
    confirmation_token: Option<String>,
    reset_token: Option<(String, DateTime<Utc>)>,
}

struct SessionEntry {
    user_id: UserId,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct DirectoryState {
    accounts: HashMap<UserId, Account>,
    sessions: HashMap<String, SessionEntry>,
}

impl DirectoryState {
    fn lookup(&self, name_or_email: &str) -> Option<&Account> {
        self.accounts.values().find(|a| {
            a.user.user_name.eq_ignore_ascii_case(name_or_email)
                || a.user.email.eq_ignore_ascii_case(name_or_email)
        })
    }
}

/// In-memory identity provider
pub struct InMemoryDirectory {
    state: Mutex<DirectoryState>,
    policy: PasswordPolicy,
    params: Params,
    session_ttl: Duration,
    lockout: Duration,
    reset_token_ttl: Duration,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DirectoryState::default()),
            policy: PasswordPolicy::default(),
            params: Params::default(),
            session_ttl: Duration::days(30),
            lockout: Duration::minutes(5),
            reset_token_ttl: Duration::minutes(15),
        }
    }

    /// Builder: cheap argon2 parameters (tests only; never in production)
    pub fn with_fast_hashing(mut self) -> Self {
        if let Ok(params) = Params::new(Params::MIN_M_COST, 1, 1, None) {
            self.params = params;
        }
        self
    }

    pub fn with_password_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    async fn hash_password(&self, password: &str) -> ShopResult<String> {
        let hasher = self.hasher();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            hasher
                .hash_password(password.as_bytes(), &salt)
                .map(|h| h.to_string())
                .map_err(|e| ShopError::Internal(format!("failed to hash password: {e}")))
        })
        .await
        .map_err(|e| ShopError::Internal(e.to_string()))?
    }

    async fn verify_password(&self, password: &str, hash: &str) -> ShopResult<bool> {
        let hasher = self.hasher();
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&hash)
                .map_err(|e| ShopError::Internal(format!("corrupt password hash: {e}")))?;
            Ok(hasher.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| ShopError::Internal(e.to_string()))?
    }
}

impl Default for InMemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryDirectory {
    async fn register(&self, account: NewAccount) -> ShopResult<Registration> {
        self.policy.check(&account.password)?;
        let password_hash = self.hash_password(&account.password).await?;

        let mut state = self.state.lock().await;
        if state.lookup(&account.user_name).is_some() {
            return Err(ShopError::DuplicateUser { field: "user name" });
        }
        if state.lookup(&account.email).is_some() {
            return Err(ShopError::DuplicateUser { field: "email" });
        }

        let user = User {
            id: Uuid::new_v4(),
            user_name: account.user_name,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
            email_confirmed: false,
        };
        let confirmation_token = random_token();
        state.accounts.insert(
            user.id,
            Account {
                user: user.clone(),
                password_hash,
                failed_logins: 0,
                locked_until: None,
                confirmation_token: Some(confirmation_token.clone()),
                reset_token: None,
            },
        );

        info!(user_id = %user.id, "user registered");
        Ok(Registration {
            user,
            confirmation_token,
        })
    }

    async fn confirm_email(&self, user_id: UserId, token: &str) -> ShopResult<()> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| ShopError::UserNotFound {
                user: user_id.to_string(),
            })?;

        if account.user.email_confirmed {
            return Ok(());
        }
        if account.confirmation_token.as_deref() != Some(token) {
            return Err(ShopError::InvalidToken);
        }
        account.user.email_confirmed = true;
        account.confirmation_token = None;
        Ok(())
    }

    async fn sign_in(&self, name_or_email: &str, password: &str) -> ShopResult<Session> {
        let now = Utc::now();
        let (user_id, hash) = {
            let state = self.state.lock().await;
            let account = state
                .lookup(name_or_email)
                .ok_or(ShopError::InvalidCredentials)?;
            if let Some(until) = account.locked_until.filter(|until| *until > now) {
                return Err(ShopError::LockedOut {
                    retry_after_secs: (until - now).num_seconds().max(1) as u64,
                });
            }
            (account.user.id, account.password_hash.clone())
        };

        let valid = self.verify_password(password, &hash).await?;

        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&user_id)
            .ok_or(ShopError::InvalidCredentials)?;

        if !valid {
            account.failed_logins += 1;
            if account.failed_logins >= MAX_FAILED_LOGINS {
                account.failed_logins = 0;
                account.locked_until = Some(now + self.lockout);
                warn!(%user_id, "account locked after repeated failed logins");
                return Err(ShopError::LockedOut {
                    retry_after_secs: self.lockout.num_seconds() as u64,
                });
            }
            return Err(ShopError::InvalidCredentials);
        }

        if !account.user.email_confirmed {
            return Err(ShopError::EmailNotConfirmed);
        }

        account.failed_logins = 0;
        account.locked_until = None;

        let session = Session {
            token: random_token(),
            user_id,
            expires_at: now + self.session_ttl,
        };
        state.sessions.insert(
            session.token.clone(),
            SessionEntry {
                user_id,
                expires_at: session.expires_at,
            },
        );
        Ok(session)
    }

    async fn sign_out(&self, session_token: &str) -> ShopResult<()> {
        self.state.lock().await.sessions.remove(session_token);
        Ok(())
    }

    async fn current_user(&self, session_token: &str) -> ShopResult<Option<User>> {
        let mut state = self.state.lock().await;
        let Some((user_id, expires_at)) = state
            .sessions
            .get(session_token)
            .map(|s| (s.user_id, s.expires_at))
        else {
            return Ok(None);
        };
        if expires_at <= Utc::now() {
            state.sessions.remove(session_token);
            return Ok(None);
        }
        Ok(state.accounts.get(&user_id).map(|a| a.user.clone()))
    }

    async fn find_by_id(&self, id: UserId) -> ShopResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.accounts.get(&id).map(|a| a.user.clone()))
    }

    async fn find_by_name_or_email(&self, name_or_email: &str) -> ShopResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.lookup(name_or_email).map(|a| a.user.clone()))
    }

    async fn generate_reset_token(&self, user: &User) -> ShopResult<String> {
        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&user.id)
            .ok_or_else(|| ShopError::UserNotFound {
                user: user.id.to_string(),
            })?;
        let token = random_token();
        account.reset_token = Some((token.clone(), Utc::now() + self.reset_token_ttl));
        Ok(token)
    }

    async fn reset_password(&self, user: &User, token: &str, new_password: &str) -> ShopResult<()> {
        {
            let state = self.state.lock().await;
            let account = state
                .accounts
                .get(&user.id)
                .ok_or_else(|| ShopError::UserNotFound {
                    user: user.id.to_string(),
                })?;
            match &account.reset_token {
                Some((expected, expires_at)) if expected == token && *expires_at > Utc::now() => {}
                _ => return Err(ShopError::InvalidToken),
            }
        }

        self.policy.check(new_password)?;
        let password_hash = self.hash_password(new_password).await?;

        let mut state = self.state.lock().await;
        let account = state
            .accounts
            .get_mut(&user.id)
            .ok_or_else(|| ShopError::UserNotFound {
                user: user.id.to_string(),
            })?;
        // Token may have been spent while hashing
        if !matches!(&account.reset_token, Some((expected, _)) if expected == token) {
            return Err(ShopError::InvalidToken);
        }
        account.password_hash = password_hash;
        account.reset_token = None;
        account.failed_logins = 0;
        account.locked_until = None;
        state.sessions.retain(|_, s| s.user_id != user.id);

        info!(user_id = %user.id, "password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> NewAccount {
        NewAccount {
            first_name: "Test".into(),
            last_name: "Reader".into(),
            user_name: name.into(),
            email: format!("{name}@example.com"),
            password: "Secret123".into(),
        }
    }

    async fn confirmed(directory: &InMemoryDirectory, name: &str) -> User {
        let reg = directory.register(account(name)).await.unwrap();
        directory
            .confirm_email(reg.user.id, &reg.confirmation_token)
            .await
            .unwrap();
        reg.user
    }

    #[tokio::test]
    async fn test_login_requires_confirmed_email() {
        let directory = InMemoryDirectory::new().with_fast_hashing();
        let reg = directory.register(account("nour")).await.unwrap();

        let err = directory.sign_in("nour", "Secret123").await.unwrap_err();
        assert!(matches!(err, ShopError::EmailNotConfirmed));

        assert!(matches!(
            directory.confirm_email(reg.user.id, "wrong").await,
            Err(ShopError::InvalidToken)
        ));
        directory
            .confirm_email(reg.user.id, &reg.confirmation_token)
            .await
            .unwrap();

        let session = directory
            .sign_in("nour@example.com", "Secret123")
            .await
            .unwrap();
        let current = directory.current_user(&session.token).await.unwrap();
        assert_eq!(current.map(|u| u.id), Some(reg.user.id));

        directory.sign_out(&session.token).await.unwrap();
        assert!(directory.current_user(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let directory = InMemoryDirectory::new().with_fast_hashing();
        directory.register(account("omar")).await.unwrap();
        let err = directory.register(account("OMAR")).await.unwrap_err();
        assert!(matches!(err, ShopError::DuplicateUser { .. }));
    }

    #[tokio::test]
    async fn test_repeated_failures_lock_the_account() {
        let directory = InMemoryDirectory::new().with_fast_hashing();
        confirmed(&directory, "laila").await;

        for _ in 0..MAX_FAILED_LOGINS - 1 {
            assert!(matches!(
                directory.sign_in("laila", "Wrong1234").await,
                Err(ShopError::InvalidCredentials)
            ));
        }
        assert!(matches!(
            directory.sign_in("laila", "Wrong1234").await,
            Err(ShopError::LockedOut { .. })
        ));
        // Even the right password is refused while locked
        assert!(matches!(
            directory.sign_in("laila", "Secret123").await,
            Err(ShopError::LockedOut { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_password_needs_matching_token() {
        let directory = InMemoryDirectory::new().with_fast_hashing();
        let user = confirmed(&directory, "sara").await;
        let session = directory.sign_in("sara", "Secret123").await.unwrap();

        assert!(matches!(
            directory.reset_password(&user, "guess", "Newpass123").await,
            Err(ShopError::InvalidToken)
        ));

        let token = directory.generate_reset_token(&user).await.unwrap();
        assert!(matches!(
            directory.reset_password(&user, &token, "weak").await,
            Err(ShopError::PasswordPolicy(_))
        ));
        directory
            .reset_password(&user, &token, "Newpass123")
            .await
            .unwrap();

        // Old sessions are revoked and the token is spent
        assert!(directory.current_user(&session.token).await.unwrap().is_none());
        assert!(directory
            .reset_password(&user, &token, "Another123")
            .await
            .is_err());
        assert!(directory.sign_in("sara", "Newpass123").await.is_ok());
    }
}
