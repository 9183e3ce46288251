//! # Accounts
//!
//! Registration, email confirmation and sessions, delegated to the identity
//! provider with the confirmation email sent from here.

use crate::email::{BoxedEmailSender, EmailMessage};
use crate::error::{ShopError, ShopResult};
use crate::identity::{BoxedIdentityProvider, NewAccount, Session, User, UserId};
use crate::store::within;
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Clone)]
pub struct AccountService {
    identity: BoxedIdentityProvider,
    email: BoxedEmailSender,
    base_url: String,
    timeout: Duration,
}

impl AccountService {
    pub fn new(
        identity: BoxedIdentityProvider,
        email: BoxedEmailSender,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            email,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn confirmation_link(&self, user_id: UserId, token: &str) -> String {
        format!(
            "{}/identity/account/confirm-email?user_id={}&token={}",
            self.base_url, user_id, token
        )
    }

    /// Create the account and mail its confirmation link
    #[instrument(skip(self, account), fields(user_name = %account.user_name))]
    pub async fn register(&self, account: NewAccount) -> ShopResult<User> {
        let registration = within(self.timeout, "identity", self.identity.register(account)).await?;
        let user = registration.user;

        let link = self.confirmation_link(user.id, &registration.confirmation_token);
        within(
            self.timeout,
            "email",
            self.email.send(EmailMessage::confirm_email(&user.email, &link)),
        )
        .await?;

        info!(user_id = %user.id, "account registered");
        Ok(user)
    }

    pub async fn confirm_email(&self, user_id: UserId, token: &str) -> ShopResult<()> {
        within(self.timeout, "identity", self.identity.confirm_email(user_id, token)).await
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, name_or_email: &str, password: &str) -> ShopResult<Session> {
        let result = within(
            self.timeout,
            "identity",
            self.identity.sign_in(name_or_email, password),
        )
        .await;
        if let Err(e) = &result {
            warn!(error = %e, "login rejected");
        }
        result
    }

    pub async fn logout(&self, session_token: &str) -> ShopResult<()> {
        within(self.timeout, "identity", self.identity.sign_out(session_token)).await
    }

    /// The user behind a bearer token
    pub async fn authenticate(&self, session_token: &str) -> ShopResult<User> {
        within(
            self.timeout,
            "identity",
            self.identity.current_user(session_token),
        )
        .await?
        .ok_or(ShopError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::email::MemoryOutbox;
    use std::sync::Arc;

    fn service() -> (AccountService, MemoryOutbox) {
        let outbox = MemoryOutbox::new();
        let service = AccountService::new(
            Arc::new(InMemoryDirectory::new().with_fast_hashing()),
            Arc::new(outbox.clone()),
            "http://shop.test/",
            Duration::from_secs(5),
        );
        (service, outbox)
    }

    fn form() -> NewAccount {
        NewAccount {
            first_name: "Hana".into(),
            last_name: "Fathy".into(),
            user_name: "hana".into(),
            email: "hana@example.com".into(),
            password: "Secret123".into(),
        }
    }

    /// Pull the query parameters back out of the mailed link
    fn link_params(body: &str) -> (String, String) {
        let start = body.find("user_id=").unwrap() + "user_id=".len();
        let rest = &body[start..];
        let (user_id, rest) = rest.split_once("&token=").unwrap();
        let token: String = rest.chars().take_while(|c| c.is_ascii_alphanumeric()).collect();
        (user_id.to_string(), token)
    }

    #[tokio::test]
    async fn test_register_confirm_login_logout() {
        let (service, outbox) = service();
        let user = service.register(form()).await.unwrap();

        let mail = outbox.last_to("hana@example.com").unwrap();
        assert_eq!(mail.subject, "Book Store - Confirm Your Email!");
        assert!(mail
            .html_body
            .contains("http://shop.test/identity/account/confirm-email?user_id="));

        assert!(matches!(
            service.login("hana", "Secret123").await,
            Err(ShopError::EmailNotConfirmed)
        ));

        let (user_id, token) = link_params(&mail.html_body);
        assert_eq!(user_id, user.id.to_string());
        service.confirm_email(user.id, &token).await.unwrap();

        let session = service.login("hana@example.com", "Secret123").await.unwrap();
        assert_eq!(service.authenticate(&session.token).await.unwrap().id, user.id);

        service.logout(&session.token).await.unwrap();
        assert!(matches!(
            service.authenticate(&session.token).await,
            Err(ShopError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_weak_password_is_rejected() {
        let (service, outbox) = service();
        let err = service
            .register(NewAccount {
                password: "short".into(),
                ..form()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::PasswordPolicy(_)));
        assert!(outbox.messages().is_empty());
    }
}
