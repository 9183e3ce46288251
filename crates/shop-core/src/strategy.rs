//! # Payment Strategy Trait
//!
//! The payment collaborator seen by the checkout orchestrator. Each provider
//! implements [`PaymentStrategy`]; the application holds one behind a
//! [`BoxedPaymentStrategy`].
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           PaymentStrategy (trait)            │
//! │  ├── create_checkout()                       │
//! │  ├── verify_webhook()                        │
//! │  └── provider_name()                         │
//! └──────────────────────────────────────────────┘
//!                       ▲
//!              ┌────────┴────────┐
//!              │ StripeCheckout  │
//!              │    Strategy     │
//!              └─────────────────┘
//! ```

use crate::error::ShopResult;
use crate::payment::{CheckoutRequest, CheckoutSession, WebhookEvent};
use async_trait::async_trait;
use std::sync::Arc;

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Create a hosted checkout session and return its redirect URL.
    ///
    /// # Arguments
    /// * `request` - The cart being paid for
    /// * `success_url` - Where the provider sends the customer after paying
    /// * `cancel_url` - Where the provider sends the customer on cancel
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
        success_url: &str,
        cancel_url: &str,
    ) -> ShopResult<CheckoutSession>;

    /// Verify a webhook signature and parse the event.
    async fn verify_webhook(&self, payload: &[u8], signature: &str) -> ShopResult<WebhookEvent>;

    /// Provider name (for logging and routing)
    fn provider_name(&self) -> &'static str;

    /// Default: `/webhook/{provider_name}`
    fn webhook_path(&self) -> String {
        format!("/webhook/{}", self.provider_name())
    }
}

/// Type alias for a boxed payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;

/// Redirect targets handed to the provider
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    /// Base URL of the application (e.g., "https://books.example.com")
    pub base_url: String,
    pub success_path: String,
    pub cancel_path: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            success_path: "/customer/checkout/success".to_string(),
            cancel_path: "/customer/checkout/cancel".to_string(),
        }
    }

    pub fn success_url(&self) -> String {
        format!("{}{}", self.base_url, self.success_path)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}{}", self.base_url, self.cancel_path)
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_urls() {
        let urls = CheckoutUrls::new("https://books.example.com/");

        assert_eq!(
            urls.success_url(),
            "https://books.example.com/customer/checkout/success"
        );
        assert_eq!(
            urls.cancel_url(),
            "https://books.example.com/customer/checkout/cancel"
        );
    }
}
