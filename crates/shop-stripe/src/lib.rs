//! # shop-stripe
//!
//! Stripe payment strategy for bookcart-rs.
//!
//! **StripeCheckoutStrategy** uses the Checkout Sessions API:
//! - One line item per cart line, priced at the cart's unit price
//! - Customer email prefill
//! - The purchasing user travels in session metadata
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_stripe::StripeCheckoutStrategy;
//! use shop_core::PaymentStrategy;
//!
//! let strategy = StripeCheckoutStrategy::from_env()?;
//!
//! let session = strategy.create_checkout(
//!     &request,
//!     "https://books.example.com/customer/checkout/success",
//!     "https://books.example.com/customer/checkout/cancel",
//! ).await?;
//!
//! // Redirect the customer to session.checkout_url
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! use shop_stripe::{dispatch_webhook_event, CheckoutCompletedData, WebhookHandler};
//!
//! struct Fulfil;
//!
//! #[async_trait]
//! impl WebhookHandler for Fulfil {
//!     async fn on_checkout_completed(&self, data: CheckoutCompletedData) -> ShopResult<()> {
//!         let confirmation = data.into_confirmation()?;
//!         // Place the order
//!         Ok(())
//!     }
//! }
//!
//! let event = strategy.verify_webhook(payload, signature).await?;
//! dispatch_webhook_event(&Fulfil, event).await?;
//! ```

pub mod checkout;
pub mod config;
pub mod webhook;

// Re-exports
pub use checkout::StripeCheckoutStrategy;
pub use config::StripeConfig;
pub use webhook::{
    dispatch_webhook_event, CheckoutCompletedData, WebhookHandler, REQUIRED_WEBHOOK_EVENTS,
};
