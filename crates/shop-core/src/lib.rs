//! # shop-core
//!
//! Domain types, workflows and collaborator traits for the bookcart
//! bookstore backend.
//!
//! This crate provides:
//! - `CartLedger` and `PromotionEngine` for cart mutation and promo codes
//! - `OtpAuthority` for one-time password-reset codes
//! - `CheckoutOrchestrator` for payment sessions and order placement
//! - `Storefront` and `AccountService` for the catalog and accounts
//! - `Store` / `UnitOfWork`, `IdentityProvider`, `EmailSender` and
//!   `PaymentStrategy` collaborator traits, with in-memory implementations
//! - `ShopError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{CartLedger, Currency, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let cart = CartLedger::new(store.clone(), Currency::EGP, timeout);
//!
//! cart.add_or_increment(user_id, book_id, 2).await?;
//! let applied = cart.apply_promotion(user_id, "SAVE10").await?;
//!
//! // Hand the cart to the payment provider
//! let session = checkout.create_payment_session(user_id).await?;
//! // Redirect the customer to session.checkout_url
//! ```

pub mod account;
pub mod book;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod directory;
pub mod email;
pub mod error;
pub mod identity;
pub mod memory;
pub mod money;
pub mod order;
pub mod otp;
pub mod payment;
pub mod promotion;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use account::AccountService;
pub use book::{Book, BookId, BookQuery, CatalogSeed, Category, CategoryId, SeedSummary};
pub use cart::{CartChange, CartEntry, CartLedger, CartLine, CartView, DecrementOutcome};
pub use catalog::{BookListing, CategoryCount, Favorite, HomeRails, Storefront};
pub use checkout::{Acknowledged, CheckoutOrchestrator, OrderConfirmation, PaymentConfirmation};
pub use directory::InMemoryDirectory;
pub use email::{BoxedEmailSender, EmailMessage, EmailSender, MemoryOutbox};
pub use error::{ShopError, ShopResult};
pub use identity::{
    BoxedIdentityProvider, IdentityProvider, NewAccount, PasswordPolicy, Session, User, UserId,
};
pub use memory::MemoryStore;
pub use money::{Currency, Price};
pub use order::{Order, OrderId, OrderItem, OrderStatus, PendingCheckout};
pub use otp::{OneTimeCode, OtpAuthority, OtpPolicy, OtpState, OtpVerdict};
pub use payment::{
    CheckoutRequest, CheckoutSession, CheckoutStatus, LineItem, WebhookEvent, WebhookEventType,
    USER_ID_METADATA_KEY,
};
pub use promotion::{AppliedDiscount, Promotion, PromotionEngine};
pub use store::{Record, Store, UnitOfWork};
pub use strategy::{BoxedPaymentStrategy, CheckoutUrls, PaymentStrategy};
