//! # Payment Types
//!
//! What the checkout orchestrator hands to a payment provider, and what comes
//! back: checkout requests, provider sessions and verified webhook events.

use crate::book::BookId;
use crate::cart::CartEntry;
use crate::identity::UserId;
use crate::money::{Currency, Price};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Metadata key carrying the purchasing user through the provider
pub const USER_ID_METADATA_KEY: &str = "user_id";

/// A line item sent to the payment provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub book_id: BookId,

    /// Book title (denormalized for the hosted checkout page)
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub unit_price: Price,

    pub quantity: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl LineItem {
    /// Line item for one cart entry, at the entry's (possibly discounted) unit price
    pub fn from_cart_entry(entry: &CartEntry) -> Self {
        let description = Some(entry.book.description.clone()).filter(|d| !d.is_empty());
        let image_url = Some(entry.book.image.clone()).filter(|i| i.starts_with("http"));
        Self {
            book_id: entry.line.book_id,
            name: entry.book.title.clone(),
            description,
            unit_price: entry.line.unit_price,
            quantity: entry.line.quantity,
            image_url,
        }
    }

    pub fn total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

/// A cart ready to be paid for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Unique request ID (generated)
    pub id: String,

    pub line_items: Vec<LineItem>,

    /// Currency (must be same for all items)
    pub currency: Currency,

    /// Customer email (optional, for prefill)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,

    /// Idempotency key (prevents duplicate sessions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,

    pub created_at: DateTime<Utc>,
}

impl CheckoutRequest {
    pub fn new(currency: Currency) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            line_items: Vec::new(),
            currency,
            customer_email: None,
            idempotency_key: Some(Uuid::new_v4().to_string()),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn add_item(&mut self, item: LineItem) {
        self.line_items.push(item);
    }

    pub fn total(&self) -> Price {
        let amount = self.line_items.iter().map(|item| item.total().amount).sum();
        Price::from_minor(amount, self.currency)
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.customer_email = Some(email.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Tag the request with the purchasing user
    pub fn for_user(self, user_id: UserId) -> Self {
        self.with_metadata(USER_ID_METADATA_KEY, user_id.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.line_items.is_empty()
    }

    pub fn item_count(&self) -> u32 {
        self.line_items.iter().map(|i| i.quantity).sum()
    }
}

/// Status of a checkout session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// Session created, awaiting payment
    #[default]
    Open,
    Complete,
    Expired,
}

/// A checkout session created by a payment provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider's session ID
    pub session_id: String,

    /// Our checkout request ID
    pub request_id: String,

    /// Provider name (e.g., "stripe")
    pub provider: String,

    /// URL to redirect the customer to for payment
    pub checkout_url: String,

    #[serde(default)]
    pub status: CheckoutStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl CheckoutSession {
    pub fn new(
        session_id: impl Into<String>,
        request_id: impl Into<String>,
        provider: impl Into<String>,
        checkout_url: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            request_id: request_id.into(),
            provider: provider.into(),
            checkout_url: checkout_url.into(),
            status: CheckoutStatus::Open,
            expires_at: None,
            payment_intent_id: None,
            customer_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Webhook event types we act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    CheckoutCompleted,
    CheckoutExpired,
    PaymentSucceeded,
    PaymentFailed,
    RefundIssued,
    /// Unknown event (passthrough)
    Unknown(String),
}

/// A verified webhook event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event ID from provider
    pub event_id: String,

    pub event_type: WebhookEventType,

    pub provider: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,

    /// Amount paid (in smallest unit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_paid: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,

    /// Provider's event object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,

    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::CartEntry;
    use crate::testing::{book, line};

    #[test]
    fn test_request_total_uses_cart_unit_prices() {
        let user = Uuid::new_v4();
        let mut request = CheckoutRequest::new(Currency::EGP).for_user(user);

        for (b, qty, unit) in [(1, 2, 9_000), (2, 1, 4_550)] {
            let entry = CartEntry {
                line: line(user, b, qty, unit),
                book: book(b, 10_000),
                line_total: Price::from_minor(unit * i64::from(qty), Currency::EGP),
            };
            request.add_item(LineItem::from_cart_entry(&entry));
        }

        assert_eq!(request.total().amount, 22_550);
        assert_eq!(request.item_count(), 3);
        assert_eq!(request.line_items[0].name, "Book 1");
        assert_eq!(
            request.metadata.get(USER_ID_METADATA_KEY),
            Some(&user.to_string())
        );
    }

    #[test]
    fn test_session_status_defaults_to_open() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "session_id": "cs_123",
            "request_id": "req_456",
            "provider": "stripe",
            "checkout_url": "https://checkout.stripe.com/c/pay",
            "created_at": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(session.status, CheckoutStatus::Open);
        assert!(session.expires_at.is_none());
    }
}
