//! # Stripe Webhook Handling
//!
//! Typed views of verified Stripe events and a dispatcher that routes them
//! to a [`WebhookHandler`].

use async_trait::async_trait;
use shop_core::{
    Currency, PaymentConfirmation, ShopError, ShopResult, UserId, WebhookEvent, WebhookEventType,
    USER_ID_METADATA_KEY,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Parsed checkout.session.completed event data
#[derive(Debug, Clone)]
pub struct CheckoutCompletedData {
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    pub customer_email: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<Currency>,
    pub payment_status: String,
    pub metadata: HashMap<String, String>,
}

impl CheckoutCompletedData {
    /// Parse from a verified webhook event
    pub fn from_event(event: &WebhookEvent) -> ShopResult<Self> {
        let obj = event
            .raw_data
            .as_ref()
            .and_then(|raw| raw.as_object())
            .ok_or_else(|| ShopError::WebhookParse("Missing event object".to_string()))?;

        let str_field = |key: &str| obj.get(key).and_then(|v| v.as_str()).map(String::from);

        let session_id = str_field("id")
            .ok_or_else(|| ShopError::WebhookParse("Missing session id".to_string()))?;

        let metadata = obj
            .get("metadata")
            .and_then(|m| m.as_object())
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            session_id,
            payment_intent_id: str_field("payment_intent"),
            customer_email: obj
                .get("customer_details")
                .and_then(|cd| cd.get("email"))
                .and_then(|v| v.as_str())
                .map(String::from),
            amount_total: obj.get("amount_total").and_then(|v| v.as_i64()),
            currency: str_field("currency").and_then(|c| c.parse().ok()),
            payment_status: str_field("payment_status").unwrap_or_else(|| "unknown".to_string()),
            metadata,
        })
    }

    /// Check if payment was collected
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    /// The purchasing user, from session metadata
    pub fn user_id(&self) -> Option<UserId> {
        self.metadata
            .get(USER_ID_METADATA_KEY)
            .and_then(|s| s.parse().ok())
    }

    /// What the checkout orchestrator needs to place the order
    pub fn into_confirmation(self) -> ShopResult<PaymentConfirmation> {
        let user_id = self.user_id().ok_or_else(|| {
            ShopError::WebhookParse("session metadata has no valid user_id".to_string())
        })?;
        Ok(PaymentConfirmation {
            user_id,
            session_id: self.session_id,
            payment_intent_id: self.payment_intent_id,
            amount_total: self.amount_total,
        })
    }
}

/// Webhook event handler trait
///
/// Every method defaults to logging the event and succeeding.
#[allow(unused_variables)]
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    /// Called when a checkout session is completed
    async fn on_checkout_completed(&self, data: CheckoutCompletedData) -> ShopResult<()> {
        info!(
            session_id = %data.session_id,
            amount = ?data.amount_total,
            "checkout completed"
        );
        Ok(())
    }

    /// Called when a checkout session expires unpaid
    async fn on_checkout_expired(&self, event: &WebhookEvent) -> ShopResult<()> {
        info!(session_id = ?event.session_id, "checkout expired");
        Ok(())
    }

    async fn on_payment_succeeded(&self, event: &WebhookEvent) -> ShopResult<()> {
        info!(payment_intent = ?event.payment_intent_id, "payment succeeded");
        Ok(())
    }

    async fn on_payment_failed(&self, event: &WebhookEvent) -> ShopResult<()> {
        warn!(payment_intent = ?event.payment_intent_id, "payment failed");
        Ok(())
    }

    async fn on_refund_issued(&self, event: &WebhookEvent) -> ShopResult<()> {
        info!(payment_intent = ?event.payment_intent_id, "refund issued");
        Ok(())
    }

    /// Called for unknown/unhandled events
    async fn on_unknown_event(&self, event: &WebhookEvent) -> ShopResult<()> {
        debug!(event_type = ?event.event_type, "unhandled webhook event");
        Ok(())
    }
}

/// Dispatch a webhook event to the appropriate handler method
pub async fn dispatch_webhook_event(
    handler: &dyn WebhookHandler,
    event: WebhookEvent,
) -> ShopResult<()> {
    match &event.event_type {
        WebhookEventType::CheckoutCompleted => {
            let data = CheckoutCompletedData::from_event(&event)?;
            handler.on_checkout_completed(data).await
        }
        WebhookEventType::CheckoutExpired => handler.on_checkout_expired(&event).await,
        WebhookEventType::PaymentSucceeded => handler.on_payment_succeeded(&event).await,
        WebhookEventType::PaymentFailed => handler.on_payment_failed(&event).await,
        WebhookEventType::RefundIssued => handler.on_refund_issued(&event).await,
        WebhookEventType::Unknown(_) => handler.on_unknown_event(&event).await,
    }
}

/// Events to enable on the Stripe webhook endpoint
pub const REQUIRED_WEBHOOK_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.expired",
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
    "charge.refunded",
];
