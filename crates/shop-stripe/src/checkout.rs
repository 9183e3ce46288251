//! # Stripe Checkout Sessions
//!
//! Implementation of the Stripe Checkout Sessions API. Every cart is paid
//! through Stripe's hosted page in one-time `payment` mode.

use crate::config::StripeConfig;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use shop_core::{
    CheckoutRequest, CheckoutSession, CheckoutStatus, Currency, PaymentStrategy, ShopError,
    ShopResult, WebhookEvent, WebhookEventType,
};
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "stripe";

/// Seconds a signed webhook stays acceptable
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe replaces this with the real session id on redirect
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Stripe Checkout Session strategy
///
/// Uses Stripe's hosted checkout page, so card data never touches this server.
pub struct StripeCheckoutStrategy {
    config: StripeConfig,
    client: Client,
}

impl StripeCheckoutStrategy {
    pub fn new(config: StripeConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ShopError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    /// Form fields for `POST /v1/checkout/sessions`
    fn build_form(
        request: &CheckoutRequest,
        success_url: &str,
        cancel_url: &str,
    ) -> Vec<(String, String)> {
        let success_url = if success_url.contains(SESSION_ID_PLACEHOLDER) {
            success_url.to_string()
        } else {
            let sep = if success_url.contains('?') { '&' } else { '?' };
            format!("{success_url}{sep}session_id={SESSION_ID_PLACEHOLDER}")
        };

        let mut form: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), success_url),
            ("cancel_url".to_string(), cancel_url.to_string()),
        ];

        for (i, item) in request.line_items.iter().enumerate() {
            form.push((
                format!("line_items[{i}][price_data][currency]"),
                item.unit_price.currency.as_str().to_string(),
            ));
            form.push((
                format!("line_items[{i}][price_data][unit_amount]"),
                item.unit_price.amount.to_string(),
            ));
            form.push((
                format!("line_items[{i}][price_data][product_data][name]"),
                item.name.clone(),
            ));
            if let Some(ref desc) = item.description {
                form.push((
                    format!("line_items[{i}][price_data][product_data][description]"),
                    desc.clone(),
                ));
            }
            if let Some(ref image) = item.image_url {
                form.push((
                    format!("line_items[{i}][price_data][product_data][images][0]"),
                    image.clone(),
                ));
            }
            form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }

        if let Some(ref email) = request.customer_email {
            form.push(("customer_email".to_string(), email.clone()));
        }

        form.push(("metadata[request_id]".to_string(), request.id.clone()));
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }
        form
    }
}

#[async_trait]
impl PaymentStrategy for StripeCheckoutStrategy {
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
        success_url: &str,
        cancel_url: &str,
    ) -> ShopResult<CheckoutSession> {
        if request.is_empty() {
            return Err(ShopError::EmptyCart);
        }

        let form = Self::build_form(request, success_url, cancel_url);
        debug!(items = request.line_items.len(), "creating Stripe checkout session");

        let idempotency_key = request
            .idempotency_key
            .clone()
            .unwrap_or_else(|| request.id.clone());

        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", &idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| ShopError::external(PROVIDER, e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ShopError::external(PROVIDER, e.to_string()))?;

        if !status.is_success() {
            error!(%status, %body, "Stripe API error");

            let message = serde_json::from_str::<StripeErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
            return Err(ShopError::external(PROVIDER, message));
        }

        let session: StripeCheckoutSessionResponse = serde_json::from_str(&body).map_err(|e| {
            ShopError::Serialization(format!("Failed to parse Stripe response: {e}"))
        })?;

        info!(session_id = %session.id, "created Stripe checkout session");

        let expires_at = session.expires_at.map(|ts| {
            DateTime::from_timestamp(ts, 0).unwrap_or_else(|| Utc::now() + Duration::hours(24))
        });

        Ok(CheckoutSession {
            session_id: session.id,
            request_id: request.id.clone(),
            provider: PROVIDER.to_string(),
            checkout_url: session.url,
            status: CheckoutStatus::Open,
            expires_at,
            payment_intent_id: session.payment_intent,
            customer_id: session.customer,
            created_at: Utc::now(),
        })
    }

    #[instrument(skip(self, payload, signature))]
    async fn verify_webhook(&self, payload: &[u8], signature: &str) -> ShopResult<WebhookEvent> {
        let header = parse_signature_header(signature)?;

        let now = Utc::now().timestamp();
        if (now - header.timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(ShopError::WebhookVerificationFailed(
                "Timestamp outside tolerance".to_string(),
            ));
        }

        let signed_payload = format!("{}.{}", header.timestamp, String::from_utf8_lossy(payload));
        let expected = compute_hmac_sha256(&self.config.webhook_secret, &signed_payload)?;

        let valid = header
            .signatures
            .iter()
            .any(|sig| constant_time_compare(sig, &expected));
        if !valid {
            return Err(ShopError::WebhookVerificationFailed(
                "Signature mismatch".to_string(),
            ));
        }

        let event: StripeWebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| ShopError::WebhookParse(format!("Failed to parse webhook: {e}")))?;

        debug!(event_type = %event.event_type, "verified Stripe webhook");

        let event_type = match event.event_type.as_str() {
            "checkout.session.completed" => WebhookEventType::CheckoutCompleted,
            "checkout.session.expired" => WebhookEventType::CheckoutExpired,
            "payment_intent.succeeded" => WebhookEventType::PaymentSucceeded,
            "payment_intent.payment_failed" => WebhookEventType::PaymentFailed,
            "charge.refunded" => WebhookEventType::RefundIssued,
            other => WebhookEventType::Unknown(other.to_string()),
        };

        let object = event.data.object;
        let str_field = |key: &str| object.get(key).and_then(|v| v.as_str()).map(String::from);

        let session_id = if event.event_type.starts_with("checkout.session.") {
            str_field("id")
        } else {
            None
        };
        let payment_intent_id = if event.event_type.starts_with("payment_intent.") {
            str_field("id")
        } else {
            str_field("payment_intent")
        };
        let customer_email = object
            .get("customer_details")
            .and_then(|cd| cd.get("email"))
            .and_then(|v| v.as_str())
            .map(String::from);
        let amount_paid = object
            .get("amount_total")
            .or_else(|| object.get("amount"))
            .and_then(|v| v.as_i64());
        let currency = str_field("currency").and_then(|c| c.parse::<Currency>().ok());

        Ok(WebhookEvent {
            event_id: event.id,
            event_type,
            provider: PROVIDER.to_string(),
            session_id,
            payment_intent_id,
            customer_email,
            amount_paid,
            currency,
            raw_data: Some(serde_json::Value::Object(object)),
            timestamp: DateTime::from_timestamp(event.created, 0).unwrap_or_else(Utc::now),
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCheckoutSessionResponse {
    id: String,
    url: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Map<String, serde_json::Value>,
}

// =============================================================================
// Webhook Signature Verification
// =============================================================================

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> ShopResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ShopError::WebhookVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(ShopError::WebhookVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn compute_hmac_sha256(secret: &str, message: &str) -> ShopResult<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ShopError::Internal(format!("invalid webhook secret: {e}")))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes().zip(b.bytes()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `Stripe-Signature` header value for `payload`, as Stripe would send it
#[cfg(test)]
pub(crate) fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> String {
    let sig = compute_hmac_sha256(secret, &format!("{timestamp}.{payload}")).unwrap();
    format!("t={timestamp},v1={sig}")
}
