//! Payment redirect pages and the Stripe webhook.
//!
//! Orders are only ever placed from a verified webhook. The success page is
//! what the customer lands on after paying and merely reports progress.

use crate::error::{ApiError, ApiResult};
use crate::extract::CurrentUser;
use crate::state::{AppState, ShopStore};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Html,
};
use serde::Deserialize;
use shop_core::{CheckoutOrchestrator, ShopError, ShopResult, WebhookEvent};
use shop_stripe::{dispatch_webhook_event, CheckoutCompletedData, WebhookHandler};
use tracing::{info, instrument, warn};

#[derive(Debug, Deserialize)]
pub struct SuccessParams {
    pub session_id: Option<String>,
}

/// Escape text echoed into a page
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn page(icon: &str, title: &str, body: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body style="font-family: system-ui; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #f4f1ea;">
    <div style="background: white; padding: 60px; border-radius: 16px; text-align: center;">
        <div style="font-size: 60px;">{icon}</div>
        <h1>{title}</h1>
        {body}
    </div>
</body>
</html>
"#
    ))
}

/// Landing page after the hosted checkout
pub async fn checkout_success(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
    Query(params): Query<SuccessParams>,
) -> ApiResult<Html<String>> {
    let session_id = params.session_id.unwrap_or_else(|| "unknown".to_string());

    let status = match user {
        Some(CurrentUser(user)) => {
            match state.checkout.order_for_session(user.id, &session_id).await? {
                Some(order) => format!(
                    "Order <code>{}</code> is confirmed, total {}.",
                    order.id,
                    order.total.display()
                ),
                None => "We are waiting for the payment confirmation.".to_string(),
            }
        }
        None => "Your order will appear in your history once the payment is confirmed."
            .to_string(),
    };

    Ok(page(
        "✅",
        "Payment Received",
        &format!(
            r#"<p>Session: <code>{}</code></p>
        <p style="color: #666;">{status}</p>"#,
            escape_html(&session_id)
        ),
    ))
}

/// Landing page when the customer backs out of the hosted checkout
pub async fn checkout_cancel(
    State(state): State<AppState>,
    user: Option<CurrentUser>,
) -> Html<String> {
    state
        .checkout
        .on_payment_cancel(user.map(|CurrentUser(u)| u.id));
    page(
        "❌",
        "Order was cancelled.",
        r#"<p style="color: #666;">No charges were made. Your cart is unchanged.</p>"#,
    )
}

/// Turns verified Stripe events into orders and refunds
pub struct OrderFulfilment {
    checkout: CheckoutOrchestrator<ShopStore>,
}

impl OrderFulfilment {
    pub fn new(checkout: CheckoutOrchestrator<ShopStore>) -> Self {
        Self { checkout }
    }
}

#[async_trait]
impl WebhookHandler for OrderFulfilment {
    async fn on_checkout_completed(&self, data: CheckoutCompletedData) -> ShopResult<()> {
        if !data.is_paid() {
            warn!(
                session_id = %data.session_id,
                payment_status = %data.payment_status,
                "checkout completed without payment"
            );
            return Ok(());
        }
        let confirmation = data.into_confirmation()?;
        let placed = self.checkout.on_payment_success(confirmation).await?;
        info!(order_id = %placed.order.id, created = placed.created, "checkout fulfilled");
        Ok(())
    }

    async fn on_refund_issued(&self, event: &WebhookEvent) -> ShopResult<()> {
        let payment_intent = event.payment_intent_id.as_deref().ok_or_else(|| {
            ShopError::WebhookParse("refund event has no payment intent".to_string())
        })?;
        self.checkout.record_refund(payment_intent).await?;
        Ok(())
    }
}

/// Stripe webhook endpoint
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError(ShopError::WebhookVerificationFailed(
                "Missing Stripe-Signature header".to_string(),
            ))
        })?;

    let event = state.payment.verify_webhook(&body, signature).await?;

    info!(
        event_id = %event.event_id,
        event_type = ?event.event_type,
        "webhook received"
    );

    let handler = OrderFulfilment::new(state.checkout.clone());
    dispatch_webhook_event(&handler, event).await?;

    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
        assert_eq!(escape_html("cs_test_a1B2"), "cs_test_a1B2");
    }
}
