//! # Checkout Orchestrator
//!
//! Turns a cart into a hosted payment session, and a confirmed payment into
//! an order.
//!
//! ```text
//! cart ──create_payment_session──► provider ──(customer pays)──► verified webhook
//!                                                                   │
//!       order, paid lines removed ◄── on_payment_success ◄──────────┘
//! ```
//!
//! Confirmation is driven only by a signature-verified provider event, never
//! by the browser redirect. Redelivered events for the same session return
//! the order that the first delivery created.
//!
//! Each session stores a [`PendingCheckout`] with the lines it charged for.
//! The order is built from that record, and only those quantities leave the
//! cart. Books added after the session was opened stay in the cart.

use crate::cart::{load_lines, with_books, CartLine, CartQuery};
use crate::error::{ShopError, ShopResult};
use crate::identity::{BoxedIdentityProvider, UserId};
use crate::money::Currency;
use crate::order::{
    Order, OrderItem, OrderQuery, OrderStatus, PendingCheckout, PendingCheckoutQuery,
};
use crate::payment::{CheckoutRequest, CheckoutSession, LineItem};
use crate::store::{within, Store, UnitOfWork};
use crate::strategy::{BoxedPaymentStrategy, CheckoutUrls};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// What a verified "checkout completed, paid" event tells us
#[derive(Debug, Clone)]
pub struct PaymentConfirmation {
    pub user_id: UserId,
    pub session_id: String,
    pub payment_intent_id: Option<String>,
    /// Amount the provider collected, in minor units
    pub amount_total: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderConfirmation {
    pub order: Order,
    /// False when the order already existed (event redelivery)
    pub created: bool,
}

/// Reply to a cancelled checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Acknowledged;

#[derive(Clone)]
pub struct CheckoutOrchestrator<S: Store> {
    store: S,
    identity: BoxedIdentityProvider,
    payment: BoxedPaymentStrategy,
    urls: CheckoutUrls,
    currency: Currency,
    timeout: Duration,
}

impl<S: Store> CheckoutOrchestrator<S> {
    pub fn new(
        store: S,
        identity: BoxedIdentityProvider,
        payment: BoxedPaymentStrategy,
        urls: CheckoutUrls,
        currency: Currency,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            identity,
            payment,
            urls,
            currency,
            timeout,
        }
    }

    async fn begin(&self) -> ShopResult<S::Tx> {
        within(self.timeout, "storage", self.store.begin()).await
    }

    /// Open a hosted payment session for the user's cart
    #[instrument(skip(self))]
    pub async fn create_payment_session(&self, user_id: UserId) -> ShopResult<CheckoutSession> {
        let user = within(self.timeout, "identity", self.identity.find_by_id(user_id))
            .await?
            .ok_or_else(|| ShopError::UserNotFound {
                user: user_id.to_string(),
            })?;

        // The unit of work is released before the provider call
        let cart = {
            let tx = self.begin().await?;
            let lines = load_lines(&tx, user_id).await?;
            if lines.is_empty() {
                return Err(ShopError::EmptyCart);
            }
            with_books(&tx, lines, self.currency).await?
        };

        let mut request = CheckoutRequest::new(self.currency)
            .with_email(user.email)
            .for_user(user_id);
        for entry in &cart.items {
            request.add_item(LineItem::from_cart_entry(entry));
        }

        info!(
            items = request.item_count(),
            total = %request.total().display(),
            provider = self.payment.provider_name(),
            "creating payment session"
        );

        let session = within(
            self.timeout,
            self.payment.provider_name(),
            self.payment
                .create_checkout(&request, &self.urls.success_url(), &self.urls.cancel_url()),
        )
        .await?;

        let pending = PendingCheckout {
            session_id: session.session_id.clone(),
            user_id,
            items: cart.items.iter().map(OrderItem::from).collect(),
            total: cart.total,
            created_at: Utc::now(),
        };
        let mut tx = self.begin().await?;
        tx.add(pending).await?;
        tx.commit().await?;

        info!(session_id = %session.session_id, "payment session created");
        Ok(session)
    }

    /// Place the order a payment session charged for once the provider
    /// confirms payment
    #[instrument(skip(self, confirmation), fields(user_id = %confirmation.user_id, session_id = %confirmation.session_id))]
    pub async fn on_payment_success(
        &self,
        confirmation: PaymentConfirmation,
    ) -> ShopResult<OrderConfirmation> {
        let mut tx = self.begin().await?;

        let existing: Option<Order> = tx
            .find_one(&OrderQuery::for_session(&confirmation.session_id))
            .await?;
        if let Some(order) = existing {
            info!(order_id = %order.id, "payment confirmation already processed");
            return Ok(OrderConfirmation {
                order,
                created: false,
            });
        }

        let pending: Option<PendingCheckout> = tx
            .find_one(&PendingCheckoutQuery::for_session(
                confirmation.user_id,
                &confirmation.session_id,
            ))
            .await?;
        let Some(pending) = pending else {
            warn!("payment confirmed for an unknown session");
            return Err(ShopError::PaymentSessionNotFound {
                session_id: confirmation.session_id,
            });
        };

        if let Some(paid) = confirmation.amount_total {
            if paid != pending.total.amount {
                warn!(
                    paid,
                    charged = pending.total.amount,
                    "collected amount differs from session total"
                );
            }
        }

        let order = Order {
            id: Uuid::new_v4(),
            user_id: confirmation.user_id,
            status: OrderStatus::Paid,
            session_id: confirmation.session_id,
            payment_intent_id: confirmation.payment_intent_id,
            items: pending.items.clone(),
            total: pending.total,
            created_at: Utc::now(),
            refunded_at: None,
        };
        tx.add(order.clone()).await?;

        for item in &pending.items {
            let line: Option<CartLine> = tx
                .find_one(&CartQuery::line(order.user_id, item.book_id))
                .await?;
            match line {
                Some(line) if line.quantity > item.quantity => {
                    let quantity = line.quantity - item.quantity;
                    tx.update(CartLine { quantity, ..line }).await?;
                }
                Some(line) => tx.delete(&line).await?,
                None => {}
            }
        }
        tx.delete(&pending).await?;
        tx.commit().await?;

        info!(order_id = %order.id, total = %order.total.display(), "order placed");
        Ok(OrderConfirmation {
            order,
            created: true,
        })
    }

    /// The customer abandoned the hosted checkout; the cart stays as it was
    pub fn on_payment_cancel(&self, user_id: Option<UserId>) -> Acknowledged {
        info!(user_id = ?user_id, "payment cancelled");
        Acknowledged
    }

    /// Mark the order paid through `payment_intent_id` as refunded
    #[instrument(skip(self))]
    pub async fn record_refund(&self, payment_intent_id: &str) -> ShopResult<Option<Order>> {
        let mut tx = self.begin().await?;
        let found: Option<Order> = tx
            .find_one(&OrderQuery {
                payment_intent_id: Some(payment_intent_id.to_string()),
                ..OrderQuery::default()
            })
            .await?;

        let Some(mut order) = found else {
            warn!("refund for unknown payment intent ignored");
            return Ok(None);
        };
        if order.status == OrderStatus::Refunded {
            return Ok(Some(order));
        }

        order.status = OrderStatus::Refunded;
        order.refunded_at = Some(Utc::now());
        tx.update(order.clone()).await?;
        tx.commit().await?;

        info!(order_id = %order.id, "order refunded");
        Ok(Some(order))
    }

    /// The order a payment session produced, if the confirmation has arrived
    pub async fn order_for_session(
        &self,
        user_id: UserId,
        session_id: &str,
    ) -> ShopResult<Option<Order>> {
        let tx = self.begin().await?;
        let order: Option<Order> = tx
            .find_one(&OrderQuery {
                user_id: Some(user_id),
                session_id: Some(session_id.to_string()),
                ..OrderQuery::default()
            })
            .await?;
        Ok(order)
    }
}
