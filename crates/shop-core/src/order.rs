//! # Orders
//!
//! Snapshots of paid carts. Orders are only created by a verified payment
//! confirmation and only change status on a verified refund.
//!
//! A [`PendingCheckout`] holds what a payment session charged for between
//! session creation and confirmation. The order is built from it, never from
//! the cart as it looks when the confirmation arrives.

use crate::book::BookId;
use crate::cart::CartEntry;
use crate::error::ShopError;
use crate::identity::UserId;
use crate::money::Price;
use crate::store::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Paid,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paid => "paid",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "paid" => Ok(OrderStatus::Paid),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(ShopError::InvalidRequest(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub book_id: BookId,
    pub title: String,
    pub quantity: u32,
    pub unit_price: Price,
}

impl From<&CartEntry> for OrderItem {
    fn from(entry: &CartEntry) -> Self {
        Self {
            book_id: entry.line.book_id,
            title: entry.book.title.clone(),
            quantity: entry.line.quantity,
            unit_price: entry.line.unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Payment session that produced this order; unique across orders
    pub session_id: String,
    #[serde(default)]
    pub payment_intent_id: Option<String>,
    pub items: Vec<OrderItem>,
    pub total: Price,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub refunded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub session_id: Option<String>,
    pub payment_intent_id: Option<String>,
}

impl OrderQuery {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }
}

impl Record for Order {
    const KIND: &'static str = "orders";
    type Query = OrderQuery;

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn matches(&self, query: &OrderQuery) -> bool {
        query.user_id.map_or(true, |u| u == self.user_id)
            && query.status.map_or(true, |s| s == self.status)
            && query
                .session_id
                .as_deref()
                .map_or(true, |s| s == self.session_id)
            && query
                .payment_intent_id
                .as_deref()
                .map_or(true, |p| self.payment_intent_id.as_deref() == Some(p))
    }
}

/// Items and total a payment session was opened for, keyed by session id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCheckout {
    pub session_id: String,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Price,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PendingCheckoutQuery {
    pub user_id: Option<UserId>,
    pub session_id: Option<String>,
}

impl PendingCheckoutQuery {
    pub fn for_session(user_id: UserId, session_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            session_id: Some(session_id.into()),
        }
    }
}

impl Record for PendingCheckout {
    const KIND: &'static str = "pending_checkouts";
    type Query = PendingCheckoutQuery;

    fn key(&self) -> String {
        self.session_id.clone()
    }

    fn matches(&self, query: &PendingCheckoutQuery) -> bool {
        query.user_id.map_or(true, |u| u == self.user_id)
            && query
                .session_id
                .as_deref()
                .map_or(true, |s| s == self.session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("paid".parse::<OrderStatus>().unwrap(), OrderStatus::Paid);
        assert_eq!("Refunded".parse::<OrderStatus>().unwrap(), OrderStatus::Refunded);
        assert!(matches!(
            "shipped".parse::<OrderStatus>(),
            Err(ShopError::InvalidRequest(_))
        ));
        assert_eq!(
            serde_json::to_string(&OrderStatus::Refunded).unwrap(),
            "\"refunded\""
        );
    }
}
