//! # Promotions
//!
//! Single-book discount codes and the engine that redeems them against a
//! cart. Redemption is one-per-user: a [`PromotionUsage`] row blocks any
//! second application regardless of what the cart holds.

use crate::book::{Book, BookId, BookQuery};
use crate::cart::CartLine;
use crate::error::{ShopError, ShopResult};
use crate::identity::UserId;
use crate::money::Price;
use crate::store::{Record, UnitOfWork};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub type PromotionId = u32;

/// A discount code bound to one book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: PromotionId,
    pub code: String,
    pub book_id: BookId,
    /// 0 to 100
    pub discount_percent: Decimal,
    pub is_valid: bool,
}

impl Promotion {
    pub fn new(
        id: PromotionId,
        code: impl Into<String>,
        book_id: BookId,
        discount_percent: Decimal,
        is_valid: bool,
    ) -> ShopResult<Self> {
        let code = code.into();
        if discount_percent < Decimal::ZERO || discount_percent > Decimal::ONE_HUNDRED {
            return Err(ShopError::Configuration(format!(
                "promotion {code}: discount {discount_percent} is outside 0..=100"
            )));
        }
        Ok(Self {
            id,
            code,
            book_id,
            discount_percent,
            is_valid,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromotionQuery {
    pub code: Option<String>,
    pub valid_only: bool,
}

impl PromotionQuery {
    /// A code that is currently switched on
    pub fn redeemable(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            valid_only: true,
        }
    }
}

impl Record for Promotion {
    const KIND: &'static str = "promotions";
    type Query = PromotionQuery;

    fn key(&self) -> String {
        format!("{:010}", self.id)
    }

    fn matches(&self, query: &PromotionQuery) -> bool {
        query.code.as_deref().map_or(true, |c| c == self.code) && (!query.valid_only || self.is_valid)
    }
}

/// Record of a user redeeming a promotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionUsage {
    pub user_id: UserId,
    pub promotion_id: PromotionId,
    pub used_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PromotionUsageQuery {
    pub user_id: Option<UserId>,
    pub promotion_id: Option<PromotionId>,
}

impl Record for PromotionUsage {
    const KIND: &'static str = "promotion_usages";
    type Query = PromotionUsageQuery;

    fn key(&self) -> String {
        format!("{}:{:010}", self.user_id, self.promotion_id)
    }

    fn matches(&self, query: &PromotionUsageQuery) -> bool {
        query.user_id.map_or(true, |u| u == self.user_id)
            && query.promotion_id.map_or(true, |p| p == self.promotion_id)
    }
}

/// Outcome of a successful redemption
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedDiscount {
    pub promotion_id: PromotionId,
    pub code: String,
    pub book_id: BookId,
    /// Amount taken off the unit price
    pub discount: Price,
    pub unit_price: Price,
}

/// Validates promotion codes and discounts the matching cart line
#[derive(Debug, Clone, Copy, Default)]
pub struct PromotionEngine;

impl PromotionEngine {
    pub fn new() -> Self {
        Self
    }

    /// Redeem `code` for `user_id` against `cart`.
    ///
    /// Every write goes through `tx`; nothing is visible until the caller
    /// commits, and the usage check runs inside the same unit of work as the
    /// discount.
    pub async fn apply<T: UnitOfWork>(
        &self,
        tx: &mut T,
        cart: &[CartLine],
        code: &str,
        user_id: UserId,
    ) -> ShopResult<AppliedDiscount> {
        let promotion: Promotion = tx
            .find_one(&PromotionQuery::redeemable(code))
            .await?
            .ok_or(ShopError::InvalidOrExpiredCode)?;

        let prior: Option<PromotionUsage> = tx
            .find_one(&PromotionUsageQuery {
                user_id: Some(user_id),
                promotion_id: Some(promotion.id),
            })
            .await?;
        if prior.is_some() {
            debug!(code, %user_id, "promotion already redeemed");
            return Err(ShopError::AlreadyUsed);
        }

        let mut line = cart
            .iter()
            .find(|l| l.book_id == promotion.book_id)
            .cloned()
            .ok_or(ShopError::NotApplicable)?;

        let book: Book = tx
            .find_one(&BookQuery::by_id(promotion.book_id))
            .await?
            .ok_or(ShopError::BookNotFound {
                book_id: promotion.book_id,
            })?;

        // Discount is taken from the catalog price, not the current line price
        let discount = book.price.percent_of(promotion.discount_percent)?;
        line.unit_price = line.unit_price.saturating_sub(discount);
        tx.update(line.clone()).await?;

        tx.add(PromotionUsage {
            user_id,
            promotion_id: promotion.id,
            used_at: Utc::now(),
        })
        .await?;

        info!(
            code,
            %user_id,
            book_id = line.book_id,
            discount = %discount.display(),
            "promotion applied"
        );

        Ok(AppliedDiscount {
            promotion_id: promotion.id,
            code: promotion.code,
            book_id: line.book_id,
            discount,
            unit_price: line.unit_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::money::Currency;
    use crate::store::{insert_all, Store};
    use crate::testing::{book, line};
    use uuid::Uuid;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        insert_all(&store, [book(1, 10_000), book(2, 5_000)]).await.unwrap();
        insert_all(
            &store,
            [
                Promotion::new(1, "SAVE10", 1, Decimal::from(10), true).unwrap(),
                Promotion::new(2, "OLD", 1, Decimal::from(50), false).unwrap(),
            ],
        )
        .await
        .unwrap();
        store
    }

    #[test]
    fn test_discount_percent_bounds() {
        assert!(Promotion::new(1, "X", 1, Decimal::from(101), true).is_err());
        assert!(Promotion::new(1, "X", 1, Decimal::from(-1), true).is_err());
        assert!(Promotion::new(1, "X", 1, Decimal::from(100), true).is_ok());
    }

    #[tokio::test]
    async fn test_switched_off_code_is_rejected() {
        let store = seeded().await;
        let user = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        let cart = vec![line(user, 1, 1, 10_000)];
        tx.add(cart[0].clone()).await.unwrap();

        let err = PromotionEngine::new()
            .apply(&mut tx, &cart, "OLD", user)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidOrExpiredCode));

        let err = PromotionEngine::new()
            .apply(&mut tx, &cart, "NOPE", user)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn test_code_for_book_not_in_cart_is_not_applicable() {
        let store = seeded().await;
        let user = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        let cart = vec![line(user, 2, 1, 5_000)];
        tx.add(cart[0].clone()).await.unwrap();

        let err = PromotionEngine::new()
            .apply(&mut tx, &cart, "SAVE10", user)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotApplicable));
    }

    #[tokio::test]
    async fn test_discount_uses_catalog_price() {
        let store = seeded().await;
        let user = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        // Line already cheaper than the catalog price
        let cart = vec![line(user, 1, 2, 9_500)];
        tx.add(cart[0].clone()).await.unwrap();

        let applied = PromotionEngine::new()
            .apply(&mut tx, &cart, "SAVE10", user)
            .await
            .unwrap();
        assert_eq!(applied.discount, Price::from_minor(1_000, Currency::EGP));
        assert_eq!(applied.unit_price, Price::from_minor(8_500, Currency::EGP));
    }
}
