//! # Cart Ledger
//!
//! A user's cart is a set of [`CartLine`]s keyed by (user, book). The ledger
//! owns every mutation of those lines and is the only caller of the
//! [`PromotionEngine`]. Each operation is one unit of work.

use crate::book::{Book, BookId, BookQuery};
use crate::error::{ShopError, ShopResult};
use crate::identity::UserId;
use crate::money::{Currency, Price};
use crate::promotion::{AppliedDiscount, PromotionEngine};
use crate::store::{within, Record, Store, UnitOfWork};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// One (user, book) pairing in a cart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub user_id: UserId,
    pub book_id: BookId,
    /// Always at least 1 while the line exists
    pub quantity: u32,
    /// Per-unit price: catalog price at add time, less any promotion
    pub unit_price: Price,
}

impl CartLine {
    pub fn line_total(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CartQuery {
    pub user_id: Option<UserId>,
    pub book_id: Option<BookId>,
}

impl CartQuery {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            book_id: None,
        }
    }

    pub fn line(user_id: UserId, book_id: BookId) -> Self {
        Self {
            user_id: Some(user_id),
            book_id: Some(book_id),
        }
    }
}

impl Record for CartLine {
    const KIND: &'static str = "cart_lines";
    type Query = CartQuery;

    fn key(&self) -> String {
        format!("{}:{:010}", self.user_id, self.book_id)
    }

    fn matches(&self, query: &CartQuery) -> bool {
        query.user_id.map_or(true, |u| u == self.user_id)
            && query.book_id.map_or(true, |b| b == self.book_id)
    }
}

/// A cart line with its book attached
#[derive(Debug, Clone, Serialize)]
pub struct CartEntry {
    #[serde(flatten)]
    pub line: CartLine,
    pub book: Book,
    pub line_total: Price,
}

/// A user's whole cart
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub items: Vec<CartEntry>,
    pub total: Price,
}

impl CartView {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Whether an add created a line or grew an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartChange {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecrementOutcome {
    Updated(CartLine),
    Removed,
}

/// Load a user's lines ordered by book id
pub(crate) async fn load_lines<T: UnitOfWork>(tx: &T, user_id: UserId) -> ShopResult<Vec<CartLine>> {
    let mut lines: Vec<CartLine> = tx.query(&CartQuery::for_user(user_id)).await?;
    lines.sort_by_key(|l| l.book_id);
    Ok(lines)
}

/// Attach book details to each line
pub(crate) async fn with_books<T: UnitOfWork>(
    tx: &T,
    lines: Vec<CartLine>,
    currency: Currency,
) -> ShopResult<CartView> {
    let mut items = Vec::with_capacity(lines.len());
    let mut total = Price::zero(currency);
    for line in lines {
        let book: Book = tx
            .find_one(&BookQuery::by_id(line.book_id))
            .await?
            .ok_or(ShopError::BookNotFound {
                book_id: line.book_id,
            })?;
        let line_total = line.line_total();
        total.amount += line_total.amount;
        items.push(CartEntry {
            line,
            book,
            line_total,
        });
    }
    Ok(CartView { items, total })
}

/// Owns cart line mutations
#[derive(Debug, Clone)]
pub struct CartLedger<S: Store> {
    store: S,
    engine: PromotionEngine,
    currency: Currency,
    timeout: Duration,
}

impl<S: Store> CartLedger<S> {
    pub fn new(store: S, currency: Currency, timeout: Duration) -> Self {
        Self {
            store,
            engine: PromotionEngine::new(),
            currency,
            timeout,
        }
    }

    async fn begin(&self) -> ShopResult<S::Tx> {
        within(self.timeout, "storage", self.store.begin()).await
    }

    async fn existing_line(tx: &S::Tx, user_id: UserId, book_id: BookId) -> ShopResult<CartLine> {
        tx.find_one(&CartQuery::line(user_id, book_id))
            .await?
            .ok_or(ShopError::LineNotFound { book_id })
    }

    /// The user's cart, ordered by book id, with book details attached
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> ShopResult<CartView> {
        let tx = self.begin().await?;
        let lines = load_lines(&tx, user_id).await?;
        with_books(&tx, lines, self.currency).await
    }

    /// Add `count` copies of a book, growing the line if it already exists
    #[instrument(skip(self))]
    pub async fn add_or_increment(
        &self,
        user_id: UserId,
        book_id: BookId,
        count: i64,
    ) -> ShopResult<(CartLine, CartChange)> {
        let count = u32::try_from(count)
            .ok()
            .filter(|c| *c >= 1)
            .ok_or(ShopError::InvalidQuantity { count })?;

        let mut tx = self.begin().await?;
        let existing: Option<CartLine> = tx.find_one(&CartQuery::line(user_id, book_id)).await?;

        let (line, change) = match existing {
            Some(mut line) => {
                line.quantity = line
                    .quantity
                    .checked_add(count)
                    .ok_or(ShopError::InvalidQuantity {
                        count: i64::from(count),
                    })?;
                tx.update(line.clone()).await?;
                (line, CartChange::Updated)
            }
            None => {
                let book: Book = tx
                    .find_one(&BookQuery::by_id(book_id))
                    .await?
                    .ok_or(ShopError::BookNotFound { book_id })?;
                let line = CartLine {
                    user_id,
                    book_id,
                    quantity: count,
                    unit_price: book.price,
                };
                tx.add(line.clone()).await?;
                (line, CartChange::Created)
            }
        };

        tx.commit().await?;
        debug!(quantity = line.quantity, ?change, "cart line saved");
        Ok((line, change))
    }

    /// Add one copy of a book already in the cart
    #[instrument(skip(self))]
    pub async fn increment(&self, user_id: UserId, book_id: BookId) -> ShopResult<CartLine> {
        let mut tx = self.begin().await?;
        let mut line = Self::existing_line(&tx, user_id, book_id).await?;
        line.quantity = line.quantity.saturating_add(1);
        tx.update(line.clone()).await?;
        tx.commit().await?;
        Ok(line)
    }

    /// Take one copy away; the last copy removes the line
    #[instrument(skip(self))]
    pub async fn decrement(&self, user_id: UserId, book_id: BookId) -> ShopResult<DecrementOutcome> {
        let mut tx = self.begin().await?;
        let mut line = Self::existing_line(&tx, user_id, book_id).await?;

        let outcome = if line.quantity <= 1 {
            tx.delete(&line).await?;
            DecrementOutcome::Removed
        } else {
            line.quantity -= 1;
            tx.update(line.clone()).await?;
            DecrementOutcome::Updated(line)
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Drop a book from the cart regardless of quantity
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: UserId, book_id: BookId) -> ShopResult<()> {
        let mut tx = self.begin().await?;
        let line = Self::existing_line(&tx, user_id, book_id).await?;
        tx.delete(&line).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Redeem a promotion code against the user's cart
    #[instrument(skip(self))]
    pub async fn apply_promotion(&self, user_id: UserId, code: &str) -> ShopResult<AppliedDiscount> {
        let mut tx = self.begin().await?;
        let lines = load_lines(&tx, user_id).await?;
        let applied = self.engine.apply(&mut tx, &lines, code, user_id).await?;
        tx.commit().await?;
        info!(book_id = applied.book_id, "cart discounted");
        Ok(applied)
    }
}
