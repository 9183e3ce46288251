//! # Storefront
//!
//! Read-mostly views over the catalog: the home page rails, category
//! listings, favorites and order history.

use crate::book::{Book, BookId, BookQuery, Category, CategoryId, CategoryQuery};
use crate::error::{ShopError, ShopResult};
use crate::identity::UserId;
use crate::order::{Order, OrderQuery, OrderStatus};
use crate::store::{within, Record, Store, UnitOfWork};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Duration;
use tracing::{info, instrument};

/// Books per home page rail
const RAIL_SIZE: usize = 8;

/// Minimum advertised discount for the flash-sales rail
const FLASH_SALE_PERCENT: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: UserId,
    pub book_id: BookId,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct FavoriteQuery {
    pub user_id: Option<UserId>,
    pub book_id: Option<BookId>,
}

impl Record for Favorite {
    const KIND: &'static str = "favorites";
    type Query = FavoriteQuery;

    fn key(&self) -> String {
        format!("{}:{:010}", self.user_id, self.book_id)
    }

    fn matches(&self, query: &FavoriteQuery) -> bool {
        query.user_id.map_or(true, |u| u == self.user_id)
            && query.book_id.map_or(true, |b| b == self.book_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeRails {
    pub best_sellers: Vec<Book>,
    pub recommended: Vec<Book>,
    pub flash_sales: Vec<Book>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryCount {
    pub id: CategoryId,
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookListing {
    pub books: Vec<Book>,
    pub categories: Vec<CategoryCount>,
    /// Books across all categories
    pub total: usize,
}

fn top(books: &[Book], keep: impl Fn(&Book) -> bool, order: impl Fn(&Book, &Book) -> Ordering) -> Vec<Book> {
    let mut picked: Vec<Book> = books.iter().filter(|&b| keep(b)).cloned().collect();
    picked.sort_by(|a, b| order(a, b).then(a.id.cmp(&b.id)));
    picked.truncate(RAIL_SIZE);
    picked
}

#[derive(Debug, Clone)]
pub struct Storefront<S: Store> {
    store: S,
    timeout: Duration,
}

impl<S: Store> Storefront<S> {
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn begin(&self) -> ShopResult<S::Tx> {
        within(self.timeout, "storage", self.store.begin()).await
    }

    /// Best sellers, top rated and flash sales, optionally narrowed by title
    #[instrument(skip(self))]
    pub async fn home(&self, search: Option<&str>) -> ShopResult<HomeRails> {
        let tx = self.begin().await?;
        let mut books: Vec<Book> = tx.query(&BookQuery::all()).await?;

        if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
            let needle = needle.to_lowercase();
            books.retain(|b| b.title.to_lowercase().contains(&needle));
        }

        let flash = Decimal::from(FLASH_SALE_PERCENT);
        Ok(HomeRails {
            best_sellers: top(&books, |_| true, |a, b| b.sold.cmp(&a.sold)),
            recommended: top(&books, |_| true, |a, b| b.rating.total_cmp(&a.rating)),
            flash_sales: top(&books, |b| b.discount >= flash, |a, b| b.discount.cmp(&a.discount)),
        })
    }

    /// Books in one category (or all), with per-category counts
    #[instrument(skip(self))]
    pub async fn books(&self, category_id: Option<CategoryId>) -> ShopResult<BookListing> {
        let tx = self.begin().await?;
        let all: Vec<Book> = tx.query(&BookQuery::all()).await?;
        let categories: Vec<Category> = tx.query(&CategoryQuery::default()).await?;

        let counts = categories
            .into_iter()
            .map(|c| CategoryCount {
                count: all.iter().filter(|b| b.category_id == c.id).count(),
                id: c.id,
                name: c.name,
            })
            .collect();

        let total = all.len();
        let books = match category_id {
            Some(id) => all.into_iter().filter(|b| b.category_id == id).collect(),
            None => all,
        };

        Ok(BookListing {
            books,
            categories: counts,
            total,
        })
    }

    /// The user's favorite books, oldest first
    pub async fn favorites(&self, user_id: UserId) -> ShopResult<Vec<Book>> {
        let tx = self.begin().await?;
        let mut favorites: Vec<Favorite> = tx
            .query(&FavoriteQuery {
                user_id: Some(user_id),
                book_id: None,
            })
            .await?;
        favorites.sort_by_key(|f| f.added_at);

        let mut books = Vec::with_capacity(favorites.len());
        for favorite in favorites {
            let book: Option<Book> = tx.find_one(&BookQuery::by_id(favorite.book_id)).await?;
            books.extend(book);
        }
        Ok(books)
    }

    #[instrument(skip(self))]
    pub async fn add_favorite(&self, user_id: UserId, book_id: BookId) -> ShopResult<Favorite> {
        let mut tx = self.begin().await?;

        let book: Option<Book> = tx.find_one(&BookQuery::by_id(book_id)).await?;
        if book.is_none() {
            return Err(ShopError::BookNotFound { book_id });
        }
        let existing: Option<Favorite> = tx
            .find_one(&FavoriteQuery {
                user_id: Some(user_id),
                book_id: Some(book_id),
            })
            .await?;
        if existing.is_some() {
            return Err(ShopError::AlreadyFavorite { book_id });
        }

        let favorite = Favorite {
            user_id,
            book_id,
            added_at: Utc::now(),
        };
        tx.add(favorite.clone()).await?;
        tx.commit().await?;
        info!("favorite added");
        Ok(favorite)
    }

    #[instrument(skip(self))]
    pub async fn remove_favorite(&self, user_id: UserId, book_id: BookId) -> ShopResult<()> {
        let mut tx = self.begin().await?;
        let favorite: Favorite = tx
            .find_one(&FavoriteQuery {
                user_id: Some(user_id),
                book_id: Some(book_id),
            })
            .await?
            .ok_or(ShopError::FavoriteNotFound { book_id })?;
        tx.delete(&favorite).await?;
        tx.commit().await
    }

    /// The user's orders, newest first
    pub async fn orders(&self, user_id: UserId, status: Option<OrderStatus>) -> ShopResult<Vec<Order>> {
        let tx = self.begin().await?;
        let mut orders: Vec<Order> = tx
            .query(&OrderQuery {
                user_id: Some(user_id),
                status,
                ..OrderQuery::default()
            })
            .await?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::money::{Currency, Price};
    use crate::store::insert_all;
    use crate::testing::book;
    use uuid::Uuid;

    fn shelf() -> Vec<Book> {
        (1..=10)
            .map(|id| Book {
                title: if id % 2 == 0 { format!("Rust Vol {id}") } else { format!("Poems {id}") },
                sold: id * 10,
                rating: f64::from(11 - id),
                discount: Decimal::from(id * 5),
                category_id: if id <= 6 { 1 } else { 2 },
                ..book(id, 1_000)
            })
            .collect()
    }

    async fn storefront() -> (Storefront<MemoryStore>, MemoryStore) {
        let store = MemoryStore::new();
        insert_all(&store, shelf()).await.unwrap();
        insert_all(
            &store,
            [
                Category {
                    id: 1,
                    name: "Programming".into(),
                    description: None,
                },
                Category {
                    id: 2,
                    name: "Poetry".into(),
                    description: None,
                },
            ],
        )
        .await
        .unwrap();
        (Storefront::new(store.clone(), Duration::from_secs(5)), store)
    }

    #[tokio::test]
    async fn test_home_rails() {
        let (front, _) = storefront().await;
        let home = front.home(None).await.unwrap();

        let ids = |books: &[Book]| books.iter().map(|b| b.id).collect::<Vec<_>>();
        assert_eq!(ids(&home.best_sellers), vec![10, 9, 8, 7, 6, 5, 4, 3]);
        assert_eq!(ids(&home.recommended), vec![1, 2, 3, 4, 5, 6, 7, 8]);
        // discount = id * 5, so ids 6..=10 qualify
        assert_eq!(ids(&home.flash_sales), vec![10, 9, 8, 7, 6]);
    }

    #[tokio::test]
    async fn test_home_search_is_case_insensitive() {
        let (front, _) = storefront().await;
        let home = front.home(Some("rust")).await.unwrap();
        assert_eq!(home.best_sellers.len(), 5);
        assert!(home.best_sellers.iter().all(|b| b.title.starts_with("Rust")));
    }

    #[tokio::test]
    async fn test_books_by_category_with_counts() {
        let (front, _) = storefront().await;
        let listing = front.books(Some(2)).await.unwrap();

        assert_eq!(listing.books.len(), 4);
        assert_eq!(listing.total, 10);
        assert_eq!(
            listing.categories,
            vec![
                CategoryCount {
                    id: 1,
                    name: "Programming".into(),
                    count: 6
                },
                CategoryCount {
                    id: 2,
                    name: "Poetry".into(),
                    count: 4
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_favorites_lifecycle() {
        let (front, _) = storefront().await;
        let user = Uuid::new_v4();

        front.add_favorite(user, 3).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        front.add_favorite(user, 1).await.unwrap();
        assert!(matches!(
            front.add_favorite(user, 3).await,
            Err(ShopError::AlreadyFavorite { book_id: 3 })
        ));
        assert!(matches!(
            front.add_favorite(user, 99).await,
            Err(ShopError::BookNotFound { book_id: 99 })
        ));

        let favorites = front.favorites(user).await.unwrap();
        assert_eq!(favorites.iter().map(|b| b.id).collect::<Vec<_>>(), vec![3, 1]);

        front.remove_favorite(user, 3).await.unwrap();
        assert!(matches!(
            front.remove_favorite(user, 3).await,
            Err(ShopError::FavoriteNotFound { book_id: 3 })
        ));
        assert_eq!(front.favorites(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_orders_filtered_by_status() {
        let (front, store) = storefront().await;
        let user = Uuid::new_v4();
        let order = |status, session: &str| Order {
            id: Uuid::new_v4(),
            user_id: user,
            status,
            session_id: session.to_string(),
            payment_intent_id: None,
            items: Vec::new(),
            total: Price::zero(Currency::EGP),
            created_at: Utc::now(),
            refunded_at: None,
        };
        insert_all(
            &store,
            [
                order(OrderStatus::Paid, "cs_1"),
                order(OrderStatus::Refunded, "cs_2"),
                order(OrderStatus::Paid, "cs_3"),
            ],
        )
        .await
        .unwrap();

        assert_eq!(front.orders(user, None).await.unwrap().len(), 3);
        assert_eq!(front.orders(user, Some(OrderStatus::Paid)).await.unwrap().len(), 2);
        let refunded = front.orders(user, Some(OrderStatus::Refunded)).await.unwrap();
        assert_eq!(refunded[0].session_id, "cs_2");
        assert!(front.orders(Uuid::new_v4(), None).await.unwrap().is_empty());
    }
}
