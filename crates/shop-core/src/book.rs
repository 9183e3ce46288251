//! # Catalog Types
//!
//! Books and categories, plus the TOML seed the server loads at startup
//! (`config/catalog.toml`).

use crate::error::{ShopError, ShopResult};
use crate::money::{Currency, Price};
use crate::promotion::Promotion;
use crate::store::{insert_all, Record, Store};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type BookId = u32;
pub type CategoryId = u32;

/// A book in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub description: String,
    pub author: String,
    /// Catalog price
    pub price: Price,
    /// Advertised markdown percent, only used to pick flash sales
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub image: String,
    /// Copies sold so far
    #[serde(default)]
    pub sold: u32,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub quantity: u32,
    pub category_id: CategoryId,
}

#[derive(Debug, Clone, Default)]
pub struct BookQuery {
    pub id: Option<BookId>,
    pub category_id: Option<CategoryId>,
}

impl BookQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: BookId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn in_category(category_id: CategoryId) -> Self {
        Self {
            category_id: Some(category_id),
            ..Self::default()
        }
    }
}

impl Record for Book {
    const KIND: &'static str = "books";
    type Query = BookQuery;

    fn key(&self) -> String {
        format!("{:010}", self.id)
    }

    fn matches(&self, query: &BookQuery) -> bool {
        query.id.map_or(true, |id| id == self.id)
            && query.category_id.map_or(true, |c| c == self.category_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryQuery {
    pub id: Option<CategoryId>,
}

impl Record for Category {
    const KIND: &'static str = "categories";
    type Query = CategoryQuery;

    fn key(&self) -> String {
        format!("{:010}", self.id)
    }

    fn matches(&self, query: &CategoryQuery) -> bool {
        query.id.map_or(true, |id| id == self.id)
    }
}

/// Book entry as written in the seed file: prices in major units
#[derive(Debug, Clone, Deserialize)]
pub struct BookSeed {
    pub id: BookId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    pub price: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub sold: u32,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub quantity: u32,
    pub category_id: CategoryId,
}

fn default_true() -> bool {
    true
}

impl BookSeed {
    fn into_book(self, currency: Currency) -> ShopResult<Book> {
        Ok(Book {
            id: self.id,
            title: self.title,
            description: self.description,
            author: self.author,
            price: Price::from_decimal(self.price, currency)?,
            discount: self.discount,
            rating: self.rating,
            image: self.image,
            sold: self.sold,
            in_stock: self.in_stock,
            quantity: self.quantity,
            category_id: self.category_id,
        })
    }
}

/// Promotion entry as written in the seed file
#[derive(Debug, Clone, Deserialize)]
pub struct PromotionSeed {
    pub id: u32,
    pub code: String,
    pub book_id: BookId,
    pub discount_percent: Decimal,
    #[serde(default = "default_true")]
    pub is_valid: bool,
}

/// Catalog seed loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub books: Vec<BookSeed>,
    #[serde(default)]
    pub promotions: Vec<PromotionSeed>,
}

/// Counts of what a seed wrote into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories: usize,
    pub books: usize,
    pub promotions: usize,
}

impl CatalogSeed {
    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Validate the seed and write it into the store in one unit of work
    pub async fn install<S: Store>(self, store: &S, currency: Currency) -> ShopResult<SeedSummary> {
        let books = self
            .books
            .into_iter()
            .map(|b| b.into_book(currency))
            .collect::<ShopResult<Vec<_>>>()?;

        for book in &books {
            if !self.categories.iter().any(|c| c.id == book.category_id) {
                return Err(ShopError::Configuration(format!(
                    "book {} references unknown category {}",
                    book.id, book.category_id
                )));
            }
        }

        let promotions = self
            .promotions
            .into_iter()
            .map(|p| {
                if !books.iter().any(|b| b.id == p.book_id) {
                    return Err(ShopError::Configuration(format!(
                        "promotion {} targets unknown book {}",
                        p.code, p.book_id
                    )));
                }
                Promotion::new(p.id, p.code, p.book_id, p.discount_percent, p.is_valid)
            })
            .collect::<ShopResult<Vec<_>>>()?;

        let summary = SeedSummary {
            categories: self.categories.len(),
            books: books.len(),
            promotions: promotions.len(),
        };

        insert_all(store, self.categories).await?;
        insert_all(store, books).await?;
        insert_all(store, promotions).await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::UnitOfWork;

    const SEED: &str = r#"
        [[categories]]
        id = 1
        name = "Fiction"

        [[books]]
        id = 10
        title = "Dune"
        author = "Frank Herbert"
        price = "100.00"
        category_id = 1

        [[promotions]]
        id = 1
        code = "SAVE10"
        book_id = 10
        discount_percent = "10"
    "#;

    #[tokio::test]
    async fn test_seed_installs_catalog() {
        let seed = CatalogSeed::from_toml(SEED).unwrap();
        let store = MemoryStore::new();
        let summary = seed.install(&store, Currency::EGP).await.unwrap();
        assert_eq!(
            summary,
            SeedSummary {
                categories: 1,
                books: 1,
                promotions: 1
            }
        );

        let tx = store.begin().await.unwrap();
        let book: Book = tx.find_one(&BookQuery::by_id(10)).await.unwrap().unwrap();
        assert_eq!(book.price, Price::from_minor(10_000, Currency::EGP));
        assert!(book.in_stock);
    }

    #[tokio::test]
    async fn test_seed_rejects_dangling_promotion() {
        let seed = CatalogSeed::from_toml(
            r#"
            [[promotions]]
            id = 1
            code = "GHOST"
            book_id = 99
            discount_percent = "5"
        "#,
        )
        .unwrap();
        let err = seed.install(&MemoryStore::new(), Currency::EGP).await.unwrap_err();
        assert!(matches!(err, ShopError::Configuration(_)));
    }
}
