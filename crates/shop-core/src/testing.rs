//! Shared fixtures for unit tests.

use crate::book::{Book, BookId};
use crate::cart::CartLine;
use crate::identity::UserId;
use crate::money::{Currency, Price};
use rust_decimal::Decimal;

pub fn book(id: BookId, price_minor: i64) -> Book {
    Book {
        id,
        title: format!("Book {id}"),
        description: format!("Description of book {id}"),
        author: "Anonymous".to_string(),
        price: Price::from_minor(price_minor, Currency::EGP),
        discount: Decimal::ZERO,
        rating: 0.0,
        image: String::new(),
        sold: 0,
        in_stock: true,
        quantity: 10,
        category_id: 1,
    }
}

pub fn line(user_id: UserId, book_id: BookId, quantity: u32, unit_minor: i64) -> CartLine {
    CartLine {
        user_id,
        book_id,
        quantity,
        unit_price: Price::from_minor(unit_minor, Currency::EGP),
    }
}
