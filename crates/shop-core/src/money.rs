//! # Money Types
//!
//! Currencies and prices. Amounts are always held in the smallest currency
//! unit so that cart arithmetic stays exact.

use crate::error::ShopError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    EGP,
    USD,
    EUR,
    GBP,
    JPY,
    CAD,
    AUD,
    CHF,
    MXN,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::EGP => "egp",
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::JPY => "jpy",
            Currency::CAD => "cad",
            Currency::AUD => "aud",
            Currency::CHF => "chf",
            Currency::MXN => "mxn",
        }
    }

    /// Returns the number of decimal places for this currency
    /// (JPY has 0 decimals, the others have 2)
    pub fn decimal_places(&self) -> u32 {
        match self {
            Currency::JPY => 0,
            _ => 2,
        }
    }

    /// Convert a decimal amount to the smallest currency unit
    pub fn to_smallest_unit(&self, amount: Decimal) -> Option<i64> {
        let scaled = amount * Decimal::from(10_i64.pow(self.decimal_places()));
        scaled
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    /// Convert from smallest unit back to decimal
    pub fn from_smallest_unit(&self, amount: i64) -> Decimal {
        Decimal::new(amount, self.decimal_places())
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::EGP
    }
}

impl FromStr for Currency {
    type Err = ShopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "egp" => Ok(Currency::EGP),
            "usd" => Ok(Currency::USD),
            "eur" => Ok(Currency::EUR),
            "gbp" => Ok(Currency::GBP),
            "jpy" => Ok(Currency::JPY),
            "cad" => Ok(Currency::CAD),
            "aud" => Ok(Currency::AUD),
            "chf" => Ok(Currency::CHF),
            "mxn" => Ok(Currency::MXN),
            other => Err(ShopError::Configuration(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// Price with amount in smallest currency unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in smallest currency unit (piastres for EGP, cents for USD)
    pub amount: i64,
    pub currency: Currency,
}

impl Price {
    /// Create a price from a decimal amount in major units
    pub fn from_decimal(amount: Decimal, currency: Currency) -> Result<Self, ShopError> {
        let amount = currency.to_smallest_unit(amount).ok_or_else(|| {
            ShopError::InvalidRequest(format!("price {amount} is out of range"))
        })?;
        Ok(Self { amount, currency })
    }

    /// Create a price from smallest unit
    pub fn from_minor(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::from_minor(0, currency)
    }

    /// Get the decimal amount
    pub fn as_decimal(&self) -> Decimal {
        self.currency.from_smallest_unit(self.amount)
    }

    /// Multiply by a quantity
    pub fn times(&self, quantity: u32) -> Self {
        Self::from_minor(self.amount * i64::from(quantity), self.currency)
    }

    /// Portion of this price for a percentage, rounded half away from zero
    /// to the smallest unit
    pub fn percent_of(&self, percent: Decimal) -> Result<Self, ShopError> {
        let applied = Decimal::from(self.amount)
            .checked_mul(percent)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| ShopError::Internal("percentage overflow".to_string()))?;
        let minor = applied
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or_else(|| ShopError::Internal("percentage overflow".to_string()))?;
        Ok(Self::from_minor(minor, self.currency))
    }

    /// Subtract, flooring at zero
    pub fn saturating_sub(&self, other: Price) -> Self {
        Self::from_minor((self.amount - other.amount).max(0), self.currency)
    }

    /// Format for display (e.g., "E£100.00")
    pub fn display(&self) -> String {
        let symbol = match self.currency {
            Currency::EGP => "E£",
            Currency::USD => "$",
            Currency::EUR => "€",
            Currency::GBP => "£",
            Currency::JPY => "¥",
            Currency::CAD => "C$",
            Currency::AUD => "A$",
            Currency::CHF => "CHF ",
            Currency::MXN => "MX$",
        };
        format!("{}{}", symbol, self.as_decimal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_conversion() {
        let egp = Currency::EGP;
        assert_eq!(egp.to_smallest_unit(Decimal::new(1099, 2)), Some(1099));
        assert_eq!(egp.from_smallest_unit(1099), Decimal::new(1099, 2));

        let jpy = Currency::JPY;
        assert_eq!(jpy.to_smallest_unit(Decimal::from(1000)), Some(1000));
    }

    #[test]
    fn test_percent_of_rounds_half_away_from_zero() {
        let price = Price::from_minor(10_000, Currency::EGP);
        assert_eq!(price.percent_of(Decimal::from(10)).unwrap().amount, 1_000);

        let odd = Price::from_minor(1_005, Currency::EGP);
        // 12.5% of 1005 = 125.625
        assert_eq!(odd.percent_of(Decimal::new(125, 1)).unwrap().amount, 126);
    }

    #[test]
    fn test_saturating_sub_floors_at_zero() {
        let price = Price::from_minor(500, Currency::EGP);
        let big = Price::from_minor(800, Currency::EGP);
        assert_eq!(price.saturating_sub(big).amount, 0);
    }

    #[test]
    fn test_price_display() {
        let price = Price::from_decimal(Decimal::new(2999, 2), Currency::USD).unwrap();
        assert_eq!(price.display(), "$29.99");
    }

    #[test]
    fn test_currency_from_str() {
        assert_eq!("EGP".parse::<Currency>().unwrap(), Currency::EGP);
        assert!("xyz".parse::<Currency>().is_err());
    }
}
