//! Type-safe price representation using decimal arithmetic.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price must not be negative (got {0})")]
    Negative(Decimal),
    /// The amount does not fit the store's `NUMERIC(12, 2)` column.
    #[error("price must not exceed {max} (got {0})", max = Price::max_amount())]
    TooLarge(Decimal),
}

/// A non-negative product price in the store's currency unit (e.g. dollars).
///
/// Serializes as the decimal's string form (`"49.99"`) so no precision is lost
/// when a product is cached as JSON.
///
/// ```
/// use flash_sale_core::Price;
/// use rust_decimal::Decimal;
///
/// assert!(Price::new(Decimal::new(4999, 2)).is_ok());
/// assert!(Price::new(Decimal::new(-1, 0)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// A price of zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Ten integer digits and two fractional ones.
    const MAX_CENTS: i64 = 999_999_999_999;

    /// The largest amount the store can hold.
    #[must_use]
    pub fn max_amount() -> Decimal {
        Decimal::new(Self::MAX_CENTS, 2)
    }

    /// Create a price, rejecting negative amounts and amounts the store cannot
    /// hold once rounded to cents.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` if `amount` is below zero, or
    /// `PriceError::TooLarge` if it rounds above [`Price::max_amount`].
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount < Decimal::ZERO {
            return Err(PriceError::Negative(amount));
        }
        if amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero) > Self::max_amount() {
            return Err(PriceError::TooLarge(amount));
        }
        Ok(Self(amount))
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
