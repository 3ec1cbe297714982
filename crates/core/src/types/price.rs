//! Monetary amounts using decimal arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::status::UnknownVariant;

/// A monetary amount with its currency.
///
/// Product prices, order totals and payment amounts are all `Price` values.
/// Arithmetic only combines amounts of the same currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., euros, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price from an amount in minor units (cents).
    #[must_use]
    pub fn from_cents(cents: i64, currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::new(cents, 2), currency_code)
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Multiply by a quantity, as for an order line.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub fn times(self, quantity: i32) -> Option<Self> {
        self.amount
            .checked_mul(Decimal::from(quantity))
            .map(|amount| Self::new(amount, self.currency_code))
    }

    /// Add another price of the same currency.
    ///
    /// Returns `None` if the currencies differ or the sum overflows.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        if self.currency_code != other.currency_code {
            return None;
        }
        self.amount
            .checked_add(other.amount)
            .map(|amount| Self::new(amount, self.currency_code))
    }
}

/// ISO 4217 currency codes accepted by the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    EUR,
    USD,
    GBP,
}

impl CurrencyCode {
    /// The three-letter code as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EUR => "EUR",
            Self::USD => "USD",
            Self::GBP => "GBP",
        }
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EUR" => Ok(Self::EUR),
            "USD" => Ok(Self::USD),
            "GBP" => Ok(Self::GBP),
            _ => Err(UnknownVariant::new("currency code", s)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_times_quantity() {
        let unit = Price::from_cents(1999, CurrencyCode::EUR);
        let line = unit.times(3).unwrap();
        assert_eq!(line.amount, Decimal::new(5997, 2));
    }

    #[test]
    fn test_checked_add_same_currency() {
        let a = Price::from_cents(100, CurrencyCode::USD);
        let b = Price::from_cents(250, CurrencyCode::USD);
        assert_eq!(a.checked_add(b).unwrap().amount, Decimal::new(350, 2));
    }

    #[test]
    fn test_checked_add_mixed_currency() {
        let a = Price::from_cents(100, CurrencyCode::USD);
        let b = Price::from_cents(100, CurrencyCode::GBP);
        assert!(a.checked_add(b).is_none());
    }

    #[test]
    fn test_currency_code_text() {
        assert_eq!("GBP".parse::<CurrencyCode>().unwrap(), CurrencyCode::GBP);
        assert_eq!(CurrencyCode::USD.as_str(), "USD");
        assert!("usd".parse::<CurrencyCode>().is_err());
    }
}
