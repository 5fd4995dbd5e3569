//! Money and currency types

use crate::{PaymentError, PaymentResult};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Currencies the supported gateways settle in (ISO 4217).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    INR,
    USD,
    EUR,
    GBP,
    SGD,
    AED,
    JPY,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Self::INR => "INR",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::SGD => "SGD",
            Self::AED => "AED",
            Self::JPY => "JPY",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::INR => "₹",
            Self::USD | Self::SGD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
            Self::AED => "AED ",
            Self::JPY => "¥",
        }
    }

    /// Digits after the decimal point in the minor unit.
    pub fn decimals(&self) -> u32 {
        match self {
            Self::JPY => 0,
            _ => 2,
        }
    }

    /// Case-insensitive lookup by ISO code
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "INR" => Some(Self::INR),
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "SGD" => Some(Self::SGD),
            "AED" => Some(Self::AED),
            "JPY" => Some(Self::JPY),
            _ => None,
        }
    }

    /// Like [`from_code`](Self::from_code) but for provider payloads.
    pub(crate) fn parse(code: &str) -> PaymentResult<Self> {
        Self::from_code(code)
            .ok_or_else(|| PaymentError::Serialization(format!("unsupported currency: {}", code)))
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::INR
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An amount in the currency's minor unit (paise, cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Indian rupees from paise
    pub fn inr(paise: i64) -> Self {
        Self::new(paise, Currency::INR)
    }

    /// US dollars from cents
    pub fn usd(cents: i64) -> Self {
        Self::new(cents, Currency::USD)
    }

    /// From a major-unit decimal such as `499.99`. `None` when the amount
    /// does not fit the minor unit range.
    pub fn from_decimal(amount: Decimal, currency: Currency) -> Option<Self> {
        let minor = (amount * Decimal::from(10i64.pow(currency.decimals())))
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        minor.to_i64().map(|amount| Self { amount, currency })
    }

    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.amount, self.currency.decimals())
    }

    pub fn format(&self) -> String {
        format!(
            "{}{:.prec$}",
            self.currency.symbol(),
            self.to_decimal(),
            prec = self.currency.decimals() as usize
        )
    }

    pub fn is_positive(&self) -> bool {
        self.amount > 0
    }

    /// Sum of two amounts in the same currency.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        self.amount
            .checked_add(other.amount)
            .map(|amount| Money::new(amount, self.currency))
    }

    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        self.amount
            .checked_sub(other.amount)
            .map(|amount| Money::new(amount, self.currency))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_money_format() {
        assert_eq!(Money::inr(49999).format(), "₹499.99");
        assert_eq!(Money::usd(5).format(), "$0.05");
        assert_eq!(Money::new(1000, Currency::JPY).format(), "¥1000");
    }

    #[test]
    fn test_from_decimal() {
        let amount = Decimal::from_str("499.995").unwrap();
        assert_eq!(Money::from_decimal(amount, Currency::INR), Some(Money::inr(50000)));

        let huge = Decimal::from_str("999999999999999999999").unwrap();
        assert_eq!(Money::from_decimal(huge, Currency::INR), None);
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Money::inr(1000);
        assert_eq!(a.checked_add(Money::inr(500)), Some(Money::inr(1500)));
        assert_eq!(a.checked_sub(Money::inr(1500)), Some(Money::inr(-500)));
        assert_eq!(a.checked_add(Money::usd(500)), None);
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::from_code("inr"), Some(Currency::INR));
        assert_eq!(Currency::from_code("XYZ"), None);
        assert_eq!(Currency::INR.to_string(), "INR");
        assert_eq!(serde_json::to_string(&Currency::INR).unwrap(), "\"inr\"");
    }
}
