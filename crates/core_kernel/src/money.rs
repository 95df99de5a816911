//! Money types with precise decimal arithmetic
//!
//! Claim totals, service amounts and payer remittances are all carried as
//! `Money`. Amounts are held at four decimal places internally and rounded to
//! the currency's minor unit when compared for settlement.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;
use thiserror::Error;

/// Currency codes following ISO 4217
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    USD,
    CAD,
    EUR,
    GBP,
}

impl Currency {
    /// Returns the number of decimal places for this currency
    pub fn decimal_places(&self) -> u32 {
        2
    }

    /// Returns the currency symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::USD => "$",
            Currency::CAD => "C$",
            Currency::EUR => "€",
            Currency::GBP => "£",
        }
    }

    /// Returns the ISO 4217 code
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::CAD => "CAD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
        }
    }

    /// Parses an ISO 4217 code
    pub fn from_code(code: &str) -> Result<Self, MoneyError> {
        match code.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "CAD" => Ok(Currency::CAD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            other => Err(MoneyError::UnknownCurrency(other.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors that can occur during money operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: cannot operate on {0} and {1}")]
    CurrencyMismatch(String, String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Amount overflow: {0}")]
    Overflow(String),
}

/// A monetary amount with associated currency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(4),
            currency,
        }
    }

    /// Creates a USD amount, the default billing currency
    pub fn usd(amount: Decimal) -> Self {
        Self::new(amount, Currency::USD)
    }

    /// Creates Money from an integer amount in minor units (e.g., cents)
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        Self::new(Decimal::new(minor_units, currency.decimal_places()), currency)
    }

    /// Creates a zero amount in the specified currency
    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: dec!(0),
            currency,
        }
    }

    /// Returns the amount
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Returns the currency
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Returns true if the amount is zero
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Returns true if the amount is strictly positive
    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    /// Returns true if the amount is negative
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// Rounds to the currency's standard decimal places
    pub fn round_to_currency(&self) -> Self {
        Self {
            amount: self.amount.round_dp(self.currency.decimal_places()),
            currency: self.currency,
        }
    }

    /// Checked addition that returns an error on currency mismatch
    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| MoneyError::Overflow(format!("{} + {}", self, other)))?;
        Ok(Self::new(amount, self.currency))
    }

    /// Checked subtraction that returns an error on currency mismatch
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| MoneyError::Overflow(format!("{} - {}", self, other)))?;
        Ok(Self::new(amount, self.currency))
    }

    /// Multiplies by a scalar (units × rate)
    pub fn checked_mul(&self, factor: Decimal) -> Result<Money, MoneyError> {
        let amount = self
            .amount
            .checked_mul(factor)
            .ok_or_else(|| MoneyError::Overflow(format!("{} * {}", self, factor)))?;
        Ok(Self::new(amount, self.currency))
    }

    /// Returns `percent`% of this amount, saturating at the decimal range
    pub fn percent(&self, percent: Decimal) -> Self {
        Self::new((self.amount / dec!(100)).saturating_mul(percent), self.currency)
    }

    /// Sums an iterator of amounts, all of which must share `currency`
    pub fn sum<'a, I>(currency: Currency, items: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = &'a Money>,
    {
        items
            .into_iter()
            .try_fold(Money::zero(currency), |acc, m| acc.checked_add(m))
    }

    /// Compares two amounts after rounding both to the currency's minor unit
    pub fn settles(&self, other: &Money) -> bool {
        self.currency == other.currency
            && self.round_to_currency().amount == other.round_to_currency().amount
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.currency != other.currency {
            return None;
        }
        self.amount.partial_cmp(&other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dp = self.currency.decimal_places();
        write!(
            f,
            "{}{:.dp$}",
            self.currency.symbol(),
            self.amount,
            dp = dp as usize
        )
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_creation() {
        let m = Money::usd(dec!(100.50));
        assert_eq!(m.amount(), dec!(100.50));
        assert_eq!(m.currency(), Currency::USD);
    }

    #[test]
    fn test_money_from_minor() {
        let m = Money::from_minor(12550, Currency::USD);
        assert_eq!(m.amount(), dec!(125.50));
    }

    #[test]
    fn test_units_times_rate() {
        let rate = Money::usd(dec!(50.00));
        assert_eq!(rate.checked_mul(dec!(2)).unwrap().amount(), dec!(100.00));
        assert_eq!(rate.checked_mul(dec!(1.5)).unwrap().amount(), dec!(75.00));
    }

    #[test]
    fn test_overflow_is_an_error() {
        let rate = Money::usd(dec!(2));
        assert!(matches!(rate.checked_mul(Decimal::MAX), Err(MoneyError::Overflow(_))));

        let huge = Money::usd(Decimal::MAX);
        assert!(matches!(huge.checked_add(&Money::usd(dec!(1))), Err(MoneyError::Overflow(_))));
        assert_eq!(huge.percent(dec!(500)).amount(), Decimal::MAX.round_dp(4));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::usd(dec!(100.00));
        let cad = Money::new(dec!(100.00), Currency::CAD);

        let result = usd.checked_add(&cad);
        assert!(matches!(result, Err(MoneyError::CurrencyMismatch(_, _))));
        assert!(usd.partial_cmp(&cad).is_none());
    }

    #[test]
    fn test_sum_and_settles() {
        let parts = [Money::usd(dec!(40.00)), Money::usd(dec!(60.00))];
        let total = Money::sum(Currency::USD, parts.iter()).unwrap();
        assert!(total.settles(&Money::usd(dec!(100))));
        assert!(!total.settles(&Money::usd(dec!(100.01))));
    }

    #[test]
    fn test_percent() {
        assert_eq!(Money::usd(dec!(200)).percent(dec!(5)).amount(), dec!(10));
    }

    #[test]
    fn test_currency_codes() {
        assert_eq!(Currency::from_code("usd").unwrap(), Currency::USD);
        assert!(Currency::from_code("XYZ").is_err());
        assert_eq!(Money::usd(dec!(12.5)).to_string(), "$12.50");
    }
}
