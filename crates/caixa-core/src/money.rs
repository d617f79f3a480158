//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Summing floats:                                                        │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A drawer reconciled with floats can be "off" by 0.0000001 and fail    │
//! │  a strict comparison even though every coin was counted.               │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Operators type "350,00" → parsed exactly as a decimal → 35000 cents │
//! │    Every sum, difference and tolerance check is integer arithmetic     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use caixa_core::money::Money;
//!
//! let opening = Money::parse("100,50").unwrap();
//! assert_eq!(opening.cents(), 10050);
//! assert_eq!(opening.to_decimal_string(), "100.50");
//! ```

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// Monetary value in centavos (1/100 of a real).
///
/// ## Design Decisions
/// - **i64 (signed)**: differences and partial balances can be negative
/// - **Single field tuple struct**: serializes as a bare integer of cents
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  CashSession.opening_balance ──┐                                        │
/// │                                ├──► expected balance ──► reconcile      │
/// │  CashMovement.amount (in/out) ─┘                                        │
/// │                                                                         │
/// │  Product.price ──► quick sale total ──► movement amount                 │
/// │                                                                         │
/// │  Ledger export: "350.00" in CSV/XLSX, "R$ 350.00" in PDF               │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Largest amount accepted from input: R$ 100,000,000,000.00.
    ///
    /// Sums of capped amounts stay far from `i64::MAX`; arithmetic is still
    /// checked and reports overflow instead of wrapping.
    pub const MAX_INPUT: Money = Money(10_000_000_000_000);

    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use caixa_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // R$ 10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Whole reais portion (truncated toward zero).
    #[inline]
    pub const fn reais(&self) -> i64 {
        self.0 / 100
    }

    /// Centavos portion, always 0-99.
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// `self + other`, `None` on overflow.
    #[inline]
    pub const fn checked_add(self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// `self - other`, `None` on overflow.
    #[inline]
    pub const fn checked_sub(self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Multiplies a unit price by a quantity, `None` on overflow.
    ///
    /// ```rust
    /// use caixa_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(299).checked_mul_quantity(3).unwrap().cents(), 897);
    /// assert!(Money::from_cents(i64::MAX).checked_mul_quantity(2).is_none());
    /// ```
    #[inline]
    pub const fn checked_mul_quantity(self, qty: i64) -> Option<Money> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Parses a typed amount such as `"350"`, `"350.5"` or `"350,50"`.
    ///
    /// Decimal comma is normalised to a dot, the value is parsed exactly and
    /// rounded half away from zero to two places. Exponent notation and
    /// thousands separators are rejected, and so is anything beyond
    /// [`Money::MAX_INPUT`] either way.
    ///
    /// ## Example
    /// ```rust
    /// use caixa_core::money::Money;
    ///
    /// assert_eq!(Money::parse("12,345").unwrap().cents(), 1235);
    /// assert_eq!(Money::parse("-5").unwrap().cents(), -500);
    /// assert!(Money::parse("abc").is_err());
    /// ```
    pub fn parse(input: &str) -> Result<Money, ParseMoneyError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseMoneyError::Empty);
        }

        let normalised = trimmed.replace(',', ".");
        let value = Decimal::from_str(&normalised)
            .map_err(|_| ParseMoneyError::Invalid(trimmed.to_string()))?;

        let cents = value
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|c| c.to_i64())
            .ok_or_else(|| ParseMoneyError::Invalid(trimmed.to_string()))?;

        if cents.unsigned_abs() > Money::MAX_INPUT.0.unsigned_abs() {
            return Err(ParseMoneyError::OutOfRange(trimmed.to_string()));
        }

        Ok(Money(cents))
    }

    /// Plain two-decimal rendering used in CSV and spreadsheet cells.
    ///
    /// ```rust
    /// use caixa_core::money::Money;
    ///
    /// assert_eq!(Money::from_cents(-1000).to_decimal_string(), "-10.00");
    /// ```
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.reais().abs(), self.cents_part())
    }

    /// Value as a float, only for spreadsheet number cells.
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

// =============================================================================
// Parse Error
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseMoneyError {
    #[error("amount is empty")]
    Empty,

    #[error("'{0}' is not a valid amount")]
    Invalid(String),

    #[error("'{0}' exceeds the largest accepted amount")]
    OutOfRange(String),
}

impl ParseMoneyError {
    /// Attaches the field name, producing the validation error callers return.
    pub fn for_field(self, field: &str) -> ValidationError {
        match self {
            ParseMoneyError::Empty => ValidationError::required(field),
            ParseMoneyError::Invalid(raw) => {
                ValidationError::invalid(field, format!("'{}' is not a valid amount", raw))
            }
            ParseMoneyError::OutOfRange(raw) => ValidationError::invalid(
                field,
                format!("'{}' exceeds the maximum of {}", raw, Money::MAX_INPUT),
            ),
        }
    }
}

// =============================================================================
// Amount Input
// =============================================================================

/// Money as it arrives in JSON: either `"350,00"` or `350.0`.
///
/// Numbers are re-read through their textual form so they get the same exact
/// parsing as strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Text(String),
    Number(serde_json::Number),
}

impl AmountInput {
    pub fn to_money(&self, field: &str) -> Result<Money, ValidationError> {
        let parsed = match self {
            AmountInput::Text(text) => Money::parse(text),
            AmountInput::Number(number) => Money::parse(&number.to_string()),
        };
        parsed.map_err(|e| e.for_field(field))
    }
}

impl From<&str> for AmountInput {
    fn from(value: &str) -> Self {
        AmountInput::Text(value.to_string())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money with the currency symbol, e.g. `R$ 350.00`, `-R$ 10.00`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}R$ {}.{:02}", sign, self.reais().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.reais(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(35000).to_string(), "R$ 350.00");
        assert_eq!(Money::from_cents(-1000).to_string(), "-R$ 10.00");
        assert_eq!(Money::from_cents(-5).to_string(), "-R$ 0.05");
        assert_eq!(Money::zero().to_string(), "R$ 0.00");
    }

    #[test]
    fn test_parse_decimal_comma() {
        assert_eq!(Money::parse("350,50").unwrap().cents(), 35050);
        assert_eq!(Money::parse(" 12.3 ").unwrap().cents(), 1230);
        assert_eq!(Money::parse("0").unwrap().cents(), 0);
        assert_eq!(Money::parse("349.99").unwrap().cents(), 34999);
    }

    #[test]
    fn test_parse_rounds_half_away_from_zero() {
        assert_eq!(Money::parse("0.005").unwrap().cents(), 1);
        assert_eq!(Money::parse("-0.005").unwrap().cents(), -1);
        assert_eq!(Money::parse("1.004").unwrap().cents(), 100);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(Money::parse("  "), Err(ParseMoneyError::Empty));
        assert!(Money::parse("abc").is_err());
        assert!(Money::parse("1.234,56").is_err());
        assert!(Money::parse("1e5").is_err());
    }

    #[test]
    fn test_amount_input_number_and_text() {
        let from_text: AmountInput = serde_json::from_str("\"10,50\"").unwrap();
        let from_number: AmountInput = serde_json::from_str("10.5").unwrap();
        assert_eq!(from_text.to_money("amount").unwrap().cents(), 1050);
        assert_eq!(from_number.to_money("amount").unwrap().cents(), 1050);

        let bad = AmountInput::from("x").to_money("amount").unwrap_err();
        assert!(matches!(bad, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);
        assert_eq!(a.checked_add(b), Some(Money::from_cents(1500)));
        assert_eq!(b.checked_sub(a), Some(Money::from_cents(-500)));

        let huge = Money::from_cents(i64::MAX - 10);
        assert!(huge.checked_add(Money::from_cents(100)).is_none());
        assert!(Money::from_cents(i64::MIN).checked_sub(a).is_none());
        assert!(Money::MAX_INPUT.checked_mul_quantity(1_000_000).is_none());
    }

    #[test]
    fn test_parse_caps_amounts() {
        assert_eq!(Money::parse("100000000000").unwrap(), Money::MAX_INPUT);
        assert!(matches!(
            Money::parse("100000000000,01"),
            Err(ParseMoneyError::OutOfRange(_))
        ));
        assert!(matches!(
            Money::parse("-92233720368547758"),
            Err(ParseMoneyError::OutOfRange(_))
        ));

        let err = AmountInput::from("92233720368547758")
            .to_money("opening_balance")
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { ref field, .. } if field == "opening_balance"));
    }

    #[test]
    fn test_decimal_string() {
        assert_eq!(Money::from_cents(35000).to_decimal_string(), "350.00");
        assert_eq!(Money::from_cents(7).to_decimal_string(), "0.07");
        assert_eq!(Money::from_cents(-1000).to_decimal_string(), "-10.00");
    }
}
