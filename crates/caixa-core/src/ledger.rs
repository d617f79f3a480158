//! # Ledger Module
//!
//! Balance math for a cash session and the reconciliation rule applied on
//! close.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Closing a Session                               │
//! │                                                                         │
//! │   opening_balance ─────────┐                                            │
//! │                            │                                            │
//! │   Σ amount (entrada) ──────┼──► expected = opening + Σin − Σout        │
//! │                            │                                            │
//! │   Σ amount (saida) ────────┘                                            │
//! │                                                                         │
//! │   declared (counted drawer)                                             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   |declared − expected| ≤ 1 cent ?                                     │
//! │        ├── yes ──► session closes                                       │
//! │        └── no  ──► BalanceMismatch, session stays open                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::{AmountInput, Money};
use crate::types::{CashMovement, LedgerTotals, MovementType};
use crate::RECONCILIATION_TOLERANCE;

// =============================================================================
// Totals
// =============================================================================

/// Accumulates entries and exits of a set of movements.
///
/// ## Errors
/// `CoreError::AmountOverflow` when a sum leaves the `i64` range.
pub fn totals_of<'a, I>(movements: I) -> CoreResult<LedgerTotals>
where
    I: IntoIterator<Item = &'a CashMovement>,
{
    movements
        .into_iter()
        .try_fold(LedgerTotals::default(), |mut acc, m| {
            let (sum, label) = match m.movement_type {
                MovementType::In => (&mut acc.entradas_cents, "entradas"),
                MovementType::Out => (&mut acc.saidas_cents, "saidas"),
            };
            *sum = sum
                .checked_add(m.amount_cents)
                .ok_or(CoreError::AmountOverflow(label))?;
            Ok(acc)
        })
}

/// `opening + Σin − Σout`
pub fn expected_balance(opening: Money, totals: &LedgerTotals) -> CoreResult<Money> {
    opening
        .checked_add(totals.entradas())
        .and_then(|m| m.checked_sub(totals.saidas()))
        .ok_or(CoreError::AmountOverflow("expected balance"))
}

// =============================================================================
// Reconciliation
// =============================================================================

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub expected: Money,
    pub declared: Money,
    /// declared − expected, within tolerance
    pub difference: Money,
}

/// Compares the counted drawer with the expected balance.
///
/// ## Errors
/// `CoreError::BalanceMismatch` when `|declared − expected|` exceeds
/// [`RECONCILIATION_TOLERANCE`]. The boundary is inclusive.
///
/// ## Example
/// ```rust
/// use caixa_core::ledger::reconcile;
/// use caixa_core::types::LedgerTotals;
/// use caixa_core::Money;
///
/// let totals = LedgerTotals { entradas_cents: 30000, saidas_cents: 5000 };
/// let opening = Money::from_cents(10000);
///
/// assert!(reconcile(opening, &totals, Money::from_cents(35001)).is_ok());
/// assert!(reconcile(opening, &totals, Money::from_cents(34000)).is_err());
/// ```
pub fn reconcile(
    opening: Money,
    totals: &LedgerTotals,
    declared: Money,
) -> Result<Reconciliation, CoreError> {
    let expected = expected_balance(opening, totals)?;
    let difference = declared
        .checked_sub(expected)
        .ok_or(CoreError::AmountOverflow("difference"))?;

    if difference.abs() > RECONCILIATION_TOLERANCE {
        return Err(CoreError::BalanceMismatch {
            declared,
            expected,
            difference,
        });
    }

    Ok(Reconciliation {
        expected,
        declared,
        difference,
    })
}

// =============================================================================
// Amount Rules
// =============================================================================

/// Opening and closing balances: required, parseable, not negative.
pub fn parse_balance(field: &str, input: Option<&AmountInput>) -> Result<Money, ValidationError> {
    let input = input.ok_or_else(|| ValidationError::required(field))?;
    let value = input.to_money(field)?;

    if value.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(value)
}

/// Movement and sale amounts: required, parseable, strictly positive.
pub fn parse_positive_amount(
    field: &str,
    input: Option<&AmountInput>,
) -> Result<Money, ValidationError> {
    let input = input.ok_or_else(|| ValidationError::required(field))?;
    let value = input.to_money(field)?;

    if !value.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(value)
}

// =============================================================================
// Unit Tests
// =============================================================================
