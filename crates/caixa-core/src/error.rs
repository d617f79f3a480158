//! # Error Types
//!
//! Domain-specific error types for caixa-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  caixa-core errors (this file)                                         │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  caixa-core import (import.rs)                                         │
//! │  └── RowRejection     - Per-row CSV failures (collected, not raised)   │
//! │                                                                         │
//! │  caixa-db errors (separate crate)                                      │
//! │  └── DbError          - Database failures, Rule(CoreError)             │
//! │                                                                         │
//! │  Server errors (in app)                                                │
//! │  └── ApiError         - What clients see: { code, message }            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Client       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations of the cash register domain.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The tenant already has an open cash session.
    ///
    /// ## When This Occurs
    /// - Opening a session while another one is still open
    /// - Two concurrent opens racing; the loser hits the unique index
    #[error("A cash session is already open")]
    SessionAlreadyOpen,

    /// An operation needs an open session and there is none.
    #[error("No cash session is open")]
    NoOpenSession,

    /// The session exists but is already closed.
    #[error("Cash session {0} is closed")]
    SessionClosed(i64),

    /// The session does not exist or belongs to another tenant.
    #[error("Cash session not found: {0}")]
    SessionNotFound(i64),

    /// Declared closing balance differs from the computed one by more than
    /// one cent.
    ///
    /// ## User Workflow
    /// ```text
    /// Close (declared: 340.00)
    ///      │
    ///      ▼
    /// expected = opening 100.00 + in 300.00 − out 50.00 = 350.00
    ///      │
    ///      ▼
    /// BalanceMismatch { declared: 340.00, expected: 350.00, difference: -10.00 }
    ///      │
    ///      ▼
    /// Session stays open, operator recounts the drawer
    /// ```
    #[error("Closing balance {declared} does not match expected {expected} (difference {difference})")]
    BalanceMismatch {
        declared: Money,
        expected: Money,
        difference: Money,
    },

    /// A total, balance or difference does not fit in an `i64` of cents.
    #[error("Amount out of range while computing {0}")]
    AmountOverflow(&'static str),

    /// Not enough stock for a quick sale.
    #[error("Insufficient stock for {product}: available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Product id unknown for this tenant.
    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    /// Confirm was called without a staged preview.
    ///
    /// ## When This Occurs
    /// - Confirm called twice (the first call consumed the preview)
    /// - The preview expired from the cache
    /// - Preview was never uploaded for this session
    #[error("No import preview available for this session")]
    NoImportPreview,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., unparseable amount, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value (e.g., username already taken).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        ValidationError::Required {
            field: field.to_string(),
        }
    }

    pub fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_mismatch_message() {
        let err = CoreError::BalanceMismatch {
            declared: Money::from_cents(34000),
            expected: Money::from_cents(35000),
            difference: Money::from_cents(-1000),
        };
        assert_eq!(
            err.to_string(),
            "Closing balance R$ 340.00 does not match expected R$ 350.00 (difference -R$ 10.00)"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::required("opening_balance");
        assert_eq!(err.to_string(), "opening_balance is required");

        let err = ValidationError::MustNotBeNegative {
            field: "opening_balance".to_string(),
        };
        assert_eq!(err.to_string(), "opening_balance must not be negative");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("amount").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
