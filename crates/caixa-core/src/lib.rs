//! # caixa-core: Pure Business Logic for Caixa
//!
//! This crate holds the cash-register rules as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Caixa Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Front-end (web & mobile clients)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ JSON over HTTP                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apps/server (axum)                           │   │
//! │  │    auth resolver, services, exports, preview cache              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ caixa-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ │   │
//! │  │   │  money  │ │ ledger  │ │ import  │ │ report  │ │ security │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └──────────┘ │   │
//! │  │   ┌─────────┐ ┌────────────┐                                   │   │
//! │  │   │  types  │ │ validation │                                   │   │
//! │  │   └─────────┘ └────────────┘                                   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    caixa-db (Database Layer)                    │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (CashSession, CashMovement, Product, Sale, ...)
//! - [`money`] - Money type with integer arithmetic and exact parsing
//! - [`ledger`] - Totals, expected balance, reconciliation
//! - [`import`] - CSV parsing, column mapping, row validation
//! - [`report`] - Ledger export model
//! - [`security`] - Lockout, device binding, backup codes
//! - [`validation`] - CPF/CNPJ, email, phone, password rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use caixa_core::ledger::reconcile;
//! use caixa_core::types::LedgerTotals;
//! use caixa_core::Money;
//!
//! let opening = Money::parse("100").unwrap();
//! let totals = LedgerTotals { entradas_cents: 30000, saidas_cents: 5000 };
//!
//! let ok = reconcile(opening, &totals, Money::parse("350,00").unwrap()).unwrap();
//! assert_eq!(ok.expected.cents(), 35000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod import;
pub mod ledger;
pub mod money;
pub mod report;
pub mod security;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{AmountInput, Money};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Largest absolute difference between declared and expected balance that
/// still closes a session.
pub const RECONCILIATION_TOLERANCE: Money = Money::from_cents(1);

/// Data rows kept from one uploaded CSV.
pub const MAX_IMPORT_ROWS: usize = 1000;

/// Rows echoed back in an import preview.
pub const PREVIEW_SAMPLE_ROWS: usize = 50;

/// Appended to the description of every imported movement. Exports use it
/// to tell imported rows from manual ones.
pub const IMPORT_MARKER: &str = "[IMPORTADO]";

/// Maximum quantity of a single item in a quick sale
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: i64 = 999;
