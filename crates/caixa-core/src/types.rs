//! # Domain Types
//!
//! Core domain types used throughout Caixa.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐ 1   * ┌─────────────────┐       ┌──────────────┐  │
//! │  │  CashSession    │───────│  CashMovement   │──────►│    Sale      │  │
//! │  │  ─────────────  │       │  ─────────────  │ ref_id│ ──────────── │  │
//! │  │  tenant_id      │       │  movement_type  │       │ total_cents  │  │
//! │  │  status         │       │  origin         │       │ payment      │  │
//! │  │  opening_cents  │       │  amount_cents   │       └──────┬───────┘  │
//! │  │  closing_cents  │       │  description    │              │ 1..*     │
//! │  └─────────────────┘       └─────────────────┘       ┌──────┴───────┐  │
//! │                                                      │  SaleItem    │  │
//! │  ┌─────────────────┐   ┌─────────────────┐           │  product_id  │  │
//! │  │ SessionStatus   │   │  MovementType   │           └──────────────┘  │
//! │  │  Open           │   │  In  (entrada)  │                              │
//! │  │  Closed         │   │  Out (saida)    │                              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tenancy
//! The tenant is the owning user account. Every row carries `tenant_id` and
//! every query filters on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

/// Owning account of every business row.
pub type TenantId = i64;

// =============================================================================
// Session Status
// =============================================================================

/// Lifecycle of a cash session: `open → closed`, closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Closed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Closed => "closed",
        }
    }
}

// =============================================================================
// Movement Type
// =============================================================================

/// Direction of a cash movement.
///
/// JSON uses `in` / `out` (the Portuguese `entrada` / `saida` are accepted
/// too); the database stores `entrada` / `saida`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum MovementType {
    #[serde(rename = "in", alias = "entrada")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "entrada"))]
    In,
    #[serde(rename = "out", alias = "saida")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "saida"))]
    Out,
}

impl MovementType {
    /// Reads the type column of an imported CSV row (`entrada` / `saida`).
    pub fn from_import(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "entrada" => Some(MovementType::In),
            "saida" => Some(MovementType::Out),
            _ => None,
        }
    }

    /// Stored form, also the value shown in ledger exports.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "entrada",
            MovementType::Out => "saida",
        }
    }
}

// =============================================================================
// Origin
// =============================================================================

/// Well-known movement origins.
///
/// `CashMovement::origin` stays a free string because imported rows may carry
/// any lowercase tag; these are the ones the application itself writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Sale
    Venda,
    /// Cash added to the drawer
    Suprimento,
    /// Cash withdrawn from the drawer
    Sangria,
    Ajuste,
    Importado,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Venda => "venda",
            Origin::Suprimento => "suprimento",
            Origin::Sangria => "sangria",
            Origin::Ajuste => "ajuste",
            Origin::Importado => "importado",
        }
    }
}

// =============================================================================
// Payment Methods
// =============================================================================

/// Payment methods the dashboard breaks sales down by.
pub const PAYMENT_METHODS: [&str; 5] = ["dinheiro", "cartao", "pix", "boleto", "transferencia"];

// =============================================================================
// Cash Session
// =============================================================================

/// A period during which a tenant's cash drawer is open.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashSession {
    pub id: i64,
    pub tenant_id: TenantId,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub opening_balance_cents: i64,
    pub closing_balance_cents: Option<i64>,
    pub opening_notes: Option<String>,
    pub closing_notes: Option<String>,
}

impl CashSession {
    #[inline]
    pub fn opening_balance(&self) -> Money {
        Money::from_cents(self.opening_balance_cents)
    }

    #[inline]
    pub fn closing_balance(&self) -> Option<Money> {
        self.closing_balance_cents.map(Money::from_cents)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

// =============================================================================
// Cash Movement
// =============================================================================

/// One immutable ledger entry inside a cash session.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashMovement {
    pub id: i64,
    pub session_id: i64,
    pub tenant_id: TenantId,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub movement_type: MovementType,
    pub origin: String,
    /// Always positive; direction comes from `movement_type`.
    pub amount_cents: i64,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub reference_id: Option<i64>,
}

impl CashMovement {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Amount with sign applied: positive for entries, negative for exits.
    pub fn signed_amount(&self) -> Money {
        match self.movement_type {
            MovementType::In => self.amount(),
            MovementType::Out => Money::from_cents(-self.amount_cents),
        }
    }
}

/// A validated movement waiting to be written.
///
/// `created_at` is only set by imports that carry a date column; otherwise
/// the database stamps the insertion time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMovement {
    pub movement_type: MovementType,
    pub origin: String,
    pub amount: Money,
    pub description: Option<String>,
    pub payment_method: Option<String>,
    pub reference_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Product
// =============================================================================

/// Catalogue entry sold through the quick sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub tenant_id: TenantId,
    pub name: String,
    pub sku: Option<String>,
    pub price_cents: i64,
    pub current_stock: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    pub fn can_sell(&self, quantity: i64) -> bool {
        self.current_stock >= quantity
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A finalized sale. Quick sales produce one per call.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub tenant_id: TenantId,
    pub total_cents: i64,
    pub payment_method: String,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: i64,
    pub sale_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// What clients get to see about an account.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub company_name: Option<String>,
    pub role: UserRole,
    pub two_factor_enabled: bool,
}

// =============================================================================
// Listing & Summaries
// =============================================================================

/// One page of a listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

/// Running totals of a session ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerTotals {
    pub entradas_cents: i64,
    pub saidas_cents: i64,
}

impl LedgerTotals {
    pub fn entradas(&self) -> Money {
        Money::from_cents(self.entradas_cents)
    }

    pub fn saidas(&self) -> Money {
        Money::from_cents(self.saidas_cents)
    }
}

/// Session plus its movements and partial balance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionDetail {
    pub session: CashSession,
    pub movements: Vec<CashMovement>,
    pub totals: LedgerTotals,
    /// opening + entradas − saidas
    pub saldo_parcial_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentMethodTotal {
    pub payment_method: String,
    pub total_cents: i64,
    pub count: i64,
}

/// Sales summary shown on the cash dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DashboardSummary {
    #[ts(as = "String")]
    pub since: DateTime<Utc>,
    pub open_session: Option<CashSession>,
    pub sale_count: i64,
    pub total_sales_cents: i64,
    pub average_ticket_cents: i64,
    pub by_payment_method: Vec<PaymentMethodTotal>,
}

// =============================================================================
// Unit Tests
// =============================================================================
