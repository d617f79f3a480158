//! # caixa-db: Database Layer for Caixa
//!
//! SQLite persistence for cash sessions, movements, quick sales and the
//! users that own them, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Caixa Data Flow                                 │
//! │                                                                         │
//! │  HTTP handler (POST /api/caixa/fechar)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     caixa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │    │  (embedded)  │  │   │
//! │  │   │               │    │ SessionRepo    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ MovementRepo   │    │ 001_initial  │  │   │
//! │  │   │ Transactions  │    │ SaleRepo ...   │    │ _schema.sql  │  │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  caixa.db (WAL) or sqlite::memory: in tests                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caixa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("caixa.db")).await?;
//! let session = db.sessions().open(tenant_id, Money::zero(), None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::movement::CashMovementRepository;
pub use repository::product::{NewProduct, ProductRepository};
pub use repository::sale::{QuickSale, QuickSaleKind, QuickSaleReceipt, SaleRepository};
pub use repository::session::CashSessionRepository;
pub use repository::user::{NewUser, UserRecord, UserRepository};
