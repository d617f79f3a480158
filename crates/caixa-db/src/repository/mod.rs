//! # Repository Module
//!
//! Tenant-scoped data access for the cash register.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database (pool.rs)                                                     │
//! │   ├── users()      UserRepository         credentials, lockout, 2FA    │
//! │   ├── products()   ProductRepository      catalogue for quick sales    │
//! │   ├── sessions()   CashSessionRepository  open / close / list          │
//! │   ├── movements()  CashMovementRepository append-only ledger           │
//! │   └── sales()      SaleRepository         quick sale, dashboard        │
//! │                                                                         │
//! │  Every query filters on tenant_id. A row of another tenant reads as    │
//! │  "not found", never as "forbidden".                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Helpers taking `&mut SqliteConnection` (`fetch_open_session`,
//! `insert_movement`, `session_totals`) are shared between repositories so
//! several of them can run inside one transaction.

pub mod movement;
pub mod product;
pub mod sale;
pub mod session;
pub mod user;
