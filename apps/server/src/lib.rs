//! # Caixa Server
//!
//! HTTP API for the cash register back office.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Caixa Server                                   │
//! │                                                                         │
//! │  Web (cookie) ──┐                                                       │
//! │                 ├──► routes ──► CurrentUser ──► services ──► caixa_db   │
//! │  Mobile (JWT) ──┘                   │               │                   │
//! │                                     ▼               ▼                   │
//! │                              web_sessions       previews, export        │
//! │                              (TtlCache)         (TtlCache) (csv/xlsx/pdf)│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! `caixa.toml` (optional) then `CAIXA__*` environment variables, e.g.
//! - `CAIXA__BIND_ADDRESS` - listen address (default: `0.0.0.0:8080`)
//! - `CAIXA__DATABASE_PATH` - SQLite file (default: `caixa.db`)
//! - `CAIXA__JWT_SECRET` - HS256 signing secret
//! - `CAIXA__ADMIN_EMAILS` - comma separated emails registered as admins

pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod routes;
pub mod services;
pub mod state;

// Re-exports
pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;
