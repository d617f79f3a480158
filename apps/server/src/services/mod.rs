//! Service layer.
//!
//! Handlers in [`crate::routes`] stay thin: they extract, call a service,
//! and serialize. Services own validation and orchestration; repositories
//! in `caixa_db` own SQL.

pub mod auth_service;
pub mod cash_service;
pub mod health_service;
