//! # Authentication
//!
//! Credential primitives shared by the web and mobile login flows.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Dual-Mode Authentication                          │
//! │                                                                         │
//! │  Mobile                              Web                                │
//! │  Authorization: Bearer <jwt>         Cookie: caixa_session=<opaque>     │
//! │        │                                   │                            │
//! │        ▼                                   ▼                            │
//! │  jwt::JwtManager                     state::SessionStore                │
//! │  (sid claim)                         (WebSession.active_session_id)     │
//! │        │                                   │                            │
//! │        └──────────────┬────────────────────┘                            │
//! │                       ▼                                                 │
//! │        users.active_session_id must match, else SessionReplaced        │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │                  CurrentUser                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`jwt`] - access / refresh / challenge tokens
//! - [`password`] - Argon2id hashing
//! - [`totp`] - second factor secrets and backup codes
//! - [`device`] - device identifier resolution

pub mod device;
pub mod jwt;
pub mod password;
pub mod totp;

use chrono::{DateTime, Utc};

/// Credential failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Account locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    /// Login from a device other than the bound one.
    #[error("Account is bound to another device")]
    DeviceMismatch { can_unlink: bool },

    #[error("Invalid two-factor code")]
    InvalidTwoFactorCode,

    #[error("Two-factor authentication is not set up")]
    TwoFactorNotEnrolled,

    /// A newer login replaced this session.
    #[error("Session replaced by a newer login")]
    SessionReplaced,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Not allowed")]
    Forbidden,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Failed to issue token: {0}")]
    TokenCreation(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

pub type AuthResult<T> = Result<T, AuthError>;
