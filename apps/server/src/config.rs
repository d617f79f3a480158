//! Server configuration.
//!
//! Layered with the `config` crate:
//!
//! ```text
//! ServerConfig::default()        built-in values below
//!        │
//!        ▼
//! caixa.toml (optional)          same keys, flat
//!        │
//!        ▼
//! CAIXA__<KEY> env variables     e.g. CAIXA__JWT_SECRET, CAIXA__BIND_ADDRESS
//! ```

use chrono::Duration;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;

use caixa_core::security::LockoutPolicy;
use caixa_core::{MAX_IMPORT_ROWS, PREVIEW_SAMPLE_ROWS};

const DEV_JWT_SECRET: &str = "caixa-dev-secret-change-in-production";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    pub bind_address: String,

    /// SQLite database file (`:memory:` for a throwaway database)
    pub database_path: String,

    pub max_db_connections: u32,

    /// JWT secret key for signing tokens
    pub jwt_secret: String,

    /// JWT access token lifetime in seconds
    pub jwt_access_lifetime_secs: i64,

    /// JWT refresh token lifetime in seconds
    pub jwt_refresh_lifetime_secs: i64,

    /// Lifetime of the token bridging password and TOTP steps
    pub challenge_lifetime_secs: i64,

    /// Web (cookie) session lifetime in seconds
    pub web_session_lifetime_secs: i64,

    pub web_session_capacity: usize,

    /// Mark cookies `Secure` (set behind TLS)
    pub secure_cookies: bool,

    /// Mixed into derived device fingerprints
    pub device_salt: String,

    pub lockout_max_attempts: i64,
    pub lockout_minutes: i64,

    pub totp_issuer: String,

    pub import_max_rows: usize,
    pub preview_sample_rows: usize,
    pub preview_ttl_secs: u64,
    pub preview_capacity: usize,

    /// Accounts registered with these emails get the admin role
    pub admin_emails: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "0.0.0.0:8080".to_string(),
            database_path: "caixa.db".to_string(),
            max_db_connections: 5,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_access_lifetime_secs: 3600,     // 1 hour
            jwt_refresh_lifetime_secs: 604_800, // 7 days
            challenge_lifetime_secs: 300,
            web_session_lifetime_secs: 28_800, // 8 hours
            web_session_capacity: 10_000,
            secure_cookies: false,
            device_salt: "caixa-device".to_string(),
            lockout_max_attempts: 5,
            lockout_minutes: 30,
            totp_issuer: "Caixa".to_string(),
            import_max_rows: MAX_IMPORT_ROWS,
            preview_sample_rows: PREVIEW_SAMPLE_ROWS,
            preview_ttl_secs: 900,
            preview_capacity: 256,
            admin_emails: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Loads defaults, then `caixa.toml` if present, then `CAIXA__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("caixa")
    }

    /// Like [`load`](Self::load) with another file stem.
    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::with_name(file_stem).required(false))
            .add_source(
                Environment::with_prefix("CAIXA")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("admin_emails")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::MissingRequired("jwt_secret".to_string()));
        }

        let lifetimes = [
            ("jwt_access_lifetime_secs", self.jwt_access_lifetime_secs),
            ("jwt_refresh_lifetime_secs", self.jwt_refresh_lifetime_secs),
            ("challenge_lifetime_secs", self.challenge_lifetime_secs),
            ("web_session_lifetime_secs", self.web_session_lifetime_secs),
            ("lockout_minutes", self.lockout_minutes),
            ("lockout_max_attempts", self.lockout_max_attempts),
        ];
        for (key, value) in lifetimes {
            if value <= 0 {
                return Err(ConfigError::InvalidValue(key.to_string()));
            }
        }

        if self.import_max_rows == 0 || self.preview_capacity == 0 || self.web_session_capacity == 0 {
            return Err(ConfigError::InvalidValue("capacity".to_string()));
        }

        Ok(())
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: self.lockout_max_attempts,
            lock_duration: Duration::minutes(self.lockout_minutes),
        }
    }

    pub fn preview_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.preview_ttl_secs)
    }

    pub fn web_session_ttl(&self) -> StdDuration {
        StdDuration::from_secs(self.web_session_lifetime_secs.unsigned_abs())
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.trim().eq_ignore_ascii_case(email.trim()))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
