//! Device identifier resolution.
//!
//! ```text
//! X-Device-ID header ──► present? use it
//!        │ no
//!        ▼
//! device_id cookie   ──► present? use it
//!        │ no
//!        ▼
//! sha256("{user-agent}|{accept-language}|{forwarded-for or peer}|{salt}")
//!        hex, 64 chars
//! ```

use axum::http::{header, HeaderMap};
use sha2::{Digest, Sha256};
use std::net::SocketAddr;

use crate::extract::read_cookie;

pub const DEVICE_HEADER: &str = "x-device-id";
pub const DEVICE_COOKIE: &str = "device_id";

/// Raw request signals a device id is derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSignals {
    pub header_id: Option<String>,
    pub cookie_id: Option<String>,
    pub user_agent: String,
    pub accept_language: String,
    /// X-Forwarded-For, else the peer address
    pub remote: String,
}

impl DeviceSignals {
    pub fn from_headers(headers: &HeaderMap, peer: Option<SocketAddr>) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let remote = text("x-forwarded-for")
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_default();

        DeviceSignals {
            header_id: text(DEVICE_HEADER),
            cookie_id: read_cookie(headers, DEVICE_COOKIE),
            user_agent: text(header::USER_AGENT.as_str()).unwrap_or_default(),
            accept_language: text(header::ACCEPT_LANGUAGE.as_str()).unwrap_or_default(),
            remote,
        }
    }

    /// The identifier to bind or compare against.
    pub fn device_id(&self, salt: &str) -> String {
        if let Some(id) = self.header_id.as_deref().or(self.cookie_id.as_deref()) {
            return id.to_string();
        }

        let raw = format!(
            "{}|{}|{}|{}",
            self.user_agent, self.accept_language, self.remote, salt
        );
        let digest = hex::encode(Sha256::digest(raw.as_bytes()));
        digest.chars().take(64).collect()
    }
}
