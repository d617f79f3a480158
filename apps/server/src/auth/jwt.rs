//! JWT token generation and validation.
//!
//! Three token kinds share one claims shape:
//! - `access`: bearer credential for API calls
//! - `refresh`: exchanged for a new pair while its `sid` is still current
//! - `challenge`: short-lived bridge between the password and TOTP steps

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use caixa_core::{TenantId, UserRole};

use super::{AuthError, AuthResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
    Challenge,
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    pub tenant_id: TenantId,

    pub role: UserRole,

    /// Active session id the token was issued for. Absent on challenges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Device the login came from
    pub device_id: String,

    /// Challenge only: an admin asked to move the device binding
    #[serde(default)]
    pub unlink_device: bool,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,

    pub token_type: TokenType,
}

impl Claims {
    pub fn user_id(&self) -> AuthResult<i64> {
        self.sub
            .parse()
            .map_err(|_| AuthError::InvalidToken("malformed subject".to_string()))
    }
}

/// Who a token is issued to.
#[derive(Debug, Clone)]
pub struct TokenSubject<'a> {
    pub user_id: i64,
    pub tenant_id: TenantId,
    pub role: UserRole,
    pub device_id: &'a str,
}

/// JWT token manager (HS256).
#[derive(Clone)]
pub struct JwtManager {
    secret: String,
    access_lifetime_secs: i64,
    refresh_lifetime_secs: i64,
    challenge_lifetime_secs: i64,
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("access_lifetime_secs", &self.access_lifetime_secs)
            .field("refresh_lifetime_secs", &self.refresh_lifetime_secs)
            .finish_non_exhaustive()
    }
}

impl JwtManager {
    pub fn new(
        secret: String,
        access_lifetime_secs: i64,
        refresh_lifetime_secs: i64,
        challenge_lifetime_secs: i64,
    ) -> Self {
        JwtManager {
            secret,
            access_lifetime_secs,
            refresh_lifetime_secs,
            challenge_lifetime_secs,
        }
    }

    pub fn access_lifetime_secs(&self) -> i64 {
        self.access_lifetime_secs
    }

    pub fn generate_access_token(&self, subject: &TokenSubject<'_>, sid: &str) -> AuthResult<String> {
        self.generate(subject, Some(sid), false, TokenType::Access, self.access_lifetime_secs)
    }

    pub fn generate_refresh_token(&self, subject: &TokenSubject<'_>, sid: &str) -> AuthResult<String> {
        self.generate(subject, Some(sid), false, TokenType::Refresh, self.refresh_lifetime_secs)
    }

    pub fn generate_challenge_token(
        &self,
        subject: &TokenSubject<'_>,
        unlink_device: bool,
    ) -> AuthResult<String> {
        self.generate(
            subject,
            None,
            unlink_device,
            TokenType::Challenge,
            self.challenge_lifetime_secs,
        )
    }

    fn generate(
        &self,
        subject: &TokenSubject<'_>,
        sid: Option<&str>,
        unlink_device: bool,
        token_type: TokenType,
        lifetime_secs: i64,
    ) -> AuthResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(lifetime_secs);

        let claims = Claims {
            sub: subject.user_id.to_string(),
            tenant_id: subject.tenant_id,
            role: subject.role,
            sid: sid.map(str::to_string),
            device_id: subject.device_id.to_string(),
            unlink_device,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate and decode a token.
    pub fn validate_token(&self, token: &str) -> AuthResult<Claims> {
        let validation = Validation::default();

        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(token_data.claims)
    }

    fn validate_kind(&self, token: &str, expected: TokenType) -> AuthResult<Claims> {
        let claims = self.validate_token(token)?;

        if claims.token_type != expected {
            return Err(AuthError::InvalidToken(format!("expected {expected:?} token")));
        }

        Ok(claims)
    }

    pub fn validate_access_token(&self, token: &str) -> AuthResult<Claims> {
        self.validate_kind(token, TokenType::Access)
    }

    pub fn validate_refresh_token(&self, token: &str) -> AuthResult<Claims> {
        self.validate_kind(token, TokenType::Refresh)
    }

    pub fn validate_challenge_token(&self, token: &str) -> AuthResult<Claims> {
        self.validate_kind(token, TokenType::Challenge)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
