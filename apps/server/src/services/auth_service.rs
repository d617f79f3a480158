//! Authentication service.
//!
//! ## Password Login
//! ```text
//! find_by_login ── none ─────────────────────────────► InvalidCredentials
//!      │
//!      ▼
//! locked_until > now ───────────────────────────────► AccountLocked
//!      │
//!      ▼
//! verify_password ── fail ── count_failure ─────────► InvalidCredentials
//!      │                     (5th failure)  ────────► AccountLocked (30 min)
//!      ▼
//! two_factor_enabled ── yes ────────────────────────► TwoFactorRequired { challenge }
//!      │                                                     │
//!      │                      verify_two_factor(code | backup code)
//!      │                      wrong code ── count_failure (same counter)
//!      ▼                                                     │
//! complete_login ◄───────────────────────────────────────────┘
//!      ├── check_device ── Mismatch ────────────────► DeviceMismatch { can_unlink }
//!      ├── new active session id (replaces every older login)
//!      └── Web: cookie token + WebSession │ Mobile: access + refresh JWT
//! ```

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use caixa_core::security::{check_device, DeviceCheck};
use caixa_core::validation::{
    optional_text, require_text, validate_email, validate_password_strength, validate_username,
};
use caixa_core::{UserProfile, UserRole};
use caixa_db::{NewUser, UserRecord};

use crate::auth::device::DeviceSignals;
use crate::auth::jwt::{extract_bearer_token, TokenSubject};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::totp::{self, Enrollment};
use crate::auth::AuthError;
use crate::error::ApiResult;
use crate::extract::{read_cookie, Credential, CurrentUser, SESSION_COOKIE};
use crate::state::{AppState, WebSession};

// =============================================================================
// Requests & Responses
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
    /// Admin only: move the device binding to this device
    #[serde(default)]
    pub unlink_device: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwoFactorRequest {
    pub challenge_token: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub backup_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Which credential a successful login hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    Web,
    Mobile,
}

#[derive(Debug, Clone)]
pub enum IssuedCredential {
    Cookie { token: String },
    Tokens(TokenPair),
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub profile: UserProfile,
    pub device_id: String,
    pub credential: IssuedCredential,
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(LoginSuccess),
    /// Password was right; a second factor must follow.
    TwoFactorRequired { challenge_token: String },
}

fn new_opaque_id() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// Service
// =============================================================================

pub struct AuthService<'a> {
    state: &'a AppState,
}

impl<'a> AuthService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        AuthService { state }
    }

    /// Creates an account. Emails listed in `admin_emails` become admins.
    pub async fn register(&self, req: &RegisterRequest) -> ApiResult<UserProfile> {
        let username = require_text("username", &req.username)?;
        validate_username(&username)?;
        let email = require_text("email", &req.email)?.to_lowercase();
        validate_email(&email)?;
        validate_password_strength(&req.password)?;

        let role = if self.state.config.is_admin_email(&email) {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let user = self
            .state
            .db
            .users()
            .create(&NewUser {
                username,
                email,
                password_hash: hash_password(&req.password)?,
                company_name: optional_text(req.company_name.as_deref()),
                role,
            })
            .await?;

        info!(user_id = user.id, role = role.as_str(), "Account registered");
        Ok(user.profile())
    }

    /// Password step of a login.
    pub async fn login(
        &self,
        req: &LoginRequest,
        device: &DeviceSignals,
        mode: LoginMode,
    ) -> ApiResult<LoginOutcome> {
        let users = self.state.db.users();
        let policy = self.state.config.lockout_policy();
        let now = Utc::now();

        let Some(user) = users.find_by_login(&req.login).await? else {
            warn!(login = %req.login.trim(), "Login for unknown account");
            return Err(AuthError::InvalidCredentials.into());
        };

        if let Some(until) = user.locked_until.filter(|u| policy.is_locked(Some(*u), now)) {
            warn!(user_id = user.id, %until, "Login refused, account locked");
            return Err(AuthError::AccountLocked { until }.into());
        }

        if !verify_password(&req.password, &user.password_hash) {
            let err = self
                .count_failure(&user, AuthError::InvalidCredentials, now)
                .await?;
            return Err(err.into());
        }

        let device_id = device.device_id(&self.state.config.device_salt);

        if user.two_factor_enabled {
            let challenge_token = self
                .state
                .jwt
                .generate_challenge_token(&subject(&user, &device_id), req.unlink_device)?;
            debug!(user_id = user.id, "Password accepted, second factor required");
            return Ok(LoginOutcome::TwoFactorRequired { challenge_token });
        }

        self.complete_login(&user, &device_id, req.unlink_device, mode)
            .await
            .map(LoginOutcome::Authenticated)
    }

    /// Second step of a login when TOTP is enabled.
    ///
    /// Accepts a current TOTP code or one unused backup code.
    pub async fn verify_two_factor(&self, req: &TwoFactorRequest, mode: LoginMode) -> ApiResult<LoginSuccess> {
        let claims = self.state.jwt.validate_challenge_token(&req.challenge_token)?;
        let user = self.load_user(claims.user_id()?).await?;
        let policy = self.state.config.lockout_policy();
        let now = Utc::now();

        if let Some(until) = user.locked_until.filter(|u| policy.is_locked(Some(*u), now)) {
            warn!(user_id = user.id, %until, "Second factor refused, account locked");
            return Err(AuthError::AccountLocked { until }.into());
        }

        let secret = match (&user.two_factor_secret, user.two_factor_enabled) {
            (Some(secret), true) => secret,
            _ => return Err(AuthError::TwoFactorNotEnrolled.into()),
        };

        let code = req.code.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let backup = req.backup_code.as_deref().map(str::trim).filter(|c| !c.is_empty());

        let passed = match (code, backup) {
            (Some(code), _) => {
                totp::verify_code(secret, code, &self.state.config.totp_issuer, &user.email)?
            }
            (None, Some(backup)) => self.state.db.users().consume_backup_code(user.id, backup).await?,
            (None, None) => false,
        };

        if !passed {
            let err = self
                .count_failure(&user, AuthError::InvalidTwoFactorCode, now)
                .await?;
            return Err(err.into());
        }

        self.complete_login(&user, &claims.device_id, claims.unlink_device, mode)
            .await
    }

    /// Counts a wrong password or second factor against the lockout.
    ///
    /// Returns the error to answer: `AccountLocked` when this failure
    /// locked the account, `wrong` otherwise.
    async fn count_failure(
        &self,
        user: &UserRecord,
        wrong: AuthError,
        now: DateTime<Utc>,
    ) -> ApiResult<AuthError> {
        let policy = self.state.config.lockout_policy();
        let failed = self
            .state
            .db
            .users()
            .record_failed_login(user.id, &policy, now)
            .await?;

        let lock = policy.lock_after(&failed, now);
        warn!(
            user_id = user.id,
            attempts = failed.failed_attempts,
            locked = lock.is_some(),
            reason = %wrong,
            "Authentication failure counted"
        );

        Ok(match lock {
            Some(until) => AuthError::AccountLocked { until },
            None => wrong,
        })
    }

    /// Device check, new active session id, credential issue.
    async fn complete_login(
        &self,
        user: &UserRecord,
        device_id: &str,
        unlink_requested: bool,
        mode: LoginMode,
    ) -> ApiResult<LoginSuccess> {
        let check = check_device(user.device_id.as_deref(), device_id, user.role, unlink_requested);

        if let DeviceCheck::Mismatch { can_unlink } = check {
            warn!(user_id = user.id, can_unlink, "Login from unbound device");
            return Err(AuthError::DeviceMismatch { can_unlink }.into());
        }

        let sid = new_opaque_id();
        let bind = check.needs_write().then_some(device_id);
        self.state
            .db
            .users()
            .record_login(user.id, &sid, bind, Utc::now())
            .await?;

        if check == DeviceCheck::Rebind {
            info!(user_id = user.id, "Admin moved device binding at login");
        }

        let credential = self.issue(user.id, user.role, device_id, &sid, mode).await?;
        info!(user_id = user.id, ?mode, "Login succeeded");

        Ok(LoginSuccess {
            profile: user.profile(),
            device_id: device_id.to_string(),
            credential,
        })
    }

    async fn issue(
        &self,
        user_id: i64,
        role: UserRole,
        device_id: &str,
        sid: &str,
        mode: LoginMode,
    ) -> ApiResult<IssuedCredential> {
        match mode {
            LoginMode::Web => {
                let token = new_opaque_id();
                self.state
                    .web_sessions
                    .insert(
                        token.clone(),
                        WebSession {
                            user_id,
                            tenant_id: user_id,
                            role,
                            active_session_id: sid.to_string(),
                            device_id: device_id.to_string(),
                            created_at: Utc::now(),
                        },
                    )
                    .await;
                Ok(IssuedCredential::Cookie { token })
            }
            LoginMode::Mobile => {
                let subject = TokenSubject {
                    user_id,
                    tenant_id: user_id,
                    role,
                    device_id,
                };
                Ok(IssuedCredential::Tokens(self.token_pair(&subject, sid)?))
            }
        }
    }

    fn token_pair(&self, subject: &TokenSubject<'_>, sid: &str) -> ApiResult<TokenPair> {
        let jwt = &self.state.jwt;
        Ok(TokenPair {
            access_token: jwt.generate_access_token(subject, sid)?,
            refresh_token: jwt.generate_refresh_token(subject, sid)?,
            token_type: "Bearer",
            expires_in: jwt.access_lifetime_secs(),
        })
    }

    /// Exchanges a refresh token for a new pair while its session is current.
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        let claims = self.state.jwt.validate_refresh_token(refresh_token)?;
        let user = self.load_user(claims.user_id()?).await?;

        let sid = match claims.sid.as_deref() {
            Some(sid) if user.active_session_id.as_deref() == Some(sid) => sid,
            _ => {
                warn!(user_id = user.id, "Refresh with replaced session");
                return Err(AuthError::SessionReplaced.into());
            }
        };

        let pair = self.token_pair(&subject(&user, &claims.device_id), sid)?;
        debug!(user_id = user.id, "Token refreshed");
        Ok(pair)
    }

    /// Resolves the caller: `Authorization: Bearer` first, then the session cookie.
    ///
    /// Either way the credential's session id must still be the account's
    /// active one. A stale web session is destroyed on the spot.
    pub async fn resolve(&self, headers: &HeaderMap) -> ApiResult<CurrentUser> {
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(extract_bearer_token);

        if let Some(token) = bearer {
            let claims = self.state.jwt.validate_access_token(token)?;
            let user = self.load_user(claims.user_id()?).await?;
            let sid = claims
                .sid
                .ok_or_else(|| AuthError::InvalidToken("missing sid".to_string()))?;

            if user.active_session_id.as_deref() != Some(sid.as_str()) {
                warn!(user_id = user.id, "Bearer token of a replaced session");
                return Err(AuthError::SessionReplaced.into());
            }

            return Ok(CurrentUser {
                user_id: user.id,
                tenant_id: user.id,
                role: user.role,
                session_id: sid,
                device_id: claims.device_id,
                credential: Credential::Bearer,
            });
        }

        let token = read_cookie(headers, SESSION_COOKIE).ok_or(AuthError::Unauthenticated)?;
        let sessions = &self.state.web_sessions;
        let session = sessions.get(&token).await.ok_or(AuthError::Unauthenticated)?;

        let Some(user) = self.state.db.users().get(session.user_id).await? else {
            sessions.remove(&token).await;
            return Err(AuthError::Unauthenticated.into());
        };

        if user.active_session_id.as_deref() != Some(session.active_session_id.as_str()) {
            sessions.remove(&token).await;
            warn!(user_id = user.id, "Web session replaced by a newer login");
            return Err(AuthError::SessionReplaced.into());
        }

        Ok(CurrentUser {
            user_id: user.id,
            tenant_id: session.tenant_id,
            role: user.role,
            session_id: session.active_session_id,
            device_id: session.device_id,
            credential: Credential::Cookie(token),
        })
    }

    /// Ends every session of the account.
    pub async fn logout(&self, current: &CurrentUser) -> ApiResult<()> {
        self.state
            .db
            .users()
            .set_active_session(current.user_id, None)
            .await?;

        let user_id = current.user_id;
        self.state
            .web_sessions
            .remove_where(|session| session.user_id == user_id)
            .await;

        info!(user_id, "Logged out");
        Ok(())
    }

    pub async fn profile(&self, current: &CurrentUser) -> ApiResult<UserProfile> {
        Ok(self.load_user(current.user_id).await?.profile())
    }

    /// Generates a TOTP secret and backup codes. Not active until confirmed.
    pub async fn enroll_two_factor(&self, current: &CurrentUser) -> ApiResult<Enrollment> {
        let user = self.load_user(current.user_id).await?;
        let enrollment = totp::enroll(&self.state.config.totp_issuer, &user.email)?;

        self.state
            .db
            .users()
            .store_two_factor_secret(user.id, &enrollment.secret, &enrollment.backup_codes)
            .await?;

        info!(user_id = user.id, "Two-factor enrollment started");
        Ok(enrollment)
    }

    pub async fn enable_two_factor(&self, current: &CurrentUser, code: &str) -> ApiResult<UserProfile> {
        let user = self.load_user(current.user_id).await?;
        let secret = user
            .two_factor_secret
            .as_deref()
            .ok_or(AuthError::TwoFactorNotEnrolled)?;

        if !totp::verify_code(secret, code, &self.state.config.totp_issuer, &user.email)? {
            return Err(AuthError::InvalidTwoFactorCode.into());
        }

        self.state.db.users().enable_two_factor(user.id).await?;
        info!(user_id = user.id, "Two-factor authentication enabled");

        Ok(self.load_user(user.id).await?.profile())
    }

    /// Admin only: binds the account to the requesting device and issues
    /// a fresh credential of the same kind.
    pub async fn rebind_device(
        &self,
        current: &CurrentUser,
        device: &DeviceSignals,
    ) -> ApiResult<LoginSuccess> {
        if !current.is_admin() {
            return Err(AuthError::Forbidden.into());
        }

        let device_id = device.device_id(&self.state.config.device_salt);
        let sid = new_opaque_id();
        self.state
            .db
            .users()
            .rebind_device(current.user_id, &device_id, &sid, Utc::now())
            .await?;

        let mode = match &current.credential {
            Credential::Cookie(old) => {
                self.state.web_sessions.remove(old).await;
                LoginMode::Web
            }
            Credential::Bearer => LoginMode::Mobile,
        };

        let credential = self
            .issue(current.user_id, current.role, &device_id, &sid, mode)
            .await?;
        info!(user_id = current.user_id, "Device binding moved");

        Ok(LoginSuccess {
            profile: self.profile(current).await?,
            device_id,
            credential,
        })
    }

    async fn load_user(&self, id: i64) -> ApiResult<UserRecord> {
        self.state
            .db
            .users()
            .get(id)
            .await?
            .ok_or_else(|| AuthError::Unauthenticated.into())
    }
}

/// Each account is its own tenant.
fn subject<'d>(user: &UserRecord, device_id: &'d str) -> TokenSubject<'d> {
    TokenSubject {
        user_id: user.id,
        tenant_id: user.id,
        role: user.role,
        device_id,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::tests::test_state;
    use axum::http::HeaderValue;
    use caixa_db::{Database, DbConfig};
    use totp_rs::{Algorithm, Secret, TOTP};

    pub(crate) const PASSWORD: &str = "S3nha!Forte";

    pub(crate) fn device(id: &str) -> DeviceSignals {
        DeviceSignals {
            header_id: Some(id.to_string()),
            ..DeviceSignals::default()
        }
    }

    pub(crate) fn register_request(name: &str) -> RegisterRequest {
        RegisterRequest {
            username: name.to_string(),
            email: format!("{name}@loja.com.br"),
            password: PASSWORD.to_string(),
            company_name: Some("Loja".to_string()),
        }
    }

    fn login_request(name: &str, password: &str) -> LoginRequest {
        LoginRequest {
            login: name.to_string(),
            password: password.to_string(),
            unlink_device: false,
        }
    }

    fn cookie_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}")).unwrap(),
        );
        headers
    }

    fn bearer_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    fn authenticated(outcome: LoginOutcome) -> LoginSuccess {
        match outcome {
            LoginOutcome::Authenticated(success) => success,
            LoginOutcome::TwoFactorRequired { .. } => panic!("unexpected 2FA challenge"),
        }
    }

    fn cookie_of(success: &LoginSuccess) -> String {
        match &success.credential {
            IssuedCredential::Cookie { token } => token.clone(),
            IssuedCredential::Tokens(_) => panic!("expected cookie"),
        }
    }

    fn tokens_of(success: &LoginSuccess) -> TokenPair {
        match &success.credential {
            IssuedCredential::Tokens(pair) => pair.clone(),
            IssuedCredential::Cookie { .. } => panic!("expected tokens"),
        }
    }

    fn current_code(secret: &str, email: &str) -> String {
        let bytes = Secret::Encoded(secret.to_string()).to_bytes().unwrap();
        TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, Some("Caixa".to_string()), email.to_string())
            .unwrap()
            .generate_current()
            .unwrap()
    }

    /// Registers `name` and logs in through the web flow.
    pub(crate) async fn web_login(state: &AppState, name: &str) -> CurrentUser {
        let auth = AuthService::new(state);
        auth.register(&register_request(name)).await.unwrap();
        let success = authenticated(
            auth.login(&login_request(name, PASSWORD), &device("d1"), LoginMode::Web)
                .await
                .unwrap(),
        );
        auth.resolve(&cookie_headers(&cookie_of(&success))).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let state = test_state().await;
        let auth = AuthService::new(&state);

        let weak = RegisterRequest {
            password: "12345678".to_string(),
            ..register_request("ana")
        };
        assert_eq!(auth.register(&weak).await.unwrap_err().code, "VALIDATION_ERROR");

        let profile = auth.register(&register_request("ana")).await.unwrap();
        assert_eq!(profile.role, UserRole::User);
        assert!(!profile.two_factor_enabled);

        let err = auth.register(&register_request("ana")).await.unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_admin_bootstrap_by_email() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = ServerConfig {
            admin_emails: vec!["dona@loja.com.br".to_string()],
            ..ServerConfig::default()
        };
        let state = AppState::new(db, config);

        let profile = AuthService::new(&state)
            .register(&register_request("dona"))
            .await
            .unwrap();
        assert_eq!(profile.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn test_web_login_resolves_by_cookie() {
        let state = test_state().await;
        let user = web_login(&state, "ana").await;

        assert!(matches!(user.credential, Credential::Cookie(_)));
        assert_eq!(user.tenant_id, user.user_id);
        assert_eq!(user.device_id, "d1");
    }

    #[tokio::test]
    async fn test_wrong_password_and_lockout() {
        let state = test_state().await;
        let auth = AuthService::new(&state);
        auth.register(&register_request("ana")).await.unwrap();

        for _ in 0..4 {
            let err = auth
                .login(&login_request("ana", "errada"), &device("d1"), LoginMode::Web)
                .await
                .unwrap_err();
            assert_eq!(err.code, "UNAUTHORIZED");
        }

        let err = auth
            .login(&login_request("ana", "errada"), &device("d1"), LoginMode::Web)
            .await
            .unwrap_err();
        assert_eq!(err.code, "ACCOUNT_LOCKED");

        // Correct password is refused while locked
        let err = auth
            .login(&login_request("ana", PASSWORD), &device("d1"), LoginMode::Web)
            .await
            .unwrap_err();
        assert_eq!(err.code, "ACCOUNT_LOCKED");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_wrong_passwords_still_lock() {
        let state = test_state().await;
        AuthService::new(&state)
            .register(&register_request("ana"))
            .await
            .unwrap();

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                tokio::spawn(async move {
                    AuthService::new(&state)
                        .login(&login_request("ana", "errada"), &device("d1"), LoginMode::Web)
                        .await
                        .unwrap_err()
                        .code
                })
            })
            .collect();

        let mut codes = Vec::new();
        for attempt in attempts {
            codes.push(attempt.await.unwrap());
        }
        assert!(codes.contains(&"ACCOUNT_LOCKED"), "codes: {codes:?}");

        let user = state.db.users().find_by_login("ana").await.unwrap().unwrap();
        assert!(user.failed_login_attempts >= 5);
        assert!(user.locked_until.is_some());

        let err = AuthService::new(&state)
            .login(&login_request("ana", PASSWORD), &device("d1"), LoginMode::Web)
            .await
            .unwrap_err();
        assert_eq!(err.code, "ACCOUNT_LOCKED");
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let state = test_state().await;
        let err = AuthService::new(&state)
            .login(&login_request("ninguem", PASSWORD), &device("d1"), LoginMode::Web)
            .await
            .unwrap_err();
        assert_eq!(err.code, "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_newer_login_replaces_older_session() {
        let state = test_state().await;
        let auth = AuthService::new(&state);
        let first = web_login(&state, "ana").await;
        let Credential::Cookie(old_cookie) = first.credential.clone() else {
            panic!("expected cookie");
        };

        let mobile = authenticated(
            auth.login(&login_request("ana", PASSWORD), &device("d1"), LoginMode::Mobile)
                .await
                .unwrap(),
        );
        let pair = tokens_of(&mobile);

        let err = auth.resolve(&cookie_headers(&old_cookie)).await.unwrap_err();
        assert_eq!(err.code, "SESSION_REPLACED");
        // The stale web session is gone for good
        let err = auth.resolve(&cookie_headers(&old_cookie)).await.unwrap_err();
        assert_eq!(err.code, "UNAUTHORIZED");

        let current = auth.resolve(&bearer_headers(&pair.access_token)).await.unwrap();
        assert_eq!(current.credential, Credential::Bearer);
    }

    #[tokio::test]
    async fn test_device_binding() {
        let state = test_state().await;
        let auth = AuthService::new(&state);
        web_login(&state, "ana").await;

        let err = auth
            .login(&login_request("ana", PASSWORD), &device("d2"), LoginMode::Web)
            .await
            .unwrap_err();
        assert_eq!(err.code, "DEVICE_MISMATCH");
        assert_eq!(err.details.unwrap()["can_unlink"], false);

        // Only admins may unlink
        let unlink = LoginRequest {
            unlink_device: true,
            ..login_request("ana", PASSWORD)
        };
        let err = auth.login(&unlink, &device("d2"), LoginMode::Web).await.unwrap_err();
        assert_eq!(err.code, "DEVICE_MISMATCH");
    }

    #[tokio::test]
    async fn test_admin_unlink_and_rebind() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = ServerConfig {
            admin_emails: vec!["dona@loja.com.br".to_string()],
            ..ServerConfig::default()
        };
        let state = AppState::new(db, config);
        let auth = AuthService::new(&state);
        web_login(&state, "dona").await;

        let err = auth
            .login(&login_request("dona", PASSWORD), &device("d2"), LoginMode::Web)
            .await
            .unwrap_err();
        assert_eq!(err.details.unwrap()["can_unlink"], true);

        let unlink = LoginRequest {
            unlink_device: true,
            ..login_request("dona", PASSWORD)
        };
        let success = authenticated(auth.login(&unlink, &device("d2"), LoginMode::Mobile).await.unwrap());
        assert_eq!(success.device_id, "d2");

        let current = auth
            .resolve(&bearer_headers(&tokens_of(&success).access_token))
            .await
            .unwrap();
        let moved = auth.rebind_device(&current, &device("d3")).await.unwrap();
        assert_eq!(moved.device_id, "d3");

        // The old bearer token belongs to a replaced session now
        let err = auth
            .resolve(&bearer_headers(&tokens_of(&success).access_token))
            .await
            .unwrap_err();
        assert_eq!(err.code, "SESSION_REPLACED");
    }

    #[tokio::test]
    async fn test_rebind_requires_admin() {
        let state = test_state().await;
        let user = web_login(&state, "ana").await;

        let err = AuthService::new(&state)
            .rebind_device(&user, &device("d9"))
            .await
            .unwrap_err();
        assert_eq!(err.code, "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_refresh_and_logout() {
        let state = test_state().await;
        let auth = AuthService::new(&state);
        auth.register(&register_request("ana")).await.unwrap();
        let success = authenticated(
            auth.login(&login_request("ana", PASSWORD), &device("d1"), LoginMode::Mobile)
                .await
                .unwrap(),
        );
        let pair = tokens_of(&success);

        let refreshed = auth.refresh(&pair.refresh_token).await.unwrap();
        assert_eq!(refreshed.token_type, "Bearer");
        // An access token is not a refresh token
        assert_eq!(auth.refresh(&pair.access_token).await.unwrap_err().code, "UNAUTHORIZED");

        let current = auth.resolve(&bearer_headers(&refreshed.access_token)).await.unwrap();
        auth.logout(&current).await.unwrap();

        assert_eq!(
            auth.refresh(&pair.refresh_token).await.unwrap_err().code,
            "SESSION_REPLACED"
        );
        assert_eq!(
            auth.resolve(&bearer_headers(&refreshed.access_token))
                .await
                .unwrap_err()
                .code,
            "SESSION_REPLACED"
        );
    }

    #[tokio::test]
    async fn test_two_factor_flow() {
        let state = test_state().await;
        let auth = AuthService::new(&state);
        let current = web_login(&state, "ana").await;

        let enrollment = auth.enroll_two_factor(&current).await.unwrap();
        assert_eq!(
            auth.enable_two_factor(&current, "000000").await.unwrap_err().code,
            "UNAUTHORIZED"
        );
        let code = current_code(&enrollment.secret, "ana@loja.com.br");
        let profile = auth.enable_two_factor(&current, &code).await.unwrap();
        assert!(profile.two_factor_enabled);

        let outcome = auth
            .login(&login_request("ana", PASSWORD), &device("d1"), LoginMode::Mobile)
            .await
            .unwrap();
        let LoginOutcome::TwoFactorRequired { challenge_token } = outcome else {
            panic!("expected a challenge");
        };

        let backup = TwoFactorRequest {
            challenge_token: challenge_token.clone(),
            code: None,
            backup_code: Some(enrollment.backup_codes[0].to_lowercase()),
        };
        let success = auth.verify_two_factor(&backup, LoginMode::Mobile).await.unwrap();
        assert_eq!(success.profile.username, "ana");

        // Backup codes are single use
        let err = auth.verify_two_factor(&backup, LoginMode::Mobile).await.unwrap_err();
        assert_eq!(err.code, "UNAUTHORIZED");

        let totp = TwoFactorRequest {
            challenge_token,
            code: Some(current_code(&enrollment.secret, "ana@loja.com.br")),
            backup_code: None,
        };
        assert!(auth.verify_two_factor(&totp, LoginMode::Web).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_second_factor_counts_toward_lockout() {
        let state = test_state().await;
        let auth = AuthService::new(&state);
        let current = web_login(&state, "ana").await;

        let enrollment = auth.enroll_two_factor(&current).await.unwrap();
        let code = current_code(&enrollment.secret, "ana@loja.com.br");
        auth.enable_two_factor(&current, &code).await.unwrap();

        let outcome = auth
            .login(&login_request("ana", PASSWORD), &device("d1"), LoginMode::Web)
            .await
            .unwrap();
        let LoginOutcome::TwoFactorRequired { challenge_token } = outcome else {
            panic!("expected a challenge");
        };

        let wrong: String = code
            .chars()
            .map(|c| char::from(b'0' + (c as u8 - b'0' + 5) % 10))
            .collect();
        let guess = TwoFactorRequest {
            challenge_token: challenge_token.clone(),
            code: Some(wrong),
            backup_code: None,
        };

        for _ in 0..4 {
            let err = auth.verify_two_factor(&guess, LoginMode::Web).await.unwrap_err();
            assert_eq!(err.code, "UNAUTHORIZED");
        }
        let err = auth.verify_two_factor(&guess, LoginMode::Web).await.unwrap_err();
        assert_eq!(err.code, "ACCOUNT_LOCKED");

        // The right code no longer helps on the same challenge
        let right = TwoFactorRequest {
            challenge_token,
            code: Some(current_code(&enrollment.secret, "ana@loja.com.br")),
            backup_code: None,
        };
        let err = auth.verify_two_factor(&right, LoginMode::Web).await.unwrap_err();
        assert_eq!(err.code, "ACCOUNT_LOCKED");
    }

    #[tokio::test]
    async fn test_enable_without_enrollment() {
        let state = test_state().await;
        let current = web_login(&state, "ana").await;

        let err = AuthService::new(&state)
            .enable_two_factor(&current, "123456")
            .await
            .unwrap_err();
        assert_eq!(err.code, "VALIDATION_ERROR");
    }
}
