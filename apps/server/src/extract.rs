//! Request extractors.
//!
//! - [`CurrentUser`] - the authenticated caller, bearer token first, cookie second
//! - [`ClientDevice`] - signals used to derive the device identifier
//! - [`ApiJson`], [`ApiQuery`], [`ApiPath`] - axum's extractors with their
//!   rejections turned into [`ApiError`], so a malformed request still gets
//!   a `{code, message}` body

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::{header, request::Parts, HeaderMap};
use axum::Json;
use serde::de::DeserializeOwned;

use caixa_core::{TenantId, UserRole};

use crate::auth::device::DeviceSignals;
use crate::error::ApiError;
use crate::services::auth_service::AuthService;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "caixa_session";

/// Reads one cookie from the `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// How the caller proved who they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer,
    /// Web session cookie; carries the cookie token
    Cookie(String),
}

/// The authenticated caller of a request.
///
/// ## Usage in Handlers
/// ```rust,ignore
/// async fn current_session(State(state): State<AppState>, user: CurrentUser) -> ApiResult<...> {
///     state.db.sessions().current(user.tenant_id).await?;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub tenant_id: TenantId,
    pub role: UserRole,
    /// Active session id this credential was issued for
    pub session_id: String,
    pub device_id: String,
    pub credential: Credential,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        AuthService::new(state).resolve(&parts.headers).await
    }
}

/// Device signals of the request, including the peer address when the
/// server runs with connect info.
#[derive(Debug, Clone)]
pub struct ClientDevice(pub DeviceSignals);

impl<S: Send + Sync> FromRequestParts<S> for ClientDevice {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientDevice(DeviceSignals::from_headers(&parts.headers, peer)))
    }
}

// =============================================================================
// Body, Query & Path
// =============================================================================

/// JSON request body.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// Query string.
#[derive(Debug, Clone)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

/// Path parameters.
#[derive(Debug, Clone)]
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_read_cookie() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; caixa_session=abc123"));
        headers.append(header::COOKIE, HeaderValue::from_static("device_id=d1"));

        assert_eq!(read_cookie(&headers, SESSION_COOKIE).as_deref(), Some("abc123"));
        assert_eq!(read_cookie(&headers, "device_id").as_deref(), Some("d1"));
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("caixa_session="));
        assert_eq!(read_cookie(&headers, SESSION_COOKIE), None);
    }
}
