//! # HTTP Routes
//!
//! ```text
//! GET  /health
//!
//! POST /api/auth/register                     RegisterRequest     → profile
//! POST /api/auth/login                        LoginRequest        → cookie session
//! POST /api/auth/token                        LoginRequest        → JWT pair
//! POST /api/auth/2fa/verify                   TwoFactorRequest    → cookie session
//! POST /api/auth/token/2fa                    TwoFactorRequest    → JWT pair
//! POST /api/auth/refresh                      { refresh_token }   → JWT pair
//! POST /api/auth/logout                                    (auth)
//! GET  /api/auth/me                                        (auth)
//! POST /api/auth/2fa/enroll                                (auth)
//! POST /api/auth/2fa/enable                   { code }     (auth)
//! POST /api/auth/device/rebind                             (admin)
//!
//! POST /api/caixa/abrir                       { opening_balance, notes? }
//! POST /api/caixa/fechar                      { closing_balance, notes? }
//! POST /api/caixa/movimentos                  { type, origin, amount, ... }
//! POST /api/caixa/venda                       { payment_method, product_id?, quantity?, amount? }
//! GET  /api/caixa/atual
//! GET  /api/caixa/dashboard
//! GET  /api/caixa/sessoes                     ?status&page&per_page
//! GET  /api/caixa/sessoes/{id}
//! POST /api/caixa/sessoes/{id}/importar       raw text/csv body
//! POST /api/caixa/sessoes/{id}/importar/confirmar   { mapping }
//! GET  /api/caixa/sessoes/{id}/exportar/{formato}   ?from&to
//!
//! GET  /api/produtos
//! POST /api/produtos
//! ```
//!
//! Every `/api/caixa` and `/api/produtos` route takes [`CurrentUser`], so
//! the bearer-or-cookie check and the single-session check run first.
//! Bodies, queries and paths go through [`ApiJson`], [`ApiQuery`] and
//! [`ApiPath`]; a malformed request answers `VALIDATION_ERROR` like any
//! other rule.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use caixa_core::report::ExportFormat;
use caixa_core::UserProfile;

use crate::auth::device::DEVICE_COOKIE;
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiPath, ApiQuery, ClientDevice, CurrentUser, SESSION_COOKIE};
use crate::services::auth_service::{
    AuthService, IssuedCredential, LoginMode, LoginOutcome, LoginRequest, LoginSuccess,
    RegisterRequest, TokenPair, TwoFactorRequest,
};
use crate::services::cash_service::{
    CashService, CloseSessionRequest, ConfirmImportRequest, ExportQuery, MovementRequest,
    OpenSessionRequest, ProductRequest, QuickSaleRequest, SessionListQuery,
};
use crate::services::health_service;
use crate::state::AppState;

/// One year; the device cookie only identifies the browser.
const DEVICE_COOKIE_MAX_AGE: i64 = 365 * 24 * 3600;

pub fn router(state: AppState) -> Router {
    let auth = Router::new()
        .route("/register", post(register))
        .route("/login", post(login_web))
        .route("/token", post(login_mobile))
        .route("/2fa/verify", post(verify_two_factor_web))
        .route("/token/2fa", post(verify_two_factor_mobile))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/2fa/enroll", post(enroll_two_factor))
        .route("/2fa/enable", post(enable_two_factor))
        .route("/device/rebind", post(rebind_device));

    let caixa = Router::new()
        .route("/abrir", post(open_session))
        .route("/fechar", post(close_session))
        .route("/movimentos", post(record_movement))
        .route("/venda", post(quick_sale))
        .route("/atual", get(current_session))
        .route("/dashboard", get(dashboard))
        .route("/sessoes", get(list_sessions))
        .route("/sessoes/{id}", get(session_detail))
        .route("/sessoes/{id}/importar", post(import_preview))
        .route("/sessoes/{id}/importar/confirmar", post(import_confirm))
        .route("/sessoes/{id}/exportar/{formato}", get(export_session));

    let produtos = Router::new().route("/", get(list_products).post(create_product));

    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth)
        .nest("/api/caixa", caixa)
        .nest("/api/produtos", produtos)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<AppState>) -> Response {
    let report = health_service::check(&state).await;
    let status = if report.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

// =============================================================================
// Auth Handlers
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LoginResponse {
    Authenticated {
        user: UserProfile,
        device_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens: Option<TokenPair>,
    },
    TwoFactorRequired {
        challenge_token: String,
    },
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct CodeRequest {
    code: String,
}

fn session_cookie(state: &AppState, token: &str) -> String {
    let secure = if state.config.secure_cookies { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{secure}",
        state.config.web_session_lifetime_secs
    )
}

fn device_cookie(state: &AppState, device_id: &str) -> String {
    let secure = if state.config.secure_cookies { "; Secure" } else { "" };
    format!(
        "{DEVICE_COOKIE}={device_id}; Path=/; HttpOnly; SameSite=Lax; Max-Age={DEVICE_COOKIE_MAX_AGE}{secure}"
    )
}

/// Renders a completed login: cookies for the web, a token pair for mobile.
fn login_response(state: &AppState, success: LoginSuccess) -> Response {
    let LoginSuccess {
        profile,
        device_id,
        credential,
    } = success;

    match credential {
        IssuedCredential::Cookie { token } => {
            let cookies = AppendHeaders([
                (header::SET_COOKIE, session_cookie(state, &token)),
                (header::SET_COOKIE, device_cookie(state, &device_id)),
            ]);
            let body = LoginResponse::Authenticated {
                user: profile,
                device_id,
                tokens: None,
            };
            (cookies, Json(body)).into_response()
        }
        IssuedCredential::Tokens(pair) => Json(LoginResponse::Authenticated {
            user: profile,
            device_id,
            tokens: Some(pair),
        })
        .into_response(),
    }
}

fn outcome_response(state: &AppState, outcome: LoginOutcome) -> Response {
    match outcome {
        LoginOutcome::Authenticated(success) => login_response(state, success),
        LoginOutcome::TwoFactorRequired { challenge_token } => {
            Json(LoginResponse::TwoFactorRequired { challenge_token }).into_response()
        }
    }
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserProfile>)> {
    let profile = AuthService::new(&state).register(&req).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn login_web(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let outcome = AuthService::new(&state).login(&req, &device, LoginMode::Web).await?;
    Ok(outcome_response(&state, outcome))
}

async fn login_mobile(
    State(state): State<AppState>,
    ClientDevice(device): ClientDevice,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let outcome = AuthService::new(&state)
        .login(&req, &device, LoginMode::Mobile)
        .await?;
    Ok(outcome_response(&state, outcome))
}

async fn verify_two_factor_web(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TwoFactorRequest>,
) -> ApiResult<Response> {
    let success = AuthService::new(&state)
        .verify_two_factor(&req, LoginMode::Web)
        .await?;
    Ok(login_response(&state, success))
}

async fn verify_two_factor_mobile(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TwoFactorRequest>,
) -> ApiResult<Response> {
    let success = AuthService::new(&state)
        .verify_two_factor(&req, LoginMode::Mobile)
        .await?;
    Ok(login_response(&state, success))
}

async fn refresh(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let pair = AuthService::new(&state).refresh(&req.refresh_token).await?;
    Ok(Json(pair))
}

async fn logout(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Response> {
    AuthService::new(&state).logout(&user).await?;

    let expired = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, expired)]).into_response())
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<UserProfile>> {
    Ok(Json(AuthService::new(&state).profile(&user).await?))
}

async fn enroll_two_factor(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Response> {
    let enrollment = AuthService::new(&state).enroll_two_factor(&user).await?;
    Ok(Json(enrollment).into_response())
}

async fn enable_two_factor(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CodeRequest>,
) -> ApiResult<Json<UserProfile>> {
    let profile = AuthService::new(&state)
        .enable_two_factor(&user, &req.code)
        .await?;
    Ok(Json(profile))
}

async fn rebind_device(
    State(state): State<AppState>,
    user: CurrentUser,
    ClientDevice(device): ClientDevice,
) -> ApiResult<Response> {
    let success = AuthService::new(&state).rebind_device(&user, &device).await?;
    Ok(login_response(&state, success))
}

// =============================================================================
// Caixa Handlers
// =============================================================================

async fn open_session(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<OpenSessionRequest>,
) -> ApiResult<Response> {
    let session = CashService::new(&state).open(user.tenant_id, &req).await?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

async fn close_session(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CloseSessionRequest>,
) -> ApiResult<Response> {
    let outcome = CashService::new(&state).close(user.tenant_id, &req).await?;
    Ok(Json(outcome).into_response())
}

async fn record_movement(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<MovementRequest>,
) -> ApiResult<Response> {
    let movement = CashService::new(&state)
        .record_movement(user.tenant_id, &req)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)).into_response())
}

async fn quick_sale(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<QuickSaleRequest>,
) -> ApiResult<Response> {
    let receipt = CashService::new(&state).quick_sale(user.tenant_id, &req).await?;
    Ok((StatusCode::CREATED, Json(receipt)).into_response())
}

async fn current_session(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Response> {
    let session = CashService::new(&state).current(user.tenant_id).await?;
    Ok(Json(session).into_response())
}

async fn dashboard(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Response> {
    let summary = CashService::new(&state).dashboard(user.tenant_id).await?;
    Ok(Json(summary).into_response())
}

async fn list_sessions(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<SessionListQuery>,
) -> ApiResult<Response> {
    let page = CashService::new(&state).list(user.tenant_id, &query).await?;
    Ok(Json(page).into_response())
}

async fn session_detail(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Response> {
    let detail = CashService::new(&state).detail(user.tenant_id, id).await?;
    Ok(Json(detail).into_response())
}

async fn import_preview(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Response> {
    let body = body?;
    let preview = CashService::new(&state)
        .import_preview(user.tenant_id, id, &body)
        .await?;
    Ok(Json(preview).into_response())
}

async fn import_confirm(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ConfirmImportRequest>,
) -> ApiResult<Response> {
    let outcome = CashService::new(&state)
        .import_confirm(user.tenant_id, id, &req)
        .await?;
    Ok(Json(outcome).into_response())
}

async fn export_session(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath((id, formato)): ApiPath<(i64, String)>,
    ApiQuery(query): ApiQuery<ExportQuery>,
) -> ApiResult<Response> {
    let format: ExportFormat = formato.parse()?;
    let file = CashService::new(&state)
        .export(user.tenant_id, id, format, &query)
        .await?;

    let headers = [
        (header::CONTENT_TYPE, file.content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.file_name),
        ),
    ];
    Ok((headers, file.bytes).into_response())
}

// =============================================================================
// Product Handlers
// =============================================================================

async fn list_products(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Response> {
    let products = CashService::new(&state).list_products(user.tenant_id).await?;
    Ok(Json(products).into_response())
}

async fn create_product(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ProductRequest>,
) -> ApiResult<Response> {
    let product = CashService::new(&state)
        .create_product(user.tenant_id, &req)
        .await?;
    Ok((StatusCode::CREATED, Json(product)).into_response())
}

// =============================================================================
// Unit Tests
// =============================================================================
