//! Authentication API endpoints.
//!
//! - POST `/register` - Create a customer account and sign in
//! - POST `/login` - Exchange email and password for tokens
//! - GET `/self` - The signed in user
//! - POST `/refresh` - Rotate the refresh token and issue a new access token
//! - POST `/logout` - Revoke the refresh token and clear cookies

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ResultExt, validate_email};
use crate::auth::{Authenticated, CookieSettings, PresentedRefreshToken, RefreshSession};
use crate::db::{RefreshTokenStore, UserStore};
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::service::{CredentialService, IssuedCredentials, Registration};

/// Minimum accepted password length.
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone)]
pub struct AuthState {
    pub service: CredentialService,
    pub users: UserStore,
    pub codec: Arc<TokenCodec>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub cookies: CookieSettings,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_login,
        ));

    let session_router = Router::new()
        .route("/self", get(current_user))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .with_state(state);

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(session_router)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct IdResponse {
    id: i64,
}

/// Respond with the user id and both token cookies.
fn credentials_response(
    status: StatusCode,
    cookies: &CookieSettings,
    issued: IssuedCredentials,
) -> Response {
    (
        status,
        AppendHeaders([
            (SET_COOKIE, cookies.access_cookie(&issued.access)),
            (SET_COOKIE, cookies.refresh_cookie(&issued.refresh)),
        ]),
        Json(IdResponse {
            id: issued.user_id,
        }),
    )
        .into_response()
}

async fn register(
    State(state): State<AuthState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&payload.email)?.to_string();

    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let issued = state
        .service
        .register(Registration {
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            email,
            password: payload.password,
        })
        .await?;

    Ok(credentials_response(
        StatusCode::CREATED,
        &state.cookies,
        issued,
    ))
}

async fn login(
    State(state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&payload.email)?;
    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password is required"));
    }

    let issued = state.service.login(email, &payload.password).await?;

    Ok(credentials_response(StatusCode::OK, &state.cookies, issued))
}

/// The signed in user, without the password hash.
async fn current_user(
    State(state): State<AuthState>,
    Authenticated(claims): Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims
        .user_id()
        .ok_or_else(|| ApiError::bad_request("Invalid subject"))?;

    let user = state
        .users
        .get_by_id(user_id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(user))
}

async fn refresh(
    State(state): State<AuthState>,
    RefreshSession(claims): RefreshSession,
) -> Result<impl IntoResponse, ApiError> {
    let issued = state.service.refresh(&claims).await?;

    Ok(credentials_response(StatusCode::OK, &state.cookies, issued))
}

async fn logout(
    State(state): State<AuthState>,
    Authenticated(access): Authenticated,
    PresentedRefreshToken(refresh): PresentedRefreshToken,
) -> Result<impl IntoResponse, ApiError> {
    state.service.logout(&access, refresh.as_ref()).await?;

    let [clear_access, clear_refresh] = state.cookies.clear_all();
    Ok((
        StatusCode::OK,
        AppendHeaders([(SET_COOKIE, clear_access), (SET_COOKIE, clear_refresh)]),
        Json(serde_json::json!({})),
    ))
}
