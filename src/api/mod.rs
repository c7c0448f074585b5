mod auth;
mod error;
mod tenants;
mod users;

use axum::{Json, Router, routing::get};
use std::sync::Arc;

use crate::auth::CookieSettings;
use crate::db::{Database, RefreshTokenStore};
use crate::jwt::TokenCodec;
use crate::password::PasswordHasher;
use crate::rate_limit::RateLimitConfig;
use crate::service::CredentialService;

pub use auth::AuthState;
pub use error::ApiError;
pub use tenants::TenantsState;
pub use users::UsersState;

/// Everything the API handlers share.
pub struct ApiContext {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub cookies: CookieSettings,
    pub passwords: PasswordHasher,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

/// Create the API router.
pub fn create_api_router(ctx: ApiContext) -> Router {
    let service = CredentialService::new(
        ctx.codec.clone(),
        ctx.refresh_tokens.clone(),
        Arc::new(ctx.db.users()),
        ctx.passwords,
    );

    let auth_state = AuthState {
        service,
        users: ctx.db.users(),
        codec: ctx.codec.clone(),
        refresh_tokens: ctx.refresh_tokens.clone(),
        cookies: ctx.cookies.clone(),
        rate_limit_config: ctx.rate_limit_config,
    };

    let tenants_state = TenantsState {
        tenants: ctx.db.tenants(),
        codec: ctx.codec.clone(),
        refresh_tokens: ctx.refresh_tokens.clone(),
        cookies: ctx.cookies.clone(),
    };

    let users_state = UsersState {
        users: ctx.db.users(),
        tenants: ctx.db.tenants(),
        passwords: ctx.passwords,
        codec: ctx.codec,
        refresh_tokens: ctx.refresh_tokens,
        cookies: ctx.cookies,
    };

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(auth_state))
        .nest("/tenants", tenants::router(tenants_state))
        .nest("/users", users::router(users_state))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "UP" }))
}
