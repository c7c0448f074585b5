pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod keys;
pub mod password;
pub mod rate_limit;
pub mod service;

use api::{ApiContext, create_api_router};
use auth::CookieSettings;
use axum::Router;
use db::{Database, RefreshTokenStore};
use jwt::{TokenCodec, TokenLifetimes};
use keys::KeyMaterial;
use password::PasswordHasher;
use rate_limit::{RateLimitConfig, RateLimits};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Access token signing keys and refresh token secret
    pub keys: KeyMaterial,
    /// Issuer claim for every token
    pub issuer: String,
    pub lifetimes: TokenLifetimes,
    /// Cookie domain and Secure flag
    pub cookies: CookieSettings,
    pub rate_limits: RateLimits,
    /// Trust X-Forwarded-For for the client IP (requires running behind a proxy)
    pub trust_forwarded_for: bool,
    pub passwords: PasswordHasher,
}

impl ServerConfig {
    /// The SQLite refresh token store for this configuration.
    pub fn refresh_token_store(&self) -> Arc<dyn RefreshTokenStore> {
        Arc::new(self.db.refresh_tokens(self.lifetimes.refresh_secs))
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    create_app_with_refresh_store(config, config.refresh_token_store())
}

/// Create the application router with a specific refresh token store.
pub fn create_app_with_refresh_store(
    config: &ServerConfig,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
) -> Router {
    let codec = Arc::new(TokenCodec::new(
        config.keys.clone(),
        config.issuer.clone(),
        config.lifetimes,
    ));

    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.rate_limits,
        config.trust_forwarded_for,
    ));

    create_api_router(ApiContext {
        db: config.db.clone(),
        codec,
        refresh_tokens,
        cookies: config.cookies.clone(),
        passwords: config.passwords,
        rate_limit_config,
    })
}

/// Sweep expired refresh tokens now and then hourly in the background.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    let refresh_tokens = config.refresh_token_store();
    cleanup::run_cleanup(refresh_tokens.as_ref()).await;
    cleanup::spawn_cleanup_scheduler(refresh_tokens);
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
