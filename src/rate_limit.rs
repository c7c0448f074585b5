//! Rate limiting for the login and registration endpoints.
//!
//! Uses a token bucket per client IP to slow down password guessing.

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Bucket key used when the client address cannot be determined.
const UNKNOWN_CLIENT: &str = "unknown";

/// Request budgets for the limited endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    /// Login attempts per IP: refills one per second up to this burst.
    pub login_burst: u32,
    /// Registrations per IP per minute.
    pub register_per_minute: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            login_burst: 5,
            register_per_minute: 3,
        }
    }
}

/// Rate limiting state shared by the middleware.
pub struct RateLimitConfig {
    pub login: IpLimiter,
    pub register: IpLimiter,
    /// Take the client IP from `X-Forwarded-For` (only behind a trusted proxy).
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    pub fn new(limits: RateLimits, trust_forwarded_for: bool) -> Self {
        let login_burst = NonZeroU32::new(limits.login_burst).unwrap_or(NonZeroU32::MIN);
        let register = NonZeroU32::new(limits.register_per_minute).unwrap_or(NonZeroU32::MIN);

        Self {
            login: RateLimiter::keyed(
                Quota::per_second(NonZeroU32::MIN).allow_burst(login_burst),
            ),
            register: RateLimiter::keyed(Quota::per_minute(register)),
            trust_forwarded_for,
        }
    }
}

/// Determine the rate limit key for a request.
///
/// `X-Forwarded-For` (first entry) when trusted, else the socket address,
/// else one shared bucket.
pub fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn too_many_requests(message: &'static str) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_key(&request, config.trust_forwarded_for);

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(%ip, "Login rate limit exceeded");
            too_many_requests("Too many login attempts. Please wait before trying again.")
        }
    }
}

/// Middleware for rate limiting registrations.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_key(&request, config.trust_forwarded_for);

    match config.register.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(%ip, "Registration rate limit exceeded");
            too_many_requests("Too many signup attempts. Please wait before trying again.")
        }
    }
}
