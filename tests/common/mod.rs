#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;
use warden::{
    ServerConfig,
    auth::CookieSettings,
    create_app, create_app_with_refresh_store,
    db::{Database, NewUser, RefreshTokenStore, Role, UserDirectory},
    jwt::{DEFAULT_ISSUER, TokenCodec, TokenLifetimes},
    keys::{KeyMaterial, generate_rsa_pem},
    password::PasswordHasher,
    rate_limit::RateLimits,
};

pub const TEST_SECRET: &[u8] = b"integration-test-refresh-secret-0123456789";

/// Rate limits high enough that tests never hit them.
pub const RELAXED_LIMITS: RateLimits = RateLimits {
    login_burst: 10_000,
    register_per_minute: 10_000,
};

/// One RSA key pair per test binary; generating keys is slow.
pub fn key_pair() -> &'static (Vec<u8>, Vec<u8>) {
    static PAIR: OnceLock<(Vec<u8>, Vec<u8>)> = OnceLock::new();
    PAIR.get_or_init(|| generate_rsa_pem(2048).expect("Failed to generate RSA key pair"))
}

pub fn test_keys() -> KeyMaterial {
    let (private_pem, public_pem) = key_pair();
    KeyMaterial::from_pem(private_pem, Some(public_pem), TEST_SECRET)
        .expect("Failed to load test keys")
}

/// A codec matching the one inside the test app.
pub fn test_codec() -> TokenCodec {
    TokenCodec::new(test_keys(), DEFAULT_ISSUER, TokenLifetimes::default())
}

pub async fn test_config() -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");

    ServerConfig {
        db,
        keys: test_keys(),
        issuer: DEFAULT_ISSUER.to_string(),
        lifetimes: TokenLifetimes::default(),
        cookies: CookieSettings::default(),
        rate_limits: RELAXED_LIMITS,
        trust_forwarded_for: false,
        passwords: PasswordHasher::with_cost(4),
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub codec: TokenCodec,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Request failed")
    }

    /// Number of live refresh token records for a user.
    pub async fn refresh_count(&self, user_id: i64) -> u64 {
        self.db
            .refresh_tokens(TokenLifetimes::default().refresh_secs)
            .count_for_user(user_id)
            .await
            .expect("Failed to count refresh tokens")
    }

    pub async fn register(&self, email: &str, password: &str) -> Session {
        let response = self
            .send(json_request(
                "POST",
                "/auth/register",
                serde_json::json!({ "email": email, "password": password }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        Session::from_response(response).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Session {
        let response = self
            .send(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({ "email": email, "password": password }),
                None,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        Session::from_response(response).await
    }

    /// Create an admin directly in the database and log them in.
    pub async fn admin_session(&self) -> Session {
        let password = "admin-password";
        let password_hash = PasswordHasher::with_cost(4)
            .hash(password)
            .await
            .expect("Failed to hash password");
        self.db
            .users()
            .create_user(&NewUser {
                first_name: "Ada".to_string(),
                last_name: "Admin".to_string(),
                email: "admin@x.com".to_string(),
                password_hash,
                role: Role::Admin,
                tenant_id: None,
            })
            .await
            .expect("Failed to create admin");
        self.login("admin@x.com", password).await
    }
}

pub async fn create_test_app() -> TestApp {
    let config = test_config().await;
    TestApp {
        app: create_app(&config),
        db: config.db.clone(),
        codec: test_codec(),
    }
}

pub async fn create_test_app_with_limits(limits: RateLimits) -> TestApp {
    let mut config = test_config().await;
    config.rate_limits = limits;
    TestApp {
        app: create_app(&config),
        db: config.db.clone(),
        codec: test_codec(),
    }
}

/// Test app whose refresh token store is supplied by the caller.
pub async fn create_test_app_with_store(store: Arc<dyn RefreshTokenStore>) -> TestApp {
    let config = test_config().await;
    TestApp {
        app: create_app_with_refresh_store(&config, store),
        db: config.db.clone(),
        codec: test_codec(),
    }
}

/// Tokens handed out by register, login or refresh.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub access: String,
    pub refresh: String,
    pub set_cookies: Vec<String>,
}

impl Session {
    pub async fn from_response(response: Response<Body>) -> Self {
        let set_cookies = extract_set_cookies(&response);
        let access = cookie_value(&set_cookies, "accessToken").expect("No access token cookie");
        let refresh =
            cookie_value(&set_cookies, "refreshToken").expect("No refresh token cookie");
        let body = body_json(response).await;
        let id = body["id"].as_i64().expect("No id in response");
        Self {
            id,
            access,
            refresh,
            set_cookies,
        }
    }

    pub fn cookies(&self) -> String {
        format!("accessToken={}; refreshToken={}", self.access, self.refresh)
    }

    pub fn access_cookie(&self) -> String {
        format!("accessToken={}", self.access)
    }

    pub fn refresh_cookie(&self) -> String {
        format!("refreshToken={}", self.refresh)
    }
}

pub fn json_request(
    method: &str,
    uri: &str,
    body: serde_json::Value,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

pub fn request(method: &str, uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder.body(Body::empty()).expect("Failed to build request")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Value of a cookie set by the response, if any.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    cookies.iter().find_map(|c| {
        let (pair, _) = c.split_once(';').unwrap_or((c.as_str(), ""));
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Check if cookies contain a token being cleared (Max-Age=0)
pub fn has_cleared_cookie(cookies: &[String], cookie_name: &str) -> bool {
    cookies
        .iter()
        .any(|c| c.starts_with(&format!("{}=;", cookie_name)) && c.contains("Max-Age=0"))
}
