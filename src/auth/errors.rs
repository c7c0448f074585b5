//! Authentication error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::CookieSettings;
use crate::jwt::{IssueError, VerificationFailure};

/// Every way a credential operation can fail, as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Key material is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("no credential presented")]
    MissingCredential,
    /// Bad signature, expired or malformed token.
    #[error("invalid credential")]
    InvalidCredential,
    /// Signature was fine but the backing record is gone.
    #[error("credential revoked")]
    Revoked,
    #[error("role not permitted")]
    AuthorizationDenied,
    #[error("email or password does not match")]
    CredentialMismatch,
    #[error("email already exists")]
    DuplicateIdentity,
    /// The revocation check could not be completed.
    #[error("credential store unavailable")]
    Unavailable,
    #[error("internal error")]
    Internal,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredential | AuthError::InvalidCredential | AuthError::Revoked => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::AuthorizationDenied => StatusCode::FORBIDDEN,
            AuthError::CredentialMismatch | AuthError::DuplicateIdentity => StatusCode::BAD_REQUEST,
            AuthError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Configuration(_) | AuthError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message. Revoked and invalid tokens read the same.
    pub fn message(&self) -> &'static str {
        match self {
            AuthError::MissingCredential => "Not authenticated",
            AuthError::InvalidCredential | AuthError::Revoked => "Invalid or expired token",
            AuthError::AuthorizationDenied => "Insufficient permissions",
            AuthError::CredentialMismatch => "Email or password does not match.",
            AuthError::DuplicateIdentity => "Email already exists",
            AuthError::Unavailable => "Unable to verify credentials",
            AuthError::Configuration(_) | AuthError::Internal => "Internal server error",
        }
    }

    /// Log an infrastructure failure and collapse it to `Internal`.
    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "{}", context);
        AuthError::Internal
    }
}

impl From<VerificationFailure> for AuthError {
    fn from(failure: VerificationFailure) -> Self {
        tracing::debug!(%failure, "Token rejected");
        AuthError::InvalidCredential
    }
}

impl From<IssueError> for AuthError {
    fn from(e: IssueError) -> Self {
        match e {
            IssueError::Configuration(e) => {
                tracing::error!(error = %e, "Cannot issue token");
                AuthError::Configuration(e.0)
            }
            IssueError::Encoding(e) => AuthError::internal("Failed to encode token", e),
            e @ IssueError::Lifetime(_) => AuthError::internal("Cannot issue token", e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response()
    }
}

/// Rejection produced by the request gates.
///
/// 401 rejections also clear both auth cookies so the client stops sending them.
#[derive(Debug)]
pub struct GateRejection {
    pub error: AuthError,
    pub(super) cookies: CookieSettings,
}

impl GateRejection {
    pub(super) fn new(error: AuthError, cookies: &CookieSettings) -> Self {
        Self {
            error,
            cookies: cookies.clone(),
        }
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let clear = self.error.status_code() == StatusCode::UNAUTHORIZED;
        let mut response = self.error.into_response();

        if clear {
            let headers = response.headers_mut();
            for cookie in self.cookies.clear_all() {
                if let Ok(value) = HeaderValue::from_str(&cookie) {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revoked_and_invalid_are_indistinguishable() {
        assert_eq!(
            AuthError::Revoked.status_code(),
            AuthError::InvalidCredential.status_code()
        );
        assert_eq!(
            AuthError::Revoked.message(),
            AuthError::InvalidCredential.message()
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::MissingCredential.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AuthorizationDenied.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::CredentialMismatch.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::DuplicateIdentity.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Configuration("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unauthorized_rejection_clears_cookies() {
        let response =
            GateRejection::new(AuthError::Revoked, &CookieSettings::default()).into_response();
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn test_forbidden_rejection_keeps_cookies() {
        let response = GateRejection::new(AuthError::AuthorizationDenied, &CookieSettings::default())
            .into_response();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}
