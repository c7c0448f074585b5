//! Axum extractors for the request gates.

use std::marker::PhantomData;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::{AuthError, GateRejection};
use super::gate::{authenticate, parse_refresh_token, validate_refresh};
use super::roles::{RoleConstraint, allow};
use super::state::HasAuthBackend;
use crate::jwt::{AccessClaims, RefreshClaims};

/// Extractor for endpoints that require a valid access token.
pub struct Authenticated(pub AccessClaims);

impl<S> FromRequestParts<S> for Authenticated
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, state.codec())
            .map(Authenticated)
            .map_err(|e| GateRejection::new(e, state.cookies()))
    }
}

/// Extractor for endpoints restricted to the roles of `R`.
///
/// Authenticates first; a valid token with the wrong role is a 403.
///
/// # Example
/// ```ignore
/// async fn admin_handler(auth: Auth<AdminOnly>) -> impl IntoResponse {
///     // Only admins reach here
/// }
/// ```
pub struct Auth<R: RoleConstraint> {
    pub claims: AccessClaims,
    _role: PhantomData<R>,
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: HasAuthBackend + Send + Sync,
    R: RoleConstraint + Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authenticated(claims) = Authenticated::from_request_parts(parts, state).await?;

        if !allow(claims.role, R::ALLOWED) {
            tracing::debug!(sub = %claims.sub, role = %claims.role, "Role not permitted");
            return Err(GateRejection::new(
                AuthError::AuthorizationDenied,
                state.cookies(),
            ));
        }

        Ok(Auth {
            claims,
            _role: PhantomData,
        })
    }
}

/// Extractor for a refresh token that is signed, unexpired and still backed
/// by a stored record.
pub struct RefreshSession(pub RefreshClaims);

impl<S> FromRequestParts<S> for RefreshSession
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = GateRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        validate_refresh(&parts.headers, state.codec(), state.refresh_tokens())
            .await
            .map(RefreshSession)
            .map_err(|e| GateRejection::new(e, state.cookies()))
    }
}

/// The presented refresh token, signature checked only. `None` when absent or
/// not verifiable.
pub struct PresentedRefreshToken(pub Option<RefreshClaims>);

impl<S> FromRequestParts<S> for PresentedRefreshToken
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(PresentedRefreshToken(
            parse_refresh_token(&parts.headers, state.codec()).ok(),
        ))
    }
}
