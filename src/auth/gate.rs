//! Request gates: access token authentication and refresh token validation.
//!
//! Both work on request headers only so they can be driven without a router.

use axum::http::HeaderMap;
use tracing::{debug, error};

use crate::db::RefreshTokenStore;
use crate::jwt::{AccessClaims, RefreshClaims, TokenCodec};

use super::cookie::{access_token_from_headers, refresh_token_from_headers};
use super::errors::AuthError;

/// Authenticate a request by its access token.
///
/// Pure signature and expiry check; never touches the store.
pub fn authenticate(headers: &HeaderMap, codec: &TokenCodec) -> Result<AccessClaims, AuthError> {
    let token = access_token_from_headers(headers).ok_or(AuthError::MissingCredential)?;
    let claims = codec.verify_access_token(token)?;

    if claims.user_id().is_none() {
        debug!(sub = %claims.sub, "Access token subject is not a user id");
        return Err(AuthError::InvalidCredential);
    }

    Ok(claims)
}

/// Verify the refresh token signature without consulting the store.
pub fn parse_refresh_token(
    headers: &HeaderMap,
    codec: &TokenCodec,
) -> Result<RefreshClaims, AuthError> {
    let token = refresh_token_from_headers(headers).ok_or(AuthError::MissingCredential)?;
    let claims = codec.verify_refresh_token(token)?;

    if claims.user_id().is_none() {
        debug!(sub = %claims.sub, "Refresh token subject is not a user id");
        return Err(AuthError::InvalidCredential);
    }

    Ok(claims)
}

/// Validate a refresh token: signature, expiry, then the backing record.
///
/// A missing record is `Revoked`. A store failure is `Unavailable`; the
/// request is rejected either way.
pub async fn validate_refresh(
    headers: &HeaderMap,
    codec: &TokenCodec,
    store: &dyn RefreshTokenStore,
) -> Result<RefreshClaims, AuthError> {
    let claims = parse_refresh_token(headers, codec)?;
    let user_id = claims.user_id().ok_or(AuthError::InvalidCredential)?;

    match store.find_active(claims.id, user_id).await {
        Ok(Some(_)) => Ok(claims),
        Ok(None) => {
            debug!(user_id, record_id = claims.id, "Refresh token revoked");
            Err(AuthError::Revoked)
        }
        Err(e) => {
            error!(user_id, error = %e, "Cannot check refresh token record");
            Err(AuthError::Unavailable)
        }
    }
}
