//! JWT token generation and validation.
//!
//! Access tokens are RS256 signed and short-lived; refresh tokens are HS256
//! signed, long-lived, and carry the id of their backing database record.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::db::Role;
use crate::keys::{ConfigurationError, KeyMaterial};

/// Algorithm for access tokens.
pub const ACCESS_TOKEN_ALGORITHM: Algorithm = Algorithm::RS256;

/// Algorithm for refresh tokens.
pub const REFRESH_TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Default issuer claim.
pub const DEFAULT_ISSUER: &str = "auth-service";

/// Access token duration: 1 hour
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Refresh token duration: 1 year
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Longest lifetime accepted for either token: 10 years
pub const MAX_TOKEN_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Who a token is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: i64,
    pub role: Role,
}

/// JWT claims for access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id, string encoded)
    pub sub: String,
    pub role: Role,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

/// JWT claims for refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject (user id, string encoded)
    pub sub: String,
    pub role: Role,
    /// Id of the backing refresh token record
    #[serde(with = "string_id")]
    pub id: i64,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

impl AccessClaims {
    /// The subject as a user id, if it is one.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    pub fn subject(&self) -> Option<TokenSubject> {
        Some(TokenSubject {
            user_id: self.user_id()?,
            role: self.role,
        })
    }
}

impl RefreshClaims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    pub fn subject(&self) -> Option<TokenSubject> {
        Some(TokenSubject {
            user_id: self.user_id()?,
            role: self.role,
        })
    }
}

/// Record ids travel as strings inside the token.
mod string_id {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A freshly signed token and how long it lives.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Why a token was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    #[error("token has expired")]
    Expired,
    #[error("token signature is not valid")]
    BadSignature,
    #[error("token is malformed")]
    Malformed,
}

impl From<jsonwebtoken::errors::Error> for VerificationFailure {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            // A token from another issuer or signed another way is not ours.
            ErrorKind::InvalidSignature | ErrorKind::InvalidIssuer | ErrorKind::InvalidAlgorithm => {
                Self::BadSignature
            }
            _ => Self::Malformed,
        }
    }
}

/// Errors while signing a token.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to encode token: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("token lifetime of {0} seconds is out of range")]
    Lifetime(u64),
}

/// `now + ttl`, refusing lifetimes that would overflow the expiry.
fn expiry(now: u64, ttl: u64) -> Result<u64, IssueError> {
    now.checked_add(ttl).ok_or(IssueError::Lifetime(ttl))
}

/// Token lifetimes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_secs: u64,
    pub refresh_secs: u64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_secs: ACCESS_TOKEN_DURATION_SECS,
            refresh_secs: REFRESH_TOKEN_DURATION_SECS,
        }
    }
}

/// Encodes, decodes and verifies both kinds of token.
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<KeyMaterial>,
    issuer: String,
    lifetimes: TokenLifetimes,
}

impl TokenCodec {
    pub fn new(keys: KeyMaterial, issuer: impl Into<String>, lifetimes: TokenLifetimes) -> Self {
        Self {
            keys: Arc::new(keys),
            issuer: issuer.into(),
            lifetimes,
        }
    }

    /// Sign an access token. Fails with a configuration error if there is no private key.
    pub fn issue_access_token(&self, subject: &TokenSubject) -> Result<IssuedToken, IssueError> {
        let key = self.keys.signing_key()?;
        let now = unix_now();
        let claims = AccessClaims {
            sub: subject.user_id.to_string(),
            role: subject.role,
            iss: self.issuer.clone(),
            iat: now,
            exp: expiry(now, self.lifetimes.access_secs)?,
        };
        self.sign(&claims, ACCESS_TOKEN_ALGORITHM, key, self.lifetimes.access_secs)
    }

    /// Sign a refresh token bound to the record `record_id`.
    pub fn issue_refresh_token(
        &self,
        subject: &TokenSubject,
        record_id: i64,
    ) -> Result<IssuedToken, IssueError> {
        let now = unix_now();
        let claims = RefreshClaims {
            sub: subject.user_id.to_string(),
            role: subject.role,
            id: record_id,
            iss: self.issuer.clone(),
            iat: now,
            exp: expiry(now, self.lifetimes.refresh_secs)?,
        };
        self.sign(
            &claims,
            REFRESH_TOKEN_ALGORITHM,
            self.keys.refresh_encoding_key(),
            self.lifetimes.refresh_secs,
        )
    }

    fn sign<C: Serialize>(
        &self,
        claims: &C,
        algorithm: Algorithm,
        key: &EncodingKey,
        duration: u64,
    ) -> Result<IssuedToken, IssueError> {
        let token = jsonwebtoken::encode(&Header::new(algorithm), claims, key)?;
        Ok(IssuedToken { token, duration })
    }

    /// Verify a token signed with `algorithm` and decode its claims.
    ///
    /// Checks signature, expiry (no leeway) and issuer. Only the two
    /// algorithms this codec issues are accepted.
    pub fn verify<C: DeserializeOwned>(
        &self,
        token: &str,
        algorithm: Algorithm,
    ) -> Result<C, VerificationFailure> {
        let key: &DecodingKey = match algorithm {
            ACCESS_TOKEN_ALGORITHM => self.keys.verifying_key(),
            REFRESH_TOKEN_ALGORITHM => self.keys.refresh_decoding_key(),
            _ => return Err(VerificationFailure::BadSignature),
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = jsonwebtoken::decode::<C>(token, key, &validation)?;
        Ok(data.claims)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, VerificationFailure> {
        self.verify(token, ACCESS_TOKEN_ALGORITHM)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, VerificationFailure> {
        self.verify(token, REFRESH_TOKEN_ALGORITHM)
    }
}
