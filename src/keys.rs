//! Signing and verification key material.
//!
//! Access tokens are signed with an RSA private key (RS256) and verified with
//! the matching public key. Refresh tokens are signed and verified with a
//! shared secret (HS256). Everything is loaded once at startup and never
//! mutated afterwards.

use jsonwebtoken::{DecodingKey, EncodingKey};
use openssl::pkey::PKey;

/// Minimum accepted length of the refresh token secret, in bytes.
pub const MIN_REFRESH_SECRET_LENGTH: usize = 32;

/// Missing or unusable key material. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

impl ConfigurationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Keys used by the token codec.
#[derive(Clone)]
pub struct KeyMaterial {
    signing: Option<EncodingKey>,
    verifying: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl KeyMaterial {
    /// Build key material from a PEM encoded RSA private key.
    ///
    /// When `public_pem` is `None` the public key is derived from the private key.
    pub fn from_pem(
        private_pem: &[u8],
        public_pem: Option<&[u8]>,
        refresh_secret: &[u8],
    ) -> Result<Self, ConfigurationError> {
        if private_pem.is_empty() {
            return Err(ConfigurationError::new("private key is not set"));
        }

        let signing = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| ConfigurationError::new(format!("invalid private key: {e}")))?;

        let derived;
        let public_pem = match public_pem {
            Some(pem) => pem,
            None => {
                derived = derive_public_pem(private_pem)?;
                derived.as_slice()
            }
        };

        let mut keys = Self::verify_only(public_pem, refresh_secret)?;
        keys.signing = Some(signing);
        Ok(keys)
    }

    /// Build key material that can verify access tokens but not issue them.
    pub fn verify_only(
        public_pem: &[u8],
        refresh_secret: &[u8],
    ) -> Result<Self, ConfigurationError> {
        if refresh_secret.len() < MIN_REFRESH_SECRET_LENGTH {
            return Err(ConfigurationError::new(format!(
                "refresh token secret must be at least {} bytes",
                MIN_REFRESH_SECRET_LENGTH
            )));
        }

        let verifying = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| ConfigurationError::new(format!("invalid public key: {e}")))?;

        Ok(Self {
            signing: None,
            verifying,
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
        })
    }

    pub fn can_sign_access_tokens(&self) -> bool {
        self.signing.is_some()
    }

    pub(crate) fn signing_key(&self) -> Result<&EncodingKey, ConfigurationError> {
        self.signing
            .as_ref()
            .ok_or_else(|| ConfigurationError::new("private key is not set"))
    }

    pub(crate) fn verifying_key(&self) -> &DecodingKey {
        &self.verifying
    }

    pub(crate) fn refresh_encoding_key(&self) -> &EncodingKey {
        &self.refresh_encoding
    }

    pub(crate) fn refresh_decoding_key(&self) -> &DecodingKey {
        &self.refresh_decoding
    }
}

/// Derive the SubjectPublicKeyInfo PEM for an RSA private key.
pub fn derive_public_pem(private_pem: &[u8]) -> Result<Vec<u8>, ConfigurationError> {
    let key = PKey::private_key_from_pem(private_pem)
        .map_err(|e| ConfigurationError::new(format!("invalid private key: {e}")))?;
    key.public_key_to_pem()
        .map_err(|e| ConfigurationError::new(format!("failed to derive public key: {e}")))
}

/// Generate a fresh RSA key pair as `(private_pem, public_pem)`.
///
/// Used by tests and by the `--print-keypair` flag of the binary.
pub fn generate_rsa_pem(bits: u32) -> Result<(Vec<u8>, Vec<u8>), ConfigurationError> {
    let rsa = openssl::rsa::Rsa::generate(bits)
        .map_err(|e| ConfigurationError::new(format!("failed to generate RSA key: {e}")))?;
    let key = PKey::from_rsa(rsa)
        .map_err(|e| ConfigurationError::new(format!("failed to wrap RSA key: {e}")))?;
    let private_pem = key
        .rsa()
        .and_then(|rsa| rsa.private_key_to_pem())
        .map_err(|e| ConfigurationError::new(format!("failed to encode private key: {e}")))?;
    let public_pem = key
        .public_key_to_pem()
        .map_err(|e| ConfigurationError::new(format!("failed to encode public key: {e}")))?;
    Ok((private_pem, public_pem))
}
