//! Credential issuance: register, login, refresh and logout.
//!
//! Every successful flow ends the same way: an access token, a new refresh
//! record, and a refresh token bound to that record.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::auth::AuthError;
use crate::db::{NewUser, RefreshTokenStore, Role, StoreError, UserDirectory};
use crate::jwt::{AccessClaims, IssuedToken, RefreshClaims, TokenCodec, TokenSubject};
use crate::password::PasswordHasher;

/// A new account's details. The password is plaintext until hashed here.
#[derive(Debug, Clone)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Tokens handed back to the client after a successful flow.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub user_id: i64,
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

#[derive(Clone)]
pub struct CredentialService {
    codec: Arc<TokenCodec>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserDirectory>,
    passwords: PasswordHasher,
}

impl CredentialService {
    pub fn new(
        codec: Arc<TokenCodec>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserDirectory>,
        passwords: PasswordHasher,
    ) -> Self {
        Self {
            codec,
            refresh_tokens,
            users,
            passwords,
        }
    }

    /// Create a customer account and sign it in.
    pub async fn register(&self, registration: Registration) -> Result<IssuedCredentials, AuthError> {
        let password_hash = self
            .passwords
            .hash(&registration.password)
            .await
            .map_err(|e| AuthError::internal("Failed to hash password", e))?;

        let user = self
            .users
            .create_user(&NewUser {
                first_name: registration.first_name,
                last_name: registration.last_name,
                email: registration.email,
                password_hash,
                role: Role::Customer,
                tenant_id: None,
            })
            .await
            .map_err(|e| match e {
                StoreError::DuplicateEmail => AuthError::DuplicateIdentity,
                e => AuthError::internal("Failed to create user", e),
            })?;

        let credentials = self
            .issue(TokenSubject {
                user_id: user.id,
                role: user.role,
            })
            .await?;
        info!(user_id = user.id, "User registered");
        Ok(credentials)
    }

    /// Check an email and password pair and sign the user in.
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedCredentials, AuthError> {
        let Some(stored) = self
            .users
            .find_user_by_email_with_hash(email)
            .await
            .map_err(|e| AuthError::internal("Failed to look up user", e))?
        else {
            // Spend the same bcrypt work as a real comparison
            self.passwords
                .compare_nothing(password)
                .await
                .map_err(|e| AuthError::internal("Failed to compare password", e))?;
            debug!("Login for unknown email");
            return Err(AuthError::CredentialMismatch);
        };

        let matches = self
            .passwords
            .compare(password, &stored.password_hash)
            .await
            .map_err(|e| AuthError::internal("Failed to compare password", e))?;
        if !matches {
            debug!(user_id = stored.id, "Login with wrong password");
            return Err(AuthError::CredentialMismatch);
        }

        let credentials = self
            .issue(TokenSubject {
                user_id: stored.id,
                role: stored.role,
            })
            .await?;
        info!(user_id = stored.id, "User logged in");
        Ok(credentials)
    }

    /// Rotate a refresh token that already passed the refresh gate.
    ///
    /// The replacement record is created and signed before the old record is
    /// deleted, so a failure part way leaves the old token usable. If the old
    /// record is already gone (a concurrent rotation or a logout won) the
    /// replacement is dropped and the result is `Revoked`.
    pub async fn refresh(&self, claims: &RefreshClaims) -> Result<IssuedCredentials, AuthError> {
        let subject = claims.subject().ok_or(AuthError::InvalidCredential)?;

        let user = self
            .users
            .find_user_by_id(subject.user_id)
            .await
            .map_err(|e| {
                error!(user_id = subject.user_id, error = %e, "Failed to look up user");
                AuthError::Unavailable
            })?;
        if user.is_none() {
            debug!(user_id = subject.user_id, "Refresh for deleted user");
            return Err(AuthError::InvalidCredential);
        }

        let access = self.codec.issue_access_token(&subject)?;

        let record = self
            .refresh_tokens
            .persist(subject.user_id)
            .await
            .map_err(|e| {
                error!(user_id = subject.user_id, error = %e, "Failed to persist refresh token");
                AuthError::Unavailable
            })?;
        let refresh = self.sign_refresh(&subject, record.id).await?;

        match self
            .refresh_tokens
            .delete_owned(claims.id, subject.user_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    user_id = subject.user_id,
                    record_id = claims.id,
                    "Refresh token already rotated"
                );
                self.drop_record(record.id).await;
                return Err(AuthError::Revoked);
            }
            Err(e) => {
                error!(user_id = subject.user_id, error = %e, "Failed to delete old refresh token");
                self.drop_record(record.id).await;
                return Err(AuthError::Unavailable);
            }
        }

        debug!(
            user_id = subject.user_id,
            old_record = claims.id,
            new_record = record.id,
            "Refresh token rotated"
        );

        Ok(IssuedCredentials {
            user_id: subject.user_id,
            access,
            refresh,
        })
    }

    /// Revoke the presented refresh token if it belongs to the caller.
    ///
    /// Already revoked or absent tokens are not an error.
    pub async fn logout(
        &self,
        access: &AccessClaims,
        presented: Option<&RefreshClaims>,
    ) -> Result<(), AuthError> {
        let Some(refresh) = presented else {
            debug!(sub = %access.sub, "Logout without refresh token");
            return Ok(());
        };

        if refresh.sub != access.sub {
            warn!(
                access_sub = %access.sub,
                refresh_sub = %refresh.sub,
                "Logout with another user's refresh token"
            );
            return Ok(());
        }

        let deleted = self
            .refresh_tokens
            .delete(refresh.id)
            .await
            .map_err(|e| AuthError::internal("Failed to delete refresh token", e))?;
        if deleted {
            info!(sub = %access.sub, record_id = refresh.id, "User logged out");
        } else {
            debug!(sub = %access.sub, record_id = refresh.id, "Refresh token already revoked");
        }
        Ok(())
    }

    async fn issue(&self, subject: TokenSubject) -> Result<IssuedCredentials, AuthError> {
        let access = self.codec.issue_access_token(&subject)?;

        let record = self
            .refresh_tokens
            .persist(subject.user_id)
            .await
            .map_err(|e| AuthError::internal("Failed to persist refresh token", e))?;

        let refresh = self.sign_refresh(&subject, record.id).await?;

        Ok(IssuedCredentials {
            user_id: subject.user_id,
            access,
            refresh,
        })
    }

    /// Sign a refresh token for `record_id`, dropping the record if signing fails.
    async fn sign_refresh(
        &self,
        subject: &TokenSubject,
        record_id: i64,
    ) -> Result<IssuedToken, AuthError> {
        match self.codec.issue_refresh_token(subject, record_id) {
            Ok(token) => Ok(token),
            Err(e) => {
                self.drop_record(record_id).await;
                Err(e.into())
            }
        }
    }

    /// Remove a record no token will ever be handed out for.
    async fn drop_record(&self, record_id: i64) {
        if let Err(e) = self.refresh_tokens.delete(record_id).await {
            warn!(record_id, error = %e, "Failed to drop unused refresh record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryRefreshTokenStore, MemoryUserDirectory};
    use crate::jwt::TokenLifetimes;
    use crate::jwt::tests::{TEST_SECRET, test_codec, test_key_pair};
    use crate::keys::KeyMaterial;

    struct Harness {
        service: CredentialService,
        codec: Arc<TokenCodec>,
        store: Arc<MemoryRefreshTokenStore>,
        users: Arc<MemoryUserDirectory>,
    }

    fn harness() -> Harness {
        let codec = Arc::new(test_codec());
        let store = Arc::new(MemoryRefreshTokenStore::new(3600));
        let users = Arc::new(MemoryUserDirectory::new());
        let service = CredentialService::new(
            codec.clone(),
            store.clone(),
            users.clone(),
            PasswordHasher::with_cost(4),
        );
        Harness {
            service,
            codec,
            store,
            users,
        }
    }

    fn registration(email: &str) -> Registration {
        Registration {
            first_name: "Dev".to_string(),
            last_name: "K".to_string(),
            email: email.to_string(),
            password: "pw123456".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_issues_customer_credentials() {
        let h = harness();
        let issued = h.service.register(registration("a@x.com")).await.unwrap();

        let access = h.codec.verify_access_token(&issued.access.token).unwrap();
        assert_eq!(access.user_id(), Some(issued.user_id));
        assert_eq!(access.role, Role::Customer);

        let refresh = h.codec.verify_refresh_token(&issued.refresh.token).unwrap();
        assert_eq!(refresh.user_id(), Some(issued.user_id));
        assert_eq!(refresh.role, Role::Customer);
        assert!(
            h.store
                .find_active(refresh.id, issued.user_id)
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(h.store.count_for_user(issued.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let h = harness();
        h.service.register(registration("a@x.com")).await.unwrap();

        let result = h.service.register(registration("a@x.com")).await;
        assert_eq!(result.err(), Some(AuthError::DuplicateIdentity));
        assert_eq!(h.users.len(), 1);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let h = harness();
        h.service.register(registration("a@x.com")).await.unwrap();

        let wrong_password = h.service.login("a@x.com", "wrong-password").await.err();
        let unknown_email = h.service.login("b@x.com", "pw123456").await.err();

        assert_eq!(wrong_password, Some(AuthError::CredentialMismatch));
        assert_eq!(wrong_password, unknown_email);
    }

    #[tokio::test]
    async fn test_unknown_email_costs_a_hash() {
        let store = Arc::new(MemoryRefreshTokenStore::new(3600));
        let service = CredentialService::new(
            Arc::new(test_codec()),
            store,
            Arc::new(MemoryUserDirectory::new()),
            PasswordHasher::with_cost(8),
        );
        service.register(registration("a@x.com")).await.unwrap();

        let started = std::time::Instant::now();
        let wrong_password = service.login("a@x.com", "wrong-password").await.err();
        let wrong_password_time = started.elapsed();

        let started = std::time::Instant::now();
        let unknown_email = service.login("b@x.com", "pw123456").await.err();
        let unknown_email_time = started.elapsed();

        assert_eq!(wrong_password, unknown_email);
        assert!(
            unknown_email_time * 4 >= wrong_password_time,
            "unknown email took {unknown_email_time:?}, wrong password {wrong_password_time:?}"
        );
    }

    #[tokio::test]
    async fn test_login_creates_a_new_record() {
        let h = harness();
        let registered = h.service.register(registration("a@x.com")).await.unwrap();

        let issued = h.service.login("a@x.com", "pw123456").await.unwrap();
        assert_eq!(issued.user_id, registered.user_id);
        assert_eq!(h.store.count_for_user(issued.user_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_refresh_rotates_exactly_once() {
        let h = harness();
        let issued = h.service.register(registration("a@x.com")).await.unwrap();
        let old = h.codec.verify_refresh_token(&issued.refresh.token).unwrap();

        let rotated = h.service.refresh(&old).await.unwrap();
        let new = h.codec.verify_refresh_token(&rotated.refresh.token).unwrap();

        assert_ne!(old.id, new.id);
        assert!(
            h.store
                .find_active(old.id, issued.user_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            h.store
                .find_active(new.id, issued.user_id)
                .await
                .unwrap()
                .is_some()
        );

        // Replaying the old token loses and creates nothing
        assert_eq!(h.service.refresh(&old).await.err(), Some(AuthError::Revoked));
        assert_eq!(h.store.count_for_user(issued.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_rotation_keeps_old_token() {
        let h = harness();
        let issued = h.service.register(registration("a@x.com")).await.unwrap();
        let old = h.codec.verify_refresh_token(&issued.refresh.token).unwrap();

        // Same keys, but refresh tokens cannot be signed
        let (private_pem, public_pem) = test_key_pair();
        let broken = CredentialService::new(
            Arc::new(TokenCodec::new(
                KeyMaterial::from_pem(private_pem, Some(public_pem), TEST_SECRET).unwrap(),
                "auth-service",
                TokenLifetimes {
                    access_secs: 3600,
                    refresh_secs: u64::MAX,
                },
            )),
            h.store.clone(),
            h.users.clone(),
            PasswordHasher::with_cost(4),
        );

        assert_eq!(broken.refresh(&old).await.err(), Some(AuthError::Internal));
        assert!(
            h.store
                .find_active(old.id, issued.user_id)
                .await
                .unwrap()
                .is_some()
        );
        assert_eq!(h.store.count_for_user(issued.user_id).await.unwrap(), 1);

        // The old token still rotates normally
        h.service.refresh(&old).await.unwrap();
        assert_eq!(h.store.count_for_user(issued.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_logged_out_token_cannot_rotate() {
        let h = harness();
        let issued = h.service.register(registration("a@x.com")).await.unwrap();
        let claims = h.codec.verify_refresh_token(&issued.refresh.token).unwrap();

        // Revoked between the gate and the rotation
        assert!(h.store.delete(claims.id).await.unwrap());
        assert_eq!(h.service.refresh(&claims).await.err(), Some(AuthError::Revoked));
        assert_eq!(h.store.count_for_user(issued.user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refresh_for_deleted_user() {
        let h = harness();
        let issued = h.service.register(registration("a@x.com")).await.unwrap();
        let claims = h.codec.verify_refresh_token(&issued.refresh.token).unwrap();

        assert!(h.users.remove(issued.user_id));
        assert_eq!(
            h.service.refresh(&claims).await.err(),
            Some(AuthError::InvalidCredential)
        );
    }

    #[tokio::test]
    async fn test_refresh_with_store_down_is_unavailable() {
        let h = harness();
        let issued = h.service.register(registration("a@x.com")).await.unwrap();
        let claims = h.codec.verify_refresh_token(&issued.refresh.token).unwrap();

        h.store.set_unavailable(true);
        assert_eq!(
            h.service.refresh(&claims).await.err(),
            Some(AuthError::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_logout_revokes_and_is_idempotent() {
        let h = harness();
        let issued = h.service.register(registration("a@x.com")).await.unwrap();
        let access = h.codec.verify_access_token(&issued.access.token).unwrap();
        let refresh = h.codec.verify_refresh_token(&issued.refresh.token).unwrap();

        h.service.logout(&access, Some(&refresh)).await.unwrap();
        assert_eq!(h.store.count_for_user(issued.user_id).await.unwrap(), 0);

        h.service.logout(&access, Some(&refresh)).await.unwrap();
        h.service.logout(&access, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_ignores_other_users_token() {
        let h = harness();
        let alice = h.service.register(registration("a@x.com")).await.unwrap();
        let bob = h.service.register(registration("b@x.com")).await.unwrap();

        let alice_access = h.codec.verify_access_token(&alice.access.token).unwrap();
        let bob_refresh = h.codec.verify_refresh_token(&bob.refresh.token).unwrap();

        h.service
            .logout(&alice_access, Some(&bob_refresh))
            .await
            .unwrap();
        assert_eq!(h.store.count_for_user(bob.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_private_key_is_a_configuration_error() {
        let (_, public_pem) = test_key_pair();
        let codec = Arc::new(TokenCodec::new(
            KeyMaterial::verify_only(public_pem, TEST_SECRET).unwrap(),
            "auth-service",
            TokenLifetimes::default(),
        ));
        let store = Arc::new(MemoryRefreshTokenStore::new(3600));
        let service = CredentialService::new(
            codec,
            store.clone(),
            Arc::new(MemoryUserDirectory::new()),
            PasswordHasher::with_cost(4),
        );

        let result = service.register(registration("a@x.com")).await;
        assert!(matches!(result, Err(AuthError::Configuration(_))));
        assert_eq!(store.count_for_user(1).await.unwrap(), 0);
    }
}
