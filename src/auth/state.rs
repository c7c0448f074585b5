//! Authentication state trait and macro.

use crate::db::RefreshTokenStore;
use crate::jwt::TokenCodec;

use super::cookie::CookieSettings;

/// Trait for state types that provide what the request gates need.
pub trait HasAuthBackend {
    fn codec(&self) -> &TokenCodec;
    fn refresh_tokens(&self) -> &dyn RefreshTokenStore;
    fn cookies(&self) -> &CookieSettings;
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `codec: Arc<TokenCodec>`
/// - `refresh_tokens: Arc<dyn RefreshTokenStore>`
/// - `cookies: CookieSettings`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub codec: Arc<TokenCodec>,
///     pub refresh_tokens: Arc<dyn RefreshTokenStore>,
///     pub cookies: CookieSettings,
///     // ... other fields
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn codec(&self) -> &$crate::jwt::TokenCodec {
                &self.codec
            }
            fn refresh_tokens(&self) -> &dyn $crate::db::RefreshTokenStore {
                self.refresh_tokens.as_ref()
            }
            fn cookies(&self) -> &$crate::auth::CookieSettings {
                &self.cookies
            }
        }
    };
}
