//! Request gates and role based access control.
//!
//! Access tokens (RS256, short-lived) are verified by signature alone.
//! Refresh tokens (HS256, long-lived) are additionally checked against their
//! stored record, which is how they get revoked.

mod cookie;
mod errors;
mod extractors;
mod gate;
mod roles;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, CookieSettings, REFRESH_COOKIE_NAME, access_token_from_headers, get_cookie,
    refresh_token_from_headers,
};
pub use errors::{AuthError, GateRejection};
pub use extractors::{Auth, Authenticated, PresentedRefreshToken, RefreshSession};
pub use gate::{authenticate, parse_refresh_token, validate_refresh};
pub use roles::{AdminOnly, RoleConstraint, RoleSet, allow};
pub use state::HasAuthBackend;
