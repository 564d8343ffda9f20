//! Access-token authentication for protected routes.
//!
//! Dual-token system: short-lived access tokens (stateless) and long-lived
//! refresh tokens (one current digest per user). Only access tokens are
//! accepted here; refresh tokens are exchanged through the session manager.

mod cookie;
mod errors;
mod extractors;
mod state;
mod types;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie, get_bearer_token, get_cookie,
    session_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Auth, authenticate_request};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
