//! Authentication user types.

use crate::db::PublicUser;
use crate::jwt::Claims;

/// Identity resolved from a valid access token.
///
/// Handed to protected handlers as a parameter; it never carries the
/// password hash or the refresh token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    /// Database user ID
    pub user_id: i64,
    /// Public view of the user
    pub user: PublicUser,
    /// Claims of the access token that authenticated the request
    pub claims: Claims,
}
