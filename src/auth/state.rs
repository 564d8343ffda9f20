//! Authentication state trait.

use crate::db::Database;
use crate::jwt::JwtConfig;

/// Trait for state types that provide database and JWT access for authentication.
pub trait HasAuthBackend {
    fn jwt(&self) -> &JwtConfig;
    fn db(&self) -> &Database;
    /// Whether cleared cookies carry the `Secure` flag.
    fn secure_cookies(&self) -> bool;
}
