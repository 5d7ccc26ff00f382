//! Password hashing boundary.

use orgiam_identity::Password;

/// Turns a validated [`Password`] into the opaque hash stored on the user.
///
/// Real key-derivation lives outside the domain; tests and local setups use
/// the placeholder implementation in `orgiam-infra`.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &Password) -> String;

    fn verify(&self, password: &str, hash: &str) -> bool;
}
