//! Placeholder password hashing for tests and local setups.

use orgiam_identity::Password;
use orgiam_services::PasswordHasher;

/// Stores `placeholder$<password>`. Not a key-derivation function; swap it for
/// a real hasher before handling real credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderHasher;

impl PlaceholderHasher {
    const PREFIX: &'static str = "placeholder$";
}

impl PasswordHasher for PlaceholderHasher {
    fn hash(&self, password: &Password) -> String {
        format!("{}{}", Self::PREFIX, password.expose())
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        hash.strip_prefix(Self::PREFIX) == Some(password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_hashed_password() {
        let hasher = PlaceholderHasher;
        let hash = hasher.hash(&Password::new("Blue7Canyon!Tide").unwrap());
        assert!(hasher.verify("Blue7Canyon!Tide", &hash));
        assert!(!hasher.verify("blue7canyon!tide", &hash));
        assert!(!hasher.verify("Blue7Canyon!Tide", "Blue7Canyon!Tide"));
    }
}
