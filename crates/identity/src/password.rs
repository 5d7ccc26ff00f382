//! Plain-text password value object and its strength rules.
//!
//! The value only lives long enough to be validated and hashed; the `User`
//! entity stores the hash, never this type.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use orgiam_core::{DomainError, DomainResult, ValueObject};

pub const MIN_LENGTH: usize = 8;
pub const MAX_LENGTH: usize = 128;

/// Lower-cased passwords rejected outright.
const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "passw0rd",
    "p@ssw0rd",
    "p@ssword1",
    "123456",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty",
    "qwerty123",
    "qwertyuiop",
    "abc123",
    "abcd1234",
    "111111",
    "letmein",
    "letmein1",
    "welcome",
    "welcome1",
    "welcome123",
    "admin",
    "admin123",
    "administrator",
    "iloveyou",
    "monkey",
    "dragon",
    "sunshine",
    "princess",
    "football",
    "baseball",
    "master",
    "superman",
    "trustno1",
    "changeme",
    "changeme123",
];

const KEYBOARD_ROWS: &[&str] = &["qwertyuiop", "asdfghjkl", "zxcvbnm", "1234567890"];
const SEQUENCE_LENGTH: usize = 4;
const MAX_REPEAT: usize = 2;

/// Three-level classification of [`Password::strength_score`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

/// A password that satisfies the policy.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    pub fn new(raw: &str) -> DomainResult<Self> {
        if raw.is_empty() {
            return Err(DomainError::validation("password cannot be empty"));
        }

        let mut reasons = Vec::new();
        let len = raw.chars().count();
        if len < MIN_LENGTH {
            reasons.push(format!("must be at least {MIN_LENGTH} characters"));
        }
        if len > MAX_LENGTH {
            reasons.push(format!("must be at most {MAX_LENGTH} characters"));
        }
        if !raw.chars().any(|c| c.is_lowercase()) {
            reasons.push("must contain a lowercase letter".to_string());
        }
        if !raw.chars().any(|c| c.is_uppercase()) {
            reasons.push("must contain an uppercase letter".to_string());
        }
        if !raw.chars().any(|c| c.is_ascii_digit()) {
            reasons.push("must contain a digit".to_string());
        }
        if is_common(raw) {
            reasons.push("is too common".to_string());
        }
        if has_repeated_run(raw) {
            reasons.push(format!(
                "must not repeat a character more than {MAX_REPEAT} times in a row"
            ));
        }
        if has_sequence(raw) {
            reasons.push("must not contain sequential or keyboard patterns".to_string());
        }

        if reasons.is_empty() {
            Ok(Self(raw.to_string()))
        } else {
            Err(DomainError::validation(format!("password {}", reasons.join("; "))))
        }
    }

    /// Random password of `length` (clamped to the policy bounds) that always
    /// passes [`Password::new`].
    pub fn generate(length: usize) -> Self {
        const LOWER: &[u8] = b"abcdefghjkmnpqrstuvwxyz";
        const UPPER: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ";
        const DIGITS: &[u8] = b"23456789";
        const SPECIAL: &[u8] = b"!@#$%^&*-_+=?";
        const POOLS: [&[u8]; 4] = [LOWER, UPPER, DIGITS, SPECIAL];

        let length = length.clamp(MIN_LENGTH.max(12), MAX_LENGTH);
        let mut rng = rand::thread_rng();
        loop {
            let mut chars: Vec<char> = POOLS
                .iter()
                .map(|pool| pool[rng.gen_range(0..pool.len())] as char)
                .collect();
            while chars.len() < length {
                let pool = POOLS[rng.gen_range(0..POOLS.len())];
                chars.push(pool[rng.gen_range(0..pool.len())] as char);
            }
            chars.shuffle(&mut rng);
            let candidate: String = chars.into_iter().collect();
            if let Ok(password) = Self::new(&candidate) {
                return password;
            }
        }
    }

    /// Expose the secret for hashing.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// 0–100: length contributes up to 40 points, each character class 15.
    pub fn strength_score(&self) -> u8 {
        let length_points = (self.0.chars().count() * 3).min(40);
        let classes = [
            self.0.chars().any(|c| c.is_lowercase()),
            self.0.chars().any(|c| c.is_uppercase()),
            self.0.chars().any(|c| c.is_ascii_digit()),
            self.0.chars().any(|c| !c.is_alphanumeric()),
        ];
        let class_points = classes.iter().filter(|present| **present).count() * 15;
        (length_points + class_points).min(100) as u8
    }

    pub fn strength(&self) -> PasswordStrength {
        match self.strength_score() {
            0..=49 => PasswordStrength::Weak,
            50..=79 => PasswordStrength::Medium,
            _ => PasswordStrength::Strong,
        }
    }
}

impl ValueObject for Password {}

impl core::fmt::Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Password(********)")
    }
}

fn is_common(raw: &str) -> bool {
    let lowered = raw.to_lowercase();
    COMMON_PASSWORDS.contains(&lowered.as_str())
}

fn has_repeated_run(raw: &str) -> bool {
    let chars: Vec<char> = raw.chars().collect();
    chars
        .windows(MAX_REPEAT + 1)
        .any(|w| w.iter().all(|c| *c == w[0]))
}

fn has_sequence(raw: &str) -> bool {
    let lowered: Vec<char> = raw.to_lowercase().chars().collect();

    let stepped = lowered.windows(SEQUENCE_LENGTH).any(|w| {
        w.iter().all(|c| c.is_ascii_alphanumeric())
            && [1i32, -1].iter().any(|step| {
                w.windows(2)
                    .all(|pair| pair[1] as i32 - pair[0] as i32 == *step)
            })
    });
    if stepped {
        return true;
    }

    let lowered: String = lowered.into_iter().collect();
    KEYBOARD_ROWS.iter().any(|row| {
        let row: Vec<char> = row.chars().collect();
        row.windows(SEQUENCE_LENGTH).any(|w| {
            let forward: String = w.iter().collect();
            let backward: String = w.iter().rev().collect();
            lowered.contains(&forward) || lowered.contains(&backward)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_a_reasonable_password() {
        let password = Password::new("Blue7Canyon!Tide").unwrap();
        assert_eq!(password.expose(), "Blue7Canyon!Tide");
    }

    #[test]
    fn lists_every_missing_requirement() {
        let msg = Password::new("short").unwrap_err().to_string();
        assert!(msg.contains("at least 8"));
        assert!(msg.contains("uppercase"));
        assert!(msg.contains("digit"));
    }

    #[test]
    fn rejects_common_passwords_case_insensitively() {
        let msg = Password::new("Password123").unwrap_err().to_string();
        assert!(msg.contains("too common"));
    }

    #[test]
    fn rejects_repeats_and_sequences() {
        assert!(Password::new("Gaaa7rden!X").unwrap_err().to_string().contains("repeat"));
        assert!(Password::new("Xabcd7!Kp").unwrap_err().to_string().contains("sequential"));
        assert!(Password::new("Kp9!4321zz").unwrap_err().to_string().contains("sequential"));
        assert!(Password::new("Mq7!Asdfzz").unwrap_err().to_string().contains("keyboard"));
    }

    #[test]
    fn debug_does_not_leak_the_secret() {
        let password = Password::new("Blue7Canyon!Tide").unwrap();
        assert!(!format!("{password:?}").contains("Canyon"));
    }

    #[test]
    fn strength_levels() {
        // 9 chars, lower/upper/digit: 27 + 45 = 72
        let medium = Password::new("Bluex7Tqm").unwrap();
        assert_eq!(medium.strength_score(), 72);
        assert_eq!(medium.strength(), PasswordStrength::Medium);

        let strong = Password::new("Blue7Canyon!Tide").unwrap();
        assert_eq!(strong.strength_score(), 100);
        assert_eq!(strong.strength(), PasswordStrength::Strong);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: generated passwords always satisfy the policy and score strong.
        #[test]
        fn generated_passwords_are_valid(length in 0usize..200) {
            let password = Password::generate(length);
            prop_assert!(Password::new(password.expose()).is_ok());
            prop_assert_eq!(password.strength(), PasswordStrength::Strong);
        }
    }
}
