use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use orgiam_core::{DomainError, DomainResult, PolicyConfig, ValueObject};

pub const MIN_LENGTH: usize = 32;
pub const MAX_LENGTH: usize = 512;
const GENERATED_LENGTH: usize = 64;
const TOKEN_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    Access,
    Refresh,
    PasswordReset,
    EmailVerification,
    ApiKey,
}

/// Opaque bearer token with an expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    value: String,
    token_type: TokenType,
    expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn new(value: &str, token_type: TokenType, expires_at: DateTime<Utc>) -> DomainResult<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::validation("token cannot be empty"));
        }

        let mut reasons = Vec::new();
        if value.len() < MIN_LENGTH {
            reasons.push(format!("must be at least {MIN_LENGTH} characters"));
        }
        if value.len() > MAX_LENGTH {
            reasons.push(format!("must be at most {MAX_LENGTH} characters"));
        }
        if !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '='))
        {
            reasons.push("contains invalid characters".to_string());
        }
        if value.chars().all(|c| c.is_ascii_digit()) {
            reasons.push("must not be purely numeric".to_string());
        }

        if reasons.is_empty() {
            Ok(Self {
                value: value.to_string(),
                token_type,
                expires_at,
            })
        } else {
            Err(DomainError::validation(format!("token {}", reasons.join("; "))))
        }
    }

    /// Random token valid for `ttl` from `now`.
    pub fn generate(token_type: TokenType, now: DateTime<Utc>, ttl: Duration) -> Self {
        let mut rng = rand::thread_rng();
        // Leading letter keeps the value from ever being purely numeric.
        let mut value = String::with_capacity(GENERATED_LENGTH);
        value.push(TOKEN_CHARSET[rng.gen_range(0..52)] as char);
        while value.len() < GENERATED_LENGTH {
            value.push(TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char);
        }
        Self {
            value,
            token_type,
            expires_at: now + ttl,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Not yet expired, but within `threshold` of expiring.
    pub fn is_expiring_soon(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        !self.is_expired(now) && self.expires_at - now <= threshold
    }

    /// Inside the configured expiry warning window, so the holder should
    /// renew the token before using it again.
    pub fn needs_refresh(&self, now: DateTime<Utc>, policy: &PolicyConfig) -> bool {
        self.is_expiring_soon(now, policy.token_expiry_warning())
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

impl ValueObject for AuthToken {}

impl core::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthToken")
            .field("value", &format_args!("{}…", self.value.get(..8).unwrap_or_default()))
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
