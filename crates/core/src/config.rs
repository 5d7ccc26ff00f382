//! Domain policy configuration.
//!
//! Values come from the process environment; anything missing or malformed
//! falls back to the built-in default.

use core::str::FromStr;

use chrono::Duration;

/// Failed-login lockout policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that lock the account.
    pub max_failed_logins: u32,
    /// How long an automatic lock lasts.
    pub lockout_minutes: i64,
}

impl LockoutPolicy {
    pub fn lockout_duration(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_logins: PolicyConfig::DEFAULT_MAX_FAILED_LOGINS,
            lockout_minutes: PolicyConfig::DEFAULT_LOCKOUT_MINUTES,
        }
    }
}

/// Tunables for the aggregates and domain services.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyConfig {
    pub max_failed_logins: u32,
    pub lockout_minutes: i64,
    /// Share of a limit at which `check_limits` starts warning, in `(0, 1]`.
    pub limit_warning_ratio: f64,
    pub token_expiry_warning_minutes: i64,
}

impl PolicyConfig {
    pub const DEFAULT_MAX_FAILED_LOGINS: u32 = 5;
    pub const DEFAULT_LOCKOUT_MINUTES: i64 = 30;
    pub const DEFAULT_LIMIT_WARNING_RATIO: f64 = 0.9;
    pub const DEFAULT_TOKEN_EXPIRY_WARNING_MINUTES: i64 = 5;

    pub const ENV_MAX_FAILED_LOGINS: &'static str = "ORGIAM_MAX_FAILED_LOGINS";
    pub const ENV_LOCKOUT_MINUTES: &'static str = "ORGIAM_LOCKOUT_MINUTES";
    pub const ENV_LIMIT_WARNING_RATIO: &'static str = "ORGIAM_LIMIT_WARNING_RATIO";
    pub const ENV_TOKEN_EXPIRY_WARNING_MINUTES: &'static str = "ORGIAM_TOKEN_EXPIRY_WARNING_MINUTES";

    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            max_failed_logins: parse_or(&lookup, Self::ENV_MAX_FAILED_LOGINS, defaults.max_failed_logins, |v| *v > 0),
            lockout_minutes: parse_or(&lookup, Self::ENV_LOCKOUT_MINUTES, defaults.lockout_minutes, |v| *v > 0),
            limit_warning_ratio: parse_or(
                &lookup,
                Self::ENV_LIMIT_WARNING_RATIO,
                defaults.limit_warning_ratio,
                |v| *v > 0.0 && *v <= 1.0,
            ),
            token_expiry_warning_minutes: parse_or(
                &lookup,
                Self::ENV_TOKEN_EXPIRY_WARNING_MINUTES,
                defaults.token_expiry_warning_minutes,
                |v| *v >= 0,
            ),
        }
    }

    pub fn lockout(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_failed_logins: self.max_failed_logins,
            lockout_minutes: self.lockout_minutes,
        }
    }

    pub fn token_expiry_warning(&self) -> Duration {
        Duration::minutes(self.token_expiry_warning_minutes)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_failed_logins: Self::DEFAULT_MAX_FAILED_LOGINS,
            lockout_minutes: Self::DEFAULT_LOCKOUT_MINUTES,
            limit_warning_ratio: Self::DEFAULT_LIMIT_WARNING_RATIO,
            token_expiry_warning_minutes: Self::DEFAULT_TOKEN_EXPIRY_WARNING_MINUTES,
        }
    }
}

fn parse_or<T, F, V>(lookup: &F, key: &str, default: T, valid: V) -> T
where
    T: FromStr + Copy + core::fmt::Display,
    F: Fn(&str) -> Option<String>,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            tracing::warn!("{key}={raw:?} is not a valid value; using default {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = PolicyConfig::from_lookup(|_| None);
        assert_eq!(config, PolicyConfig::default());
        assert_eq!(config.lockout().max_failed_logins, 5);
        assert_eq!(config.lockout().lockout_duration(), Duration::minutes(30));
    }

    #[test]
    fn reads_overrides() {
        let config = PolicyConfig::from_lookup(lookup_from(&[
            ("ORGIAM_MAX_FAILED_LOGINS", "3"),
            ("ORGIAM_LOCKOUT_MINUTES", "15"),
            ("ORGIAM_LIMIT_WARNING_RATIO", "0.75"),
        ]));
        assert_eq!(config.max_failed_logins, 3);
        assert_eq!(config.lockout_minutes, 15);
        assert_eq!(config.limit_warning_ratio, 0.75);
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = PolicyConfig::from_lookup(lookup_from(&[
            ("ORGIAM_MAX_FAILED_LOGINS", "zero"),
            ("ORGIAM_LOCKOUT_MINUTES", "-5"),
            ("ORGIAM_LIMIT_WARNING_RATIO", "1.5"),
        ]));
        assert_eq!(config, PolicyConfig::default());
    }
}
