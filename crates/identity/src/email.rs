use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use orgiam_core::{DomainError, DomainResult, ValueObject};

const MAX_LENGTH: usize = 254;
const MAX_LOCAL_LENGTH: usize = 64;

static LOCAL_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*$")
        .expect("local part pattern is valid")
});

static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .expect("domain pattern is valid")
});

/// Lower-cased email address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn new(raw: &str) -> DomainResult<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(DomainError::validation("email cannot be empty"));
        }

        let mut reasons = Vec::new();
        if normalized.len() > MAX_LENGTH {
            reasons.push(format!("must be at most {MAX_LENGTH} characters"));
        }

        match normalized.rsplit_once('@') {
            None => reasons.push("must contain '@'".to_string()),
            Some((local, domain)) => {
                if local.is_empty() {
                    reasons.push("local part cannot be empty".to_string());
                } else {
                    if local.len() > MAX_LOCAL_LENGTH {
                        reasons.push(format!(
                            "local part must be at most {MAX_LOCAL_LENGTH} characters"
                        ));
                    }
                    if !LOCAL_PART.is_match(local) {
                        reasons.push("local part is malformed".to_string());
                    }
                }
                if !DOMAIN.is_match(domain) {
                    reasons.push("domain is malformed".to_string());
                }
            }
        }

        if reasons.is_empty() {
            Ok(Self(normalized))
        } else {
            Err(DomainError::validation(format!(
                "email '{}': {}",
                raw.trim(),
                reasons.join("; ")
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn local_part(&self) -> &str {
        self.0.rsplit_once('@').map(|(local, _)| local).unwrap_or_default()
    }

    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map(|(_, domain)| domain).unwrap_or_default()
    }
}

impl ValueObject for Email {}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for Email {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_lowercase() {
        let email = Email::new("  Alice.Smith@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice.smith@example.com");
        assert_eq!(email.local_part(), "alice.smith");
        assert_eq!(email.domain(), "example.com");
    }

    #[test]
    fn accepts_plus_addressing_and_subdomains() {
        assert!(Email::new("ops+alerts@mail.eu.example.org").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in [
            "",
            "plainaddress",
            "@example.com",
            "alice@",
            "alice@example",
            "alice..smith@example.com",
            ".alice@example.com",
            "alice.@example.com",
            "alice@-example.com",
            "alice smith@example.com",
        ] {
            assert!(Email::new(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn rejects_overlong_local_part() {
        let local = "a".repeat(65);
        let err = Email::new(&format!("{local}@example.com")).unwrap_err();
        assert!(err.to_string().contains("local part must be at most 64"));
    }
}
