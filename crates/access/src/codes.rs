//! Role and permission codes.

use serde::{Deserialize, Serialize};

use orgiam_core::{CaseStyle, CodeRules, DomainError, DomainResult, ValueObject, impl_code_value_object};

/// Role code, unique within an organization. Uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleCode(String);

impl RoleCode {
    pub const RULES: CodeRules = CodeRules {
        label: "role code",
        min_len: 3,
        max_len: 50,
        case: CaseStyle::Upper,
        separators: &['_', '-'],
        reserved: &["NULL", "UNDEFINED", "ROOT"],
        must_start_with_letter: true,
        generated_prefix: "ROLE",
    };
}

impl_code_value_object!(RoleCode);

// ─────────────────────────────────────────────────────────────────────────────
// Permission code
// ─────────────────────────────────────────────────────────────────────────────

const PERMISSION_MAX_LENGTH: usize = 100;
const WILDCARD: &str = "*";

/// `resource:action:scope`, lowercase. Each part is `[a-z][a-z0-9_-]*` or `*`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionCode(String);

impl PermissionCode {
    pub fn new(raw: &str) -> DomainResult<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(DomainError::validation("permission code cannot be empty"));
        }

        let mut reasons = Vec::new();
        if normalized.len() > PERMISSION_MAX_LENGTH {
            reasons.push(format!("must be at most {PERMISSION_MAX_LENGTH} characters"));
        }

        let parts: Vec<&str> = normalized.split(':').collect();
        if parts.len() != 3 {
            reasons.push("must have the form resource:action:scope".to_string());
        } else {
            for (label, part) in ["resource", "action", "scope"].iter().zip(&parts) {
                if part.is_empty() {
                    reasons.push(format!("{label} cannot be empty"));
                } else if !is_valid_part(part) {
                    reasons.push(format!(
                        "{label} '{part}' must start with a letter and contain only letters, digits, '_' or '-' (or be '*')"
                    ));
                }
            }
        }

        if reasons.is_empty() {
            Ok(Self(normalized))
        } else {
            Err(DomainError::validation(format!(
                "permission code '{}': {}",
                raw.trim(),
                reasons.join("; ")
            )))
        }
    }

    pub fn from_parts(resource: &str, action: &str, scope: &str) -> DomainResult<Self> {
        Self::new(&format!("{}:{}:{}", resource.trim(), action.trim(), scope.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn part(&self, index: usize) -> &str {
        self.0.split(':').nth(index).unwrap_or_default()
    }

    pub fn resource(&self) -> &str {
        self.part(0)
    }

    pub fn action(&self) -> &str {
        self.part(1)
    }

    pub fn scope(&self) -> &str {
        self.part(2)
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.split(':').any(|p| p == WILDCARD)
    }

    /// Whether holding `self` grants `other`; `*` matches any part.
    pub fn implies(&self, other: &PermissionCode) -> bool {
        self.0
            .split(':')
            .zip(other.0.split(':'))
            .all(|(mine, theirs)| mine == WILDCARD || mine == theirs)
    }
}

fn is_valid_part(part: &str) -> bool {
    if part == WILDCARD {
        return true;
    }
    let mut chars = part.chars();
    chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

impl ValueObject for PermissionCode {}

impl core::fmt::Display for PermissionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl core::str::FromStr for PermissionCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PermissionCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<PermissionCode> for String {
    fn from(value: PermissionCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn role_codes_are_case_insensitive() {
        assert_eq!(RoleCode::new("manager").unwrap(), RoleCode::new("MANAGER").unwrap());
        assert!(RoleCode::new("root").is_err());
        assert!(RoleCode::new("1ADMIN").is_err());
    }

    #[test]
    fn permission_code_parts() {
        let code = PermissionCode::new("user:read:global").unwrap();
        assert_eq!(code.resource(), "user");
        assert_eq!(code.action(), "read");
        assert_eq!(code.scope(), "global");
        assert!(!code.is_wildcard());
    }

    #[test]
    fn permission_code_is_lowercased() {
        let code = PermissionCode::new(" User:READ:Org ").unwrap();
        assert_eq!(code.as_str(), "user:read:org");
        assert_eq!(code, PermissionCode::from_parts("user", "read", "org").unwrap());
    }

    #[test]
    fn rejects_malformed_permission_codes() {
        for bad in ["", "user", "user:read", "user:read:global:extra", "user::global", "1user:read:x", "user:re ad:x", "user:read:**"] {
            assert!(PermissionCode::new(bad).is_err(), "{bad:?} should be rejected");
        }
        let msg = PermissionCode::new("user::").unwrap_err().to_string();
        assert!(msg.contains("action cannot be empty"));
        assert!(msg.contains("scope cannot be empty"));
    }

    #[test]
    fn wildcards_imply_specific_codes() {
        let any_user = PermissionCode::new("user:*:*").unwrap();
        let read = PermissionCode::new("user:read:global").unwrap();
        let invoice = PermissionCode::new("invoice:read:global").unwrap();
        assert!(any_user.is_wildcard());
        assert!(any_user.implies(&read));
        assert!(!any_user.implies(&invoice));
        assert!(read.implies(&read));
        assert!(!read.implies(&any_user));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: valid permission codes survive a Display/FromStr round trip.
        #[test]
        fn permission_codes_round_trip(
            resource in "[a-z][a-z0-9_-]{0,10}",
            action in "[a-z][a-z0-9_-]{0,10}|\\*",
            scope in "[a-z][a-z0-9_-]{0,10}|\\*",
        ) {
            let code = PermissionCode::from_parts(&resource, &action, &scope).unwrap();
            prop_assert_eq!(code.to_string().parse::<PermissionCode>().unwrap(), code.clone());
            prop_assert_eq!(code.resource(), resource.as_str());
            prop_assert!(code.implies(&code));
        }

        /// Property: generated role codes validate.
        #[test]
        fn generated_role_codes_validate(name in "\\PC{0,60}") {
            let code = RoleCode::generate_from_name(&name);
            prop_assert_eq!(code.to_string().parse::<RoleCode>().unwrap(), code);
            prop_assert!(RoleCode::new(RoleCode::generate().as_str()).is_ok());
        }
    }
}
