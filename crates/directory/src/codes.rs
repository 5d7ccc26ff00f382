//! Tenant, organization and department codes.

use serde::{Deserialize, Serialize};

use orgiam_core::{CaseStyle, CodeRules, impl_code_value_object};

const RESERVED_CODES: &[&str] = &[
    "ADMIN",
    "ROOT",
    "SYSTEM",
    "API",
    "NULL",
    "UNDEFINED",
    "DEFAULT",
    "PUBLIC",
    "PRIVATE",
];

/// Tenant code, unique across the installation. Lowercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantCode(String);

impl TenantCode {
    pub const RULES: CodeRules = CodeRules {
        label: "tenant code",
        min_len: 3,
        max_len: 30,
        case: CaseStyle::Lower,
        separators: &['-', '_'],
        reserved: RESERVED_CODES,
        must_start_with_letter: true,
        generated_prefix: "tenant",
    };
}

impl_code_value_object!(TenantCode);

/// Organization code, unique within a tenant. Uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganizationCode(String);

impl OrganizationCode {
    pub const RULES: CodeRules = CodeRules {
        label: "organization code",
        min_len: 3,
        max_len: 20,
        case: CaseStyle::Upper,
        separators: &['_', '-'],
        reserved: RESERVED_CODES,
        must_start_with_letter: false,
        generated_prefix: "ORG",
    };
}

impl_code_value_object!(OrganizationCode);

/// Department code, unique within an organization. Uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DepartmentCode(String);

impl DepartmentCode {
    pub const RULES: CodeRules = CodeRules {
        label: "department code",
        min_len: 3,
        max_len: 20,
        case: CaseStyle::Upper,
        separators: &['_', '-'],
        reserved: RESERVED_CODES,
        must_start_with_letter: false,
        generated_prefix: "DEPT",
    };
}

impl_code_value_object!(DepartmentCode);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn organization_codes_compare_case_insensitively() {
        assert_eq!(
            OrganizationCode::new("org001").unwrap(),
            OrganizationCode::new("ORG001").unwrap()
        );
        assert_eq!(OrganizationCode::new("org001").unwrap().as_str(), "ORG001");
    }

    #[test]
    fn tenant_codes_are_lowercase() {
        assert_eq!(TenantCode::new("Acme-Corp").unwrap().as_str(), "acme-corp");
        assert!(TenantCode::new("1acme").is_err());
    }

    #[test]
    fn rejects_reserved_and_malformed_codes() {
        assert!(OrganizationCode::new("admin").is_err());
        assert!(DepartmentCode::new("public").is_err());
        assert!(OrganizationCode::new("12345").is_err());
        assert!(OrganizationCode::new("AB").is_err());
        assert!(OrganizationCode::new("A__B").is_err());
        assert!(OrganizationCode::new("-ABC").is_err());
        assert!(DepartmentCode::new(&"D".repeat(21)).is_err());
    }

    #[test]
    fn error_lists_all_reasons() {
        let msg = OrganizationCode::new("_a").unwrap_err().to_string();
        assert!(msg.contains("organization code"));
        assert!(msg.contains("at least 3"));
        assert!(msg.contains("separator"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: generated codes validate and survive a Display/FromStr round trip.
        #[test]
        fn generated_codes_round_trip(name in "\\PC{0,40}") {
            let org = OrganizationCode::generate_from_name(&name);
            prop_assert_eq!(org.to_string().parse::<OrganizationCode>().unwrap(), org);
            let dept = DepartmentCode::generate_from_name(&name);
            prop_assert_eq!(dept.to_string().parse::<DepartmentCode>().unwrap(), dept);
            let tenant = TenantCode::generate_from_name(&name);
            prop_assert_eq!(tenant.to_string().parse::<TenantCode>().unwrap(), tenant);

            prop_assert!(OrganizationCode::new(OrganizationCode::generate().as_str()).is_ok());
            prop_assert!(DepartmentCode::new(DepartmentCode::generate().as_str()).is_ok());
            prop_assert!(TenantCode::new(TenantCode::generate().as_str()).is_ok());
        }

        /// Property: case does not matter for equality.
        #[test]
        fn case_is_normalized(code in "[A-Za-z][A-Za-z0-9]{2,15}") {
            prop_assume!(OrganizationCode::new(&code).is_ok());
            prop_assert_eq!(
                OrganizationCode::new(&code.to_lowercase()).unwrap(),
                OrganizationCode::new(&code.to_uppercase()).unwrap()
            );
        }
    }
}
