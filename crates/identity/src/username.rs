use serde::{Deserialize, Serialize};

use orgiam_core::{CaseStyle, CodeRules, impl_code_value_object};

/// Login name, unique per tenant.
///
/// 3–30 characters, lowercase letters and digits separated by `_`, `.` or `-`,
/// starting with a letter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub const RULES: CodeRules = CodeRules {
        label: "username",
        min_len: 3,
        max_len: 30,
        case: CaseStyle::Lower,
        separators: &['_', '.', '-'],
        reserved: &[
            "admin",
            "administrator",
            "root",
            "system",
            "support",
            "guest",
            "anonymous",
            "null",
            "undefined",
            "api",
        ],
        must_start_with_letter: true,
        generated_prefix: "user",
    };
}

impl_code_value_object!(Username);
