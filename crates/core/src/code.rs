//! Shared format rules for short, normalized identifiers ("codes").
//!
//! Organization, department, role and tenant codes as well as usernames all
//! follow the same shape: a bounded run of ASCII letters and digits, optionally
//! split by separators that may not lead, trail or repeat. The value objects in
//! the domain crates wrap a [`CodeRules`] constant and delegate to it, so the
//! generator and the validator can never disagree.

use rand::Rng;

use crate::error::{DomainError, DomainResult};

/// Case a code is normalized to before validation and comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStyle {
    Upper,
    Lower,
}

impl CaseStyle {
    fn apply(self, s: &str) -> String {
        match self {
            CaseStyle::Upper => s.to_ascii_uppercase(),
            CaseStyle::Lower => s.to_ascii_lowercase(),
        }
    }

    fn apply_char(self, c: char) -> char {
        match self {
            CaseStyle::Upper => c.to_ascii_uppercase(),
            CaseStyle::Lower => c.to_ascii_lowercase(),
        }
    }
}

/// Format rules for one family of codes.
#[derive(Debug, Clone, Copy)]
pub struct CodeRules {
    /// Human-readable name used in error messages ("organization code").
    pub label: &'static str,
    pub min_len: usize,
    pub max_len: usize,
    pub case: CaseStyle,
    /// Allowed separators; the first one is used by the generators.
    pub separators: &'static [char],
    /// Reserved words, compared after normalization.
    pub reserved: &'static [&'static str],
    pub must_start_with_letter: bool,
    /// Prefix used by [`CodeRules::generate`] and for numeric names.
    pub generated_prefix: &'static str,
}

const RANDOM_SUFFIX_LEN: usize = 6;
const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

impl CodeRules {
    fn is_separator(&self, c: char) -> bool {
        self.separators.contains(&c)
    }

    fn separator(&self) -> char {
        self.separators.first().copied().unwrap_or('_')
    }

    /// Trim and case-normalize without validating.
    pub fn normalize(&self, raw: &str) -> String {
        self.case.apply(raw.trim())
    }

    pub fn is_valid(&self, raw: &str) -> bool {
        self.validate(raw).is_ok()
    }

    fn is_reserved(&self, normalized: &str) -> bool {
        self.reserved
            .iter()
            .any(|word| self.case.apply(word) == normalized)
    }

    /// Validate `raw`, returning its normalized form.
    ///
    /// Every failed rule is reported in a single [`DomainError::Validation`].
    pub fn validate(&self, raw: &str) -> DomainResult<String> {
        let normalized = self.normalize(raw);
        if normalized.is_empty() {
            return Err(DomainError::validation(format!(
                "{} cannot be empty",
                self.label
            )));
        }

        let mut reasons: Vec<String> = Vec::new();
        let len = normalized.chars().count();

        if len < self.min_len {
            reasons.push(format!("must be at least {} characters", self.min_len));
        }
        if len > self.max_len {
            reasons.push(format!("must be at most {} characters", self.max_len));
        }
        if normalized
            .chars()
            .any(|c| !c.is_ascii_alphanumeric() && !self.is_separator(c))
        {
            let allowed: String = self.separators.iter().collect();
            reasons.push(format!(
                "contains invalid characters (allowed: letters, digits and '{allowed}')"
            ));
        }

        let first = normalized.chars().next();
        let last = normalized.chars().last();
        if first.is_some_and(|c| self.is_separator(c)) || last.is_some_and(|c| self.is_separator(c))
        {
            reasons.push("must not start or end with a separator".to_string());
        }

        let chars: Vec<char> = normalized.chars().collect();
        if chars
            .windows(2)
            .any(|w| self.is_separator(w[0]) && self.is_separator(w[1]))
        {
            reasons.push("must not contain consecutive separators".to_string());
        }

        if normalized.chars().all(|c| c.is_ascii_digit()) {
            reasons.push("must not be purely numeric".to_string());
        } else if self.must_start_with_letter && !first.is_some_and(|c| c.is_ascii_alphabetic()) {
            reasons.push("must start with a letter".to_string());
        }

        if self.is_reserved(&normalized) {
            reasons.push(format!("'{normalized}' is a reserved word"));
        }

        if reasons.is_empty() {
            Ok(normalized)
        } else {
            Err(DomainError::validation(format!(
                "{} '{}': {}",
                self.label,
                raw.trim(),
                reasons.join("; ")
            )))
        }
    }

    fn random_chars(&self, count: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..count)
            .map(|_| {
                let idx = rng.gen_range(0..ALPHANUMERIC.len());
                self.case.apply_char(ALPHANUMERIC[idx] as char)
            })
            .collect()
    }

    /// Random code of the form `<PREFIX><sep><random>`, always valid.
    pub fn generate(&self) -> String {
        let prefix = self.case.apply(self.generated_prefix);
        let room = self
            .max_len
            .saturating_sub(prefix.len() + 1)
            .min(RANDOM_SUFFIX_LEN);
        let candidate = if prefix.is_empty() || room == 0 {
            // Leading letter keeps the code from being numeric or digit-led.
            let letter = self.case.apply_char('X');
            format!("{letter}{}", self.random_chars(self.min_len.max(RANDOM_SUFFIX_LEN) - 1))
        } else {
            format!("{prefix}{}{}", self.separator(), self.random_chars(room.max(1)))
        };

        let mut code = candidate;
        code.truncate(self.max_len);
        while code.len() < self.min_len {
            code.push_str(&self.random_chars(1));
        }
        code
    }

    /// Derive a code from a display name ("Acme Holdings Ltd." → "ACME_HOLDINGS_LTD").
    ///
    /// Falls back to [`CodeRules::generate`] when nothing usable survives.
    pub fn generate_from_name(&self, name: &str) -> String {
        let sep = self.separator();
        let mut code = String::new();
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                code.push(self.case.apply_char(c));
            } else if !code.is_empty() && !code.ends_with(sep) {
                code.push(sep);
            }
        }
        let code = code.trim_end_matches(sep).to_string();
        if code.is_empty() {
            return self.generate();
        }

        let starts_badly = code.chars().all(|c| c.is_ascii_digit())
            || (self.must_start_with_letter
                && !code.chars().next().is_some_and(|c| c.is_ascii_alphabetic()));
        let mut code = if starts_badly {
            format!("{}{sep}{code}", self.case.apply(self.generated_prefix))
        } else {
            code
        };

        code.truncate(self.max_len);
        let mut code = code.trim_end_matches(sep).to_string();
        while code.len() < self.min_len {
            code.push_str(&self.random_chars(1));
        }

        if self.is_reserved(&code) {
            code.truncate(self.max_len.saturating_sub(4));
            let base = code.trim_end_matches(sep).to_string();
            code = format!("{base}{sep}{}", self.random_chars(3));
        }

        if self.is_valid(&code) {
            code
        } else {
            self.generate()
        }
    }
}

/// Implements the constructor, generators and conversions of a code value object.
///
/// The type must be a `struct Name(String)` with an associated
/// `const RULES: CodeRules`.
#[macro_export]
macro_rules! impl_code_value_object {
    ($t:ident) => {
        impl $t {
            /// Validate and normalize `raw`.
            pub fn new(raw: &str) -> $crate::DomainResult<Self> {
                Self::RULES.validate(raw).map(Self)
            }

            /// Random valid value.
            pub fn generate() -> Self {
                Self(Self::RULES.generate())
            }

            /// Valid value derived from a display name.
            pub fn generate_from_name(name: &str) -> Self {
                Self(Self::RULES.generate_from_name(name))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl $crate::ValueObject for $t {}

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl core::str::FromStr for $t {
            type Err = $crate::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = $crate::DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(&value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}
