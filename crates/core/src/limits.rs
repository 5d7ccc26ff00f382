//! Capacity checks shared by every aggregate.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A counter that has crossed the warning ratio of its configured maximum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitWarning {
    pub resource: String,
    pub current: u64,
    pub max: u64,
    pub usage_ratio: f64,
}

/// Guard for an add operation: `allowed && current < max`.
pub fn ensure_capacity(resource: &str, allowed: bool, current: u64, max: u64) -> DomainResult<()> {
    if !allowed {
        return Err(DomainError::capacity(format!(
            "cannot add more {resource}: adding {resource} is disabled by settings"
        )));
    }
    if current >= max {
        return Err(DomainError::capacity(format!(
            "cannot add more {resource} (limit of {max} reached)"
        )));
    }
    Ok(())
}

/// Guard for a settings update: a limit may not shrink below live usage.
pub fn ensure_limit_covers(resource: &str, new_max: u64, current: u64) -> DomainResult<()> {
    if new_max < current {
        return Err(DomainError::capacity(format!(
            "max {resource} ({new_max}) cannot be lower than the current {resource} count ({current})"
        )));
    }
    Ok(())
}

/// Reject negative counters coming from the outside.
pub fn non_negative(counter: &str, value: i64) -> DomainResult<u64> {
    u64::try_from(value)
        .map_err(|_| DomainError::validation(format!("{counter} cannot be negative (got {value})")))
}

/// Every `(resource, current, max)` at or above `ratio` of its maximum.
///
/// Counters with a zero maximum are skipped.
pub fn limit_warnings(counters: &[(&str, u64, u64)], ratio: f64) -> Vec<LimitWarning> {
    counters
        .iter()
        .filter(|(_, _, max)| *max > 0)
        .filter_map(|&(resource, current, max)| {
            let usage_ratio = current as f64 / max as f64;
            (usage_ratio >= ratio).then(|| LimitWarning {
                resource: resource.to_string(),
                current,
                max,
                usage_ratio,
            })
        })
        .collect()
}
