//! Three-state lifecycle shared by organizations, departments, roles and permissions.
//!
//! ```text
//! ACTIVE    --suspend--> SUSPENDED
//! SUSPENDED --activate-> ACTIVE
//! ACTIVE/SUSPENDED --disable--> DISABLED
//! DISABLED  --activate-> ACTIVE
//! ```

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityStatus {
    #[default]
    Active,
    Suspended,
    Disabled,
}

impl EntityStatus {
    pub fn is_active(self) -> bool {
        self == EntityStatus::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityStatus::Active => "ACTIVE",
            EntityStatus::Suspended => "SUSPENDED",
            EntityStatus::Disabled => "DISABLED",
        }
    }

    /// Next status after `activate`; `label` names the entity in errors.
    pub fn activate(self, label: &str) -> DomainResult<Self> {
        match self {
            EntityStatus::Active => Err(DomainError::state(format!("{label} is already active"))),
            EntityStatus::Suspended | EntityStatus::Disabled => Ok(EntityStatus::Active),
        }
    }

    pub fn suspend(self, label: &str) -> DomainResult<Self> {
        match self {
            EntityStatus::Active => Ok(EntityStatus::Suspended),
            EntityStatus::Suspended => {
                Err(DomainError::state(format!("{label} is already suspended")))
            }
            EntityStatus::Disabled => Err(DomainError::state(format!(
                "{label} is disabled and cannot be suspended"
            ))),
        }
    }

    pub fn disable(self, label: &str) -> DomainResult<Self> {
        match self {
            EntityStatus::Active | EntityStatus::Suspended => Ok(EntityStatus::Disabled),
            EntityStatus::Disabled => Err(DomainError::state(format!("{label} is already disabled"))),
        }
    }

    /// Dispatch to the mutator that leads to `target`.
    pub fn transition_to(self, target: EntityStatus, label: &str) -> DomainResult<Self> {
        match target {
            EntityStatus::Active => self.activate(label),
            EntityStatus::Suspended => self.suspend(label),
            EntityStatus::Disabled => self.disable(label),
        }
    }
}

impl core::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(EntityStatus::Active),
            "SUSPENDED" => Ok(EntityStatus::Suspended),
            "DISABLED" => Ok(EntityStatus::Disabled),
            other => Err(DomainError::validation(format!("unknown status '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_and_suspended_toggle() {
        let s = EntityStatus::Active.suspend("org").unwrap();
        assert_eq!(s, EntityStatus::Suspended);
        assert_eq!(s.activate("org").unwrap(), EntityStatus::Active);
    }

    #[test]
    fn disabled_can_be_reactivated_but_not_suspended() {
        let s = EntityStatus::Suspended.disable("org").unwrap();
        assert!(s.suspend("org").is_err());
        assert_eq!(s.activate("org").unwrap(), EntityStatus::Active);
    }

    #[test]
    fn transitions_into_current_state_fail() {
        for status in [EntityStatus::Active, EntityStatus::Suspended, EntityStatus::Disabled] {
            let err = status.transition_to(status, "role").unwrap_err();
            assert!(err.to_string().contains("already"));
        }
    }

    #[test]
    fn parses_known_statuses_only() {
        assert_eq!("suspended".parse::<EntityStatus>().unwrap(), EntityStatus::Suspended);
        assert!(matches!(
            "ARCHIVED".parse::<EntityStatus>(),
            Err(DomainError::Validation(_))
        ));
    }
}
