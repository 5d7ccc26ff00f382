//! Tenant entity: the outermost isolation boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::{DomainError, DomainResult, Entity, TenantId};

use crate::TenantCode;

/// Tenant lifecycle. Like [`orgiam_core::EntityStatus`] with an extra
/// onboarding state in front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Pending,
    #[default]
    Active,
    Suspended,
    Disabled,
}

impl TenantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TenantStatus::Pending => "PENDING",
            TenantStatus::Active => "ACTIVE",
            TenantStatus::Suspended => "SUSPENDED",
            TenantStatus::Disabled => "DISABLED",
        }
    }
}

impl core::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    id: TenantId,
    code: TenantCode,
    name: String,
    status: TenantStatus,
    max_users: u64,
    max_organizations: u64,
    settings: BTreeMap<String, serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Tenant {
    pub const DEFAULT_MAX_USERS: u64 = 1_000;
    pub const DEFAULT_MAX_ORGANIZATIONS: u64 = 10;

    /// New ACTIVE tenant with default limits.
    pub fn new(id: TenantId, code: TenantCode, name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        Ok(Self {
            id,
            code,
            name: non_empty_name(name)?,
            status: TenantStatus::Active,
            max_users: Self::DEFAULT_MAX_USERS,
            max_organizations: Self::DEFAULT_MAX_ORGANIZATIONS,
            settings: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// New tenant awaiting activation (self-service signup).
    pub fn pending(id: TenantId, code: TenantCode, name: &str, now: DateTime<Utc>) -> DomainResult<Self> {
        let mut tenant = Self::new(id, code, name, now)?;
        tenant.status = TenantStatus::Pending;
        Ok(tenant)
    }

    pub fn code(&self) -> &TenantCode {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TenantStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == TenantStatus::Active
    }

    pub fn max_users(&self) -> u64 {
        self.max_users
    }

    pub fn max_organizations(&self) -> u64 {
        self.max_organizations
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == TenantStatus::Active {
            return Err(DomainError::state("tenant is already active"));
        }
        self.status = TenantStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    pub fn suspend(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            TenantStatus::Active => {}
            TenantStatus::Suspended => return Err(DomainError::state("tenant is already suspended")),
            other => {
                return Err(DomainError::state(format!("tenant is {other} and cannot be suspended")));
            }
        }
        self.status = TenantStatus::Suspended;
        self.updated_at = now;
        Ok(())
    }

    pub fn disable(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == TenantStatus::Disabled {
            return Err(DomainError::state("tenant is already disabled"));
        }
        self.status = TenantStatus::Disabled;
        self.updated_at = now;
        Ok(())
    }

    pub fn update_name(&mut self, name: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.name = non_empty_name(name)?;
        self.updated_at = now;
        Ok(())
    }

    /// Replace both limits. Zero is not a usable limit.
    pub fn update_limits(&mut self, max_users: u64, max_organizations: u64, now: DateTime<Utc>) -> DomainResult<()> {
        if max_users == 0 || max_organizations == 0 {
            return Err(DomainError::validation("tenant limits must be greater than zero"));
        }
        self.max_users = max_users;
        self.max_organizations = max_organizations;
        self.updated_at = now;
        Ok(())
    }

    /// Whether one more user fits, given `current` users.
    pub fn can_add_user(&self, current: u64) -> bool {
        self.is_active() && current < self.max_users
    }

    /// Whether one more organization fits, given `current` organizations.
    pub fn can_add_organization(&self, current: u64) -> bool {
        self.is_active() && current < self.max_organizations
    }

    pub fn setting(&self, key: &str) -> Option<&serde_json::Value> {
        self.settings.get(key)
    }

    pub fn settings(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.settings
    }

    pub fn set_setting(&mut self, key: &str, value: serde_json::Value, now: DateTime<Utc>) -> DomainResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(DomainError::validation("setting key cannot be empty"));
        }
        self.settings.insert(key.to_string(), value);
        self.updated_at = now;
        Ok(())
    }

    pub fn remove_setting(&mut self, key: &str, now: DateTime<Utc>) -> Option<serde_json::Value> {
        let removed = self.settings.remove(key);
        if removed.is_some() {
            self.updated_at = now;
        }
        removed
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

pub(crate) fn non_empty_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tenant() -> Tenant {
        Tenant::pending(TenantId::new(), TenantCode::new("acme").unwrap(), "Acme", Utc::now()).unwrap()
    }

    #[test]
    fn pending_tenant_activates_once() {
        let mut t = tenant();
        assert_eq!(t.status(), TenantStatus::Pending);
        assert!(t.suspend(Utc::now()).is_err());
        t.activate(Utc::now()).unwrap();
        assert!(t.activate(Utc::now()).is_err());
        t.suspend(Utc::now()).unwrap();
        t.disable(Utc::now()).unwrap();
        assert!(t.suspend(Utc::now()).is_err());
        t.activate(Utc::now()).unwrap();
    }

    #[test]
    fn capacity_requires_active_tenant() {
        let mut t = tenant();
        assert!(!t.can_add_user(0));
        t.activate(Utc::now()).unwrap();
        assert!(t.can_add_user(999));
        assert!(!t.can_add_user(1_000));
        t.update_limits(5, 1, Utc::now()).unwrap();
        assert!(!t.can_add_organization(1));
        assert!(t.update_limits(0, 1, Utc::now()).is_err());
    }

    #[test]
    fn settings_map() {
        let mut t = tenant();
        t.set_setting("locale", json!("en-GB"), Utc::now()).unwrap();
        assert_eq!(t.setting("locale"), Some(&json!("en-GB")));
        assert!(t.set_setting("  ", json!(1), Utc::now()).is_err());
        assert_eq!(t.remove_setting("locale", Utc::now()), Some(json!("en-GB")));
        assert!(t.settings().is_empty());
    }

    #[test]
    fn name_cannot_be_blank() {
        let mut t = tenant();
        assert!(matches!(t.update_name(" ", Utc::now()), Err(DomainError::Validation(_))));
    }
}
