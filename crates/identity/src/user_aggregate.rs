//! User aggregate: the user entity plus its settings, limits, statistics and
//! the events recorded for every account change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::limits::{ensure_capacity, ensure_limit_covers, limit_warnings, non_negative};
use orgiam_core::{
    AggregateRoot, DepartmentId, DomainError, DomainResult, Entity, LimitWarning, LockoutPolicy,
    OrganizationId, PolicyConfig, RoleId, TenantId, UserId,
};
use orgiam_events::{DomainEvent, EventBuffer, EventPayload, RecordsEvents};

use crate::user::{LoginOutcome, User, UserStatus};
use crate::Email;

// ─────────────────────────────────────────────────────────────────────────────
// Settings, limits, statistics
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub allow_multiple_roles: bool,
    pub allow_role_assignment: bool,
    pub allow_department_assignment: bool,
    pub require_password_change: bool,
    pub mfa_enabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            allow_multiple_roles: true,
            allow_role_assignment: true,
            allow_department_assignment: true,
            require_password_change: false,
            mfa_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLimits {
    pub max_roles: u64,
    pub max_departments: u64,
    pub max_sessions: u64,
}

impl Default for UserLimits {
    fn default() -> Self {
        Self {
            max_roles: 20,
            max_departments: 5,
            max_sessions: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatistics {
    pub role_count: u64,
    pub department_count: u64,
    pub login_count: u64,
    pub failed_login_count: u64,
    pub session_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl UserStatistics {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            role_count: 0,
            department_count: 0,
            login_count: 0,
            failed_login_count: 0,
            session_count: 0,
            last_updated: now,
        }
    }
}

/// Partial settings update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserSettingsPatch {
    pub allow_multiple_roles: Option<bool>,
    pub allow_role_assignment: Option<bool>,
    pub allow_department_assignment: Option<bool>,
    pub require_password_change: Option<bool>,
    pub mfa_enabled: Option<bool>,
    pub max_roles: Option<u64>,
    pub max_departments: Option<u64>,
    pub max_sessions: Option<u64>,
}

/// Externally reported counters. Signed so that bad input can be rejected
/// instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserStatisticsUpdate {
    pub login_count: Option<i64>,
    pub failed_login_count: Option<i64>,
    pub session_count: Option<i64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserEvent {
    Registered {
        tenant_id: TenantId,
        username: String,
        email: String,
    },
    StatusChanged {
        from: UserStatus,
        to: UserStatus,
        reason: Option<String>,
    },
    OrganizationJoined {
        organization_id: OrganizationId,
    },
    OrganizationLeft {
        organization_id: OrganizationId,
    },
    RoleAssigned {
        role_id: RoleId,
    },
    RoleRemoved {
        role_id: RoleId,
    },
    DepartmentAdded {
        department_id: DepartmentId,
    },
    DepartmentRemoved {
        department_id: DepartmentId,
    },
    LoginSucceeded {
        lock_cleared: bool,
    },
    LoginFailed {
        attempts: u32,
    },
    AccountLocked {
        until: DateTime<Utc>,
        reason: String,
    },
    AccountUnlocked,
    PasswordChanged,
    ProfileUpdated {
        display_name: Option<String>,
        email: Option<String>,
    },
    SettingsUpdated {
        settings: UserSettings,
        limits: UserLimits,
    },
    StatisticsUpdated {
        statistics: UserStatistics,
    },
    LimitsWarning {
        warnings: Vec<LimitWarning>,
    },
}

impl EventPayload for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::Registered { .. } => "identity.user.registered",
            UserEvent::StatusChanged { .. } => "identity.user.status_changed",
            UserEvent::OrganizationJoined { .. } => "identity.user.organization_joined",
            UserEvent::OrganizationLeft { .. } => "identity.user.organization_left",
            UserEvent::RoleAssigned { .. } => "identity.user.role_assigned",
            UserEvent::RoleRemoved { .. } => "identity.user.role_removed",
            UserEvent::DepartmentAdded { .. } => "identity.user.department_added",
            UserEvent::DepartmentRemoved { .. } => "identity.user.department_removed",
            UserEvent::LoginSucceeded { .. } => "identity.user.login_succeeded",
            UserEvent::LoginFailed { .. } => "identity.user.login_failed",
            UserEvent::AccountLocked { .. } => "identity.user.locked",
            UserEvent::AccountUnlocked => "identity.user.unlocked",
            UserEvent::PasswordChanged => "identity.user.password_changed",
            UserEvent::ProfileUpdated { .. } => "identity.user.profile_updated",
            UserEvent::SettingsUpdated { .. } => "identity.user.settings_updated",
            UserEvent::StatisticsUpdated { .. } => "identity.user.statistics_updated",
            UserEvent::LimitsWarning { .. } => "identity.user.limits_warning",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate
// ─────────────────────────────────────────────────────────────────────────────

/// Aggregate root: User.
///
/// Every recorded event bumps the version by one. Most mutations record a
/// single event; a failed login that trips the lockout also records
/// `AccountLocked`, and a statistics update that crosses the warning ratio
/// also records `LimitsWarning`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserAggregate {
    user: User,
    settings: UserSettings,
    limits: UserLimits,
    statistics: UserStatistics,
    lockout: LockoutPolicy,
    warning_ratio: f64,
    version: u64,
    events: EventBuffer<UserEvent>,
}

impl UserAggregate {
    /// Wrap a freshly created user and record `Registered`.
    pub fn register(user: User, now: DateTime<Utc>) -> Self {
        let statistics = UserStatistics {
            role_count: user.role_ids().len() as u64,
            department_count: user.department_ids().len() as u64,
            ..UserStatistics::new(now)
        };
        let mut aggregate = Self {
            user,
            settings: UserSettings::default(),
            limits: UserLimits::default(),
            statistics,
            lockout: LockoutPolicy::default(),
            warning_ratio: PolicyConfig::DEFAULT_LIMIT_WARNING_RATIO,
            version: 0,
            events: EventBuffer::new(),
        };
        let payload = UserEvent::Registered {
            tenant_id: aggregate.user.tenant_id(),
            username: aggregate.user.username().to_string(),
            email: aggregate.user.email().to_string(),
        };
        aggregate.record(now, payload);
        aggregate
    }

    /// Apply the lockout policy and warning ratio from configuration.
    pub fn with_policy(mut self, config: &PolicyConfig) -> Self {
        self.lockout = config.lockout();
        self.warning_ratio = config.limit_warning_ratio;
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn settings(&self) -> &UserSettings {
        &self.settings
    }

    pub fn limits(&self) -> &UserLimits {
        &self.limits
    }

    pub fn statistics(&self) -> &UserStatistics {
        &self.statistics
    }

    pub fn lockout_policy(&self) -> &LockoutPolicy {
        &self.lockout
    }

    pub fn tenant_id(&self) -> TenantId {
        self.user.tenant_id()
    }

    pub fn status(&self) -> UserStatus {
        self.user.status()
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.user.organization_id()
    }

    pub fn role_ids(&self) -> Vec<RoleId> {
        self.user.role_ids().iter().copied().collect()
    }

    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.user.has_role(role_id)
    }

    pub fn in_department(&self, department_id: DepartmentId) -> bool {
        self.user.in_department(department_id)
    }

    pub fn department_ids(&self) -> Vec<DepartmentId> {
        self.user.department_ids().iter().copied().collect()
    }

    fn record(&mut self, now: DateTime<Utc>, payload: UserEvent) {
        self.version += 1;
        self.statistics.last_updated = now;
        let id = *self.user.id();
        self.events.record(id, now, payload);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────

    /// Move to `target`, routing through the matching entity mutator.
    pub fn change_status(
        &mut self,
        target: UserStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let from = self.user.status();
        if from == target {
            return Err(DomainError::state(format!("user is already {target}")));
        }

        match target {
            UserStatus::Pending => {
                return Err(DomainError::state("a user cannot be returned to PENDING"));
            }
            UserStatus::Active => match from {
                UserStatus::Locked => self.user.unlock(now)?,
                UserStatus::Disabled => {
                    self.validate_activation_from_disabled()?;
                    self.user.activate(now)?;
                }
                _ => self.user.activate(now)?,
            },
            UserStatus::Suspended => self.user.suspend(now)?,
            UserStatus::Locked => self.user.lock(self.lockout.lockout_minutes, now)?,
            UserStatus::Disabled => self.user.disable(now)?,
        }

        self.record(
            now,
            UserEvent::StatusChanged {
                from,
                to: target,
                reason: reason.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.change_status(UserStatus::Active, None, now)
    }

    /// Extension point for re-activating a disabled account. Always allowed today.
    fn validate_activation_from_disabled(&self) -> DomainResult<()> {
        Ok(())
    }

    /// Administrative lock for `duration_minutes`.
    pub fn lock(&mut self, duration_minutes: i64, reason: &str, now: DateTime<Utc>) -> DomainResult<()> {
        self.user.lock(duration_minutes, now)?;
        let until = self.user.locked_until().unwrap_or(now);
        self.record(
            now,
            UserEvent::AccountLocked {
                until,
                reason: reason.to_string(),
            },
        );
        Ok(())
    }

    pub fn unlock(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.user.unlock(now)?;
        self.record(now, UserEvent::AccountUnlocked);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Authentication
    // ─────────────────────────────────────────────────────────────────────────

    /// Count a login attempt against the lockout policy.
    ///
    /// A successful login is refused while the account cannot log in (pending,
    /// suspended, disabled, or inside a lock window). Failures are always
    /// counted but only lock an active account or one whose lock has expired.
    pub fn record_login(&mut self, success: bool, now: DateTime<Utc>) -> DomainResult<LoginOutcome> {
        if success && !self.user.can_login(now) {
            return Err(DomainError::state(format!(
                "user cannot log in while {}",
                self.user.status()
            )));
        }

        let outcome = self.user.record_login(success, now, &self.lockout);
        match outcome {
            LoginOutcome::Succeeded { lock_cleared } => {
                self.statistics.login_count += 1;
                self.record(now, UserEvent::LoginSucceeded { lock_cleared });
            }
            LoginOutcome::Failed { attempts } => {
                self.statistics.failed_login_count += 1;
                self.record(now, UserEvent::LoginFailed { attempts });
            }
            LoginOutcome::Locked { attempts, until } => {
                self.statistics.failed_login_count += 1;
                self.record(now, UserEvent::LoginFailed { attempts });
                self.record(
                    now,
                    UserEvent::AccountLocked {
                        until,
                        reason: format!("{attempts} consecutive failed logins"),
                    },
                );
            }
        }
        Ok(outcome)
    }

    /// Store a new password hash; clears a pending forced change.
    pub fn change_password(&mut self, new_hash: &str, now: DateTime<Utc>) -> DomainResult<()> {
        if new_hash == self.user.password_hash() {
            return Err(DomainError::validation(
                "new password must differ from the current password",
            ));
        }
        self.user.set_password_hash(new_hash, now)?;
        self.settings.require_password_change = false;
        self.record(now, UserEvent::PasswordChanged);
        Ok(())
    }

    /// Update display name and/or email. Records nothing if neither changes.
    pub fn update_profile(
        &mut self,
        display_name: Option<&str>,
        email: Option<Email>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut changed_name = None;
        if let Some(name) = display_name {
            if name.trim() != self.user.display_name() {
                self.user.update_display_name(name, now)?;
                changed_name = Some(self.user.display_name().to_string());
            }
        }

        let mut changed_email = None;
        if let Some(email) = email {
            if &email != self.user.email() {
                changed_email = Some(email.to_string());
                self.user.change_email(email, now);
            }
        }

        if changed_name.is_some() || changed_email.is_some() {
            self.record(
                now,
                UserEvent::ProfileUpdated {
                    display_name: changed_name,
                    email: changed_email,
                },
            );
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memberships
    // ─────────────────────────────────────────────────────────────────────────

    /// A user belongs to at most one organization at a time.
    pub fn join_organization(&mut self, organization_id: OrganizationId, now: DateTime<Utc>) -> DomainResult<()> {
        match self.user.organization_id() {
            Some(current) if current == organization_id => {
                return Err(DomainError::state(format!(
                    "user is already a member of organization {organization_id}"
                )));
            }
            Some(current) => {
                return Err(DomainError::state(format!(
                    "user already belongs to organization {current}"
                )));
            }
            None => {}
        }
        self.user.set_organization(Some(organization_id), now);
        self.record(now, UserEvent::OrganizationJoined { organization_id });
        Ok(())
    }

    /// Leaving requires that no roles or departments are still held.
    pub fn leave_organization(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        let Some(organization_id) = self.user.organization_id() else {
            return Err(DomainError::state("user is not a member of any organization"));
        };
        if !self.user.role_ids().is_empty() || !self.user.department_ids().is_empty() {
            return Err(DomainError::state(
                "user still holds roles or departments in the organization",
            ));
        }
        self.user.set_organization(None, now);
        self.record(now, UserEvent::OrganizationLeft { organization_id });
        Ok(())
    }

    pub fn assign_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.user.has_role(role_id) {
            return Err(DomainError::state(format!("role {role_id} is already assigned to the user")));
        }
        let allowed = self.settings.allow_role_assignment
            && (self.settings.allow_multiple_roles || self.statistics.role_count == 0);
        ensure_capacity("roles", allowed, self.statistics.role_count, self.limits.max_roles)?;

        self.user.assign_role(role_id, now);
        self.statistics.role_count = self.user.role_ids().len() as u64;
        self.record(now, UserEvent::RoleAssigned { role_id });
        Ok(())
    }

    pub fn remove_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.user.has_role(role_id) {
            return Err(DomainError::state(format!("role {role_id} is not assigned to the user")));
        }
        self.user.remove_role(role_id, now);
        self.statistics.role_count = self.user.role_ids().len() as u64;
        self.record(now, UserEvent::RoleRemoved { role_id });
        Ok(())
    }

    pub fn add_to_department(&mut self, department_id: DepartmentId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.user.in_department(department_id) {
            return Err(DomainError::state(format!(
                "user is already a member of department {department_id}"
            )));
        }
        ensure_capacity(
            "departments",
            self.settings.allow_department_assignment,
            self.statistics.department_count,
            self.limits.max_departments,
        )?;

        self.user.join_department(department_id, now);
        self.statistics.department_count = self.user.department_ids().len() as u64;
        self.record(now, UserEvent::DepartmentAdded { department_id });
        Ok(())
    }

    pub fn remove_from_department(&mut self, department_id: DepartmentId, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.user.in_department(department_id) {
            return Err(DomainError::state(format!(
                "user is not a member of department {department_id}"
            )));
        }
        self.user.leave_department(department_id, now);
        self.statistics.department_count = self.user.department_ids().len() as u64;
        self.record(now, UserEvent::DepartmentRemoved { department_id });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Settings & statistics
    // ─────────────────────────────────────────────────────────────────────────

    pub fn update_settings(&mut self, patch: UserSettingsPatch, now: DateTime<Utc>) -> DomainResult<()> {
        if let Some(max) = patch.max_roles {
            ensure_limit_covers("roles", max, self.statistics.role_count)?;
        }
        if let Some(max) = patch.max_departments {
            ensure_limit_covers("departments", max, self.statistics.department_count)?;
        }
        if let Some(max) = patch.max_sessions {
            ensure_limit_covers("sessions", max, self.statistics.session_count)?;
        }
        if patch.allow_multiple_roles == Some(false) && self.statistics.role_count > 1 {
            return Err(DomainError::capacity(format!(
                "cannot restrict the user to a single role while {} roles are assigned",
                self.statistics.role_count
            )));
        }

        let s = &mut self.settings;
        if let Some(v) = patch.allow_multiple_roles {
            s.allow_multiple_roles = v;
        }
        if let Some(v) = patch.allow_role_assignment {
            s.allow_role_assignment = v;
        }
        if let Some(v) = patch.allow_department_assignment {
            s.allow_department_assignment = v;
        }
        if let Some(v) = patch.require_password_change {
            s.require_password_change = v;
        }
        if let Some(v) = patch.mfa_enabled {
            s.mfa_enabled = v;
        }

        let l = &mut self.limits;
        if let Some(v) = patch.max_roles {
            l.max_roles = v;
        }
        if let Some(v) = patch.max_departments {
            l.max_departments = v;
        }
        if let Some(v) = patch.max_sessions {
            l.max_sessions = v;
        }

        self.record(
            now,
            UserEvent::SettingsUpdated {
                settings: self.settings,
                limits: self.limits,
            },
        );
        Ok(())
    }

    /// Apply externally reported counters, then run [`Self::check_limits`].
    pub fn update_statistics(&mut self, update: UserStatisticsUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let login_count = update
            .login_count
            .map(|v| non_negative("login_count", v))
            .transpose()?;
        let failed_login_count = update
            .failed_login_count
            .map(|v| non_negative("failed_login_count", v))
            .transpose()?;
        let session_count = update
            .session_count
            .map(|v| non_negative("session_count", v))
            .transpose()?;

        if let Some(v) = login_count {
            self.statistics.login_count = v;
        }
        if let Some(v) = failed_login_count {
            self.statistics.failed_login_count = v;
        }
        if let Some(v) = session_count {
            self.statistics.session_count = v;
        }

        self.record(
            now,
            UserEvent::StatisticsUpdated {
                statistics: self.statistics,
            },
        );
        self.check_limits(now);
        Ok(())
    }

    /// Record one `LimitsWarning` for every counter at or above the warning ratio.
    pub fn check_limits(&mut self, now: DateTime<Utc>) -> Vec<LimitWarning> {
        let warnings = limit_warnings(
            &[
                ("roles", self.statistics.role_count, self.limits.max_roles),
                ("departments", self.statistics.department_count, self.limits.max_departments),
                ("sessions", self.statistics.session_count, self.limits.max_sessions),
            ],
            self.warning_ratio,
        );
        if !warnings.is_empty() {
            tracing::warn!(
                user_id = %self.user.id(),
                count = warnings.len(),
                "user is approaching its limits"
            );
            self.record(
                now,
                UserEvent::LimitsWarning {
                    warnings: warnings.clone(),
                },
            );
        }
        warnings
    }
}

impl AggregateRoot for UserAggregate {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        self.user.id()
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl RecordsEvents for UserAggregate {
    type Payload = UserEvent;

    fn pending_events(&self) -> &[DomainEvent<UserEvent>] {
        self.events.pending()
    }

    fn drain_events(&mut self) -> Vec<DomainEvent<UserEvent>> {
        self.events.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use orgiam_core::ErrorKind;
    use orgiam_events::Event;
    use proptest::prelude::*;

    use crate::Username;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn active_user() -> UserAggregate {
        let user = User::new(
            UserId::new(),
            TenantId::new(),
            Username::new("bob").unwrap(),
            Email::new("bob@example.com").unwrap(),
            "hash-1",
            "Bob",
            t0(),
        )
        .unwrap();
        let mut agg = UserAggregate::register(user, t0());
        agg.activate(t0()).unwrap();
        agg.drain_events();
        agg
    }

    #[test]
    fn register_records_one_event_and_bumps_version() {
        let user = User::new(
            UserId::new(),
            TenantId::new(),
            Username::new("carol").unwrap(),
            Email::new("carol@example.com").unwrap(),
            "hash",
            "",
            t0(),
        )
        .unwrap();
        let agg = UserAggregate::register(user, t0());
        assert_eq!(agg.version(), 1);
        assert_eq!(agg.status(), UserStatus::Pending);
        assert_eq!(agg.pending_events().len(), 1);
        assert_eq!(agg.pending_events()[0].event_type(), "identity.user.registered");
    }

    #[test]
    fn change_status_rejects_noop_and_pending() {
        let mut agg = active_user();
        let err = agg.change_status(UserStatus::Active, None, t0()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
        assert!(agg.change_status(UserStatus::Pending, None, t0()).is_err());

        agg.change_status(UserStatus::Disabled, Some("left the company"), t0()).unwrap();
        agg.change_status(UserStatus::Active, None, t0()).unwrap();
        assert_eq!(agg.status(), UserStatus::Active);

        let events = agg.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].payload(),
            UserEvent::StatusChanged { from: UserStatus::Active, to: UserStatus::Disabled, reason: Some(_) }
        ));
    }

    #[test]
    fn locked_to_active_goes_through_unlock() {
        let mut agg = active_user();
        agg.change_status(UserStatus::Locked, None, t0()).unwrap();
        assert!(agg.user().is_locked(t0()));
        agg.change_status(UserStatus::Active, None, t0()).unwrap();
        assert!(!agg.user().is_locked(t0()));
        assert_eq!(agg.user().login_attempts(), 0);
    }

    #[test]
    fn fifth_failed_login_locks_and_emits_lock_event() {
        let mut agg = active_user();
        for _ in 0..4 {
            agg.record_login(false, t0()).unwrap();
            assert!(!agg.user().is_locked(t0()));
        }
        let outcome = agg.record_login(false, t0()).unwrap();
        assert!(matches!(outcome, LoginOutcome::Locked { attempts: 5, .. }));
        assert!(agg.user().is_locked(t0()));
        assert_eq!(agg.statistics().failed_login_count, 5);

        let types: Vec<_> = agg.drain_events().iter().map(|e| e.event_type()).collect();
        assert_eq!(types.last(), Some(&"identity.user.locked"));

        // Still inside the lock window.
        assert!(agg.record_login(true, t0() + Duration::minutes(10)).is_err());

        let later = t0() + Duration::minutes(31);
        let outcome = agg.record_login(true, later).unwrap();
        assert_eq!(outcome, LoginOutcome::Succeeded { lock_cleared: true });
        assert_eq!(agg.user().login_attempts(), 0);
        assert_eq!(agg.status(), UserStatus::Active);
    }

    #[test]
    fn pending_users_cannot_log_in() {
        let user = User::new(
            UserId::new(),
            TenantId::new(),
            Username::new("dave").unwrap(),
            Email::new("dave@example.com").unwrap(),
            "hash",
            "",
            t0(),
        )
        .unwrap();
        let mut agg = UserAggregate::register(user, t0());
        assert!(agg.record_login(true, t0()).is_err());
    }

    #[test]
    fn failed_logins_do_not_turn_a_suspension_into_a_lock() {
        let mut agg = active_user();
        agg.change_status(UserStatus::Suspended, Some("audit"), t0()).unwrap();
        agg.drain_events();

        for _ in 0..5 {
            let outcome = agg.record_login(false, t0()).unwrap();
            assert!(matches!(outcome, LoginOutcome::Failed { .. }));
        }
        assert_eq!(agg.status(), UserStatus::Suspended);
        assert!(agg.drain_events().iter().all(|e| e.event_type() != "identity.user.locked"));

        let err = agg.record_login(true, t0() + Duration::minutes(31)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
        assert_eq!(agg.status(), UserStatus::Suspended);
    }

    #[test]
    fn failed_logins_leave_pending_users_pending() {
        let user = User::new(
            UserId::new(),
            TenantId::new(),
            Username::new("erin").unwrap(),
            Email::new("erin@example.com").unwrap(),
            "hash",
            "",
            t0(),
        )
        .unwrap();
        let mut agg = UserAggregate::register(user, t0());
        for _ in 0..5 {
            agg.record_login(false, t0()).unwrap();
        }
        assert_eq!(agg.status(), UserStatus::Pending);

        let err = agg.record_login(true, t0() + Duration::minutes(31)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
        assert_eq!(agg.status(), UserStatus::Pending);
    }

    #[test]
    fn one_failure_after_the_lock_window_keeps_the_user_unlocked() {
        let mut agg = active_user();
        for _ in 0..5 {
            agg.record_login(false, t0()).unwrap();
        }
        assert!(agg.user().is_locked(t0()));

        let later = t0() + Duration::minutes(31);
        let outcome = agg.record_login(false, later).unwrap();
        assert_eq!(outcome, LoginOutcome::Failed { attempts: 1 });
        assert!(!agg.user().is_locked(later));
        assert!(agg.record_login(true, later).is_ok());
        assert_eq!(agg.status(), UserStatus::Active);
    }

    #[test]
    fn organization_membership_is_exclusive() {
        let mut agg = active_user();
        let org = OrganizationId::new();
        assert!(agg.leave_organization(t0()).is_err());
        agg.join_organization(org, t0()).unwrap();
        assert_eq!(agg.organization_id(), Some(org));
        assert_eq!(agg.join_organization(org, t0()).unwrap_err().kind(), Some(ErrorKind::State));
        assert!(agg.join_organization(OrganizationId::new(), t0()).is_err());

        let role = RoleId::new();
        agg.assign_role(role, t0()).unwrap();
        assert!(agg.leave_organization(t0()).is_err());
        agg.remove_role(role, t0()).unwrap();
        agg.leave_organization(t0()).unwrap();
        assert_eq!(agg.organization_id(), None);
        assert_eq!(
            agg.pending_events().last().map(|e| e.event_type()),
            Some("identity.user.organization_left")
        );
    }

    #[test]
    fn role_membership_is_strict_at_aggregate_level() {
        let mut agg = active_user();
        let role = RoleId::new();
        agg.assign_role(role, t0()).unwrap();
        assert!(agg.assign_role(role, t0()).unwrap_err().to_string().contains("already"));
        agg.remove_role(role, t0()).unwrap();
        assert!(agg.remove_role(role, t0()).unwrap_err().to_string().contains("not assigned"));
        assert_eq!(agg.statistics().role_count, 0);
    }

    #[test]
    fn single_role_setting_blocks_second_role() {
        let mut agg = active_user();
        agg.assign_role(RoleId::new(), t0()).unwrap();
        agg.update_settings(
            UserSettingsPatch {
                allow_multiple_roles: Some(false),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
        let err = agg.assign_role(RoleId::new(), t0()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Capacity));
    }

    #[test]
    fn limits_cannot_shrink_below_usage() {
        let mut agg = active_user();
        agg.add_to_department(DepartmentId::new(), t0()).unwrap();
        agg.add_to_department(DepartmentId::new(), t0()).unwrap();
        let err = agg
            .update_settings(
                UserSettingsPatch {
                    max_departments: Some(1),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Capacity));
        assert_eq!(agg.limits().max_departments, 5);
    }

    #[test]
    fn change_password_clears_forced_change() {
        let mut agg = active_user();
        agg.update_settings(
            UserSettingsPatch {
                require_password_change: Some(true),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
        assert!(agg.change_password("hash-1", t0()).is_err());
        agg.change_password("hash-2", t0()).unwrap();
        assert!(!agg.settings().require_password_change);
        assert_eq!(agg.user().password_hash(), "hash-2");
    }

    #[test]
    fn update_profile_only_records_real_changes() {
        let mut agg = active_user();
        let version = agg.version();
        agg.update_profile(Some("Bob"), None, t0()).unwrap();
        assert_eq!(agg.version(), version);

        agg.update_profile(Some("Robert"), Some(Email::new("rob@example.com").unwrap()), t0())
            .unwrap();
        assert_eq!(agg.version(), version + 1);
        assert_eq!(agg.user().email().as_str(), "rob@example.com");
    }

    #[test]
    fn statistics_reject_negatives_and_warn_near_limits() {
        let mut agg = active_user();
        let err = agg
            .update_statistics(
                UserStatisticsUpdate {
                    session_count: Some(-1),
                    ..Default::default()
                },
                t0(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Format));

        agg.update_statistics(
            UserStatisticsUpdate {
                session_count: Some(5),
                ..Default::default()
            },
            t0(),
        )
        .unwrap();
        let events = agg.drain_events();
        assert_eq!(events.len(), 2);
        match events[1].payload() {
            UserEvent::LimitsWarning { warnings } => {
                assert_eq!(warnings.len(), 1);
                assert_eq!(warnings[0].resource, "sessions");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: exactly `max_roles` assignments succeed, the next is a capacity error.
        #[test]
        fn role_capacity_is_enforced(max in 1u64..15) {
            let mut agg = active_user();
            agg.update_settings(
                UserSettingsPatch { max_roles: Some(max), ..Default::default() },
                t0(),
            )
            .unwrap();
            for _ in 0..max {
                agg.assign_role(RoleId::new(), t0()).unwrap();
            }
            let err = agg.assign_role(RoleId::new(), t0()).unwrap_err();
            prop_assert_eq!(err.kind(), Some(ErrorKind::Capacity));
            prop_assert_eq!(agg.statistics().role_count, max);
        }

        /// Property: the account locks on exactly the configured failure count.
        #[test]
        fn lockout_threshold_is_exact(max_failed in 1u32..10) {
            let config = PolicyConfig { max_failed_logins: max_failed, ..PolicyConfig::default() };
            let mut agg = active_user().with_policy(&config);
            for attempt in 1..=max_failed {
                agg.record_login(false, t0()).unwrap();
                prop_assert_eq!(agg.user().is_locked(t0()), attempt == max_failed);
            }
        }
    }
}
