//! User entity: identity, credentials reference, memberships and the login lockout machine.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use orgiam_core::{
    DepartmentId, DomainError, DomainResult, Entity, LockoutPolicy, OrganizationId, RoleId,
    TenantId, UserId,
};

use crate::{Email, Username};

// ─────────────────────────────────────────────────────────────────────────────
// User Status
// ─────────────────────────────────────────────────────────────────────────────

/// User account status.
///
/// ```text
/// PENDING --activate--> ACTIVE
/// ACTIVE  <--suspend/activate--> SUSPENDED
/// ACTIVE  --lock--> LOCKED --unlock--> ACTIVE
/// *       --disable--> DISABLED --activate--> ACTIVE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// Registered but not yet activated.
    #[default]
    Pending,
    Active,
    Suspended,
    /// Locked after repeated failed logins or by an administrator.
    Locked,
    Disabled,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Pending => "PENDING",
            UserStatus::Active => "ACTIVE",
            UserStatus::Suspended => "SUSPENDED",
            UserStatus::Locked => "LOCKED",
            UserStatus::Disabled => "DISABLED",
        }
    }
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for UserStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(UserStatus::Pending),
            "ACTIVE" => Ok(UserStatus::Active),
            "SUSPENDED" => Ok(UserStatus::Suspended),
            "LOCKED" => Ok(UserStatus::Locked),
            "DISABLED" => Ok(UserStatus::Disabled),
            other => Err(DomainError::validation(format!("unknown user status '{other}'"))),
        }
    }
}

/// What a call to [`User::record_login`] did to the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Successful login; `lock_cleared` is set when a lock was lifted by it.
    Succeeded { lock_cleared: bool },
    /// Failed login below the lockout threshold.
    Failed { attempts: u32 },
    /// Failed login that locked the account.
    Locked { attempts: u32, until: DateTime<Utc> },
}

// ─────────────────────────────────────────────────────────────────────────────
// User
// ─────────────────────────────────────────────────────────────────────────────

/// User entity.
///
/// # Invariants
/// - A user belongs to exactly one tenant (tenant_id is immutable after creation).
/// - `max_failed_logins` consecutive failures lock the account for the policy's duration.
/// - Membership helpers are idempotent; stricter checks live in `UserAggregate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    tenant_id: TenantId,
    username: Username,
    email: Email,
    password_hash: String,
    display_name: String,
    organization_id: Option<OrganizationId>,
    department_ids: BTreeSet<DepartmentId>,
    role_ids: BTreeSet<RoleId>,
    status: UserStatus,
    login_attempts: u32,
    locked_until: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl User {
    /// New PENDING user. A blank display name falls back to the username.
    pub fn new(
        id: UserId,
        tenant_id: TenantId,
        username: Username,
        email: Email,
        password_hash: impl Into<String>,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let password_hash = password_hash.into();
        if password_hash.trim().is_empty() {
            return Err(DomainError::validation("password hash cannot be empty"));
        }
        let display_name = match display_name.trim() {
            "" => username.as_str().to_string(),
            name => name.to_string(),
        };

        Ok(Self {
            id,
            tenant_id,
            username,
            email,
            password_hash,
            display_name,
            organization_id: None,
            department_ids: BTreeSet::new(),
            role_ids: BTreeSet::new(),
            status: UserStatus::Pending,
            login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn username(&self) -> &Username {
        &self.username
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn organization_id(&self) -> Option<OrganizationId> {
        self.organization_id
    }

    pub fn department_ids(&self) -> &BTreeSet<DepartmentId> {
        &self.department_ids
    }

    pub fn role_ids(&self) -> &BTreeSet<RoleId> {
        &self.role_ids
    }

    pub fn status(&self) -> UserStatus {
        self.status
    }

    pub fn login_attempts(&self) -> u32 {
        self.login_attempts
    }

    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        self.locked_until
    }

    pub fn last_login_at(&self) -> Option<DateTime<Utc>> {
        self.last_login_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Locked and the lock has not run out yet.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.status == UserStatus::Locked && self.locked_until.is_none_or(|until| until > now)
    }

    pub fn can_login(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            UserStatus::Active => true,
            // A timed lock that has run out no longer blocks.
            UserStatus::Locked => !self.is_locked(now),
            _ => false,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status machine
    // ─────────────────────────────────────────────────────────────────────────

    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        match self.status {
            UserStatus::Active => return Err(DomainError::state("user is already active")),
            UserStatus::Locked => {
                return Err(DomainError::state("user is locked; unlock the account instead"));
            }
            UserStatus::Pending | UserStatus::Suspended | UserStatus::Disabled => {}
        }
        self.status = UserStatus::Active;
        self.touch(now);
        Ok(())
    }

    pub fn suspend(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != UserStatus::Active {
            return Err(DomainError::state(format!(
                "only active users can be suspended (user is {})",
                self.status
            )));
        }
        self.status = UserStatus::Suspended;
        self.touch(now);
        Ok(())
    }

    pub fn disable(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status == UserStatus::Disabled {
            return Err(DomainError::state("user is already disabled"));
        }
        self.status = UserStatus::Disabled;
        self.locked_until = None;
        self.touch(now);
        Ok(())
    }

    /// Lock for `duration_minutes`. Re-locking a locked user extends the lock.
    pub fn lock(&mut self, duration_minutes: i64, now: DateTime<Utc>) -> DomainResult<()> {
        if duration_minutes <= 0 {
            return Err(DomainError::validation("lock duration must be positive"));
        }
        if !matches!(self.status, UserStatus::Active | UserStatus::Locked) {
            return Err(DomainError::state(format!(
                "only active users can be locked (user is {})",
                self.status
            )));
        }
        self.status = UserStatus::Locked;
        self.locked_until = Some(now + Duration::minutes(duration_minutes));
        self.touch(now);
        Ok(())
    }

    pub fn unlock(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != UserStatus::Locked {
            return Err(DomainError::state("user is not locked"));
        }
        self.status = UserStatus::Active;
        self.locked_until = None;
        self.login_attempts = 0;
        self.touch(now);
        Ok(())
    }

    /// Count a login attempt.
    ///
    /// Success resets the failure counter and lifts any lock. The failure that
    /// reaches `policy.max_failed_logins` locks an active account, or a locked
    /// one whose window has passed. Pending, suspended and disabled users only
    /// have the failure counted. An expired lock starts a fresh count.
    pub fn record_login(
        &mut self,
        success: bool,
        now: DateTime<Utc>,
        policy: &LockoutPolicy,
    ) -> LoginOutcome {
        self.touch(now);
        if success {
            let lock_cleared = self.status == UserStatus::Locked;
            if lock_cleared {
                self.status = UserStatus::Active;
            }
            self.login_attempts = 0;
            self.locked_until = None;
            self.last_login_at = Some(now);
            return LoginOutcome::Succeeded { lock_cleared };
        }

        let lock_expired = self.status == UserStatus::Locked && !self.is_locked(now);
        if lock_expired {
            self.login_attempts = 0;
        }
        self.login_attempts = self.login_attempts.saturating_add(1);
        let attempts = self.login_attempts;
        let lockable = self.status == UserStatus::Active || lock_expired;
        if lockable && attempts >= policy.max_failed_logins {
            let until = now + policy.lockout_duration();
            self.status = UserStatus::Locked;
            self.locked_until = Some(until);
            return LoginOutcome::Locked { attempts, until };
        }
        LoginOutcome::Failed { attempts }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Profile
    // ─────────────────────────────────────────────────────────────────────────

    pub fn update_display_name(&mut self, name: &str, now: DateTime<Utc>) -> DomainResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(DomainError::validation("display name cannot be empty"));
        }
        self.display_name = name.to_string();
        self.touch(now);
        Ok(())
    }

    pub fn change_email(&mut self, email: Email, now: DateTime<Utc>) {
        self.email = email;
        self.touch(now);
    }

    pub fn change_username(&mut self, username: Username, now: DateTime<Utc>) {
        self.username = username;
        self.touch(now);
    }

    pub fn set_password_hash(&mut self, hash: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        let hash = hash.into();
        if hash.trim().is_empty() {
            return Err(DomainError::validation("password hash cannot be empty"));
        }
        self.password_hash = hash;
        self.touch(now);
        Ok(())
    }

    pub fn set_organization(&mut self, organization_id: Option<OrganizationId>, now: DateTime<Utc>) {
        self.organization_id = organization_id;
        self.touch(now);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memberships (idempotent)
    // ─────────────────────────────────────────────────────────────────────────

    pub fn assign_role(&mut self, role_id: RoleId, now: DateTime<Utc>) {
        if self.role_ids.insert(role_id) {
            self.touch(now);
        }
    }

    pub fn remove_role(&mut self, role_id: RoleId, now: DateTime<Utc>) {
        if self.role_ids.remove(&role_id) {
            self.touch(now);
        }
    }

    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.role_ids.contains(&role_id)
    }

    pub fn join_department(&mut self, department_id: DepartmentId, now: DateTime<Utc>) {
        if self.department_ids.insert(department_id) {
            self.touch(now);
        }
    }

    pub fn leave_department(&mut self, department_id: DepartmentId, now: DateTime<Utc>) {
        if self.department_ids.remove(&department_id) {
            self.touch(now);
        }
    }

    pub fn in_department(&self, department_id: DepartmentId) -> bool {
        self.department_ids.contains(&department_id)
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn test_user() -> User {
        User::new(
            UserId::new(),
            TenantId::new(),
            Username::new("alice").unwrap(),
            Email::new("alice@example.com").unwrap(),
            "hash",
            "  ",
            t0(),
        )
        .unwrap()
    }

    fn active_user() -> User {
        let mut user = test_user();
        user.activate(t0()).unwrap();
        user
    }

    #[test]
    fn new_users_are_pending_with_username_as_display_name() {
        let user = test_user();
        assert_eq!(user.status(), UserStatus::Pending);
        assert_eq!(user.display_name(), "alice");
        assert!(!user.can_login(t0()));
    }

    #[test]
    fn status_machine() {
        let mut user = active_user();
        assert!(user.activate(t0()).is_err());
        user.suspend(t0()).unwrap();
        assert!(user.suspend(t0()).is_err());
        user.activate(t0()).unwrap();
        user.disable(t0()).unwrap();
        assert!(user.disable(t0()).is_err());
        assert!(user.lock(10, t0()).is_err());
        user.activate(t0()).unwrap();
        assert_eq!(user.status(), UserStatus::Active);
    }

    #[test]
    fn explicit_lock_and_unlock() {
        let mut user = active_user();
        user.lock(15, t0()).unwrap();
        assert!(user.is_locked(t0() + Duration::minutes(14)));
        assert!(!user.is_locked(t0() + Duration::minutes(15)));
        assert!(user.activate(t0()).is_err());
        user.unlock(t0()).unwrap();
        assert_eq!(user.status(), UserStatus::Active);
        assert!(user.unlock(t0()).is_err());
        assert!(user.lock(0, t0()).is_err());
    }

    #[test]
    fn fifth_failure_locks_and_success_resets() {
        let policy = LockoutPolicy::default();
        let mut user = active_user();

        for attempt in 1..=4 {
            let outcome = user.record_login(false, t0(), &policy);
            assert_eq!(outcome, LoginOutcome::Failed { attempts: attempt });
            assert!(!user.is_locked(t0()));
        }

        let outcome = user.record_login(false, t0(), &policy);
        assert!(matches!(outcome, LoginOutcome::Locked { attempts: 5, .. }));
        assert!(user.is_locked(t0()));
        assert_eq!(user.locked_until(), Some(t0() + Duration::minutes(30)));

        let later = t0() + Duration::minutes(1);
        let outcome = user.record_login(true, later, &policy);
        assert_eq!(outcome, LoginOutcome::Succeeded { lock_cleared: true });
        assert_eq!(user.login_attempts(), 0);
        assert!(!user.is_locked(later));
        assert_eq!(user.status(), UserStatus::Active);
        assert_eq!(user.last_login_at(), Some(later));
    }

    #[test]
    fn failures_after_an_expired_lock_start_a_fresh_count() {
        let policy = LockoutPolicy::default();
        let mut user = active_user();
        for _ in 0..5 {
            user.record_login(false, t0(), &policy);
        }
        assert!(user.is_locked(t0()));

        let after = t0() + Duration::minutes(31);
        let outcome = user.record_login(false, after, &policy);
        assert_eq!(outcome, LoginOutcome::Failed { attempts: 1 });
        assert!(!user.is_locked(after));
        assert!(user.can_login(after));

        for attempt in 2..=4 {
            let outcome = user.record_login(false, after, &policy);
            assert_eq!(outcome, LoginOutcome::Failed { attempts: attempt });
        }
        let outcome = user.record_login(false, after, &policy);
        assert!(matches!(outcome, LoginOutcome::Locked { attempts: 5, .. }));
        assert_eq!(user.locked_until(), Some(after + Duration::minutes(30)));
    }

    #[test]
    fn failures_inside_a_lock_do_not_extend_it() {
        let policy = LockoutPolicy::default();
        let mut user = active_user();
        user.lock(10, t0()).unwrap();
        for _ in 0..6 {
            let outcome = user.record_login(false, t0(), &policy);
            assert!(matches!(outcome, LoginOutcome::Failed { .. }));
        }
        assert_eq!(user.locked_until(), Some(t0() + Duration::minutes(10)));
    }

    #[test]
    fn failures_never_lock_suspended_or_pending_users() {
        let policy = LockoutPolicy::default();

        let mut suspended = active_user();
        suspended.suspend(t0()).unwrap();
        let mut pending = test_user();

        for user in [&mut suspended, &mut pending] {
            let before = user.status();
            for attempt in 1..=6 {
                let outcome = user.record_login(false, t0(), &policy);
                assert_eq!(outcome, LoginOutcome::Failed { attempts: attempt });
            }
            assert_eq!(user.status(), before);
            assert_eq!(user.locked_until(), None);
            assert!(!user.can_login(t0() + Duration::hours(1)));
        }
    }

    #[test]
    fn memberships_are_idempotent() {
        let mut user = active_user();
        let role = RoleId::new();
        user.assign_role(role, t0());
        user.assign_role(role, t0());
        assert_eq!(user.role_ids().len(), 1);
        user.remove_role(role, t0());
        user.remove_role(role, t0());
        assert!(!user.has_role(role));

        let dept = DepartmentId::new();
        user.join_department(dept, t0());
        assert!(user.in_department(dept));
        user.leave_department(dept, t0());
        user.leave_department(dept, t0());
        assert!(user.department_ids().is_empty());
    }

    #[test]
    fn blank_display_name_is_rejected_on_update() {
        let mut user = active_user();
        assert!(matches!(
            user.update_display_name("   ", t0()),
            Err(DomainError::Validation(_))
        ));
        user.update_display_name(" Alice A. ", t0()).unwrap();
        assert_eq!(user.display_name(), "Alice A.");
    }
}
