//! User account orchestration and cross-aggregate memberships.
//!
//! Role and department assignments touch two aggregates. Both are validated
//! and mutated in memory before either is saved, so a domain failure on one
//! side leaves both untouched.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use orgiam_access::RoleAggregate;
use orgiam_core::{
    AggregateRoot, DepartmentId, DomainError, ExpectedVersion, OrganizationId, PolicyConfig, RoleId,
    TenantId, UserId, Violations,
};
use orgiam_directory::{DepartmentAggregate, OrganizationAggregate};
use orgiam_identity::{Email, LoginOutcome, Password, User, UserAggregate, UserStatus, Username};

use crate::error::ServiceResult;
use crate::hasher::PasswordHasher;
use crate::repository::{DepartmentRepository, OrganizationRepository, RoleRepository, UserRepository};
use crate::{Tracked, finish, required};

#[derive(Clone, PartialEq, Eq)]
pub struct RegisterUser {
    pub tenant_id: TenantId,
    pub organization_id: Option<OrganizationId>,
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
}

impl core::fmt::Debug for RegisterUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisterUser")
            .field("tenant_id", &self.tenant_id)
            .field("organization_id", &self.organization_id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"********")
            .field("display_name", &self.display_name)
            .finish()
    }
}

pub struct UserDomainService {
    users: Arc<dyn UserRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    departments: Arc<dyn DepartmentRepository>,
    roles: Arc<dyn RoleRepository>,
    hasher: Arc<dyn PasswordHasher>,
    policy: PolicyConfig,
}

impl UserDomainService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        departments: Arc<dyn DepartmentRepository>,
        roles: Arc<dyn RoleRepository>,
        hasher: Arc<dyn PasswordHasher>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            users,
            organizations,
            departments,
            roles,
            hasher,
            policy,
        }
    }

    pub fn get(&self, id: UserId) -> ServiceResult<UserAggregate> {
        self.users
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("user {id} does not exist")).into())
    }

    fn role(&self, id: RoleId) -> ServiceResult<RoleAggregate> {
        self.roles
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("role {id} does not exist")).into())
    }

    fn department(&self, id: DepartmentId) -> ServiceResult<DepartmentAggregate> {
        self.departments
            .find_by_id(id)?
            .ok_or_else(|| DomainError::not_found(format!("department {id} does not exist")).into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration & profile
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate and persist a new PENDING user, optionally joining an
    /// organization of the same tenant.
    pub fn register_user(&self, cmd: RegisterUser, now: DateTime<Utc>) -> ServiceResult<UserAggregate> {
        tracing::debug!(tenant_id = %cmd.tenant_id, username = %cmd.username, "registering user");
        let mut violations = Violations::new();

        let username = required(&mut violations, "username", &cmd.username)
            .and_then(|raw| violations.check(Username::new(raw)));
        let email = required(&mut violations, "email", &cmd.email)
            .and_then(|raw| violations.check(Email::new(raw)));
        let password = violations.check(Password::new(&cmd.password));

        if let Some(username) = &username {
            if self.users.find_by_username(username, cmd.tenant_id)?.is_some() {
                violations.push(DomainError::uniqueness(format!(
                    "username {username} is already taken in this tenant"
                )));
            }
        }
        if let Some(email) = &email {
            if self.users.find_by_email(email, cmd.tenant_id)?.is_some() {
                violations.push(DomainError::uniqueness(format!(
                    "email {email} is already registered in this tenant"
                )));
            }
        }
        let organization = match cmd.organization_id {
            Some(organization_id) => self.check_organization(organization_id, cmd.tenant_id, &mut violations)?,
            None => None,
        };

        finish(violations, "register_user")?;
        let (Some(username), Some(email), Some(password)) = (username, email, password) else {
            return Err(DomainError::validation("username, email and password are required").into());
        };

        let id = UserId::new();
        let hash = self.hasher.hash(&password);
        let user = User::new(id, cmd.tenant_id, username, email, hash, &cmd.display_name, now)?;
        let mut aggregate = UserAggregate::register(user, now).with_policy(&self.policy);

        let mut organization = organization.map(Tracked::new);
        if let Some(organization) = organization.as_mut() {
            let organization_id = *organization.aggregate.id();
            organization.aggregate.add_member(id, now)?;
            aggregate.join_organization(organization_id, now)?;
        }

        self.users.save(&aggregate, ExpectedVersion::Exact(0))?;
        if let Some(organization) = organization {
            if let Err(err) = self.organizations.save(&organization.aggregate, organization.expected) {
                self.users.delete(id)?;
                return Err(err.into());
            }
        }

        tracing::info!(user_id = %id, tenant_id = %cmd.tenant_id, "user registered");
        Ok(aggregate)
    }

    /// Change display name and/or email; a new email must be unique in the tenant.
    pub fn update_profile(
        &self,
        id: UserId,
        display_name: Option<&str>,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, "updating user profile");
        let mut tracked = Tracked::new(self.get(id)?);
        let mut violations = Violations::new();

        let email = email
            .and_then(|raw| violations.check(Email::new(raw)))
            .filter(|email| email != tracked.aggregate.user().email());
        if let Some(email) = &email {
            if let Some(existing) = self.users.find_by_email(email, tracked.aggregate.tenant_id())? {
                if *existing.id() != id {
                    violations.push(DomainError::uniqueness(format!(
                        "email {email} is already registered in this tenant"
                    )));
                }
            }
        }
        finish(violations, "update_profile")?;

        let version = tracked.aggregate.version();
        tracked.aggregate.update_profile(display_name, email, now)?;
        if tracked.aggregate.version() != version {
            self.users.save(&tracked.aggregate, tracked.expected)?;
        }
        Ok(tracked.aggregate)
    }

    /// Verify `current`, validate `new` against the password policy and store
    /// its hash.
    pub fn change_password(
        &self,
        id: UserId,
        current: &str,
        new: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, "changing password");
        let mut tracked = Tracked::new(self.get(id)?);
        if !self.hasher.verify(current, tracked.aggregate.user().password_hash()) {
            tracing::warn!(user_id = %id, "password change rejected: current password mismatch");
            return Err(DomainError::validation("current password is incorrect").into());
        }
        let password = Password::new(new)?;
        let hash = self.hasher.hash(&password);
        tracked.aggregate.change_password(&hash, now)?;
        self.users.save(&tracked.aggregate, tracked.expected)?;
        tracing::info!(user_id = %id, "password changed");
        Ok(tracked.aggregate)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status & authentication
    // ─────────────────────────────────────────────────────────────────────────

    pub fn activate(&self, id: UserId, now: DateTime<Utc>) -> ServiceResult<UserAggregate> {
        self.change_status(id, UserStatus::Active, None, now)
    }

    pub fn change_status(
        &self,
        id: UserId,
        target: UserStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, target = %target, "changing user status");
        let mut tracked = Tracked::new(self.get(id)?);
        let from = tracked.aggregate.status();
        tracked.aggregate.change_status(target, reason, now)?;
        self.users.save(&tracked.aggregate, tracked.expected)?;
        tracing::info!(user_id = %id, from = %from, to = %target, "user status changed");
        Ok(tracked.aggregate)
    }

    /// Administrative lock for `duration_minutes`.
    pub fn lock(&self, id: UserId, duration_minutes: i64, reason: &str, now: DateTime<Utc>) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, duration_minutes, "locking user");
        let mut tracked = Tracked::new(self.get(id)?);
        tracked.aggregate.lock(duration_minutes, reason, now)?;
        self.users.save(&tracked.aggregate, tracked.expected)?;
        tracing::warn!(user_id = %id, duration_minutes, reason, "user locked");
        Ok(tracked.aggregate)
    }

    pub fn unlock(&self, id: UserId, now: DateTime<Utc>) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, "unlocking user");
        let mut tracked = Tracked::new(self.get(id)?);
        tracked.aggregate.unlock(now)?;
        self.users.save(&tracked.aggregate, tracked.expected)?;
        tracing::info!(user_id = %id, "user unlocked");
        Ok(tracked.aggregate)
    }

    /// Count one login attempt against the lockout policy.
    pub fn record_login(
        &self,
        id: UserId,
        success: bool,
        now: DateTime<Utc>,
    ) -> ServiceResult<(UserAggregate, LoginOutcome)> {
        let mut tracked = Tracked::new(self.get(id)?);
        let outcome = tracked.aggregate.record_login(success, now)?;
        self.users.save(&tracked.aggregate, tracked.expected)?;

        match outcome {
            LoginOutcome::Locked { attempts, until } => {
                tracing::warn!(user_id = %id, attempts, until = %until, "account locked after failed logins");
            }
            LoginOutcome::Failed { attempts } => {
                tracing::debug!(user_id = %id, attempts, "login failed");
            }
            LoginOutcome::Succeeded { lock_cleared } => {
                tracing::debug!(user_id = %id, lock_cleared, "login succeeded");
            }
        }
        Ok((tracked.aggregate, outcome))
    }

    /// Look up `username` in the tenant, check `password` and record the attempt.
    pub fn authenticate(
        &self,
        tenant_id: TenantId,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<(UserAggregate, LoginOutcome)> {
        let username = Username::new(username)?;
        let Some(user) = self.users.find_by_username(&username, tenant_id)? else {
            return Err(DomainError::not_found(format!("user {username} does not exist")).into());
        };
        let success = self.hasher.verify(password, user.user().password_hash());
        self.record_login(*user.id(), success, now)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Organization membership
    // ─────────────────────────────────────────────────────────────────────────

    pub fn join_organization(
        &self,
        id: UserId,
        organization_id: OrganizationId,
        now: DateTime<Utc>,
    ) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, organization_id = %organization_id, "joining organization");
        let mut user = Tracked::new(self.get(id)?);
        let mut violations = Violations::new();
        let organization = self.check_organization(organization_id, user.aggregate.tenant_id(), &mut violations)?;
        finish(violations, "join_organization")?;
        let Some(organization) = organization else {
            return Err(DomainError::not_found(format!("organization {organization_id} does not exist")).into());
        };

        let mut organization = Tracked::new(organization);
        user.aggregate.join_organization(organization_id, now)?;
        organization.aggregate.add_member(id, now)?;

        self.organizations.save(&organization.aggregate, organization.expected)?;
        self.users.save(&user.aggregate, user.expected)?;
        tracing::info!(user_id = %id, organization_id = %organization_id, "user joined organization");
        Ok(user.aggregate)
    }

    /// Requires that the user no longer holds roles or departments.
    pub fn leave_organization(&self, id: UserId, now: DateTime<Utc>) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, "leaving organization");
        let mut user = Tracked::new(self.get(id)?);
        let Some(organization_id) = user.aggregate.organization_id() else {
            return Err(DomainError::state("user is not a member of any organization").into());
        };
        user.aggregate.leave_organization(now)?;

        if let Some(organization) = self.organizations.find_by_id(organization_id)? {
            let mut organization = Tracked::new(organization);
            if organization.aggregate.has_member(id) {
                organization.aggregate.remove_member(id, now)?;
                self.organizations.save(&organization.aggregate, organization.expected)?;
            }
        }
        self.users.save(&user.aggregate, user.expected)?;
        tracing::info!(user_id = %id, organization_id = %organization_id, "user left organization");
        Ok(user.aggregate)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    /// Assign a role of the user's own organization.
    ///
    /// The role must be ACTIVE and not expired; capacity is checked on both
    /// the user (max roles) and the role (max members).
    pub fn assign_role(&self, id: UserId, role_id: RoleId, now: DateTime<Utc>) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, role_id = %role_id, "assigning role");
        let mut user = Tracked::new(self.get(id)?);
        let mut role = Tracked::new(self.role(role_id)?);

        if user.aggregate.status() == UserStatus::Disabled {
            return Err(DomainError::state(format!("user {id} is DISABLED")).into());
        }
        if user.aggregate.organization_id() != Some(role.aggregate.organization_id()) {
            return Err(DomainError::hierarchy(format!(
                "role {} belongs to another organization than user {id}",
                role.aggregate.role().code()
            ))
            .into());
        }

        role.aggregate.add_member(id, now)?;
        user.aggregate.assign_role(role_id, now)?;

        self.roles.save(&role.aggregate, role.expected)?;
        self.users.save(&user.aggregate, user.expected)?;
        tracing::info!(user_id = %id, role_id = %role_id, "role assigned");
        Ok(user.aggregate)
    }

    /// Remove a role from the user. A role that no longer exists is only
    /// dropped from the user side.
    pub fn remove_role(&self, id: UserId, role_id: RoleId, now: DateTime<Utc>) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, role_id = %role_id, "removing role");
        let mut user = Tracked::new(self.get(id)?);
        user.aggregate.remove_role(role_id, now)?;

        if let Some(role) = self.roles.find_by_id(role_id)? {
            let mut role = Tracked::new(role);
            if role.aggregate.has_member(id) {
                role.aggregate.remove_member(id, now)?;
                self.roles.save(&role.aggregate, role.expected)?;
            }
        }
        self.users.save(&user.aggregate, user.expected)?;
        tracing::info!(user_id = %id, role_id = %role_id, "role removed");
        Ok(user.aggregate)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Departments
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_to_department(
        &self,
        id: UserId,
        department_id: DepartmentId,
        now: DateTime<Utc>,
    ) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, department_id = %department_id, "adding user to department");
        let mut user = Tracked::new(self.get(id)?);
        let mut department = Tracked::new(self.department(department_id)?);

        if !department.aggregate.is_active() {
            return Err(DomainError::state(format!(
                "department {department_id} is {}",
                department.aggregate.status()
            ))
            .into());
        }
        if user.aggregate.organization_id() != Some(department.aggregate.organization_id()) {
            return Err(DomainError::hierarchy(format!(
                "department {department_id} belongs to another organization than user {id}"
            ))
            .into());
        }

        department.aggregate.add_member(id, now)?;
        user.aggregate.add_to_department(department_id, now)?;

        self.departments.save(&department.aggregate, department.expected)?;
        self.users.save(&user.aggregate, user.expected)?;
        tracing::info!(user_id = %id, department_id = %department_id, "user added to department");
        Ok(user.aggregate)
    }

    pub fn remove_from_department(
        &self,
        id: UserId,
        department_id: DepartmentId,
        now: DateTime<Utc>,
    ) -> ServiceResult<UserAggregate> {
        tracing::debug!(user_id = %id, department_id = %department_id, "removing user from department");
        let mut user = Tracked::new(self.get(id)?);
        user.aggregate.remove_from_department(department_id, now)?;

        if let Some(department) = self.departments.find_by_id(department_id)? {
            let mut department = Tracked::new(department);
            if department.aggregate.has_member(id) {
                department.aggregate.remove_member(id, now)?;
                self.departments.save(&department.aggregate, department.expected)?;
            }
        }
        self.users.save(&user.aggregate, user.expected)?;
        tracing::info!(user_id = %id, department_id = %department_id, "user removed from department");
        Ok(user.aggregate)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline steps
    // ─────────────────────────────────────────────────────────────────────────

    fn check_organization(
        &self,
        organization_id: OrganizationId,
        tenant_id: TenantId,
        violations: &mut Violations,
    ) -> ServiceResult<Option<OrganizationAggregate>> {
        let Some(organization) = self.organizations.find_by_id(organization_id)? else {
            violations.push(DomainError::not_found(format!(
                "organization {organization_id} does not exist"
            )));
            return Ok(None);
        };
        if !organization.is_active() {
            violations.push(DomainError::state(format!(
                "organization {organization_id} is {}",
                organization.status()
            )));
        }
        if organization.tenant_id() != tenant_id {
            violations.push(DomainError::hierarchy(format!(
                "organization {organization_id} belongs to another tenant"
            )));
        }
        Ok(Some(organization))
    }
}
