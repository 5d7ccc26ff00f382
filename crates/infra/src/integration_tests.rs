//! Integration tests for the domain services over the in-memory repositories.
//!
//! Verifies:
//! - Tree moves never create cycles
//! - Codes and names are unique within their scope only
//! - Cross-aggregate memberships stay symmetric
//! - Optimistic concurrency and racing creates are detected
//! - Login lockout follows the policy
//! - A move that loses a save race leaves the tree as it was

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, Utc};

    use orgiam_access::{AccessRight, Permission, PermissionCode, PermissionType, RoleEvent, RoleScope, RoleType};
    use orgiam_core::{
        AggregateRoot, EntityStatus, ErrorKind, ExpectedVersion, OrganizationId, PermissionId,
        PolicyConfig, RoleId, TenantId, UserId,
    };
    use orgiam_directory::{OrganizationAggregate, OrganizationCode, OrganizationType};
    use orgiam_events::{Event, RecordsEvents};
    use orgiam_identity::{LoginOutcome, UserStatus};
    use orgiam_services::{
        CloneRole, CreateDepartment, CreateOrganization, CreateRole, DepartmentDomainService,
        OrganizationDomainService, OrganizationRepository, RegisterUser, RepositoryError,
        RepositoryResult, RoleDomainService, ServiceError, UserDomainService,
    };

    use crate::{
        InMemoryDepartmentRepository, InMemoryOrganizationRepository, InMemoryRoleRepository,
        InMemoryUserRepository, PlaceholderHasher,
    };

    const PASSWORD: &str = "Blue7Canyon!Tide";

    struct Harness {
        organization_repo: Arc<InMemoryOrganizationRepository>,
        organizations: OrganizationDomainService,
        departments: DepartmentDomainService,
        roles: RoleDomainService,
        users: UserDomainService,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    }

    fn setup() -> Harness {
        orgiam_observability::init_for_tests();
        let organization_repo = Arc::new(InMemoryOrganizationRepository::new());
        let department_repo = Arc::new(InMemoryDepartmentRepository::new());
        let role_repo = Arc::new(InMemoryRoleRepository::new());
        let user_repo = Arc::new(InMemoryUserRepository::new());
        let policy = PolicyConfig::default();

        Harness {
            organizations: OrganizationDomainService::new(organization_repo.clone(), policy),
            departments: DepartmentDomainService::new(department_repo.clone(), organization_repo.clone(), policy),
            roles: RoleDomainService::new(role_repo.clone(), organization_repo.clone(), policy),
            users: UserDomainService::new(
                user_repo,
                organization_repo.clone(),
                department_repo,
                role_repo,
                Arc::new(PlaceholderHasher),
                policy,
            ),
            organization_repo,
            tenant_id: TenantId::new(),
            now: Utc::now(),
        }
    }

    impl Harness {
        fn organization(&self, code: &str, parent_id: Option<OrganizationId>) -> OrganizationId {
            let created = self
                .organizations
                .create_organization(
                    CreateOrganization {
                        tenant_id: self.tenant_id,
                        code: code.to_string(),
                        name: format!("{code} Holdings"),
                        description: None,
                        org_type: OrganizationType::Company,
                        parent_id,
                    },
                    self.now,
                )
                .unwrap();
            *created.id()
        }

        fn create_role(&self, organization_id: OrganizationId, code: &str) -> Result<RoleId, ServiceError> {
            self.roles
                .create_role(
                    CreateRole {
                        organization_id,
                        code: code.to_string(),
                        name: format!("{code} role"),
                        description: None,
                        role_type: RoleType::Custom,
                        scope: RoleScope::Organization,
                        parent_id: None,
                    },
                    self.now,
                )
                .map(|role| *role.id())
        }

        fn active_user(&self, username: &str, organization_id: Option<OrganizationId>) -> UserId {
            let user = self
                .users
                .register_user(
                    RegisterUser {
                        tenant_id: self.tenant_id,
                        organization_id,
                        username: username.to_string(),
                        email: format!("{username}@example.com"),
                        password: PASSWORD.to_string(),
                        display_name: String::new(),
                    },
                    self.now,
                )
                .unwrap();
            let id = *user.id();
            self.users.activate(id, self.now).unwrap();
            id
        }
    }

    #[test]
    fn moving_an_organization_under_its_descendant_is_rejected() {
        let h = setup();
        let a = h.organization("ORG-A", None);
        let b = h.organization("ORG-B", Some(a));
        let c = h.organization("ORG-C", Some(b));

        let err = h.organizations.move_organization(a, Some(c), h.now).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));

        let err = h.organizations.move_organization(a, Some(a), h.now).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));

        // Detaching C only touches B.
        let moved = h.organizations.move_organization(c, None, h.now).unwrap();
        assert_eq!(moved.parent_id(), None);
        assert!(h.organizations.get(b).unwrap().children().is_empty());
        assert_eq!(h.organizations.get(a).unwrap().children(), vec![b]);
    }

    #[test]
    fn role_codes_are_unique_per_organization_only() {
        let h = setup();
        let org1 = h.organization("ORG1", None);
        let org2 = h.organization("ORG2", None);

        h.create_role(org1, "MANAGER").unwrap();
        let err = h.create_role(org1, "manager").unwrap_err();
        assert!(err.has_kind(ErrorKind::Uniqueness));
        assert!(h.create_role(org2, "MANAGER").is_ok());

        let registered = h.organizations.get(org1).unwrap();
        assert_eq!(registered.roles().len(), 1);
    }

    #[test]
    fn every_pipeline_violation_is_reported_together() {
        let h = setup();
        h.organization("ACME", None);

        let err = h
            .organizations
            .create_organization(
                CreateOrganization {
                    tenant_id: h.tenant_id,
                    code: "acme".to_string(),
                    name: "   ".to_string(),
                    description: None,
                    org_type: OrganizationType::Division,
                    parent_id: Some(OrganizationId::new()),
                },
                h.now,
            )
            .unwrap_err();

        assert_eq!(err.kind(), None);
        assert!(err.has_kind(ErrorKind::Uniqueness));
        assert!(err.has_kind(ErrorKind::Format));
        assert!(err.has_kind(ErrorKind::NotFound));
        let report = err.as_domain().unwrap().violations();
        assert_eq!(report.len(), 3);
    }

    #[test]
    fn cloned_role_keeps_permissions_and_is_registered() {
        let h = setup();
        let org = h.organization("ACME", None);
        let source = h.create_role(org, "AUDITOR").unwrap();
        h.roles.grant_permission(source, "Invoices", AccessRight::Read, h.now).unwrap();

        let clone = h
            .roles
            .clone_role(
                CloneRole {
                    source_id: source,
                    code: "AUDITOR_EU".to_string(),
                    name: "EU auditor".to_string(),
                },
                h.now,
            )
            .unwrap();

        assert!(clone.role().has_permission("invoices", AccessRight::Read));
        assert!(clone.members().is_empty());
        assert_eq!(clone.pending_events()[0].event_type(), "access.role.created");
        assert!(matches!(
            clone.pending_events()[0].payload(),
            RoleEvent::Created { cloned_from: Some(from), .. } if *from == source
        ));
        assert!(h.organizations.get(org).unwrap().roles().contains(clone.id()));

        let err = h
            .roles
            .clone_role(
                CloneRole {
                    source_id: source,
                    code: "auditor_eu".to_string(),
                    name: "Another".to_string(),
                },
                h.now,
            )
            .unwrap_err();
        assert!(err.has_kind(ErrorKind::Uniqueness));
    }

    #[test]
    fn named_permission_grants_every_right_once() {
        let h = setup();
        let org = h.organization("ACME", None);
        let role = h.create_role(org, "EDITOR").unwrap();
        let permission = Permission::new(
            PermissionId::new(),
            org,
            PermissionCode::new("reports:manage:organization").unwrap(),
            "Manage reports",
            PermissionType::Custom,
            RoleScope::Organization,
            h.now,
        )
        .unwrap();

        let granted = h.roles.grant_named_permission(role, &permission, h.now).unwrap();
        for right in AccessRight::ALL {
            assert!(granted.role().has_permission("reports", right));
        }
        let version = h.roles.get(role).unwrap().version();
        h.roles.grant_named_permission(role, &permission, h.now).unwrap();
        assert_eq!(h.roles.get(role).unwrap().version(), version);
    }

    #[test]
    fn role_assignment_updates_both_sides() {
        let h = setup();
        let org = h.organization("ACME", None);
        let other = h.organization("GLOBEX", None);
        let user = h.active_user("jane.doe", Some(org));
        let role = h.create_role(org, "MANAGER").unwrap();
        let foreign = h.create_role(other, "MANAGER").unwrap();

        let assigned = h.users.assign_role(user, role, h.now).unwrap();
        assert!(assigned.has_role(role));
        assert!(h.roles.get(role).unwrap().has_member(user));

        let err = h.users.assign_role(user, foreign, h.now).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));
        assert!(!h.roles.get(foreign).unwrap().has_member(user));

        let err = h.users.leave_organization(user, h.now).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));

        h.users.remove_role(user, role, h.now).unwrap();
        assert!(!h.roles.get(role).unwrap().has_member(user));
        let left = h.users.leave_organization(user, h.now).unwrap();
        assert_eq!(left.organization_id(), None);
        assert!(!h.organizations.get(org).unwrap().has_member(user));
    }

    #[test]
    fn inactive_roles_cannot_be_assigned() {
        let h = setup();
        let org = h.organization("ACME", None);
        let user = h.active_user("jane.doe", Some(org));
        let role = h.create_role(org, "TEMP_STAFF").unwrap();
        h.roles.change_status(role, EntityStatus::Suspended, Some("audit"), h.now).unwrap();

        let err = h.users.assign_role(user, role, h.now).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));
        assert!(!h.users.get(user).unwrap().has_role(role));
    }

    #[test]
    fn department_manager_must_stay_a_member() {
        let h = setup();
        let org = h.organization("ACME", None);
        let user = h.active_user("jane.doe", Some(org));
        let dept = h
            .departments
            .create_department(
                CreateDepartment {
                    organization_id: org,
                    code: "ENG".to_string(),
                    name: "Engineering".to_string(),
                    description: None,
                    parent_id: None,
                },
                h.now,
            )
            .unwrap();
        let dept = *dept.id();
        assert!(h.organizations.get(org).unwrap().departments().contains(&dept));

        h.users.add_to_department(user, dept, h.now).unwrap();
        h.departments.assign_manager(dept, user, h.now).unwrap();
        assert!(h.users.remove_from_department(user, dept, h.now).is_err());
        assert!(h.departments.delete_department(dept, h.now).is_err());

        h.departments.remove_manager(dept, h.now).unwrap();
        h.users.remove_from_department(user, dept, h.now).unwrap();
        h.departments.delete_department(dept, h.now).unwrap();
        assert!(!h.organizations.get(org).unwrap().departments().contains(&dept));
    }

    #[test]
    fn stale_save_is_a_conflict() {
        let h = setup();
        let org = h.organization("ACME", None);
        let mut first = h.organization_repo.find_by_id(org).unwrap().unwrap();
        let mut second = h.organization_repo.find_by_id(org).unwrap().unwrap();
        let loaded_at = ExpectedVersion::Exact(first.version());

        first.update_name("Acme Corp", h.now).unwrap();
        h.organization_repo.save(&first, loaded_at).unwrap();

        second.update_name("Acme Inc", h.now).unwrap();
        let err = h.organization_repo.save(&second, loaded_at).unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(h.organizations.get(org).unwrap().organization().name(), "Acme Corp");
    }

    #[test]
    fn racing_creates_leave_one_winner() {
        let harness = setup();
        let h = &harness;
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    scope.spawn(move || {
                        h.organizations.create_organization(
                            CreateOrganization {
                                tenant_id: h.tenant_id,
                                code: "RACE".to_string(),
                                name: format!("Racer {i}"),
                                description: None,
                                org_type: OrganizationType::Company,
                                parent_id: None,
                            },
                            h.now,
                        )
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(err.has_kind(ErrorKind::Uniqueness), "unexpected error: {err}");
        }
    }

    #[test]
    fn usernames_are_unique_per_tenant() {
        let h = setup();
        h.active_user("jane.doe", None);

        let register = |tenant_id: TenantId, email: &str| {
            h.users.register_user(
                RegisterUser {
                    tenant_id,
                    organization_id: None,
                    username: "Jane.Doe".to_string(),
                    email: email.to_string(),
                    password: PASSWORD.to_string(),
                    display_name: "Jane".to_string(),
                },
                h.now,
            )
        };

        let err = register(h.tenant_id, "jane.doe@example.com").unwrap_err();
        assert!(matches!(err.as_domain(), Some(e) if e.violations().len() == 2));
        assert!(register(TenantId::new(), "jane.doe@example.com").is_ok());
    }

    #[test]
    fn repeated_failures_lock_until_the_window_passes() {
        let h = setup();
        let user = h.active_user("jane.doe", None);

        for attempt in 1..=4 {
            let (_, outcome) = h.users.authenticate(h.tenant_id, "jane.doe", "wrong", h.now).unwrap();
            assert_eq!(outcome, LoginOutcome::Failed { attempts: attempt });
        }
        let (locked, outcome) = h.users.authenticate(h.tenant_id, "jane.doe", "wrong", h.now).unwrap();
        assert!(matches!(outcome, LoginOutcome::Locked { attempts: 5, .. }));
        assert_eq!(locked.status(), UserStatus::Locked);

        let err = h
            .users
            .authenticate(h.tenant_id, "jane.doe", PASSWORD, h.now + Duration::minutes(1))
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));

        let (user_after, outcome) = h
            .users
            .authenticate(h.tenant_id, "jane.doe", PASSWORD, h.now + Duration::minutes(31))
            .unwrap();
        assert_eq!(outcome, LoginOutcome::Succeeded { lock_cleared: true });
        assert_eq!(user_after.user().login_attempts(), 0);
        assert_eq!(user_after.status(), UserStatus::Active);
        assert_eq!(*user_after.id(), user);
    }

    #[test]
    fn password_change_checks_the_current_password() {
        let h = setup();
        let user = h.active_user("jane.doe", None);

        let err = h.users.change_password(user, "nope", "Green4Harbor#Mist", h.now).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Format));

        h.users.change_password(user, PASSWORD, "Green4Harbor#Mist", h.now).unwrap();
        let (_, outcome) = h
            .users
            .authenticate(h.tenant_id, "jane.doe", "Green4Harbor#Mist", h.now)
            .unwrap();
        assert!(matches!(outcome, LoginOutcome::Succeeded { .. }));
    }

    #[test]
    fn organizations_with_children_cannot_be_deleted() {
        let h = setup();
        let parent = h.organization("PARENT", None);
        let child = h.organization("CHILD", Some(parent));

        let err = h.organizations.delete_organization(parent, h.now).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::State));

        h.organizations.delete_organization(child, h.now).unwrap();
        assert!(h.organizations.get(parent).unwrap().children().is_empty());
        h.organizations.delete_organization(parent, h.now).unwrap();
        assert_eq!(h.organizations.get(parent).unwrap_err().kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn organizations_cannot_hang_below_a_suspended_parent() {
        let h = setup();
        let parent = h.organization("HOLDING", None);
        let other = h.organization("OTHER", None);
        h.organizations.change_status(parent, EntityStatus::Suspended, Some("audit"), h.now).unwrap();

        let err = h
            .organizations
            .create_organization(
                CreateOrganization {
                    tenant_id: h.tenant_id,
                    code: "BRANCH".to_string(),
                    name: "Branch".to_string(),
                    description: None,
                    org_type: OrganizationType::Division,
                    parent_id: Some(parent),
                },
                h.now,
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));

        let err = h.organizations.move_organization(other, Some(parent), h.now).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));
        assert_eq!(h.organizations.get(other).unwrap().parent_id(), None);
    }

    #[test]
    fn departments_cannot_hang_below_a_suspended_parent() {
        let h = setup();
        let org = h.organization("ACME", None);
        let create = |code: &str, parent_id| {
            h.departments.create_department(
                CreateDepartment {
                    organization_id: org,
                    code: code.to_string(),
                    name: format!("{code} department"),
                    description: None,
                    parent_id,
                },
                h.now,
            )
        };
        let parent = *create("OPS", None).unwrap().id();
        h.departments.change_status(parent, EntityStatus::Suspended, Some("reorg"), h.now).unwrap();

        let err = create("OPS-EAST", Some(parent)).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));
        assert!(h.departments.get(parent).unwrap().children().is_empty());
    }

    #[test]
    fn roles_cannot_hang_below_a_suspended_parent() {
        let h = setup();
        let org = h.organization("ACME", None);
        let parent = h.create_role(org, "MANAGER").unwrap();
        h.roles.change_status(parent, EntityStatus::Suspended, Some("review"), h.now).unwrap();

        let err = h
            .roles
            .create_role(
                CreateRole {
                    organization_id: org,
                    code: "TEAM_LEAD".to_string(),
                    name: "Team lead".to_string(),
                    description: None,
                    role_type: RoleType::Custom,
                    scope: RoleScope::Organization,
                    parent_id: Some(parent),
                },
                h.now,
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Hierarchy));
        assert!(h.roles.get(parent).unwrap().sub_roles().is_empty());
    }

    /// Organization store where another writer renames one chosen
    /// organization right before its next save goes through.
    struct InterleavedWriter {
        inner: InMemoryOrganizationRepository,
        rename_next: Mutex<Option<OrganizationId>>,
    }

    impl InterleavedWriter {
        fn new() -> Self {
            Self { inner: InMemoryOrganizationRepository::new(), rename_next: Mutex::new(None) }
        }

        fn rename_before_save(&self, id: OrganizationId) {
            *self.rename_next.lock().unwrap() = Some(id);
        }
    }

    impl OrganizationRepository for InterleavedWriter {
        fn find_by_id(&self, id: OrganizationId) -> RepositoryResult<Option<OrganizationAggregate>> {
            self.inner.find_by_id(id)
        }

        fn find_by_code(
            &self,
            code: &OrganizationCode,
            tenant_id: TenantId,
        ) -> RepositoryResult<Option<OrganizationAggregate>> {
            self.inner.find_by_code(code, tenant_id)
        }

        fn find_by_name(&self, name: &str, tenant_id: TenantId) -> RepositoryResult<Option<OrganizationAggregate>> {
            self.inner.find_by_name(name, tenant_id)
        }

        fn find_by_parent(&self, parent_id: OrganizationId) -> RepositoryResult<Vec<OrganizationAggregate>> {
            self.inner.find_by_parent(parent_id)
        }

        fn save(&self, aggregate: &OrganizationAggregate, expected: ExpectedVersion) -> RepositoryResult<()> {
            let target = self.rename_next.lock().unwrap().take_if(|id| *id == *aggregate.id());
            if let Some(id) = target {
                let mut other = self.inner.find_by_id(id)?.unwrap();
                let loaded_at = ExpectedVersion::Exact(other.version());
                other.update_name("Renamed Elsewhere", Utc::now()).unwrap();
                self.inner.save(&other, loaded_at)?;
            }
            self.inner.save(aggregate, expected)
        }

        fn delete(&self, id: OrganizationId) -> RepositoryResult<()> {
            self.inner.delete(id)
        }
    }

    fn interleaved_tree() -> (Arc<InterleavedWriter>, OrganizationDomainService, [OrganizationId; 3]) {
        orgiam_observability::init_for_tests();
        let repo = Arc::new(InterleavedWriter::new());
        let service = OrganizationDomainService::new(repo.clone(), PolicyConfig::default());
        let tenant_id = TenantId::new();
        let create = |code: &str, parent_id| {
            let created = service
                .create_organization(
                    CreateOrganization {
                        tenant_id,
                        code: code.to_string(),
                        name: format!("{code} Holdings"),
                        description: None,
                        org_type: OrganizationType::Company,
                        parent_id,
                    },
                    Utc::now(),
                )
                .unwrap();
            *created.id()
        };
        let old_parent = create("WEST", None);
        let new_parent = create("EAST", None);
        let child = create("BRANCH", Some(old_parent));
        (repo, service, [old_parent, new_parent, child])
    }

    fn assert_child_of(
        service: &OrganizationDomainService,
        child: OrganizationId,
        parent: OrganizationId,
        other: OrganizationId,
    ) {
        assert_eq!(service.get(child).unwrap().parent_id(), Some(parent));
        assert!(service.get(parent).unwrap().children().contains(&child));
        assert!(!service.get(other).unwrap().children().contains(&child));
    }

    #[test]
    fn move_losing_the_race_on_a_parent_leaves_the_tree_unchanged() {
        let (repo, service, [old_parent, new_parent, child]) = interleaved_tree();

        repo.rename_before_save(old_parent);
        let err = service.move_organization(child, Some(new_parent), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Conflict));
        assert_child_of(&service, child, old_parent, new_parent);
        assert_eq!(service.get(old_parent).unwrap().organization().name(), "Renamed Elsewhere");

        service.move_organization(child, Some(new_parent), Utc::now()).unwrap();
        assert_child_of(&service, child, new_parent, old_parent);
    }

    #[test]
    fn move_losing_the_race_on_the_node_restores_both_parents() {
        let (repo, service, [old_parent, new_parent, child]) = interleaved_tree();

        repo.rename_before_save(child);
        let err = service.move_organization(child, Some(new_parent), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Conflict));
        assert_child_of(&service, child, old_parent, new_parent);
        assert_eq!(service.get(child).unwrap().organization().name(), "Renamed Elsewhere");
    }
}
