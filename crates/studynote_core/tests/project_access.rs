use studynote_core::crypto::password::PasswordPolicyError;
use studynote_core::db::{open_db_in_memory, Schema};
use studynote_core::{
    AccessError, Actor, Capability, Credential, CredentialKind, GateState, NewProject, NewRole,
    PasswordHasher, ProjectService, ProjectServiceError, ProjectSession, ProjectSettings,
    SqliteProjectRepository,
};

fn hasher() -> PasswordHasher {
    PasswordHasher::new(1_000)
}

fn new_project(password: &str, members_enabled: bool, roles_enabled: bool) -> NewProject {
    NewProject {
        name: "Study group".to_string(),
        password: password.to_string(),
        members_enabled,
        roles_enabled,
    }
}

fn member(username: &str, password: &str) -> Credential {
    Credential::Member {
        username: username.to_string(),
        password: password.to_string(),
    }
}

fn role(role_name: &str, password: &str) -> Credential {
    Credential::Role {
        role_name: role_name.to_string(),
        password: password.to_string(),
    }
}

#[test]
fn unprotected_project_without_members_or_roles_enters_as_admin() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", false, false)).unwrap();

    assert!(!project.project_protected);
    assert!(!project.salt.is_empty());
    let session = service.enter(project.id, &Credential::None).unwrap();
    assert_eq!(session.actor, Actor::Admin);
    assert_eq!(session.capabilities, Capability::admin());
}

#[test]
fn protected_project_admits_admin_only_with_correct_password() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service
        .create_project(&new_project("password1", false, false))
        .unwrap();
    assert!(project.project_protected);

    let session = service
        .enter(project.id, &Credential::ProjectPassword("password1".to_string()))
        .unwrap();
    assert_eq!(session.actor, Actor::Admin);

    for credential in [
        Credential::ProjectPassword("password2".to_string()),
        Credential::None,
    ] {
        match service.enter(project.id, &credential).unwrap_err() {
            ProjectServiceError::Access(err) => {
                assert!(matches!(
                    err,
                    AccessError::IncorrectCredential(CredentialKind::ProjectPassword)
                ));
                assert_eq!(err.user_message(), "Incorrect password.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn member_alice_enters_with_signup_password_only() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", true, false)).unwrap();
    let alice = service
        .signup_member(project.id, "alice", "password1", "")
        .unwrap();

    let session = service
        .enter(project.id, &member("alice", "password1"))
        .unwrap();
    assert_eq!(session.actor, Actor::Member(alice.id));
    assert_eq!(session.capabilities, Capability::admin());

    match service
        .enter(project.id, &member("alice", "wrong"))
        .unwrap_err()
    {
        ProjectServiceError::Access(err) => {
            assert!(matches!(
                err,
                AccessError::IncorrectCredential(CredentialKind::Member)
            ));
            assert_eq!(err.user_message(), "Incorrect username or password.");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(
        service.enter(project.id, &member("mallory", "password1")),
        Err(ProjectServiceError::Access(AccessError::IncorrectCredential(
            CredentialKind::Member
        )))
    ));
}

#[test]
fn member_digest_is_salted_with_member_then_project_salt() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", true, false)).unwrap();
    let alice = service
        .signup_member(project.id, "alice", "password1", "")
        .unwrap();

    let salts = [alice.password.salt.as_str(), project.salt.as_str()];
    let hasher = hasher();
    assert_eq!(hasher.hash("password1", &salts).unwrap(), alice.password.hash);
    assert_ne!(hasher.hash("password2", &salts).unwrap(), alice.password.hash);
    let reversed = [project.salt.as_str(), alice.password.salt.as_str()];
    assert_ne!(hasher.hash("password1", &reversed).unwrap(), alice.password.hash);
}

#[test]
fn seven_character_passwords_are_rejected_and_eight_accepted() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());

    assert!(matches!(
        service.create_project(&new_project("1234567", false, false)),
        Err(ProjectServiceError::Password(PasswordPolicyError::TooShort {
            min_chars: 8,
            actual_chars: 7
        }))
    ));
    let project = service
        .create_project(&new_project("12345678", true, false))
        .unwrap();

    assert!(matches!(
        service.signup_member(project.id, "bob", "abcdefg", "12345678"),
        Err(ProjectServiceError::Password(PasswordPolicyError::TooShort { .. }))
    ));
    service
        .signup_member(project.id, "bob", "abcdefgh", "12345678")
        .unwrap();
}

#[test]
fn signup_rules() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let closed = service.create_project(&new_project("", false, false)).unwrap();
    let open = service.create_project(&new_project("", true, true)).unwrap();

    assert!(matches!(
        service.signup_member(closed.id, "alice", "password1", ""),
        Err(ProjectServiceError::MembersDisabled(id)) if id == closed.id
    ));
    assert!(matches!(
        service.signup_member(open.id, "not valid", "password1", ""),
        Err(ProjectServiceError::InvalidUsername(_))
    ));

    let first = service.signup_member(open.id, "alice", "password1", "").unwrap();
    let second = service.signup_member(open.id, " bob ", "password1", "").unwrap();
    assert_eq!(second.username, "bob");
    assert_ne!(first.role_id, second.role_id);
    assert_eq!(second.role_id, open.member_default_role);

    assert!(matches!(
        service.signup_member(open.id, "alice", "password2", ""),
        Err(ProjectServiceError::DuplicateUsername(name)) if name == "alice"
    ));
}

#[test]
fn protected_project_signup_needs_project_password() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service
        .create_project(&new_project("secretpw1", true, false))
        .unwrap();

    for attempt in ["", "wrongpass"] {
        match service
            .signup_member(project.id, "eve", "", attempt)
            .unwrap_err()
        {
            ProjectServiceError::Access(err) => {
                assert!(matches!(
                    err,
                    AccessError::IncorrectCredential(CredentialKind::ProjectPassword)
                ));
                assert_eq!(err.user_message(), "Incorrect password.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert!(service.enter(project.id, &member("eve", "")).is_err());

    service
        .signup_member(project.id, "alice", "password1", "secretpw1")
        .unwrap();
    service
        .enter(project.id, &member("alice", "password1"))
        .unwrap();
}

#[test]
fn enabling_roles_later_keeps_new_signups_unprivileged() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", true, false)).unwrap();
    service
        .signup_member(project.id, "owner", "password1", "")
        .unwrap();
    let owner = service
        .enter(project.id, &member("owner", "password1"))
        .unwrap();

    let updated = service
        .update_settings(
            &owner,
            &ProjectSettings {
                name: project.name.clone(),
                members_enabled: true,
                roles_enabled: true,
                member_default_role: None,
            },
        )
        .unwrap();
    assert!(updated.roles_enabled);

    service
        .signup_member(project.id, "stranger", "password1", "")
        .unwrap();
    let stranger = service
        .enter(project.id, &member("stranger", "password1"))
        .unwrap();
    assert!(stranger.capabilities.is_empty());

    let owner = service
        .enter(project.id, &member("owner", "password1"))
        .unwrap();
    assert_eq!(owner.capabilities, Capability::admin());
}

#[test]
fn enabling_roles_resets_an_admin_default_role() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", true, false)).unwrap();
    let admin = ProjectSession::admin(project.id);
    let admin_role = service
        .list_roles(&admin)
        .unwrap()
        .into_iter()
        .find(|role| role.name == "admin")
        .unwrap();

    let settings = ProjectSettings {
        name: project.name.clone(),
        members_enabled: true,
        roles_enabled: false,
        member_default_role: Some(admin_role.id),
    };
    let updated = service.update_settings(&admin, &settings).unwrap();
    assert_eq!(updated.member_default_role, admin_role.id);

    let updated = service
        .update_settings(
            &admin,
            &ProjectSettings {
                roles_enabled: true,
                member_default_role: None,
                ..settings
            },
        )
        .unwrap();
    assert_eq!(updated.member_default_role, project.member_default_role);
    assert_ne!(updated.member_default_role, admin_role.id);
}

#[test]
fn deleting_the_default_role_falls_back_to_none() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", true, true)).unwrap();
    let admin = ProjectSession::admin(project.id);
    let helper = service
        .create_role(
            &admin,
            &NewRole {
                name: "helper".to_string(),
                password: String::new(),
                capabilities: Capability::VIEW_TASK | Capability::CREATE_TASK,
            },
        )
        .unwrap();
    let updated = service
        .update_settings(
            &admin,
            &ProjectSettings {
                name: project.name.clone(),
                members_enabled: true,
                roles_enabled: true,
                member_default_role: Some(helper.id),
            },
        )
        .unwrap();
    assert_eq!(updated.member_default_role, helper.id);

    service.delete_role(&admin, helper.id).unwrap();
    let reloaded = service.get_project(project.id).unwrap().unwrap();
    assert_eq!(reloaded.member_default_role, project.member_default_role);

    service
        .signup_member(project.id, "first", "password1", "")
        .unwrap();
    let late = service
        .signup_member(project.id, "late", "password1", "")
        .unwrap();
    assert_eq!(late.role_id, project.member_default_role);
    let session = service.enter(project.id, &member("late", "password1")).unwrap();
    assert!(session.capabilities.is_empty());
}

#[test]
fn duplicate_and_reserved_role_names_are_rejected() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", false, true)).unwrap();
    let admin = ProjectSession::admin(project.id);

    let request = NewRole {
        name: "Editor".to_string(),
        password: String::new(),
        capabilities: Capability::VIEW_TASK | Capability::CREATE_TASK,
    };
    service.create_role(&admin, &request).unwrap();

    let duplicate = NewRole {
        name: " editor ".to_string(),
        ..request.clone()
    };
    assert!(matches!(
        service.create_role(&admin, &duplicate),
        Err(ProjectServiceError::DuplicateRole(name)) if name == "editor"
    ));

    let reserved = NewRole {
        name: "Admin".to_string(),
        ..request
    };
    assert!(matches!(
        service.create_role(&admin, &reserved),
        Err(ProjectServiceError::ReservedRole(_))
    ));

    let names: Vec<String> = service
        .list_roles(&admin)
        .unwrap()
        .into_iter()
        .map(|role| role.name)
        .collect();
    assert_eq!(names, vec!["admin", "Editor", "none"]);
}

#[test]
fn role_login_uses_role_password_and_capabilities() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service
        .create_project(&new_project("projectpw", false, true))
        .unwrap();
    let admin = ProjectSession::admin(project.id);
    let editor = service
        .create_role(
            &admin,
            &NewRole {
                name: "editor".to_string(),
                password: "editorpw".to_string(),
                capabilities: Capability::VIEW_TASK | Capability::MODIFY_OWN_TASK,
            },
        )
        .unwrap();

    let session = service.enter(project.id, &role("Editor", "editorpw")).unwrap();
    assert_eq!(session.actor, Actor::Role(editor.id));
    assert_eq!(
        session.capabilities,
        Capability::VIEW_TASK | Capability::MODIFY_OWN_TASK
    );

    let admin_session = service.enter(project.id, &role("admin", "projectpw")).unwrap();
    assert_eq!(admin_session.capabilities, Capability::admin());

    match service.enter(project.id, &role("editor", "projectpw")).unwrap_err() {
        ProjectServiceError::Access(err) => {
            assert_eq!(err.user_message(), "Incorrect role or password.")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(
        service.enter(project.id, &Credential::ProjectPassword("projectpw".to_string())),
        Err(ProjectServiceError::Access(AccessError::UnexpectedCredential {
            expected: CredentialKind::Role,
            supplied: CredentialKind::ProjectPassword,
        }))
    ));
}

#[test]
fn member_capabilities_follow_assigned_role() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", true, true)).unwrap();

    service.signup_member(project.id, "owner", "password1", "").unwrap();
    let bob = service.signup_member(project.id, "bob", "password1", "").unwrap();
    let owner = service
        .enter(project.id, &member("owner", "password1"))
        .unwrap();
    assert_eq!(owner.capabilities, Capability::admin());

    let bob_session = service.enter(project.id, &member("bob", "password1")).unwrap();
    assert!(bob_session.capabilities.is_empty());
    assert!(matches!(
        service.list_members(&bob_session),
        Err(ProjectServiceError::PermissionDenied(denied))
            if denied.required == Capability::VIEW_MEMBERS
    ));

    let reviewer = service
        .create_role(
            &owner,
            &NewRole {
                name: "reviewer".to_string(),
                password: String::new(),
                capabilities: Capability::VIEW_TASK | Capability::VIEW_MEMBERS,
            },
        )
        .unwrap();
    service
        .assign_member_role(&owner, bob.id, reviewer.id)
        .unwrap();
    let bob_session = service.enter(project.id, &member("bob", "password1")).unwrap();
    assert_eq!(bob_session.role_id, Some(reviewer.id));
    assert_eq!(service.list_members(&bob_session).unwrap().len(), 2);

    let moved = service.delete_role(&owner, reviewer.id).unwrap();
    assert_eq!(moved, 1);
    let bob_session = service.enter(project.id, &member("bob", "password1")).unwrap();
    assert_eq!(bob_session.role_id, Some(project.member_default_role));
    assert!(bob_session.capabilities.is_empty());
}

#[test]
fn reserved_roles_cannot_be_changed_or_deleted() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", false, true)).unwrap();
    let admin = ProjectSession::admin(project.id);
    let none_role = project.member_default_role;

    assert!(matches!(
        service.update_role_capabilities(&admin, none_role, Capability::VIEW_TASK),
        Err(ProjectServiceError::ReservedRole(name)) if name == "none"
    ));
    assert!(matches!(
        service.delete_role(&admin, none_role),
        Err(ProjectServiceError::ReservedRole(_))
    ));
}

#[test]
fn project_gate_moves_to_authenticated_on_first_success() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service
        .create_project(&new_project("password1", false, false))
        .unwrap();

    let mut gate = service.open_gate(project.id).unwrap();
    assert_eq!(gate.required_credential(), CredentialKind::ProjectPassword);
    assert_eq!(gate.project().id, project.id);
    let evaluator = service.evaluator();

    assert!(gate
        .submit(&evaluator, &Credential::ProjectPassword("nope".to_string()))
        .is_err());
    assert_eq!(gate.state(), &GateState::AwaitingCredential);

    let session = gate
        .submit(&evaluator, &Credential::ProjectPassword("password1".to_string()))
        .unwrap();
    assert!(gate.is_authenticated());
    assert_eq!(gate.session(), Some(&session));
}

#[test]
fn settings_and_password_changes_require_capabilities() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", false, false)).unwrap();
    let admin = service.enter(project.id, &Credential::None).unwrap();

    let updated = service
        .update_settings(
            &admin,
            &ProjectSettings {
                name: "Renamed".to_string(),
                members_enabled: false,
                roles_enabled: false,
                member_default_role: None,
            },
        )
        .unwrap();
    assert_eq!(updated.name, "Renamed");

    service.change_password(&admin, "newpassword").unwrap();
    assert!(service.enter(project.id, &Credential::None).is_err());
    service
        .enter(project.id, &Credential::ProjectPassword("newpassword".to_string()))
        .unwrap();

    let powerless = ProjectSession {
        capabilities: Capability::VIEW_TASK,
        ..admin
    };
    assert!(matches!(
        service.change_password(&powerless, ""),
        Err(ProjectServiceError::PermissionDenied(_))
    ));
}

#[test]
fn delete_project_removes_everything() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let keep = service.create_project(&new_project("", false, false)).unwrap();
    let doomed = service.create_project(&new_project("", true, true)).unwrap();
    service
        .signup_member(doomed.id, "alice", "password1", "")
        .unwrap();
    let owner = service
        .enter(doomed.id, &member("alice", "password1"))
        .unwrap();

    service.delete_project(&owner).unwrap();

    assert!(service.get_project(doomed.id).unwrap().is_none());
    let remaining: Vec<_> = service
        .list_projects()
        .unwrap()
        .into_iter()
        .map(|project| project.id)
        .collect();
    assert_eq!(remaining, vec![keep.id]);
    assert!(matches!(
        service.enter(doomed.id, &member("alice", "password1")),
        Err(ProjectServiceError::ProjectNotFound(_))
    ));
}

#[test]
fn members_and_roles_can_replace_their_passwords() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", true, false)).unwrap();
    service
        .signup_member(project.id, "alice", "password1", "")
        .unwrap();

    let session = service.enter(project.id, &member("alice", "password1")).unwrap();
    assert!(matches!(
        service.change_member_password(&session, "short"),
        Err(ProjectServiceError::Password(PasswordPolicyError::TooShort { .. }))
    ));
    service.change_member_password(&session, "password2").unwrap();
    assert!(service.enter(project.id, &member("alice", "password1")).is_err());
    service.enter(project.id, &member("alice", "password2")).unwrap();

    let admin = ProjectSession::admin(project.id);
    assert!(matches!(
        service.change_member_password(&admin, "password3"),
        Err(ProjectServiceError::PermissionDenied(_))
    ));

    let roles = service
        .create_project(&new_project("", false, true))
        .unwrap();
    let roles_admin = ProjectSession::admin(roles.id);
    let editor = service
        .create_role(
            &roles_admin,
            &NewRole {
                name: "editor".to_string(),
                password: String::new(),
                capabilities: Capability::VIEW_TASK,
            },
        )
        .unwrap();
    service.enter(roles.id, &role("editor", "")).unwrap();

    service
        .set_role_password(&roles_admin, editor.id, "editorpw")
        .unwrap();
    assert!(service.enter(roles.id, &role("editor", "")).is_err());
    service.enter(roles.id, &role("editor", "editorpw")).unwrap();
}

#[test]
fn project_password_change_also_moves_admin_role_password() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service
        .create_project(&new_project("projectpw", false, true))
        .unwrap();
    let admin = ProjectSession::admin(project.id);

    service.change_password(&admin, "rotatedpw").unwrap();
    assert!(service.enter(project.id, &role("admin", "projectpw")).is_err());
    let session = service.enter(project.id, &role("admin", "rotatedpw")).unwrap();
    assert_eq!(session.capabilities, Capability::admin());

    service.change_password(&admin, "").unwrap();
    let cleared = service.get_project(project.id).unwrap().unwrap();
    assert!(!cleared.project_protected);
    service.enter(project.id, &role("admin", "")).unwrap();
}

#[test]
fn stored_sessions_follow_role_changes_and_revocation() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", true, true)).unwrap();
    service
        .signup_member(project.id, "owner", "password1", "")
        .unwrap();
    let bob = service
        .signup_member(project.id, "bob", "password1", "")
        .unwrap();
    let owner = service
        .enter(project.id, &member("owner", "password1"))
        .unwrap();
    let bob_session = service.enter(project.id, &member("bob", "password1")).unwrap();
    assert!(bob_session.capabilities.is_empty());

    let writer = service
        .create_role(
            &owner,
            &NewRole {
                name: "writer".to_string(),
                password: String::new(),
                capabilities: Capability::VIEW_TASK | Capability::CREATE_TASK,
            },
        )
        .unwrap();
    service
        .assign_member_role(&owner, bob.id, writer.id)
        .unwrap();
    let refreshed = service.refresh_session(&bob_session).unwrap();
    assert_eq!(refreshed.role_id, Some(writer.id));
    assert_eq!(
        refreshed.capabilities,
        Capability::VIEW_TASK | Capability::CREATE_TASK
    );

    service.delete_member(&owner, bob.id).unwrap();
    match service.refresh_session(&refreshed).unwrap_err() {
        ProjectServiceError::Access(err) => {
            assert!(matches!(err, AccessError::SessionRevoked));
            assert_eq!(err.user_message(), "Session expired. Please sign in again.");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn implicit_admin_session_ends_when_entry_mode_changes() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let mut service =
        ProjectService::new(SqliteProjectRepository::try_new(&mut conn).unwrap(), hasher());
    let project = service.create_project(&new_project("", false, false)).unwrap();
    let admin = service.enter(project.id, &Credential::None).unwrap();
    assert_eq!(service.refresh_session(&admin).unwrap(), admin);

    service
        .update_settings(
            &admin,
            &ProjectSettings {
                name: project.name.clone(),
                members_enabled: true,
                roles_enabled: false,
                member_default_role: None,
            },
        )
        .unwrap();
    assert!(matches!(
        service.refresh_session(&admin),
        Err(ProjectServiceError::Access(AccessError::SessionRevoked))
    ));
}
