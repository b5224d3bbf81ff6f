use rusqlite::Connection;
use studynote_core::db::{open_db_in_memory, Schema};
use studynote_core::{
    Actor, Capability, Credential, Member, NewProject, NewTask, PasswordHasher, Project,
    ProjectService, ProjectSession, SqliteProjectRepository, SqliteTaskRepository, TaskService,
    TaskServiceError, TaskStatus, TaskUpdate,
};
use uuid::Uuid;

struct Fixture {
    project: Project,
    alice: Member,
    bob: Member,
}

/// Members-and-roles project with `alice` (admin) and `bob` (none).
fn fixture(conn: &mut Connection) -> Fixture {
    let mut service = ProjectService::new(
        SqliteProjectRepository::try_new(conn).unwrap(),
        PasswordHasher::new(1_000),
    );
    let project = service
        .create_project(&NewProject {
            name: "Lab".to_string(),
            password: String::new(),
            members_enabled: true,
            roles_enabled: true,
        })
        .unwrap();
    let alice = service
        .signup_member(project.id, "alice", "password1", "")
        .unwrap();
    let bob = service.signup_member(project.id, "bob", "password1", "").unwrap();
    Fixture {
        project,
        alice,
        bob,
    }
}

fn member_session(project: &Project, member: &Member, capabilities: Capability) -> ProjectSession {
    ProjectSession {
        project_id: project.id,
        actor: Actor::Member(member.id),
        role_id: Some(member.role_id),
        capabilities,
    }
}

fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        ..NewTask::default()
    }
}

#[test]
fn admin_creates_lists_and_completes_tasks() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let fx = fixture(&mut conn);
    let session = ProjectService::new(
        SqliteProjectRepository::try_new(&mut conn).unwrap(),
        PasswordHasher::new(1_000),
    )
    .enter(
        fx.project.id,
        &Credential::Member {
            username: "alice".to_string(),
            password: "password1".to_string(),
        },
    )
    .unwrap();

    let service = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap(), &session);
    let task = service
        .create_task(&NewTask {
            title: " Order reagents ".to_string(),
            description: "by friday".to_string(),
            assignee_id: Some(fx.bob.id),
            due_at: Some(1_700_000_000_000),
        })
        .unwrap();
    assert_eq!(task.title, "Order reagents");
    assert_eq!(task.status, TaskStatus::Todo);
    assert_eq!(task.owner, Actor::Member(fx.alice.id));
    assert_eq!(task.assignee_id, Some(fx.bob.id));

    let done = service.set_status(task.id, TaskStatus::Done).unwrap();
    assert_eq!(done.status, TaskStatus::Done);
    assert_eq!(service.list_tasks().unwrap(), vec![done]);
}

#[test]
fn capabilities_gate_task_operations() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let fx = fixture(&mut conn);
    let viewer = member_session(&fx.project, &fx.bob, Capability::VIEW_TASK);

    let service = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap(), &viewer);
    assert!(service.list_tasks().unwrap().is_empty());
    assert!(matches!(
        service.create_task(&new_task("Nope")),
        Err(TaskServiceError::PermissionDenied(denied))
            if denied.required == Capability::CREATE_TASK
    ));

    let creator = member_session(&fx.project, &fx.bob, Capability::CREATE_TASK);
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap(), &creator);
    assert!(matches!(
        service.create_task(&NewTask {
            assignee_id: Some(fx.alice.id),
            ..new_task("Assign me")
        }),
        Err(TaskServiceError::PermissionDenied(denied))
            if denied.required == Capability::ASSIGN_TASK
    ));
}

#[test]
fn own_and_other_tasks_need_different_flags() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let fx = fixture(&mut conn);
    let alice = member_session(&fx.project, &fx.alice, Capability::admin());
    let bob = member_session(
        &fx.project,
        &fx.bob,
        Capability::VIEW_TASK
            | Capability::CREATE_TASK
            | Capability::MODIFY_OWN_TASK
            | Capability::DELETE_OWN_TASK,
    );

    let alice_tasks = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap(), &alice);
    let bob_tasks = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap(), &bob);

    let alices = alice_tasks.create_task(&new_task("Alice's")).unwrap();
    let bobs = bob_tasks.create_task(&new_task("Bob's")).unwrap();

    let update = TaskUpdate {
        title: "Renamed".to_string(),
        description: String::new(),
        due_at: None,
    };
    assert_eq!(bob_tasks.update_task(bobs.id, &update).unwrap().title, "Renamed");
    assert!(matches!(
        bob_tasks.update_task(alices.id, &update),
        Err(TaskServiceError::PermissionDenied(denied))
            if denied.required == Capability::MODIFY_OTHER_TASK
    ));
    assert!(matches!(
        bob_tasks.delete_task(alices.id),
        Err(TaskServiceError::PermissionDenied(denied))
            if denied.required == Capability::DELETE_OTHER_TASK
    ));

    alice_tasks.assign_task(alices.id, Some(fx.bob.id)).unwrap();
    let started = bob_tasks
        .set_status(alices.id, TaskStatus::InProgress)
        .unwrap();
    assert_eq!(started.status, TaskStatus::InProgress);

    bob_tasks.delete_task(bobs.id).unwrap();
    alice_tasks.delete_task(alices.id).unwrap();
    assert!(alice_tasks.list_tasks().unwrap().is_empty());
}

#[test]
fn assignee_must_belong_to_the_project() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let fx = fixture(&mut conn);
    let alice = member_session(&fx.project, &fx.alice, Capability::admin());
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap(), &alice);

    let task = service.create_task(&new_task("Lonely")).unwrap();
    let stranger = Uuid::new_v4();
    assert!(matches!(
        service.assign_task(task.id, Some(stranger)),
        Err(TaskServiceError::UnknownAssignee(id)) if id == stranger
    ));
    assert_eq!(service.assign_task(task.id, None).unwrap().assignee_id, None);
}

#[test]
fn tasks_are_scoped_to_the_session_project() {
    let mut conn = open_db_in_memory(Schema::Project).unwrap();
    let fx = fixture(&mut conn);
    let alice = member_session(&fx.project, &fx.alice, Capability::admin());
    let outsider = ProjectSession::admin(Uuid::new_v4());

    let task = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap(), &alice)
        .create_task(&new_task("Private"))
        .unwrap();
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn).unwrap(), &outsider);

    assert!(service.list_tasks().unwrap().is_empty());
    assert!(matches!(
        service.get_task(task.id),
        Err(TaskServiceError::TaskNotFound(id)) if id == task.id
    ));
    assert!(matches!(
        service.create_task(&new_task("   ")),
        Err(TaskServiceError::BlankTitle)
    ));
}
