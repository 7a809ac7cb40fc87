#![allow(missing_docs)]

use genquery::{
    backend::{seed::seed_demo, PermissionCatalog, SqliteBackend},
    catalog::standard::{columns::*, standard_schema},
    query::{
        AccessLevel, AccessSettings, Condition, Dialect, PrivilegeLevel, QueryEngine,
        QueryRequest, RowPermissionCheck, SelectColumn, Session,
    },
    types::{ColumnId, ErrorKind, QueryError},
};

fn catalog() -> SqliteBackend {
    let backend = SqliteBackend::open_in_memory().expect("open sqlite");
    seed_demo(backend.connection()).expect("seed demo catalog");
    backend
}

fn engine() -> QueryEngine {
    QueryEngine::new(standard_schema().expect("standard schema"), Dialect::sqlite()).expect("engine")
}

fn session<'e>(
    engine: &'e QueryEngine,
    user: &str,
    privilege: PrivilegeLevel,
) -> Session<'e, SqliteBackend> {
    let mut session = engine.session(catalog());
    session.set_caller_identity(user, "tempZone", privilege);
    session
}

fn cond(column: ColumnId, expression: &str) -> Condition {
    Condition {
        column,
        expression: expression.into(),
    }
}

fn all_data_names() -> QueryRequest {
    QueryRequest {
        select: vec![SelectColumn::new(DATA_NAME)],
        max_rows: 100,
        ..QueryRequest::default()
    }
}

fn object_id(backend: &SqliteBackend, name: &str) -> String {
    backend
        .connection()
        .query_row(
            "select data_id from r_data_main where data_name = ?1",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .expect("object id")
        .to_string()
}

fn visible(session: &mut Session<'_, SqliteBackend>, request: &QueryRequest) -> Vec<String> {
    match session.execute_query(request) {
        Ok(page) => page.table.rows().map(|row| row[0].to_string()).collect(),
        Err(QueryError::NoRows { .. }) => Vec::new(),
        Err(err) => panic!("unexpected error: {err}"),
    }
}

#[test]
fn anonymous_caller_sees_only_granted_objects() {
    let engine = engine();
    let mut session = session(&engine, "anonymous", PrivilegeLevel::RemoteUser);
    let request = QueryRequest {
        conditions: vec![cond(COLL_NAME, "like '/tempZone/home/%'")],
        ..all_data_names()
    };
    assert_eq!(visible(&mut session, &request), ["run01.dat"]);
}

#[test]
fn lenient_policy_leaves_users_unfiltered() {
    let engine = engine();
    let mut session = session(&engine, "alice", PrivilegeLevel::LocalUser);
    assert_eq!(visible(&mut session, &all_data_names()).len(), 28);
}

#[test]
fn strict_policy_filters_users_but_not_local_admins() {
    let engine = engine().with_access(AccessSettings {
        strict: true,
        ..AccessSettings::default()
    });
    let mut alice = session(&engine, "alice", PrivilegeLevel::LocalUser);
    let names = visible(&mut alice, &all_data_names());
    assert_eq!(names.len(), 25);
    assert!(names.iter().all(|name| name.starts_with("run")));

    let mut bob = session(&engine, "bob", PrivilegeLevel::RemoteAdmin);
    assert_eq!(
        visible(&mut bob, &all_data_names()),
        ["notes.txt", "plot.png", "raw.bin", "run01.dat"]
    );

    let mut rods = session(&engine, "rods", PrivilegeLevel::LocalAdmin);
    assert_eq!(visible(&mut rods, &all_data_names()).len(), 28);
}

#[test]
fn strict_policy_cannot_be_relaxed() {
    let engine = engine();
    let alice = session(&engine, "alice", PrivilegeLevel::LocalUser);
    assert!(!alice.set_access_policy(false));
    assert!(alice.set_access_policy(true));
    assert!(alice.set_access_policy(false));
    drop(alice);

    let mut alice = session(&engine, "alice", PrivilegeLevel::LocalUser);
    assert_eq!(visible(&mut alice, &all_data_names()).len(), 25);
}

#[test]
fn restricted_columns_need_a_local_admin() {
    let engine = engine();
    let request = QueryRequest {
        select: vec![SelectColumn::new(AUDIT_COMMENT), SelectColumn::new(DATA_NAME)],
        conditions: vec![cond(DATA_NAME, "= 'run05.dat'")],
        max_rows: 10,
        ..QueryRequest::default()
    };

    let mut alice = session(&engine, "alice", PrivilegeLevel::RemoteAdmin);
    let err = alice.execute_query(&request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);

    let mut rods = session(&engine, "rods", PrivilegeLevel::LocalAdmin);
    let page = rods.execute_query(&request).expect("admin audit query");
    assert_eq!(page.table.value(0, 0), Some("create"));
}

#[test]
fn grant_chain_answers_permission_questions() {
    let mut backend = catalog();
    let run01 = object_id(&backend, "run01.dat");
    let run02 = object_id(&backend, "run02.dat");
    let notes = object_id(&backend, "notes.txt");

    assert!(backend
        .check_object_access(&run01, "alice", "tempZone", AccessLevel::Own)
        .unwrap());
    assert!(backend
        .check_object_access(&run01, "anonymous", "tempZone", AccessLevel::Read)
        .unwrap());
    assert!(!backend
        .check_object_access(&run01, "anonymous", "tempZone", AccessLevel::Modify)
        .unwrap());
    assert!(!backend
        .check_object_access(&run02, "anonymous", "tempZone", AccessLevel::Read)
        .unwrap());
    assert!(backend
        .check_object_access(&notes, "rods", "tempZone", AccessLevel::Read)
        .unwrap());
    assert!(!backend
        .check_object_access(&notes, "rods", "otherZone", AccessLevel::Read)
        .unwrap());
}

#[test]
fn row_permission_check_fails_the_request() {
    let engine = engine();
    let mut session = session(&engine, "rods", PrivilegeLevel::LocalAdmin);
    let mut request = QueryRequest {
        select: vec![SelectColumn::new(DATA_ID), SelectColumn::new(DATA_NAME)],
        conditions: vec![cond(COLL_NAME, "= '/tempZone/home/alice'")],
        max_rows: 30,
        permission_check: Some(RowPermissionCheck {
            user: "alice".into(),
            zone: String::new(),
            level: AccessLevel::Own,
        }),
        ..QueryRequest::default()
    };
    let page = session.execute_query(&request).expect("alice owns her objects");
    assert_eq!(page.table.row_count(), 25);

    request.permission_check = Some(RowPermissionCheck {
        user: "bob".into(),
        zone: "tempZone".into(),
        level: AccessLevel::Read,
    });
    let err = session.execute_query(&request).unwrap_err();
    assert!(matches!(err, QueryError::PermissionDenied { .. }));
    assert_eq!(session.open_cursors(), 0);
    assert_eq!(session.backend_mut().open_statements(), 0);
}

#[test]
fn row_permission_check_without_object_column_fails_closed() {
    let engine = engine();
    let mut session = session(&engine, "rods", PrivilegeLevel::LocalAdmin);
    let request = QueryRequest {
        permission_check: Some(RowPermissionCheck {
            user: "alice".into(),
            zone: String::new(),
            level: AccessLevel::Read,
        }),
        ..all_data_names()
    };
    let err = session.execute_query(&request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Permission);
}
