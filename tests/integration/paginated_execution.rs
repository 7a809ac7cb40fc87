#![allow(missing_docs)]

use genquery::{
    backend::{seed::seed_demo, SqliteBackend},
    catalog::standard::{columns::*, standard_schema},
    query::{
        Aggregation, Condition, CursorState, Dialect, OrderBy, PaginationSyntax, PrivilegeLevel,
        QueryEngine, QueryRequest, QueryResult, SelectColumn, Session,
    },
    types::{ColumnId, QueryError},
};

const ALICE_HOME: &str = "/tempZone/home/alice";

fn catalog() -> SqliteBackend {
    let backend = SqliteBackend::open_in_memory().expect("open sqlite");
    seed_demo(backend.connection()).expect("seed demo catalog");
    backend
}

fn engine(dialect: Dialect) -> QueryEngine {
    QueryEngine::new(standard_schema().expect("standard schema"), dialect).expect("engine")
}

fn session(engine: &QueryEngine) -> Session<'_, SqliteBackend> {
    let mut session = engine.session(catalog());
    session.set_caller_identity("alice", "tempZone", PrivilegeLevel::LocalUser);
    session
}

fn cond(column: ColumnId, expression: &str) -> Condition {
    Condition {
        column,
        expression: expression.into(),
    }
}

fn data_names(conditions: Vec<Condition>) -> QueryRequest {
    QueryRequest {
        select: vec![SelectColumn::new(DATA_NAME)],
        conditions,
        max_rows: 100,
        ..QueryRequest::default()
    }
}

fn column(page: &QueryResult, idx: usize) -> Vec<String> {
    page.table
        .rows()
        .map(|row| row[idx].to_string())
        .collect()
}

#[test]
fn pages_through_a_collection_in_canonical_order() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let request = QueryRequest {
        select: vec![SelectColumn::new(COLL_NAME), SelectColumn::new(DATA_NAME)],
        conditions: vec![cond(COLL_NAME, &format!("= '{ALICE_HOME}'"))],
        max_rows: 10,
        total_count: true,
        ..QueryRequest::default()
    };

    let first = session.execute_query(&request).expect("first page");
    assert_eq!(first.table.row_count(), 10);
    assert_eq!(first.total_count, Some(25));
    assert_eq!(first.table.value(0, 0), Some(ALICE_HOME));
    assert_eq!(first.table.value(0, 1), Some("run01.dat"));
    let token = first.continuation;
    assert!(!token.is_exhausted());

    let second = session
        .execute_query(&QueryRequest::continuation(token, 10))
        .expect("second page");
    assert_eq!(second.continuation, token);
    assert_eq!(second.table.value(0, 1), Some("run11.dat"));

    let third = session
        .execute_query(&QueryRequest::continuation(token, 10))
        .expect("third page");
    assert_eq!(column(&third, 1), ["run21.dat", "run22.dat", "run23.dat", "run24.dat", "run25.dat"]);
    assert!(third.continuation.is_exhausted());
    assert_eq!(third.state, CursorState::Exhausted);
    assert_eq!(session.open_cursors(), 0);
    assert_eq!(session.backend_mut().open_statements(), 0);
}

#[test]
fn offset_skips_rows_and_reports_full_total() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let request = QueryRequest {
        offset: 20,
        total_count: true,
        ..data_names(vec![cond(COLL_NAME, &format!("= '{ALICE_HOME}'"))])
    };
    let page = session.execute_query(&request).expect("page");
    assert_eq!(page.table.row_count(), 5);
    assert_eq!(page.table.value(0, 0), Some("run21.dat"));
    assert_eq!(page.total_count, Some(25));
}

#[test]
fn offset_past_the_end_still_reports_total() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let request = QueryRequest {
        offset: 30,
        total_count: true,
        ..data_names(vec![cond(COLL_NAME, &format!("= '{ALICE_HOME}'"))])
    };
    let err = session.execute_query(&request).unwrap_err();
    assert!(matches!(err, QueryError::NoRows { .. }));
    assert_eq!(err.recovered_total_count(), Some(25));
    assert_eq!(session.backend_mut().open_statements(), 0);
}

#[test]
fn manual_skip_with_count_query() {
    let dialect = Dialect {
        name: "sqlite-manual".into(),
        pagination: PaginationSyntax::Manual,
        count_query: true,
        ..Dialect::sqlite()
    };
    let engine = engine(dialect);
    let mut session = session(&engine);
    let request = QueryRequest {
        offset: 22,
        total_count: true,
        ..data_names(vec![cond(COLL_NAME, &format!("= '{ALICE_HOME}'"))])
    };
    let page = session.execute_query(&request).expect("page");
    assert_eq!(column(&page, 0), ["run23.dat", "run24.dat", "run25.dat"]);
    assert_eq!(page.total_count, Some(25));
}

#[test]
fn or_and_and_conditions() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);

    let either = data_names(vec![cond(DATA_NAME, "= 'run01.dat' || = 'notes.txt'")]);
    let page = session.execute_query(&either).expect("or");
    assert_eq!(column(&page, 0), ["notes.txt", "run01.dat"]);

    let range = data_names(vec![cond(DATA_SIZE, "n>= '500' && n< '1000'")]);
    let page = session.execute_query(&range).expect("and");
    assert_eq!(
        column(&page, 0),
        ["run05.dat", "run06.dat", "run07.dat", "run08.dat", "run09.dat"]
    );
}

#[test]
fn exclusive_and_matches_nothing() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let err = session
        .execute_query(&data_names(vec![cond(DATA_NAME, "= 'run01.dat' && = 'notes.txt'")]))
        .unwrap_err();
    assert!(matches!(err, QueryError::NoRows { .. }));
}

#[test]
fn or_survives_a_quote_inside_the_literal() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let page = session
        .execute_query(&data_names(vec![cond(DATA_NAME, "= 'O'Brien' || = 'run01.dat'")]))
        .expect("or with embedded quote");
    assert_eq!(column(&page, 0), ["run01.dat"]);
}

#[test]
fn begin_of_matches_prefix() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let page = session
        .execute_query(&data_names(vec![cond(DATA_NAME, "begin_of 'run1'")]))
        .expect("begin_of");
    assert_eq!(page.table.row_count(), 10);
    assert!(column(&page, 0).iter().all(|name| name.starts_with("run1")));

    let err = session
        .execute_query(&data_names(vec![cond(DATA_NAME, "begin_of 'xyz'")]))
        .unwrap_err();
    assert!(matches!(err, QueryError::NoRows { .. }));
}

#[test]
fn like_between_and_in() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);

    let page = session
        .execute_query(&data_names(vec![cond(COLL_NAME, "like '/tempZone/home/%'")]))
        .expect("like");
    assert_eq!(page.table.row_count(), 28);

    let page = session
        .execute_query(&data_names(vec![cond(DATA_NAME, "between 'run20.dat' and 'run22.dat'")]))
        .expect("between");
    assert_eq!(column(&page, 0), ["run20.dat", "run21.dat", "run22.dat"]);

    let page = session
        .execute_query(&data_names(vec![cond(DATA_NAME, "in 'plot.png'")]))
        .expect("in");
    assert_eq!(column(&page, 0), ["plot.png"]);
}

#[test]
fn literal_quotes_never_reach_sql() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let err = session
        .execute_query(&data_names(vec![cond(DATA_NAME, "= 'x' or '1'='1'")]))
        .unwrap_err();
    assert!(matches!(err, QueryError::NoRows { .. }));
}

#[test]
fn aggregates_group_per_collection() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let request = QueryRequest {
        select: vec![
            SelectColumn::new(COLL_NAME),
            SelectColumn {
                column: DATA_ID,
                aggregate: Aggregation::Count,
                order: OrderBy::None,
            },
        ],
        max_rows: 10,
        ..QueryRequest::default()
    };
    let page = session.execute_query(&request).expect("aggregate");
    assert_eq!(page.table.to_rows(), vec![
        vec![ALICE_HOME.to_string(), "25".to_string()],
        vec!["/tempZone/home/bob".to_string(), "3".to_string()],
    ]);
}

#[test]
fn zone_is_reached_through_the_resource() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let request = QueryRequest {
        select: vec![SelectColumn::new(ZONE_NAME), SelectColumn::new(DATA_NAME)],
        conditions: vec![cond(DATA_NAME, "= 'notes.txt'")],
        max_rows: 10,
        ..QueryRequest::default()
    };
    let page = session.execute_query(&request).expect("zone");
    assert_eq!(page.table.to_rows(), vec![vec!["tempZone".to_string(), "notes.txt".to_string()]]);
}

#[test]
fn attribute_conditions_bind_to_one_object() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let request = data_names(vec![
        cond(META_DATA_ATTR_NAME, "= 'quality'"),
        cond(META_DATA_ATTR_VALUE, "= 'good'"),
        cond(META_DATA_ATTR_NAME, "= 'temperature'"),
        cond(META_DATA_ATTR_VALUE, "n>= '60'"),
    ]);
    let page = session.execute_query(&request).expect("attributes");
    assert_eq!(column(&page, 0), ["run20.dat"]);

    let single = data_names(vec![
        cond(META_DATA_ATTR_NAME, "= 'quality'"),
        cond(META_DATA_ATTR_VALUE, "= 'good'"),
    ]);
    let page = session.execute_query(&single).expect("single attribute");
    assert_eq!(column(&page, 0), ["run10.dat", "run20.dat"]);
}

#[test]
fn closing_releases_the_cursor() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let first = session
        .execute_query(&QueryRequest {
            max_rows: 5,
            ..data_names(Vec::new())
        })
        .expect("first page");
    let token = first.continuation;
    assert_eq!(session.cursor_state(token), CursorState::Open);
    assert_eq!(session.backend_mut().open_statements(), 1);

    let closed = session
        .execute_query(&QueryRequest::continuation(token, 0))
        .expect("close");
    assert!(closed.continuation.is_exhausted());
    assert_eq!(session.backend_mut().open_statements(), 0);
    assert!(matches!(
        session.execute_query(&QueryRequest::continuation(token, 5)),
        Err(QueryError::CursorNotFound { .. })
    ));
    assert!(session.close_query(token).expect("close again").is_exhausted());
}

#[test]
fn cursors_are_independent() {
    let engine = engine(Dialect::sqlite());
    let mut session = session(&engine);
    let small = QueryRequest {
        max_rows: 2,
        ..data_names(Vec::new())
    };
    let a = session.execute_query(&small).expect("a").continuation;
    let b = session.execute_query(&small).expect("b").continuation;
    assert_ne!(a, b);
    session.close_query(a).expect("close a");
    let next = session
        .execute_query(&QueryRequest::continuation(b, 2))
        .expect("b continues");
    assert_eq!(column(&next, 0), ["raw.bin", "run01.dat"]);
}
