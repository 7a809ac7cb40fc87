#![allow(missing_docs)]

use genquery::{
    catalog::{
        standard::{columns::*, standard_schema},
        SchemaDefinition, SchemaGraph,
    },
    query::{
        CallerIdentity, CompiledQuery, Condition, Dialect, PrivilegeLevel, QueryBuilder, QueryCompiler,
        QueryEngine, QueryRequest, SelectColumn,
    },
    types::{ColumnId, ErrorKind, QueryError},
};

const TWO_ISLANDS: &str = r#"
[[tables]]
name = "left_side"

[[tables]]
name = "right_side"

[[columns]]
id = 1
table = "left_side"
name = "label"

[[columns]]
id = 2
table = "right_side"
name = "label"
"#;

const HUB_AND_SPOKES: &str = r#"
[[tables]]
name = "west"

[[tables]]
name = "east"

[[tables]]
name = "hub"
cycler = true

[[columns]]
id = 1
table = "west"
name = "label"

[[columns]]
id = 2
table = "east"
name = "label"

[[columns]]
id = 3
table = "hub"
name = "zone"

[[links]]
left = "west"
right = "hub"
predicate = "west.zone = hub.zone"

[[links]]
left = "east"
right = "hub"
predicate = "east.zone = hub.zone"
"#;

fn caller() -> CallerIdentity {
    CallerIdentity::new("alice", "tempZone", PrivilegeLevel::LocalUser)
}

fn compile_with(dialect: Dialect, request: &QueryRequest) -> genquery::Result<CompiledQuery> {
    let graph = standard_schema()?;
    QueryCompiler::new(&graph, &dialect).compile(request, &caller())
}

fn data_in_collection(offset: u64) -> QueryRequest {
    QueryBuilder::new()
        .select(COLL_NAME)
        .select(DATA_NAME)
        .equals(COLL_NAME, "/tempZone/home/alice")
        .offset(offset)
        .build()
        .expect("request")
}

#[test]
fn pagination_syntax_follows_the_dialect() {
    let request = data_in_collection(20);

    let postgres = compile_with(Dialect::postgres(), &request).unwrap();
    assert!(postgres.sql.ends_with(" offset ?"));
    assert_eq!(postgres.binds, vec!["/tempZone/home/alice", "20"]);

    let mysql = compile_with(Dialect::mysql(), &request).unwrap();
    assert!(mysql.sql.ends_with(" limit 20,18446744073709551615"));
    assert_eq!(mysql.binds, vec!["/tempZone/home/alice"]);

    let oracle = compile_with(Dialect::oracle(), &request).unwrap();
    assert!(oracle.sql.ends_with("order by r_coll_main.coll_name, r_data_main.data_name"));
    assert_eq!(oracle.binds, vec!["/tempZone/home/alice"]);

    let first_page = compile_with(Dialect::mysql(), &data_in_collection(0)).unwrap();
    assert!(!first_page.sql.contains(" limit "));
}

#[test]
fn count_statement_wraps_the_distinct_select() {
    let out = compile_with(Dialect::postgres(), &data_in_collection(40)).unwrap();
    assert!(out.count_sql.starts_with("select count(*) from (select distinct "));
    assert!(out.count_sql.ends_with(") genquery_count"));
    assert!(!out.count_sql.contains("order by"));
    assert_eq!(out.count_binds, vec!["/tempZone/home/alice"]);
}

#[test]
fn begin_of_uses_the_dialect_length_function() {
    let request = QueryBuilder::new()
        .select(DATA_NAME)
        .begins_with(DATA_NAME, "run")
        .build()
        .unwrap();
    let postgres = compile_with(Dialect::postgres(), &request).unwrap();
    assert!(postgres.sql.contains(
        "substr(r_data_main.data_name,1,char_length(?))=? AND char_length(r_data_main.data_name)>0"
    ));
    let sqlite = compile_with(Dialect::sqlite(), &request).unwrap();
    assert!(sqlite.sql.contains("length(r_data_main.data_name)>0"));
    assert!(!sqlite.sql.contains("char_length"));
    assert_eq!(sqlite.binds, vec!["run", "run"]);
}

#[test]
fn literals_travel_as_binds_only() {
    let request = QueryRequest {
        select: vec![SelectColumn::new(DATA_NAME)],
        conditions: vec![Condition {
            column: DATA_NAME,
            expression: "= 'x'); drop table r_data_main; --'".into(),
        }],
        ..QueryRequest::default()
    };
    let out = compile_with(Dialect::postgres(), &request).unwrap();
    assert!(!out.sql.contains("drop table"));
    assert_eq!(out.binds, vec!["x'); drop table r_data_main; --"]);
}

#[test]
fn malformed_conditions_are_condition_syntax_errors() {
    for expression in ["~= 'x'", "= 'a' || = 'b' || = 'c'", "= x", "like 'a' extra"] {
        let request = QueryRequest {
            select: vec![SelectColumn::new(DATA_NAME)],
            conditions: vec![Condition {
                column: DATA_NAME,
                expression: expression.into(),
            }],
            ..QueryRequest::default()
        };
        let err = compile_with(Dialect::postgres(), &request).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConditionSyntax, "{expression}");
    }
}

#[test]
fn unknown_columns_are_schema_errors() {
    let request = QueryRequest {
        select: vec![SelectColumn::new(ColumnId(9999))],
        ..QueryRequest::default()
    };
    let err = compile_with(Dialect::postgres(), &request).unwrap_err();
    assert!(matches!(err, QueryError::UnknownColumn { .. }));
    assert_eq!(err.kind(), ErrorKind::Schema);
}

#[test]
fn disconnected_tables_cannot_be_linked() {
    let graph = SchemaDefinition::from_toml_str(TWO_ISLANDS)
        .and_then(|def| def.build())
        .unwrap();
    let dialect = Dialect::postgres();
    let request = QueryRequest {
        select: vec![SelectColumn::new(ColumnId(1)), SelectColumn::new(ColumnId(2))],
        ..QueryRequest::default()
    };
    let err = QueryCompiler::new(&graph, &dialect)
        .compile(&request, &caller())
        .unwrap_err();
    match err {
        QueryError::UnlinkedTables { unreachable } => assert_eq!(unreachable, vec!["right_side"]),
        other => panic!("unexpected {other}"),
    }
}

#[test]
fn cycler_tables_do_not_bridge_joins() {
    let graph = SchemaDefinition::from_toml_str(HUB_AND_SPOKES)
        .and_then(|def| def.build())
        .unwrap();
    let dialect = Dialect::postgres();
    let compiler = QueryCompiler::new(&graph, &dialect);

    let spokes = QueryRequest {
        select: vec![SelectColumn::new(ColumnId(1)), SelectColumn::new(ColumnId(2))],
        ..QueryRequest::default()
    };
    let err = compiler.compile(&spokes, &caller()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Graph);

    let spoke_and_hub = QueryRequest {
        select: vec![SelectColumn::new(ColumnId(1)), SelectColumn::new(ColumnId(3))],
        ..QueryRequest::default()
    };
    let out = compiler.compile(&spoke_and_hub, &caller()).unwrap();
    assert_eq!(out.joins, 1);
    assert!(out.sql.contains("west.zone = hub.zone"));
}

#[test]
fn standard_zone_is_joined_through_users() {
    let request = QueryRequest {
        select: vec![SelectColumn::new(USER_NAME), SelectColumn::new(ZONE_NAME)],
        ..QueryRequest::default()
    };
    let out = compile_with(Dialect::postgres(), &request).unwrap();
    assert_eq!(out.joins, 1);
    assert!(out.sql.contains("r_user_main.zone_name = r_zone_main.zone_name"));
}

#[test]
fn engine_refuses_cyclic_schemas() {
    let mut graph = SchemaGraph::new();
    for name in ["a", "b", "c"] {
        graph.register_table(name, "", false).unwrap();
    }
    graph.register_link("a", "b", "a.id = b.a_id").unwrap();
    graph.register_link("b", "c", "b.id = c.b_id").unwrap();
    graph.register_link("c", "a", "c.id = a.c_id").unwrap();
    let err = QueryEngine::new(graph, Dialect::postgres()).unwrap_err();
    assert!(matches!(err, QueryError::SchemaCycle { .. }));
}

#[test]
fn reload_keeps_existing_snapshots() {
    let engine = QueryEngine::new(standard_schema().unwrap(), Dialect::postgres()).unwrap();
    let before = engine.schema();
    let islands = SchemaDefinition::from_toml_str(TWO_ISLANDS)
        .and_then(|def| def.build())
        .unwrap();
    engine.reload_schema(islands).unwrap();
    assert_eq!(engine.schema().tables().len(), 2);
    assert_eq!(before.tables().len(), standard_schema().unwrap().tables().len());

    let err = engine
        .compile_query(&data_in_collection(0), &caller())
        .unwrap_err();
    assert!(matches!(err, QueryError::UnknownColumn { .. }));
}

#[test]
fn standard_schema_survives_a_definition_round_trip() {
    let graph = standard_schema().unwrap();
    let text = SchemaDefinition::from_graph(&graph).to_toml_string().unwrap();
    let rebuilt = SchemaDefinition::from_toml_str(&text)
        .and_then(|def| def.build())
        .unwrap();
    let dialect = Dialect::postgres();
    let request = data_in_collection(0);
    let a = QueryCompiler::new(&graph, &dialect).compile(&request, &caller()).unwrap();
    let b = QueryCompiler::new(&rebuilt, &dialect).compile(&request, &caller()).unwrap();
    assert_eq!(a, b);
}
