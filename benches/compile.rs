#![forbid(unsafe_code)]

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use genquery::backend::{seed::seed_demo, SqliteBackend};
use genquery::catalog::standard::{columns::*, standard_schema};
use genquery::query::{
    CallerIdentity, Dialect, PrivilegeLevel, QueryBuilder, QueryCompiler, QueryEngine,
    QueryRequest,
};

fn requests() -> Vec<(&'static str, QueryRequest)> {
    let simple = QueryBuilder::new()
        .select(COLL_NAME)
        .select(DATA_NAME)
        .equals(COLL_NAME, "/tempZone/home/alice")
        .build()
        .expect("simple request");
    let attributes = QueryBuilder::new()
        .select(DATA_NAME)
        .select(DATA_SIZE)
        .condition(META_DATA_ATTR_NAME, "= 'quality'")
        .condition(META_DATA_ATTR_VALUE, "= 'good'")
        .condition(META_DATA_ATTR_NAME, "= 'temperature'")
        .condition(META_DATA_ATTR_VALUE, "n>= '60'")
        .build()
        .expect("attribute request");
    let wide = QueryBuilder::new()
        .select(ZONE_NAME)
        .select(RESC_NAME)
        .select(COLL_NAME)
        .select(DATA_NAME)
        .select(DATA_ACCESS_NAME)
        .condition(DATA_NAME, "like 'run%' || = 'notes.txt'")
        .offset(20)
        .build()
        .expect("wide request");
    vec![("simple", simple), ("attributes", attributes), ("wide", wide)]
}

fn compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/standard");
    let graph = standard_schema().expect("schema");
    let dialect = Dialect::postgres();
    let caller = CallerIdentity::new("alice", "tempZone", PrivilegeLevel::RemoteUser);
    let compiler = QueryCompiler::new(&graph, &dialect);

    group.throughput(Throughput::Elements(1));
    for (name, request) in requests() {
        group.bench_function(name, |b| {
            b.iter(|| black_box(compiler.compile(black_box(&request), &caller)));
        });
    }
    group.finish();
}

fn execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute/sqlite");
    group.sample_size(30);
    let engine = QueryEngine::new(standard_schema().expect("schema"), Dialect::sqlite())
        .expect("engine");
    let backend = SqliteBackend::open_in_memory().expect("sqlite");
    seed_demo(backend.connection()).expect("seed");
    let mut session = engine.session(backend);
    session.set_caller_identity("alice", "tempZone", PrivilegeLevel::LocalUser);
    let request = QueryBuilder::new()
        .select(COLL_NAME)
        .select(DATA_NAME)
        .max_rows(100)
        .build()
        .expect("request");

    group.bench_function("first_page", |b| {
        b.iter(|| black_box(session.execute_query(&request).expect("page")));
    });
    group.finish();
}

criterion_group!(benches, compile, execute);
criterion_main!(benches);
