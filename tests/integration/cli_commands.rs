#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use csv::ReaderBuilder;
use genquery::{
    catalog::standard::columns::{COLL_NAME, DATA_NAME},
    query::QueryBuilder,
};
use serde_json::Value;
use tempfile::TempDir;

const CYCLIC_SCHEMA: &str = r#"
[[tables]]
name = "a"

[[tables]]
name = "b"

[[tables]]
name = "c"

[[links]]
left = "a"
right = "b"
predicate = "a.id = b.a_id"

[[links]]
left = "b"
right = "c"
predicate = "b.id = c.b_id"

[[links]]
left = "c"
right = "a"
predicate = "c.id = a.c_id"
"#;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let config = dir.path().join("genquery.toml");
        fs::write(&config, "").expect("write config");
        Self { dir, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("genquery");
        cmd.env("GENQUERY_CONFIG", &self.config)
            .env_remove("GENQUERY_USER")
            .env_remove("GENQUERY_LOG");
        cmd
    }

    fn seeded(&self) -> PathBuf {
        let db = self.path("catalog.db");
        self.cmd().arg("seed-demo").arg(&db).assert().success();
        db
    }

    fn alice_request(&self) -> PathBuf {
        let request = QueryBuilder::new()
            .select(COLL_NAME)
            .select(DATA_NAME)
            .equals(COLL_NAME, "/tempZone/home/alice")
            .max_rows(10)
            .total_count(true)
            .build()
            .expect("request");
        let path = self.path("request.json");
        fs::write(&path, serde_json::to_vec(&request).expect("encode request")).expect("write request");
        path
    }
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

fn json_stdout(cmd: &mut assert_cmd::Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    stdout_json(&output)
}

#[test]
fn seed_demo_reports_counts() {
    let ws = Workspace::new();
    let db = ws.path("seeded.db");
    let json = json_stdout(ws.cmd().args(["--format", "json", "seed-demo"]).arg(&db));
    assert_eq!(json["data_objects"], 28);
    assert_eq!(json["collections"], 4);
    assert!(db.exists());
}

#[test]
fn run_returns_first_page_as_json() {
    let ws = Workspace::new();
    let db = ws.seeded();
    let request = ws.alice_request();
    let json = json_stdout(
        ws.cmd()
            .args(["--format", "json", "--user", "alice", "run"])
            .arg(&db)
            .arg(&request),
    );
    let rows = json["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0]["r_data_main.data_name"], "run01.dat");
    assert_eq!(json["total_count"], 25);
    assert_eq!(json["pages"], 1);
    assert_eq!(json["columns"][0], "r_coll_main.coll_name");
}

#[test]
fn run_all_drains_every_page() {
    let ws = Workspace::new();
    let db = ws.seeded();
    let request = ws.alice_request();
    let json = json_stdout(
        ws.cmd()
            .args(["--format", "json", "run", "--all", "--page-size", "7"])
            .arg(&db)
            .arg(&request),
    );
    assert_eq!(json["rows"].as_array().map(Vec::len), Some(25));
    assert_eq!(json["pages"], 4);
    assert_eq!(json["continuation"], 0);
}

#[test]
fn run_writes_csv() {
    let ws = Workspace::new();
    let db = ws.seeded();
    let request = ws.alice_request();
    let output = ws
        .cmd()
        .args(["--format", "csv", "run", "--offset", "23"])
        .arg(&db)
        .arg(&request)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let mut reader = ReaderBuilder::new().from_reader(output.as_slice());
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(headers.get(1), Some("r_data_main.data_name"));
    let names: Vec<String> = reader
        .records()
        .map(|rec| rec.expect("row")[1].to_string())
        .collect();
    assert_eq!(names, ["run24.dat", "run25.dat"]);
}

#[test]
fn run_reads_request_from_stdin() {
    let ws = Workspace::new();
    let db = ws.seeded();
    let request = fs::read(ws.alice_request()).expect("request");
    let json = json_stdout(
        ws.cmd()
            .args(["--format", "json", "run"])
            .arg(&db)
            .arg("-")
            .write_stdin(request),
    );
    assert_eq!(json["rows"].as_array().map(Vec::len), Some(10));
}

#[test]
fn strict_run_hides_other_users_objects() {
    let ws = Workspace::new();
    let db = ws.seeded();
    let request = QueryBuilder::new()
        .select(DATA_NAME)
        .max_rows(100)
        .build()
        .expect("request");
    let path = ws.path("all.json");
    fs::write(&path, serde_json::to_vec(&request).expect("encode")).expect("write");
    let json = json_stdout(
        ws.cmd()
            .args(["--format", "json", "--user", "anonymous", "--privilege", "remote-user"])
            .args(["run", "--strict"])
            .arg(&db)
            .arg(&path),
    );
    assert_eq!(json["rows"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["rows"][0]["r_data_main.data_name"], "run01.dat");
}

#[test]
fn compile_prints_sql_and_binds() {
    let ws = Workspace::new();
    let request = ws.alice_request();
    let json = json_stdout(
        ws.cmd()
            .args(["--format", "json", "--dialect", "postgres", "compile"])
            .arg(&request),
    );
    let sql = json["sql"].as_str().expect("sql");
    assert!(sql.starts_with("select distinct r_coll_main.coll_name, r_data_main.data_name from "));
    assert!(!sql.contains("/tempZone"));
    assert_eq!(json["binds"][0], "/tempZone/home/alice");
    assert_eq!(json["joins"], 1);
}

#[test]
fn check_schema_accepts_the_standard_schema() {
    let ws = Workspace::new();
    let json = json_stdout(ws.cmd().args(["--format", "json", "check-schema"]));
    assert_eq!(json["valid"], true);
    assert_eq!(json["tables"], 12);
    assert_eq!(json["cyclers"][0], "r_zone_main");
}

#[test]
fn check_schema_exits_two_on_a_cycle() {
    let ws = Workspace::new();
    let schema = ws.path("cyclic.toml");
    fs::write(&schema, CYCLIC_SCHEMA).expect("write schema");
    let output = ws
        .cmd()
        .args(["--format", "json", "check-schema", "--schema"])
        .arg(&schema)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&output);
    assert_eq!(json["valid"], false);
    assert!(json["error"].as_str().expect("error").contains("cycle"));
}

#[test]
fn dump_schema_round_trips_through_check() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .arg("dump-schema")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let schema = ws.path("dumped.toml");
    fs::write(&schema, output).expect("write dump");
    ws.cmd()
        .arg("check-schema")
        .arg("--schema")
        .arg(&schema)
        .assert()
        .success();
}

#[test]
fn missing_explicit_config_fails() {
    let ws = Workspace::new();
    let missing: &Path = &ws.path("absent.toml");
    ws.cmd()
        .arg("check-schema")
        .arg("--config")
        .arg(missing)
        .assert()
        .failure()
        .code(1);
}

#[test]
fn completions_are_generated() {
    let ws = Workspace::new();
    let output = ws
        .cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("genquery"));
}
