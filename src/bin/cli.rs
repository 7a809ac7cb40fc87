//! Binary entry point for the genquery administrative CLI.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use genquery::{
    backend::{seed::seed_demo, SqliteBackend},
    catalog::{SchemaDefinition, SchemaGraph},
    config::{ConfigError, EngineConfig},
    query::{PrivilegeLevel, QueryRequest},
    types::{QueryError, QueryErrorWithCode},
};
use tracing_subscriber::EnvFilter;

#[path = "cli/output.rs"]
mod output;

use output::{emit_rows, Rendered, Ui};

#[derive(Parser, Debug)]
#[command(
    name = "genquery",
    version,
    about = "Compile and run generic catalog queries",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, env = "GENQUERY_CONFIG", help = "Engine config file (TOML)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Schema definition file (TOML) overriding the config")]
    schema: Option<PathBuf>,

    #[arg(long, global = true, help = "Dialect preset: postgres, mysql, oracle or sqlite")]
    dialect: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for structured responses"
    )]
    format: OutputFormat,

    #[command(flatten)]
    caller: CallerArgs,

    #[arg(short, long, global = true, action = ArgAction::Count, help = "Raise log verbosity")]
    verbose: u8,

    #[arg(long, global = true, help = "Disable colored output")]
    plain: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CallerArgs {
    #[arg(long, global = true, env = "GENQUERY_USER", default_value = "rods", help = "Caller user name")]
    user: String,

    #[arg(long, global = true, default_value = "tempZone", help = "Caller zone")]
    zone: String,

    #[arg(
        long,
        global = true,
        default_value = "local-user",
        help = "none, remote-user, local-user, remote-admin or local-admin"
    )]
    privilege: String,
}

#[derive(Args, Debug)]
struct RunCmd {
    #[arg(value_name = "DB", help = "SQLite catalog database")]
    db_path: PathBuf,

    #[arg(value_name = "REQUEST", help = "Request JSON file, or - for stdin")]
    request: PathBuf,

    #[arg(long, help = "Rows per page (overrides the request)")]
    page_size: Option<i64>,

    #[arg(long, help = "Rows to skip (overrides the request)")]
    offset: Option<u64>,

    #[arg(long, help = "Fetch every page instead of the first one")]
    all: bool,

    #[arg(long, help = "Apply row filters to every non-administrator")]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Validate the schema graph (exit 2 on a cycle)")]
    CheckSchema,

    #[command(about = "Print the active schema as a TOML definition")]
    DumpSchema,

    #[command(about = "Compile a request to SQL without executing it")]
    Compile {
        #[arg(value_name = "REQUEST", help = "Request JSON file, or - for stdin")]
        request: PathBuf,
    },

    #[command(about = "Execute a request against a SQLite catalog")]
    Run(RunCmd),

    #[command(about = "Create and populate a demo SQLite catalog")]
    SeedDemo {
        #[arg(value_name = "DB")]
        db_path: PathBuf,
    },

    #[command(about = "Print shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Csv,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(1);
        }
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("GENQUERY_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32, Box<dyn Error>> {
    let ui = Ui::new(cli.plain || cli.format != OutputFormat::Text);
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(schema) = &cli.schema {
        config.schema = Some(schema.clone());
    }
    if let Some(dialect) = &cli.dialect {
        config.dialect.preset = dialect.clone();
    }

    match &cli.command {
        Command::CheckSchema => check_schema(&cli, &config, &ui),
        Command::DumpSchema => {
            let graph = config.load_schema()?;
            print!("{}", SchemaDefinition::from_graph(&graph).to_toml_string()?);
            Ok(0)
        }
        Command::Compile { request } => {
            let request = read_request(request)?;
            compile(&cli, &config, &ui, &request)?;
            Ok(0)
        }
        Command::Run(cmd) => run_request(&cli, config, &ui, cmd),
        Command::SeedDemo { db_path } => {
            let backend = SqliteBackend::open(db_path)?;
            let summary = seed_demo(backend.connection())?;
            if cli.format == OutputFormat::Json {
                let value = serde_json::json!({
                    "data_objects": summary.data_objects,
                    "collections": summary.collections,
                    "attributes": summary.attributes,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                ui.success(&format!(
                    "Seeded {} data objects in {} collections ({} attributes) into {}",
                    summary.data_objects,
                    summary.collections,
                    summary.attributes,
                    db_path.display()
                ));
            }
            Ok(0)
        }
        Command::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(*shell, &mut command, "genquery", &mut io::stdout());
            Ok(0)
        }
    }
}

fn check_schema(cli: &Cli, config: &EngineConfig, ui: &Ui) -> Result<i32, Box<dyn Error>> {
    let graph = match config.load_schema() {
        Ok(graph) => graph,
        Err(ConfigError::Query(err @ QueryError::SchemaCycle { .. })) => {
            if cli.format == OutputFormat::Json {
                let value = serde_json::json!({ "valid": false, "code": err.code(), "error": err.to_string() });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                ui.warn(&QueryErrorWithCode(&err).to_string());
            }
            return Ok(2);
        }
        Err(err) => return Err(err.into()),
    };
    let cyclers: Vec<String> = graph
        .tables()
        .iter()
        .filter(|t| t.cycler)
        .map(|t| t.name.clone())
        .collect();
    if cli.format == OutputFormat::Json {
        let value = serde_json::json!({
            "valid": true,
            "tables": graph.tables().len(),
            "columns": graph.columns().len(),
            "links": graph.links().len(),
            "cyclers": cyclers,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        ui.section(
            "Schema",
            [
                ("tables", graph.tables().len()),
                ("columns", graph.columns().len()),
                ("links", graph.links().len()),
            ],
        );
        ui.list("Cyclers", cyclers);
        ui.success("schema graph is acyclic");
    }
    Ok(0)
}

fn compile(
    cli: &Cli,
    config: &EngineConfig,
    ui: &Ui,
    request: &QueryRequest,
) -> Result<(), Box<dyn Error>> {
    let engine = config.build_engine()?;
    let caller = caller_identity(cli)?;
    let compiled = engine.compile_query(request, &caller)?;
    match cli.format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "sql": compiled.sql,
                "binds": compiled.binds,
                "count_sql": compiled.count_sql,
                "count_binds": compiled.count_binds,
                "from": compiled.from,
                "joins": compiled.joins,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(io::stdout());
            writer.write_record(["position", "bind"])?;
            for (idx, bind) in compiled.binds.iter().enumerate() {
                writer.write_record([(idx + 1).to_string(), bind.clone()])?;
            }
            writer.flush()?;
        }
        OutputFormat::Text => {
            println!("{}", compiled.sql);
            println!();
            let binds: Vec<(String, &String)> = compiled
                .binds
                .iter()
                .enumerate()
                .map(|(idx, bind)| ((idx + 1).to_string(), bind))
                .collect();
            ui.section("Binds", binds.iter().map(|(pos, bind)| (pos.as_str(), bind)));
            ui.info(&format!(
                "{} tables, {} joins ({} dialect)",
                compiled.from.len(),
                compiled.joins,
                engine.dialect()
            ));
        }
    }
    Ok(())
}

fn run_request(
    cli: &Cli,
    mut config: EngineConfig,
    ui: &Ui,
    cmd: &RunCmd,
) -> Result<i32, Box<dyn Error>> {
    if cli.dialect.is_none() {
        config.dialect.preset = "sqlite".into();
    }
    config.access.strict |= cmd.strict;
    let mut request = read_request(&cmd.request)?;
    if let Some(page_size) = cmd.page_size {
        request.max_rows = page_size;
    }
    if let Some(offset) = cmd.offset {
        request.offset = offset;
    }

    let engine = config.build_engine()?;
    let schema = engine.schema();
    let headers = column_headers(&schema, &request)?;
    let caller = caller_identity(cli)?;
    let backend = SqliteBackend::open(&cmd.db_path)?;
    let mut session = engine.session(backend);
    session.set_caller_identity(caller.user, caller.zone, caller.privilege);

    let mut page = match session.execute_query(&request) {
        Ok(page) => page,
        Err(QueryError::NoRows { total_count }) => {
            match total_count {
                Some(total) => ui.warn(&format!("no rows found (total {total})")),
                None => ui.warn("no rows found"),
            }
            return Ok(0);
        }
        Err(err) => return Err(Box::new(err)),
    };
    let mut rendered = Rendered {
        headers,
        rows: page.table.to_rows(),
        total_count: page.total_count,
        continuation: page.continuation.0,
        pages: 1,
    };
    while cmd.all && !page.continuation.is_exhausted() {
        let next = QueryRequest::continuation(page.continuation, request.max_rows.max(1));
        page = session.execute_query(&next)?;
        rendered.rows.extend(page.table.to_rows());
        rendered.continuation = page.continuation.0;
        rendered.pages += 1;
    }
    if !page.continuation.is_exhausted() {
        session.close_query(page.continuation)?;
    }
    emit_rows(cli.format, ui, &rendered)?;
    Ok(0)
}

fn column_headers(graph: &SchemaGraph, request: &QueryRequest) -> Result<Vec<String>, QueryError> {
    request
        .select
        .iter()
        .map(|select| {
            let qualified = graph.column_info(select.column)?.qualified();
            Ok(match select.aggregate.function() {
                Some(function) => format!("{function}({qualified})"),
                None => qualified,
            })
        })
        .collect()
}

fn caller_identity(cli: &Cli) -> Result<genquery::query::CallerIdentity, QueryError> {
    let privilege: PrivilegeLevel = cli.caller.privilege.parse()?;
    Ok(genquery::query::CallerIdentity::new(
        cli.caller.user.clone(),
        cli.caller.zone.clone(),
        privilege,
    ))
}

fn read_request(path: &Path) -> Result<QueryRequest, Box<dyn Error>> {
    let text = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(serde_json::from_str(&text)?)
}
