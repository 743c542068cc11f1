//! phenoquery CLI - compile query specifications and manage the dataframe cache
//!
//! Usage:
//!   phenoquery compile <spec.json> [--format debug|sql|json] [--dialect <dialect>]
//!   phenoquery execute <spec.json> --db <file.sqlite> [--mode all|first|count]
//!   phenoquery key <type> <model> [--harmonise] [--master-unit <unit>]
//!   phenoquery cache <get|exists|delete|flush|keys|purge> ...
//!   phenoquery schema <routes|check>
//!
//! Examples:
//!   phenoquery compile queries/pipeline_testing.json --format sql --dialect duckdb
//!   phenoquery key combined AnnotatedFeature --harmonise --master-unit mmol/L
//!   phenoquery cache purge 'SavedQuery\w+::42'

use std::error::Error;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use phenoquery::cache::{self, DataFrameKey, Payload, TieredCache};
use phenoquery::config::Settings;
use phenoquery::executor::{ExecOutcome, ExecuteMode, SqliteBackend};
use phenoquery::frame::DataFrame;
use phenoquery::logging;
use phenoquery::query::{CompileOptions, QueryCompiler, QuerySpec};
use phenoquery::saved_query::SqliteSavedQueryStore;
use phenoquery::schema::phenomedb;
use phenoquery::sql::Dialect;

#[derive(Parser)]
#[command(name = "phenoquery")]
#[command(about = "phenoquery - compile metabolomics query specifications and manage cached dataframes")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the standard search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log errors only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query specification
    Compile {
        /// Path to the JSON query specification
        file: PathBuf,

        /// Override the output model
        #[arg(short, long)]
        model: Option<String>,

        /// SQL dialect (defaults to the configured one)
        #[arg(short, long)]
        dialect: Option<DialectArg>,

        /// Output format
        #[arg(short, long, default_value = "sql")]
        format: OutputFormat,

        /// Restrict to projects visible to this role
        #[arg(long)]
        role: Option<i64>,
    },

    /// Compile and run a query specification against a SQLite database
    Execute {
        file: PathBuf,

        #[arg(long)]
        db: PathBuf,

        #[arg(long, default_value = "all")]
        mode: String,

        #[arg(long)]
        limit: Option<u64>,

        #[arg(long)]
        offset: Option<u64>,
    },

    /// Print the cache key for a dataframe
    Key {
        /// Dataframe type (combined, intensity_data, ...)
        df_type: String,

        model: String,

        #[arg(long)]
        class_type: Option<String>,

        #[arg(long)]
        class_level: Option<String>,

        #[arg(long)]
        aggregate_function: Option<String>,

        #[arg(long)]
        annotation_version: Option<String>,

        #[arg(long)]
        correction_type: Option<String>,

        #[arg(long)]
        harmonise: bool,

        #[arg(long)]
        feature_label: Option<String>,

        #[arg(long)]
        sample_label: Option<String>,

        #[arg(long)]
        master_unit: Option<String>,

        #[arg(long)]
        no_convert_units: bool,

        /// Prefix with the test namespace
        #[arg(long)]
        test: bool,
    },

    /// Inspect or modify the cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Inspect the built-in schema
    Schema {
        #[command(subcommand)]
        command: SchemaCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Print a cached artifact (tables as CSV)
    Get { key: String },

    /// Exit 0 if the key is cached, 1 otherwise
    Exists { key: String },

    Delete { key: String },

    /// Clear the cache, keeping the protected namespace unless included
    Flush {
        #[arg(long)]
        include_protected: bool,

        /// Saved query database whose cache states are reset
        #[arg(long)]
        saved_queries: Option<PathBuf>,
    },

    /// List known keys and their tiers
    Keys {
        #[arg(long)]
        include_protected: bool,

        #[arg(long)]
        include_hidden: bool,
    },

    /// Delete keys matching a regex (or every test key)
    Purge {
        #[arg(required_unless_present = "test")]
        pattern: Option<String>,

        #[arg(long)]
        test: bool,
    },
}

#[derive(Subcommand)]
enum SchemaCommand {
    /// Print the join routes from an output model
    Routes { output: String },

    /// Check every declared route against the relations
    Check,
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Duckdb,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// SQL text
    Sql,
    /// ORM-style query expression
    Debug,
    /// Canonical specification with recomputed joins
    Json,
}

type CliResult = Result<ExitCode, Box<dyn Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    };
    let settings = match settings {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        settings.logging.level.as_str()
    };
    if let Err(e) = logging::init(level) {
        eprintln!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Compile {
            file,
            model,
            dialect,
            format,
            role,
        } => cmd_compile(&settings, file, model, dialect, format, role),
        Commands::Execute {
            file,
            db,
            mode,
            limit,
            offset,
        } => cmd_execute(&settings, file, db, &mode, limit, offset),
        Commands::Key {
            df_type,
            model,
            class_type,
            class_level,
            aggregate_function,
            annotation_version,
            correction_type,
            harmonise,
            feature_label,
            sample_label,
            master_unit,
            no_convert_units,
            test,
        } => {
            let key = DataFrameKey {
                df_type: match df_type.parse() {
                    Ok(t) => t,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::FAILURE;
                    }
                },
                model,
                class_type,
                class_level,
                aggregate_function,
                annotation_version,
                correction_type,
                harmonise_annotations: harmonise,
                feature_label,
                sample_label,
                convert_units: !no_convert_units,
                master_unit,
                test_namespace: test || settings.query.test_namespace,
            };
            println!("{}", key);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cache { command } => cmd_cache(&settings, command),
        Commands::Schema { command } => cmd_schema(command),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn read_spec(file: &PathBuf) -> Result<QuerySpec, Box<dyn Error>> {
    let source = fs::read_to_string(file)
        .map_err(|e| format!("Error reading file '{}': {}", file.display(), e))?;
    Ok(QuerySpec::from_json(&source)?)
}

fn cmd_compile(
    settings: &Settings,
    file: PathBuf,
    model: Option<String>,
    dialect: Option<DialectArg>,
    format: OutputFormat,
    role: Option<i64>,
) -> CliResult {
    let mut spec = read_spec(&file)?;
    if let Some(model) = model {
        spec.model = model;
    }
    if let Some(role) = role {
        spec.add_filter(phenoquery::query::project_role_filter(role));
    }

    let graph = phenomedb::schema()?;
    let compiler = QueryCompiler::new(graph).with_options(CompileOptions {
        require_declared_joins: settings.query.require_declared_joins,
    });
    let compiled = compiler.compile(&spec)?;

    match format {
        OutputFormat::Sql => {
            let dialect = dialect.map(Dialect::from).unwrap_or(settings.query.dialect);
            println!("{}", compiled.to_sql(dialect));
        }
        OutputFormat::Debug => println!("{}", compiled.to_debug_string()),
        OutputFormat::Json => println!("{}", compiled.spec.to_json_pretty()?),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_execute(
    settings: &Settings,
    file: PathBuf,
    db: PathBuf,
    mode: &str,
    limit: Option<u64>,
    offset: Option<u64>,
) -> CliResult {
    let spec = read_spec(&file)?;
    let mode: ExecuteMode = mode.parse()?;

    let graph = phenomedb::schema()?;
    let compiled = QueryCompiler::new(graph)
        .with_options(CompileOptions {
            require_declared_joins: settings.query.require_declared_joins,
        })
        .compile(&spec)?;

    let backend = SqliteBackend::open(&db)?;
    let executor = phenoquery::executor::Executor::new(backend).with_query(compiled);

    match executor.execute(mode, limit, offset)? {
        ExecOutcome::Count(n) => println!("{}", n),
        outcome => write_csv(&DataFrame::from_records(&outcome.into_rows()))?,
    }
    Ok(ExitCode::SUCCESS)
}

fn write_csv(table: &DataFrame) -> Result<(), Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|c| c.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn open_cache(settings: &Settings) -> Result<TieredCache, Box<dyn Error>> {
    Ok(cache::open(&settings.cache)?)
}

fn cmd_cache(settings: &Settings, command: CacheCommand) -> CliResult {
    match command {
        CacheCommand::Get { key } => match open_cache(settings)?.get(&key)? {
            Some(Payload::Table(table)) => {
                write_csv(&table)?;
                Ok(ExitCode::SUCCESS)
            }
            Some(Payload::Value(datum)) => {
                println!("{:?}", datum);
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("Not cached: {}", key);
                Ok(ExitCode::FAILURE)
            }
        },
        CacheCommand::Exists { key } => {
            if open_cache(settings)?.exists(&key)? {
                println!("true");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("false");
                Ok(ExitCode::FAILURE)
            }
        }
        CacheCommand::Delete { key } => {
            let removed = open_cache(settings)?.delete(&key)?;
            println!("{}", if removed { "deleted" } else { "not cached" });
            Ok(ExitCode::SUCCESS)
        }
        CacheCommand::Flush {
            include_protected,
            saved_queries,
        } => {
            let mut cache = open_cache(settings)?;
            if let Some(path) = saved_queries {
                cache = cache.with_state_sink(Arc::new(SqliteSavedQueryStore::open(path)?));
            }
            let removed = cache.flush(include_protected)?;
            println!("Removed {} durable entries", removed);
            Ok(ExitCode::SUCCESS)
        }
        CacheCommand::Keys {
            include_protected,
            include_hidden,
        } => {
            let report = open_cache(settings)?.keys_report(include_protected, include_hidden)?;
            for (key, presence) in report {
                let tiers = match (presence.volatile, presence.durable) {
                    (true, true) => "both",
                    (true, false) => "volatile",
                    (false, true) => "durable",
                    (false, false) => "-",
                };
                println!("{:<9} {}", tiers, key);
            }
            Ok(ExitCode::SUCCESS)
        }
        CacheCommand::Purge { pattern, test } => {
            let cache = open_cache(settings)?;
            let deleted = match pattern {
                Some(pattern) if !test => cache.delete_by_pattern(&pattern)?,
                _ => cache.delete_test_keys()?,
            };
            for key in &deleted {
                println!("{}", key);
            }
            eprintln!("Deleted {} keys", deleted.len());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn cmd_schema(command: SchemaCommand) -> CliResult {
    let graph = phenomedb::schema()?;
    match command {
        SchemaCommand::Routes { output } => {
            for (target, path) in graph.routes_from(&output)? {
                println!("{} -> {}: {}", output, target, path.join(" > "));
            }
            Ok(ExitCode::SUCCESS)
        }
        SchemaCommand::Check => {
            let issues = graph.validate_routes();
            if issues.is_empty() {
                let routes: usize = graph
                    .output_models()
                    .iter()
                    .filter_map(|output| graph.routes_from(output).ok())
                    .map(|table| table.len())
                    .sum();
                println!("OK: {} routes checked", routes);
                return Ok(ExitCode::SUCCESS);
            }
            eprintln!("Route errors:");
            for issue in &issues {
                eprintln!("  {}", issue);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
