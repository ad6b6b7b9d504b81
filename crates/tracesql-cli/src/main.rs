//! tracesql CLI: run statement blocks against an in-memory engine.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracesql_core::{EngineConfig, SqlSource, SqlValue};
use tracesql_engine::TraceSqlEngine;

#[derive(Parser)]
#[command(name = "tracesql")]
#[command(about = "Run SQL statement blocks with trace functions and tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a script file and print the final statement's rows
    Run {
        /// Path to the SQL script
        script: PathBuf,

        /// Print execution statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Execute an inline statement block
    Query {
        /// The SQL to run
        sql: String,

        /// Print execution statistics to stderr
        #[arg(long)]
        stats: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (sql, stats) = match cli.command {
        Commands::Run { script, stats } => match fs::read_to_string(&script) {
            Ok(sql) => (sql, stats),
            Err(e) => {
                eprintln!("Error: cannot read {}: {}", script.display(), e);
                std::process::exit(1);
            }
        },
        Commands::Query { sql, stats } => (sql, stats),
    };

    if let Err(e) = run_block(&sql, stats) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_block(sql: &str, print_stats: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = TraceSqlEngine::new(EngineConfig::from_env())?;
    let mut result = engine.execute_until_last_statement(SqlSource::from_user(sql))?;

    // One JSON object per row, column names as keys.
    let names = result.column_names();
    while let Some(row) = result.next_row()? {
        let object: serde_json::Map<String, serde_json::Value> = names
            .iter()
            .cloned()
            .zip(row.iter().map(to_json))
            .collect();
        println!("{}", serde_json::Value::Object(object));
    }

    if print_stats {
        eprintln!(
            "statements: {} ({} with output), columns: {}",
            result.stats.statement_count,
            result.stats.statement_count_with_output,
            result.stats.column_count
        );
    }
    Ok(())
}

fn to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(i) => serde_json::Value::from(*i),
        // Non-finite floats have no JSON representation.
        SqlValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        SqlValue::Text(s) => serde_json::Value::from(s.as_str()),
        SqlValue::Blob(b) => serde_json::Value::from(b.clone()),
    }
}
