//! Tabula CLI - inspect and query any supported data source

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use futures::future::BoxFuture;
use tabula_connectors::{
    default_registry, test_connection, with_connection, ConnectionConfig, Connector,
    ConnectorError, ConnectorRegistry, DEFAULT_SAMPLE_LIMIT,
};
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Universal tabular data access - one interface over databases and flat files")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend identifier (postgresql, mysql, sqlite, mongodb, excel, csv)
    #[arg(short, long, global = true, env = "TABULA_BACKEND")]
    backend: Option<String>,

    /// Path to a JSON file with connection parameters
    #[arg(short, long, global = true, env = "TABULA_CONFIG")]
    config: Option<PathBuf>,

    /// Override a connection parameter, e.g. `--set port=5433`
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the supported backend identifiers
    Backends,

    /// Connect, list tables and report the outcome
    TestConnection,

    /// List tables, collections or sheets
    Tables,

    /// Show the columns of a table
    Columns {
        table: String,
    },

    /// Show the first rows of a table
    Sample {
        table: String,

        #[arg(short, long, default_value_t = DEFAULT_SAMPLE_LIMIT)]
        limit: usize,
    },

    /// Dump every table with its columns and sample rows
    Schema,

    /// Run a query in the backend's dialect
    Query {
        /// SQL, a MongoDB find request, or a flat-file query
        query: String,

        /// Positional parameter as JSON (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose when set
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_writer(std::io::stderr);
    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = builder.with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let registry = default_registry();

    match &cli.command {
        Commands::Backends => {
            print_json(&registry.supported_backends())?;
        }
        Commands::TestConnection => {
            let (backend, config) = target(&cli)?;
            let result = test_connection(&registry, &backend, config).await;
            print_json(&result)?;
            if !result.success {
                anyhow::bail!("connection test for {} failed", backend);
            }
        }
        Commands::Tables => {
            let tables = run(&registry, &cli, |c| {
                Box::pin(async move { c.get_tables().await })
            })
            .await?;
            print_json(&tables)?;
        }
        Commands::Columns { table } => {
            let table = table.clone();
            let columns = run(&registry, &cli, move |c| {
                Box::pin(async move { c.get_columns(&table).await })
            })
            .await?;
            print_json(&columns)?;
        }
        Commands::Sample { table, limit } => {
            let (table, limit) = (table.clone(), *limit);
            let rows = run(&registry, &cli, move |c| {
                Box::pin(async move { c.get_sample_data(&table, limit).await })
            })
            .await?;
            print_json(&rows)?;
        }
        Commands::Schema => {
            let snapshot = run(&registry, &cli, |c| {
                Box::pin(async move { c.get_schema_info().await })
            })
            .await?;
            print_json(&snapshot)?;
        }
        Commands::Query { query, params } => {
            let query = query.clone();
            let params: Vec<Value> = params.iter().map(|p| parse_value(p)).collect();
            let rows = run(&registry, &cli, move |c| {
                Box::pin(async move { c.execute_query(&query, &params).await })
            })
            .await?;
            print_json(&rows)?;
        }
    }

    Ok(())
}

/// Backend id and merged connection parameters from the command line.
fn target(cli: &Cli) -> Result<(String, ConnectionConfig)> {
    let backend = cli
        .backend
        .clone()
        .context("no backend given; pass --backend or set TABULA_BACKEND")?;
    let config = load_config(cli.config.as_deref(), &cli.overrides)?;
    debug!("Using backend {} with {} parameters", backend, config.len());
    Ok((backend, config))
}

/// Connect, run `f` and disconnect.
async fn run<T, F>(registry: &ConnectorRegistry, cli: &Cli, f: F) -> Result<T>
where
    F: for<'c> FnOnce(&'c mut dyn Connector) -> BoxFuture<'c, Result<T, ConnectorError>>,
{
    let (backend, config) = target(cli)?;
    with_connection(registry, &backend, config, f)
        .await
        .with_context(|| format!("{} request failed", backend))
}

/// Read the config file, if any, then apply `key=value` overrides.
fn load_config(path: Option<&Path>, overrides: &[String]) -> Result<ConnectionConfig> {
    let mut config = match path {
        Some(path) => {
            info!("Loading connection config from {:?}", path);
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {:?}", path))?;
            ConnectionConfig::from_json_str(&content)
                .with_context(|| format!("invalid config file {:?}", path))?
        }
        None => ConnectionConfig::new(),
    };

    for entry in overrides {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("override '{}' is not KEY=VALUE", entry))?;
        config.set(key.trim(), parse_value(value.trim()));
    }
    Ok(config)
}

/// JSON when it parses (numbers, booleans, null), otherwise a plain string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("5433"), json!(5433));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("localhost"), json!("localhost"));
        assert_eq!(parse_value("\"5433\""), json!("5433"));
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"host": "db.local", "port": 5432, "database": "finds"}}"#).unwrap();

        let config = load_config(
            Some(file.path()),
            &["port=5433".to_string(), "user = archaeologist".to_string()],
        )
        .unwrap();
        assert_eq!(config.get("host"), Some(&json!("db.local")));
        assert_eq!(config.get("port"), Some(&json!(5433)));
        assert_eq!(config.get("user"), Some(&json!("archaeologist")));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        assert!(load_config(None, &["port".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parses_global_options() {
        let cli = Cli::try_parse_from([
            "tabula",
            "--backend",
            "csv",
            "--set",
            "file_path=finds.csv",
            "query",
            "SELECT * FROM finds",
            "--param",
            "1",
        ])
        .unwrap();
        assert_eq!(cli.backend.as_deref(), Some("csv"));
        assert_eq!(cli.overrides, vec!["file_path=finds.csv"]);
        match cli.command {
            Commands::Query { query, params } => {
                assert_eq!(query, "SELECT * FROM finds");
                assert_eq!(params, vec!["1".to_string()]);
            }
            _ => panic!("expected the query subcommand"),
        }
    }
}
