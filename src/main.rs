//! bdq - run one SQL statement against BoilingData
//!
//! ## Usage
//!
//! ```bash
//! # Against a pre-signed endpoint
//! bdq --signed-url "$BD_SIGNED_URL" "SELECT * FROM parquet_scan('s3://bucket/key') LIMIT 10"
//!
//! # With a config file and engine override
//! bdq --config ~/.config/boilingdata/config.toml --engine sqlite "SELECT 1"
//! ```
//!
//! Rows are printed to stdout as JSON lines once the query has finished.
//! Logs go to stderr; tune them with `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use boilingdata_client::config::default_config_path;
use boilingdata_client::{
    Callbacks, ClientConfig, EngineType, Query, QuerySession, StaticCredentialSupplier,
};

#[derive(Parser, Debug)]
#[command(name = "bdq")]
#[command(about = "Run a SQL query on BoilingData and print the rows as JSON lines")]
struct Args {
    /// SQL statement to run
    sql: String,

    /// Path to config file (defaults to the user config dir when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pre-signed gateway WebSocket URL (falls back to `endpoint_url` in the
    /// config, for gateways that need no signature)
    #[arg(long, env = "BD_SIGNED_URL")]
    signed_url: Option<String>,

    /// Principal the signed URL was issued to (falls back to `username` in
    /// the config)
    #[arg(long, env = "BD_USERNAME")]
    username: Option<String>,

    /// Query engine
    #[arg(long, value_enum)]
    engine: Option<Engine>,

    /// Row offset to start from
    #[arg(long)]
    scan_cursor: Option<u64>,

    /// Let the gateway split large objects across workers
    #[arg(long)]
    split_access: bool,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Engine {
    Duckdb,
    Sqlite,
}

impl From<Engine> for EngineType {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::Duckdb => EngineType::Duckdb,
            Engine::Sqlite => EngineType::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("boilingdata_client=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let path = default_config_path();
            if path.exists() {
                ClientConfig::load(&path)
                    .with_context(|| format!("Failed to load config from {}", path.display()))?
            } else {
                ClientConfig::default()
            }
        }
    };

    let mut query = Query::new(&args.sql);
    if let Some(engine) = args.engine {
        query = query.with_engine(engine.into());
    }
    if let Some(cursor) = args.scan_cursor {
        query = query.with_scan_cursor(cursor);
    }
    if args.split_access {
        query = query.with_split_access(true, None);
    }

    let supplier =
        StaticCredentialSupplier::from_config(&config, args.signed_url.clone(), args.username.clone())
            .context("Pass --signed-url, set BD_SIGNED_URL or endpoint_url in the config")?;
    let session = QuerySession::new(
        &config,
        Arc::new(supplier),
        Callbacks::new().on_log_warn(|event| warn!(payload = %event.payload, "Gateway warning")),
    );

    info!(region = %config.region, engine = ?args.engine, "Running query");

    let limit = Duration::from_secs(args.timeout_secs);
    let rows = tokio::time::timeout(limit, session.execute_collect(query))
        .await
        .with_context(|| format!("Query did not finish within {}s", args.timeout_secs))??;

    for row in &rows {
        println!("{}", serde_json::to_string(row)?);
    }
    info!(rows = rows.len(), "Query finished");

    if let Err(e) = session.close().await {
        warn!(error = %e, "Close failed");
    }
    Ok(())
}
