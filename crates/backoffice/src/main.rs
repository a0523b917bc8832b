//! Back office - Entry point
//!
//! Runs the back-office server against an in-memory database, optionally
//! seeded from a JSON file of `{ "table": [rows...] }`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{info, warn};

use backoffice::config::{ConfigLoader, DEFAULT_ENV_PREFIX};
use backoffice::core::{MemoryDatabase, Record};
use backoffice::telemetry::init_telemetry;
use backoffice::App;

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
    /// Path to a JSON seed file.
    seed: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut seed = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--seed" | "-s" => {
                    seed = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("backoffice {}", env!("CARGO_PKG_VERSION"));
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config, seed }
    }
}

fn print_help() {
    println!(
        r"Back office - POS back-office request runtime

USAGE:
    backoffice [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -s, --seed <PATH>      JSON file of table rows loaded at startup
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    BACKOFFICE__ENVIRONMENT                development | staging | production
    BACKOFFICE__SERVER__HTTP_ADDR          Listen address (default: 0.0.0.0:8080)
    BACKOFFICE__AUTH__BOT_TOKEN            Value granting the bot role
    BACKOFFICE__AUTH__ADMIN_TOKEN          Value granting the admin role
    BACKOFFICE__JOBS__DAILY_CRON           Daily aggregation schedule
    BACKOFFICE__TELEMETRY__LOGGING__LEVEL  Log filter (default: info)

EXAMPLES:
    backoffice --config /etc/backoffice/backoffice.toml
    BACKOFFICE__SERVER__HTTP_ADDR=127.0.0.1:3000 backoffice --seed fixtures.json
"
    );
}

async fn seed(db: &MemoryDatabase, path: &Path) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;
    let tables: BTreeMap<String, Vec<Record>> =
        serde_json::from_str(&content).context("parsing seed file")?;
    for (table, rows) in tables {
        info!(table = %table, rows = rows.len(), "seeding table");
        db.seed(&table, rows).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loader = ConfigLoader::new().with_dotenv()?;
    let loader = match &args.config {
        Some(path) => loader.with_file(path)?,
        None => loader,
    };
    let config = loader
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load()
        .context("invalid configuration")?;

    init_telemetry(&config.telemetry.to_telemetry_config())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        addr = %config.server.http_addr,
        "starting back office"
    );

    let db = MemoryDatabase::new();
    match &args.seed {
        Some(path) => seed(&db, path).await?,
        None => warn!("no seed file given, starting with an empty database"),
    }

    let app = App::builder(config).database(Arc::new(db)).build()?;
    app.run().await?;

    info!("back office stopped");
    Ok(())
}
