//! seqidx CLI
//!
//! Command-line interface over a SQLite database holding demo events:
//! - Create tables and index sentinels
//! - Insert events
//! - Scan events newest first, optionally by number and status

use anyhow::Context;
use clap::{Parser, Subcommand};
use seqidx::config::{Config, LoggingConfig};
use seqidx::index::{Collection, Indexer, ScanStep};
use seqidx::record::Record;
use seqidx::seqid::{SeqId, SeqIdGenerator};
use seqidx::store::SqliteStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "seqidx")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Time-bucketed secondary indexes over SQLite")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/seqidx/config.toml or ./seqidx.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the event table and its indexes
    Init,

    /// Insert one event
    Put {
        #[arg(short, long)]
        number: i64,
        #[arg(short, long)]
        status: String,
        #[arg(short, long, default_value = "")]
        body: String,
    },

    /// Print events newest first, then the resume cursor
    Scan {
        /// Only events with this number
        #[arg(short, long)]
        number: Option<i64>,
        /// Only events with this status (requires --number)
        #[arg(short, long, requires = "number")]
        status: Option<String>,
        /// Resume below this SeqId
        #[arg(short, long)]
        after: Option<SeqId>,
        /// Maximum number of events
        #[arg(short, long)]
        limit: Option<usize>,
        /// Index rows per query (default: from config)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Print or write the default configuration
    Config {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Demo record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub seq_id: Option<SeqId>,
    pub number: i64,
    pub status: String,
    pub body: String,
}

impl Record for Event {
    const TABLE: &'static str = "events";
    const COLUMNS: &'static [&'static str] = &["seq_id", "number", "status", "body"];
    const KEY: &'static [&'static str] = &["seq_id"];

    fn seq_id(&self) -> Option<SeqId> {
        self.seq_id
    }

    fn set_seq_id(&mut self, id: SeqId) {
        self.seq_id = Some(id);
    }
}

const BY_NUMBER: &str = "by_number";
const BY_NUMBER_STATUS: &str = "by_number_status";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_ref());
    }

    // Warnings raised while loading reach stderr before logging is configured
    let loaded = tracing::subscriber::with_default(bootstrap_subscriber(std::io::stderr), || {
        match &cli.config {
            Some(path) => Config::load_with_env(path),
            None => Ok(Config::load_default()),
        }
    });
    let mut config = loaded?;
    if let Some(db) = cli.db {
        config.store.path = db;
    }
    init_logging(&config.logging);

    tracing::debug!("seqidx v{}", env!("CARGO_PKG_VERSION"));

    let events = open_events(&config).await?;

    match cli.command {
        Commands::Init => {
            for index in events.indexes() {
                println!(
                    "{:<18} table={} floor={}",
                    index.name(),
                    index.backing_table(),
                    index.floor()
                );
            }
            println!("Initialized {}", config.store.path.display());
        }

        Commands::Put {
            number,
            status,
            body,
        } => {
            let mut event = Event {
                seq_id: None,
                number,
                status,
                body,
            };
            let seq_id = events.insert(&mut event).await?;
            println!("{}", seq_id);
        }

        Commands::Scan {
            number,
            status,
            after,
            limit,
            page_size,
        } => {
            let index_name = match (&number, &status) {
                (Some(_), Some(_)) => BY_NUMBER_STATUS,
                (Some(_), None) => BY_NUMBER,
                _ => seqidx::index::CHRONOLOGICAL_NAME,
            };
            let index = events
                .index(index_name)
                .with_context(|| format!("index {} is not attached", index_name))?;

            let mut builder = index
                .scan()
                .page_size(page_size.unwrap_or(config.index.page_size));
            if let Some(number) = &number {
                builder = builder.matching(number);
            }
            if let Some(status) = &status {
                builder = builder.matching(status);
            }
            if let Some(after) = after {
                builder = builder.after(after);
            }
            if let Some(limit) = limit {
                builder = builder.limit(limit);
            }

            let mut scanner = builder.start()?;
            loop {
                match scanner.next().await {
                    ScanStep::Record(event) => print_event(&event)?,
                    ScanStep::Exhausted => break,
                    ScanStep::Failed(err) => {
                        if let Some(cursor) = scanner.cursor() {
                            eprintln!("Resume with --after {}", cursor);
                        }
                        anyhow::bail!("scan failed: {}", err);
                    }
                }
            }

            match scanner.cursor() {
                Some(cursor) => println!("cursor: {}", cursor),
                None => println!("cursor: -"),
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Warnings only, used until the configured subscriber is installed
fn bootstrap_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("seqidx=warn"))
        .with_ansi(false)
        .with_writer(writer)
        .finish()
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("seqidx={}", logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn open_events(config: &Config) -> anyhow::Result<Collection<Event>> {
    let store = SqliteStore::open(&config.store.path)
        .with_context(|| format!("opening {}", config.store.path.display()))?;
    let generator = SeqIdGenerator::new(config.index.worker_id)?;

    let mut events = Collection::open(Arc::new(store), Arc::new(generator)).await?;
    events.add_index(Indexer::Chronological).await?;
    events.add_index(Indexer::by_columns(["number"])).await?;
    events
        .add_index(Indexer::by_columns(["number", "status"]))
        .await?;

    Ok(events)
}

fn print_event(event: &Event) -> anyhow::Result<()> {
    let written = event
        .seq_id
        .and_then(|id| chrono::DateTime::from_timestamp_millis(id.timestamp_ms()))
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    println!("{} {}", written, serde_json::to_string(event)?);
    Ok(())
}

fn write_default_config(output: Option<&PathBuf>) -> anyhow::Result<()> {
    let config = seqidx::config::generate_default_config();

    match output {
        Some(path) => {
            // Create parent directory if needed
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &config)?;
            println!("Config written to {:?}", path);
        }
        None => {
            print!("{}", config);
        }
    }

    Ok(())
}
