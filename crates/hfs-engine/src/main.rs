//! Helios FHIR Search & Transaction Engine CLI
//!
//! Loads resources into an in-memory store and runs searches or
//! transaction/batch Bundles against them, printing FHIR JSON to stdout.
//!
//! ```text
//! hfs-engine search Observation "code=http://loinc.org|1234-5&_include=Observation:subject" --data data.ndjson
//! hfs-engine explain Patient "name:exact=Smith&_sort=-birthdate"
//! hfs-engine bundle transaction.json --data seed.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use helios_engine::backends::memory::MemoryStore;
use helios_engine::search::{CancellationToken, RawParams};
use helios_engine::{EngineConfig, ParameterCatalog, SearchService, TransactionProcessor};
use serde_json::Value;
use tracing::{info, warn};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "hfs-engine", version)]
#[command(about = "Run FHIR searches and transaction Bundles against an in-memory store")]
struct Cli {
    #[command(flatten)]
    config: EngineConfig,

    /// JSON, Bundle, or NDJSON files to load before running the command.
    #[arg(long = "data", global = true)]
    data: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a search and print the searchset Bundle.
    Search {
        /// Resource type to search.
        resource_type: String,
        /// Query string, e.g. `name=smith&_count=10`.
        #[arg(default_value = "")]
        query: String,
    },
    /// Print the query plan a search would execute.
    Explain {
        /// Resource type to search.
        resource_type: String,
        /// Query string.
        #[arg(default_value = "")]
        query: String,
    },
    /// Process a transaction or batch Bundle and print the response Bundle.
    Bundle {
        /// Path to the request Bundle.
        file: PathBuf,
    },
}

/// What the command printed and whether it succeeded.
#[derive(Debug)]
struct Output {
    body: Value,
    success: bool,
}

impl Output {
    fn ok(body: Value) -> Self {
        Self {
            body,
            success: true,
        }
    }

    fn failed(body: Value) -> Self {
        Self {
            body,
            success: false,
        }
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("helios_engine={},hfs_engine={}", level, level))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_store(paths: &[PathBuf]) -> anyhow::Result<Arc<MemoryStore>> {
    let store = Arc::new(MemoryStore::new());
    for path in paths {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let count = store
            .load_str(&text)
            .with_context(|| format!("loading {}", path.display()))?;
        info!(path = %path.display(), count, "Loaded resources");
    }
    Ok(store)
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

async fn run(cli: &Cli) -> anyhow::Result<Output> {
    let store = load_store(&cli.data)?;

    match &cli.command {
        Command::Search {
            resource_type,
            query,
        } => {
            let service = search_service(&cli.config, store)?;
            let raw = RawParams::parse_query(query);
            match service
                .search(resource_type, &raw, CancellationToken::new())
                .await
            {
                Ok(bundle) => Ok(Output::ok(bundle.to_json())),
                Err(err) => {
                    warn!(error = %err, code = %err.code(), "Search failed");
                    Ok(Output::failed(err.to_operation_outcome().to_json()))
                }
            }
        }
        Command::Explain {
            resource_type,
            query,
        } => {
            let service = search_service(&cli.config, store)?;
            let raw = RawParams::parse_query(query);
            match service.explain(resource_type, &raw) {
                Ok(plan) => Ok(Output::ok(serde_json::to_value(&plan)?)),
                Err(err) => Ok(Output::failed(err.to_operation_outcome().to_json())),
            }
        }
        Command::Bundle { file } => {
            let request = read_json(file)?;
            let processor =
                TransactionProcessor::new(store).with_base_url(cli.config.base());
            match processor.process(&request).await {
                Ok(bundle) => Ok(Output::ok(bundle.to_json())),
                Err(err) => {
                    warn!(error = %err, "Bundle rejected");
                    Ok(Output::failed(err.to_operation_outcome().to_json()))
                }
            }
        }
    }
}

fn search_service(config: &EngineConfig, store: Arc<MemoryStore>) -> anyhow::Result<SearchService> {
    let catalog = ParameterCatalog::builtin().context("building the search parameter catalog")?;
    Ok(SearchService::new(config.clone(), Arc::new(catalog), store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.config.log_level);

    if let Err(errors) = cli.config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(2);
    }

    let output = run(&cli).await?;
    println!("{}", serde_json::to_string_pretty(&output.body)?);
    if !output.success {
        std::process::exit(1);
    }
    Ok(())
}
