use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use pharmsearch::config::Config;
use pharmsearch::errors::PharmaError;
use pharmsearch::logging;
use pharmsearch::query::SearchFilters;
use pharmsearch::service::CatalogueService;

#[derive(Parser)]
#[command(name = "pharmsearch", version, about = "Search a pharmaceutical catalogue snapshot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalogue CSV snapshot (overrides catalogue_path from config)
    #[arg(long, global = true, env = "PHARMSEARCH_CATALOGUE")]
    catalogue: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one query and print the response as JSON
    Search {
        query: String,
        #[command(flatten)]
        filters: FilterArgs,
        /// Maximum number of results (1-100)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print records similar to a record id
    Recommend {
        id: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print service health
    Health,
    /// Print catalogue and cache statistics
    Analytics,
    /// Read one query per line from stdin and print one JSON response per line
    Batch {
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(clap::Args, Clone, Default)]
struct FilterArgs {
    /// Only return records with this packaging type
    #[arg(long)]
    packaging_type: Option<String>,
    /// Only return records marketed by this company
    #[arg(long)]
    manufacturer: Option<String>,
    /// relevance | confidence | name | manufacturer | packaging
    #[arg(long)]
    sort_by: Option<String>,
}

impl From<FilterArgs> for SearchFilters {
    fn from(args: FilterArgs) -> Self {
        SearchFilters {
            packaging_type: args.packaging_type,
            manufacturer: args.manufacturer,
            sort_by: args.sort_by,
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();

    // 2. Load configuration
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });
    if let Some(path) = &cli.catalogue {
        config.catalogue_path = path.display().to_string();
    }

    // 3. Initialize logging FIRST (before any other output)
    // stdout carries JSON responses only
    logging::init_logging(&config);

    // 4. Load the catalogue; any load error stops here
    let path = PathBuf::from(&config.catalogue_path);
    let service = tokio::task::spawn_blocking(move || CatalogueService::open(path, config))
        .await
        .map_err(|e| PharmaError::Internal(format!("catalogue load task failed: {}", e)))
        .and_then(|loaded| loaded)
        .map_err(|e| {
            tracing::error!(code = e.code(), error = %e, "Catalogue failed to load");
            e
        })?;

    // 5. Handle subcommand
    match cli.command {
        Commands::Search { query, filters, limit } => {
            let response = service.search(&query, &filters.into(), limit);
            print_json(&response)?;
        }
        Commands::Recommend { id, limit } => {
            print_json(&service.recommendations(id, limit))?;
        }
        Commands::Health => {
            print_json(&service.health())?;
        }
        Commands::Analytics => {
            print_json(&service.analytics())?;
        }
        Commands::Batch { filters, limit } => {
            let filters: SearchFilters = filters.into();
            let stdin = std::io::stdin();
            let mut served = 0usize;
            for line in stdin.lock().lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                print_json(&service.search(&line, &filters, limit))?;
                served += 1;
            }
            let analytics = service.analytics();
            tracing::info!(
                queries = served,
                cache_hits = analytics.cache_hits,
                cache_misses = analytics.cache_misses,
                "Batch complete"
            );
        }
    }

    Ok(())
}
