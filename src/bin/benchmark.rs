/// Latency benchmark for the search pipeline.
///
/// Loads a catalogue, replays a query list for N rounds across M concurrent
/// workers, and prints a JSON report: latency mean / p50 / p95 / max, cache
/// hit ratio, and how many queries returned nothing. The first round runs
/// against a cold cache; later rounds mostly hit it.

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pharmsearch::config::Config;
use pharmsearch::logging;
use pharmsearch::query::SearchFilters;
use pharmsearch::service::{CatalogueService, SearchStatus};

const DEFAULT_QUERIES: &[&str] = &[
    "paracetamol",
    "paracetamol 500mg",
    "crocin",
    "dolo 650",
    "headache",
    "fever",
    "acidity",
    "cough syrup",
    "azithromycin",
    "pantoprazole 40",
    "allergy",
    "vitamin d3",
];

#[derive(Parser)]
#[command(name = "pharmsearch-bench", about = "Search latency benchmark for pharmsearch")]
struct Cli {
    /// Catalogue CSV snapshot
    #[arg(long)]
    catalogue: PathBuf,

    /// File with one query per line (defaults to a built-in list)
    #[arg(long)]
    queries: Option<PathBuf>,

    /// Times the whole query list is replayed
    #[arg(long, default_value_t = 5)]
    rounds: usize,

    /// Concurrent worker tasks
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Results requested per query
    #[arg(long)]
    limit: Option<usize>,

    /// Log level for the benchmark run
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BenchmarkReport {
    records: usize,
    queries: usize,
    rounds: usize,
    workers: usize,
    total_searches: usize,
    load_ms: u64,
    wall_ms: u64,
    mean_us: f64,
    p50_us: u64,
    p95_us: u64,
    max_us: u64,
    cache_hit_ratio: f64,
    empty_results: usize,
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn load_queries(path: Option<&PathBuf>) -> anyhow::Result<Vec<String>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)?;
            let queries: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            if queries.is_empty() {
                anyhow::bail!("query file '{}' has no queries", path.display());
            }
            Ok(queries)
        }
        None => Ok(DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()),
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // 1. Parse CLI args
    let cli = Cli::parse();
    logging::init_with_level(&cli.log_level);

    let queries = Arc::new(load_queries(cli.queries.as_ref())?);
    let workers = cli.workers.max(1);
    let rounds = cli.rounds.max(1);

    // 2. Load catalogue and build indices
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Config error (using defaults): {}", e);
        Config::default()
    });
    let load_start = Instant::now();
    let catalogue_path = cli.catalogue.clone();
    let service = Arc::new(
        tokio::task::spawn_blocking(move || CatalogueService::open(catalogue_path, config)).await??,
    );
    let load_ms = load_start.elapsed().as_millis() as u64;
    tracing::info!(records = service.health().records_loaded, load_ms, "Catalogue ready");

    // 3. Replay queries across workers
    let total = queries.len() * rounds;
    let progress = ProgressBar::new(total as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} searches ({elapsed})")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let wall_start = Instant::now();
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let service = service.clone();
        let queries = queries.clone();
        let progress = progress.clone();
        let limit = cli.limit;
        handles.push(tokio::task::spawn_blocking(move || {
            let filters = SearchFilters::default();
            let mut latencies = Vec::new();
            let mut empty = 0usize;
            // worker w takes every workers-th search of the full schedule
            for i in (worker..total).step_by(workers) {
                let query = &queries[i % queries.len()];
                let start = Instant::now();
                let response = service.search(query, &filters, limit);
                latencies.push(start.elapsed());
                if response.status != SearchStatus::Ok {
                    empty += 1;
                }
                progress.inc(1);
            }
            (latencies, empty)
        }));
    }

    let mut latencies: Vec<Duration> = Vec::with_capacity(total);
    let mut empty_results = 0;
    for handle in handles {
        let (worker_latencies, empty) = handle.await?;
        latencies.extend(worker_latencies);
        empty_results += empty;
    }
    progress.finish_and_clear();
    let wall_ms = wall_start.elapsed().as_millis() as u64;

    // 4. Report
    let mut micros: Vec<u64> = latencies.iter().map(|d| d.as_micros() as u64).collect();
    micros.sort_unstable();
    let mean_us = if micros.is_empty() {
        0.0
    } else {
        micros.iter().sum::<u64>() as f64 / micros.len() as f64
    };
    let analytics = service.analytics();
    let lookups = analytics.cache_hits + analytics.cache_misses;
    let report = BenchmarkReport {
        records: analytics.total_medicines,
        queries: queries.len(),
        rounds,
        workers,
        total_searches: micros.len(),
        load_ms,
        wall_ms,
        mean_us,
        p50_us: percentile(&micros, 50.0),
        p95_us: percentile(&micros, 95.0),
        max_us: micros.last().copied().unwrap_or(0),
        cache_hit_ratio: if lookups == 0 {
            0.0
        } else {
            analytics.cache_hits as f64 / lookups as f64
        },
        empty_results,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
