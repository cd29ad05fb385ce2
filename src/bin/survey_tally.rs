#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use survey_tally::cache::{GenericCacheKey, SqliteResultCache};
use survey_tally::collection::{JsonCollection, RetryConfig, RetryingCollection};
use survey_tally::pipeline::{compute_with_inspection_file, ComputeEngine};
use survey_tally::request::ComputeRequest;
use survey_tally::stages::{AxisMode, StagePlan};

#[derive(Parser)]
#[command(name = "survey-tally", version, about = "Survey result aggregation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute one request against a JSON collection fixture
    Compute {
        /// Collection fixture (survey, questions, raw results, statistics)
        #[arg(long)]
        fixture: PathBuf,
        #[arg(long)]
        request: PathBuf,
        /// Write the response here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        cache: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        no_cache: bool,
        #[arg(long, default_value_t = false)]
        lock_cache: bool,
        /// JSONL file receiving intermediate artifacts
        #[arg(long)]
        inspect: Option<PathBuf>,
    },
    /// Print the cache key of a request
    CacheKey {
        #[arg(long)]
        survey_id: String,
        #[arg(long)]
        request: PathBuf,
    },
    /// Export SQLite cache to JSONL
    CacheExport {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Prune SQLite cache (by age and/or size)
    CachePrune {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        max_age_days: Option<u64>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
    /// List the post-processing stages in execution order
    Stages {
        #[arg(long, default_value_t = false)]
        faceted: bool,
        #[arg(long, default_value_t = false)]
        no_overall: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compute {
            fixture,
            request,
            out,
            cache,
            no_cache,
            lock_cache,
            inspect,
        } => {
            let req: ComputeRequest = read_json(&request)?;
            let collection = RetryingCollection::new(
                JsonCollection::from_path(&fixture)?,
                RetryConfig::default(),
            );
            let source = collection.inner();

            let cache = if no_cache {
                None
            } else {
                let path = cache.unwrap_or_else(SqliteResultCache::default_path);
                Some(SqliteResultCache::new(path)?)
            };
            let _lock = match (&cache, lock_cache) {
                (Some(cache), true) => Some(cache.lock_exclusive()?),
                _ => None,
            };

            let mut engine = ComputeEngine::new(
                source.survey(),
                source.questions(),
                &collection,
                source,
            )
            .with_enricher(source);
            if let Some(cache) = cache.as_ref() {
                engine = engine.with_cache(cache);
            }

            let response = compute_with_inspection_file(engine, inspect, &req).await?;
            match out {
                Some(path) => write_json(&path, &response)?,
                None => println!("{}", serde_json::to_string_pretty(&response)?),
            }
        }
        Commands::CacheKey { survey_id, request } => {
            let req: ComputeRequest = read_json(&request)?;
            let key = GenericCacheKey::new(&survey_id, &req)?;
            println!("{}", key.key_hash);
            println!("{}", key.description);
        }
        Commands::CacheExport { db, out } => {
            let path = db.unwrap_or_else(SqliteResultCache::default_path);
            let cache = SqliteResultCache::new(path)?;
            let rows = cache.export_jsonl(out).await?;
            eprintln!("exported {rows} rows");
        }
        Commands::CachePrune {
            db,
            max_age_days,
            max_rows,
        } => {
            if max_age_days.is_none() && max_rows.is_none() {
                return Err("cache-prune requires --max-age-days and/or --max-rows".into());
            }
            if matches!(max_rows, Some(0)) {
                return Err("--max-rows must be >= 1".into());
            }
            let path = db.unwrap_or_else(SqliteResultCache::default_path);
            let cache = SqliteResultCache::new(path)?;
            let _lock = cache.lock_exclusive()?;
            let stats = cache.prune(max_age_days, max_rows).await?;
            println!(
                "pruned {} rows; {} rows remain",
                stats.deleted, stats.remaining
            );
        }
        Commands::Stages {
            faceted,
            no_overall,
        } => {
            let mode = if faceted {
                AxisMode::Faceted
            } else {
                AxisMode::Single
            };
            let plan = StagePlan::standard(mode, !no_overall)?;
            for (i, stage) in plan.stages().iter().enumerate() {
                println!("{:>2}. {}", i + 1, stage.name());
            }
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
