//! # Graphmill CLI (`gmill`)
//!
//! The `gmill` binary drives the extraction pipeline from the command line:
//! database initialization, document ingestion, graph inspection, vector
//! queries, and document deletion.
//!
//! ## Usage
//!
//! ```bash
//! gmill --config ./config/graphmill.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gmill init` | Create the SQLite database and run schema migrations |
//! | `gmill ingest <path>` | Process a file or directory through the pipeline |
//! | `gmill entities` | List extracted entities with quality scores |
//! | `gmill relationships` | List extracted relationships |
//! | `gmill query "<text>"` | Vector similarity search over chunk embeddings |
//! | `gmill delete <document-id>` | Delete a document (cascades) |
//! | `gmill stats` | Corpus counts |

mod config;
mod db;
mod embedding;
mod ingest;
mod migrate;
mod oracle;
mod pipeline;
mod sqlite_store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use graphmill_core::cache::{CacheConfig, EvictingCache};
use graphmill_core::embedding::normalize_for_embedding;
use graphmill_core::models::DocumentStatus;
use graphmill_core::store::GraphStore;

use crate::config::Config;
use crate::pipeline::{CacheSweeper, PipelineConfig, PipelineOrchestrator};

/// Graphmill — a document-to-knowledge-graph extraction pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/graphmill.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gmill",
    about = "Graphmill — a document-to-knowledge-graph extraction pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/graphmill.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a file or directory through the extraction pipeline.
    ///
    /// Directories are walked recursively; `ingest.include_globs` and
    /// `ingest.exclude_globs` in the config control which files qualify.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,
    },

    /// List entities in the graph, highest quality first.
    Entities {
        /// Only show entities at or above this quality score.
        #[arg(long)]
        min_quality: Option<f64>,
    },

    /// List relationships in the graph.
    Relationships,

    /// Vector similarity search over chunk embeddings.
    Query {
        /// Query text (embedded with the configured provider).
        query: String,

        /// Maximum number of results.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Delete a document and everything it owns.
    Delete {
        /// Document UUID.
        document_id: String,
    },

    /// Corpus counts.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Ingest { path } => run_ingest(&config, &path).await,
        Commands::Entities { min_quality } => run_entities(&config, min_quality).await,
        Commands::Relationships => run_relationships(&config).await,
        Commands::Query { query, limit } => run_query(&config, &query, limit).await,
        Commands::Delete { document_id } => run_delete(&config, &document_id).await,
        Commands::Stats => run_stats(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<sqlite_store::SqliteGraphStore>> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    Ok(Arc::new(sqlite_store::SqliteGraphStore::new(pool)))
}

fn build_orchestrator(config: &Config, store: Arc<dyn GraphStore>) -> Result<PipelineOrchestrator> {
    let oracle = crate::oracle::create_oracle(&config.extraction)?;
    let embedder = crate::embedding::create_embedder(&config.embedding)?;

    let extraction_cache = Arc::new(
        EvictingCache::new(CacheConfig {
            max_entries: config.cache.extraction_max_entries,
            max_age: chrono::Duration::seconds(config.cache.extraction_max_age_secs),
        })
        .with_size_estimator(|p: &graphmill_core::oracle::ExtractionPayload| {
            p.entities.len() * 96 + p.relationships.len() * 128
        }),
    );
    let embedding_cache = Arc::new(
        EvictingCache::new(CacheConfig {
            max_entries: config.cache.embedding_max_entries,
            max_age: chrono::Duration::seconds(config.cache.embedding_max_age_secs),
        })
        .with_size_estimator(|v: &Vec<f32>| v.len() * 4),
    );

    Ok(PipelineOrchestrator::with_caches(
        store,
        Arc::from(oracle),
        Arc::from(embedder),
        PipelineConfig::from_config(config),
        extraction_cache,
        embedding_cache,
    ))
}

async fn run_init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    pool.close().await;
    println!("initialized {}", config.db.path.display());
    println!("ok");
    Ok(())
}

async fn run_ingest(config: &Config, path: &std::path::Path) -> Result<()> {
    let store = open_store(config).await?;
    let orchestrator = build_orchestrator(config, store)?;

    let sweeper = CacheSweeper::start(
        orchestrator.extraction_cache(),
        orchestrator.embedding_cache(),
        Duration::from_secs(config.cache.sweep_interval_secs),
    );

    let cancel = CancellationToken::new();
    let results = ingest::ingest_path(&orchestrator, path, &config.ingest, &cancel).await?;
    sweeper.stop().await;

    let completed = results
        .iter()
        .filter(|r| r.status == DocumentStatus::Completed)
        .count();
    let failed = results.len() - completed;
    let entities: usize = results.iter().map(|r| r.entities.len()).sum();
    let relationships: usize = results.iter().map(|r| r.relationships.len()).sum();
    let warnings: usize = results.iter().map(|r| r.warnings.len()).sum();
    let elapsed: u64 = results.iter().map(|r| r.processing_time_ms).sum();

    println!("ingest {}", path.display());
    for result in &results {
        println!(
            "  {}  {}  {} entities, {} relationships ({} ms)",
            result.document_id,
            result.status.as_str(),
            result.entities.len(),
            result.relationships.len(),
            result.processing_time_ms
        );
        for error in &result.errors {
            println!("    error [{}] {}", error.stage, error.message);
        }
    }
    println!("  documents: {} completed, {} failed", completed, failed);
    println!("  entities: {}", entities);
    println!("  relationships: {}", relationships);
    println!("  warnings: {}", warnings);
    println!("  elapsed: {} ms", elapsed);
    let (extraction_metrics, _) = orchestrator.cache_metrics();
    println!(
        "  extraction cache: {} entries, {:.0}% hit rate",
        extraction_metrics.entries,
        extraction_metrics.hit_rate * 100.0
    );
    println!("ok");
    Ok(())
}

async fn run_entities(config: &Config, min_quality: Option<f64>) -> Result<()> {
    let store = open_store(config).await?;
    let mut entities = store.get_entities().await?;

    entities.sort_by(|a, b| {
        quality_of(&b.properties)
            .partial_cmp(&quality_of(&a.properties))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut shown = 0;
    for entity in &entities {
        let quality = quality_of(&entity.properties);
        if let Some(min) = min_quality {
            if quality < min {
                continue;
            }
        }
        println!(
            "{}  {} ({})  quality {:.2}  confidence {:.2}  docs {}",
            entity.id,
            entity.name,
            entity.entity_type,
            quality,
            entity.confidence,
            entity.source_document_ids.len()
        );
        shown += 1;
    }
    println!("{} entities", shown);
    Ok(())
}

async fn run_relationships(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let relationships = store.get_relationships().await?;
    for rel in &relationships {
        let arrow = if rel.bidirectional { "<->" } else { "->" };
        println!(
            "{} {} {} [{}]  weight {:.2}  confidence {:.2}",
            rel.source_entity_id, arrow, rel.target_entity_id, rel.rel_type, rel.weight, rel.confidence
        );
    }
    println!("{} relationships", relationships.len());
    Ok(())
}

async fn run_query(config: &Config, query: &str, limit: usize) -> Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!("embedding provider is disabled; configure [embedding] to use query");
    }
    let store = open_store(config).await?;
    let embedder = crate::embedding::create_embedder(&config.embedding)?;

    let normalized = normalize_for_embedding(query, config.embedding.max_chars);
    let vector = embedder.embed(&normalized).await?;
    let matches = store.similar_chunks(&vector, limit).await?;

    for m in &matches {
        println!("{:.3}  {}  {}", m.score, m.document_id, m.snippet.replace('\n', " "));
    }
    println!("{} results", matches.len());
    Ok(())
}

async fn run_delete(config: &Config, document_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    if store.get_document(document_id).await?.is_none() {
        anyhow::bail!("document not found: {}", document_id);
    }
    store.delete_document(document_id).await?;
    println!("deleted {}", document_id);
    println!("ok");
    Ok(())
}

async fn run_stats(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let entities = store.get_entities().await?;
    let relationships = store.get_relationships().await?;

    let quality_sum: f64 = entities.iter().map(|e| quality_of(&e.properties)).sum();
    let avg_quality = if entities.is_empty() {
        0.0
    } else {
        quality_sum / entities.len() as f64
    };

    println!("stats {}", config.db.path.display());
    println!("  entities: {}", entities.len());
    println!("  relationships: {}", relationships.len());
    println!("  avg entity quality: {:.2}", avg_quality);
    Ok(())
}

fn quality_of(properties: &serde_json::Map<String, serde_json::Value>) -> f64 {
    properties
        .get("quality_score")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}
