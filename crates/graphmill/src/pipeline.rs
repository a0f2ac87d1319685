//! Pipeline orchestration.
//!
//! Drives a document through the full extraction flow:
//!
//! ```text
//! Pending → Validating → Chunking → Extracting → Scoring
//!         → Deduplicating → Persisting → Completed
//! ```
//!
//! `Failed` is reachable from any stage. Every transition is recorded in a
//! timestamped stage log. Extraction runs in batches, each chunk going
//! through the shared evicting cache first; oracle failures degrade the
//! affected chunk (it contributes nothing) instead of failing the document.
//! Persistence is all-or-nothing at the document level: nothing is written
//! until every earlier stage succeeded, and a failed write triggers a
//! best-effort cascading delete before the document is marked `Failed`.
//!
//! Cancellation is honored between stages, never mid-stage.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use graphmill_core::cache::{content_key, CacheConfig, CacheMetrics, EvictingCache};
use graphmill_core::chunk::{chunk_document, ChunkingConfig};
use graphmill_core::classify::{classify, ContentType};
use graphmill_core::dedup::DeduplicationEngine;
use graphmill_core::embedding::{normalize_for_embedding, zero_vector, Embedder};
use graphmill_core::error::PipelineError;
use graphmill_core::models::{
    entity_id, normalize_entity_name, ChunkStatus, Document, DocumentChunk, DocumentStatus,
    Entity, ProcessingResult, Relationship, Stage, StageError, StageLogEntry, StageStatus,
};
use graphmill_core::oracle::{
    parse_extraction_payload, ExtractionOracle, ExtractionPayload, OracleRequest,
};
use graphmill_core::score::{score_chunk, score_entity, score_relationship, ScoreContext, ScoringWeights};
use graphmill_core::store::GraphStore;

use crate::config::Config;
use crate::oracle::build_extraction_prompt;

/// Pipeline-relevant settings, extracted from the application config.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunking: ChunkingConfig,
    pub batch_size: usize,
    pub entity_types: Vec<String>,
    pub max_document_bytes: usize,
    pub weights: ScoringWeights,
    pub embedding_max_chars: usize,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: config.chunking.clone(),
            batch_size: config.extraction.batch_size,
            entity_types: config.extraction.entity_types.clone(),
            max_document_bytes: config.extraction.max_document_bytes,
            weights: config.scoring.clone(),
            embedding_max_chars: config.embedding.max_chars,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            batch_size: 5,
            entity_types: vec![
                "Person".to_string(),
                "Organization".to_string(),
                "Location".to_string(),
                "Technology".to_string(),
                "Concept".to_string(),
            ],
            max_document_bytes: 2_000_000,
            weights: ScoringWeights::default(),
            embedding_max_chars: 8000,
        }
    }
}

/// How much of the document feeds the relevance scorer as context.
const SCORING_CONTEXT_CHARS: usize = 4000;

enum ChunkExtraction {
    Cached(ExtractionPayload),
    Fresh(ExtractionPayload),
    Degraded(String),
}

/// Orchestrates document processing against injected collaborators.
///
/// The store, oracle, and embedder are handed in explicitly — one store per
/// corpus, no global registry. The caches are shared across all documents
/// this orchestrator processes and are safe for concurrent pipelines.
pub struct PipelineOrchestrator {
    store: Arc<dyn GraphStore>,
    oracle: Arc<dyn ExtractionOracle>,
    embedder: Arc<dyn Embedder>,
    extraction_cache: Arc<EvictingCache<ExtractionPayload>>,
    embedding_cache: Arc<EvictingCache<Vec<f32>>>,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn GraphStore>,
        oracle: Arc<dyn ExtractionOracle>,
        embedder: Arc<dyn Embedder>,
        config: PipelineConfig,
    ) -> Self {
        let extraction_cache = Arc::new(
            EvictingCache::new(CacheConfig::extraction())
                .with_size_estimator(payload_size),
        );
        let embedding_cache = Arc::new(
            EvictingCache::new(CacheConfig::embedding()).with_size_estimator(|v: &Vec<f32>| v.len() * 4),
        );
        Self::with_caches(store, oracle, embedder, config, extraction_cache, embedding_cache)
    }

    /// Construct with externally owned caches (shared sweeping, tests).
    pub fn with_caches(
        store: Arc<dyn GraphStore>,
        oracle: Arc<dyn ExtractionOracle>,
        embedder: Arc<dyn Embedder>,
        config: PipelineConfig,
        extraction_cache: Arc<EvictingCache<ExtractionPayload>>,
        embedding_cache: Arc<EvictingCache<Vec<f32>>>,
    ) -> Self {
        Self {
            store,
            oracle,
            embedder,
            extraction_cache,
            embedding_cache,
            config,
        }
    }

    pub fn extraction_cache(&self) -> Arc<EvictingCache<ExtractionPayload>> {
        self.extraction_cache.clone()
    }

    pub fn embedding_cache(&self) -> Arc<EvictingCache<Vec<f32>>> {
        self.embedding_cache.clone()
    }

    pub fn cache_metrics(&self) -> (CacheMetrics, CacheMetrics) {
        (self.extraction_cache.metrics(), self.embedding_cache.metrics())
    }

    /// Process one document through the full pipeline.
    pub async fn process(&self, mut doc: Document, cancel: &CancellationToken) -> ProcessingResult {
        let started = Instant::now();
        let mut log: Vec<StageLogEntry> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut errors: Vec<StageError> = Vec::new();

        doc.status = DocumentStatus::Processing;
        info!(document_id = %doc.id, "processing document");

        // ── Validating ──────────────────────────────────────────────
        stage(&mut log, Stage::Validating, StageStatus::Started, None);
        if let Err(e) = self.validate(&doc) {
            return self.abort(doc, Stage::Validating, e.to_string(), started, log, warnings, errors);
        }
        stage(
            &mut log,
            Stage::Validating,
            StageStatus::Completed,
            Some(format!("{} bytes", doc.content.len())),
        );

        // ── Chunking ────────────────────────────────────────────────
        stage(&mut log, Stage::Chunking, StageStatus::Started, None);
        let content_type = doc
            .metadata
            .content_type
            .as_deref()
            .and_then(ContentType::parse)
            .unwrap_or_else(|| classify(&doc));
        let outcome = chunk_document(&doc, content_type, &self.config.chunking);
        warnings.extend(outcome.warnings);
        let mut chunks = outcome.chunks;
        stage(
            &mut log,
            Stage::Chunking,
            StageStatus::Completed,
            Some(format!(
                "{} chunk(s) as {}, avg {} bytes",
                outcome.stats.count, content_type, outcome.stats.avg_size
            )),
        );

        if cancel.is_cancelled() {
            return self.abort(doc, Stage::Extracting, PipelineError::Cancelled.to_string(), started, log, warnings, errors);
        }

        // ── Extracting ──────────────────────────────────────────────
        stage(&mut log, Stage::Extracting, StageStatus::Started, None);
        let existing_entities = match self.store.get_entities().await {
            Ok(v) => v,
            Err(e) => {
                return self.abort(doc, Stage::Extracting, format!("failed to load graph snapshot: {}", e), started, log, warnings, errors)
            }
        };
        let existing_relationships = match self.store.get_relationships().await {
            Ok(v) => v,
            Err(e) => {
                return self.abort(doc, Stage::Extracting, format!("failed to load graph snapshot: {}", e), started, log, warnings, errors)
            }
        };

        // Batched extraction. Accumulation is append-only and
        // order-independent; the final sort restores chunk order.
        let mut extractions: Vec<(usize, ExtractionPayload, Option<String>)> = Vec::new();
        let mut cache_hits = 0usize;
        let batch_size = self.config.batch_size.max(1);
        for batch_start in (0..chunks.len()).step_by(batch_size) {
            let batch_end = (batch_start + batch_size).min(chunks.len());
            let futures: Vec<_> = (batch_start..batch_end)
                .map(|i| {
                    let chunk = &chunks[i];
                    let context = existing_entities.as_slice();
                    async move { (i, self.extract_chunk(chunk, context).await) }
                })
                .collect();
            for (i, extraction) in join_all(futures).await {
                match extraction {
                    ChunkExtraction::Cached(payload) => {
                        cache_hits += 1;
                        extractions.push((i, payload, None));
                    }
                    ChunkExtraction::Fresh(payload) => extractions.push((i, payload, None)),
                    ChunkExtraction::Degraded(message) => {
                        extractions.push((i, ExtractionPayload::empty(), Some(message)))
                    }
                }
            }
        }
        extractions.sort_by_key(|(i, _, _)| *i);

        let mut entities: Vec<Entity> = Vec::new();
        let mut relationships: Vec<Relationship> = Vec::new();
        for (i, payload, degraded) in extractions {
            let chunk = &mut chunks[i];
            if let Some(message) = degraded {
                warnings.push(message);
                chunk.status = ChunkStatus::Error;
                continue;
            }
            collect_chunk_results(
                &doc.id,
                chunk,
                payload,
                &mut entities,
                &mut relationships,
                &mut warnings,
            );
        }
        stage(
            &mut log,
            Stage::Extracting,
            StageStatus::Completed,
            Some(format!(
                "{} entities, {} relationships from {} chunk(s) ({} cache hit(s))",
                entities.len(),
                relationships.len(),
                chunks.len(),
                cache_hits
            )),
        );

        if cancel.is_cancelled() {
            return self.abort(doc, Stage::Scoring, PipelineError::Cancelled.to_string(), started, log, warnings, errors);
        }

        // ── Scoring ─────────────────────────────────────────────────
        stage(&mut log, Stage::Scoring, StageStatus::Started, None);
        let context_text: String = doc.content.chars().take(SCORING_CONTEXT_CHARS).collect();
        let peers = entities.clone();
        let ctx = ScoreContext {
            document_text: Some(&context_text),
            peer_entities: &peers,
        };
        let mut entity_quality_total = 0.0;
        for entity in &mut entities {
            let analysis = score_entity(entity, &self.config.weights.entity, &ctx);
            entity_quality_total += analysis.score;
            annotate(&mut entity.properties, analysis.score, analysis.category.as_str());
        }
        for rel in &mut relationships {
            let analysis = score_relationship(rel, &self.config.weights.relationship, &ctx);
            annotate(&mut rel.properties, analysis.score, analysis.category.as_str());
        }
        let chunk_quality_avg = if chunks.is_empty() {
            0.0
        } else {
            chunks
                .iter()
                .map(|c| score_chunk(c, &self.config.weights.chunk, &ctx).score)
                .sum::<f64>()
                / chunks.len() as f64
        };
        let entity_quality_avg = if entities.is_empty() {
            0.0
        } else {
            entity_quality_total / entities.len() as f64
        };
        stage(
            &mut log,
            Stage::Scoring,
            StageStatus::Completed,
            Some(format!(
                "avg entity quality {:.2}, avg chunk quality {:.2}",
                entity_quality_avg, chunk_quality_avg
            )),
        );

        // ── Deduplicating ───────────────────────────────────────────
        stage(&mut log, Stage::Deduplicating, StageStatus::Started, None);
        let engine = DeduplicationEngine::new(existing_entities, existing_relationships);
        let dedup = engine.deduplicate(entities, relationships);
        warnings.extend(dedup.warnings);
        let entities = dedup.entities;
        let relationships = dedup.relationships;
        stage(
            &mut log,
            Stage::Deduplicating,
            StageStatus::Completed,
            Some(format!("{} merge(s)", dedup.merged_count)),
        );

        if cancel.is_cancelled() {
            return self.abort(doc, Stage::Persisting, PipelineError::Cancelled.to_string(), started, log, warnings, errors);
        }

        // ── Persisting ──────────────────────────────────────────────
        stage(&mut log, Stage::Persisting, StageStatus::Started, None);
        match self.persist(&doc, &chunks, &entities, &relationships).await {
            Ok(embed_warnings) => {
                warnings.extend(embed_warnings);
                doc.status = DocumentStatus::Completed;
                stage(
                    &mut log,
                    Stage::Persisting,
                    StageStatus::Completed,
                    Some(format!(
                        "{} chunk(s), {} entities, {} relationships",
                        chunks.len(),
                        entities.len(),
                        relationships.len()
                    )),
                );
            }
            Err(e) => {
                let message = PipelineError::Persistence(e.into()).to_string();
                stage(&mut log, Stage::Persisting, StageStatus::Error, Some(message.clone()));
                errors.push(StageError {
                    stage: Stage::Persisting,
                    message,
                });
                // Roll back whatever the store committed for this document.
                if let Err(cleanup) = self.store.delete_document(&doc.id).await {
                    warnings.push(format!("cleanup after failed persist also failed: {}", cleanup));
                }
                doc.status = DocumentStatus::Failed;
            }
        }

        let status = doc.status;
        let result = ProcessingResult {
            document_id: doc.id,
            status,
            entities,
            relationships,
            warnings,
            errors,
            processing_time_ms: started.elapsed().as_millis() as u64,
            log,
        };
        info!(
            document_id = %result.document_id,
            status = result.status.as_str(),
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            elapsed_ms = result.processing_time_ms,
            "pipeline finished"
        );
        result
    }

    fn validate(&self, doc: &Document) -> Result<(), PipelineError> {
        if doc.content.trim().is_empty() {
            return Err(PipelineError::Validation {
                reason: "document content is empty".to_string(),
            });
        }
        if doc.content.len() > self.config.max_document_bytes {
            return Err(PipelineError::Validation {
                reason: format!(
                    "document too large ({} > {} bytes)",
                    doc.content.len(),
                    self.config.max_document_bytes
                ),
            });
        }
        // Binary sniff: control bytes other than tab/newline/CR.
        let non_printable = doc
            .content
            .bytes()
            .filter(|b| matches!(b, 0..=8 | 11 | 12 | 14..=31 | 127))
            .count();
        if non_printable * 10 > doc.content.len() * 3 {
            return Err(PipelineError::Validation {
                reason: format!(
                    "binary content detected ({}% non-printable)",
                    non_printable * 100 / doc.content.len()
                ),
            });
        }
        Ok(())
    }

    async fn extract_chunk(&self, chunk: &DocumentChunk, context: &[Entity]) -> ChunkExtraction {
        let key = content_key(&chunk.text);
        if let Some(payload) = self.extraction_cache.get(&key) {
            debug!(chunk = chunk.sequence_index, "extraction cache hit");
            return ChunkExtraction::Cached(payload);
        }

        let prompt = build_extraction_prompt(&chunk.text, &self.config.entity_types, context);
        match self.oracle.extract(&OracleRequest { prompt }).await {
            Ok(raw) => match parse_extraction_payload(&raw) {
                Ok(payload) => {
                    self.extraction_cache.set(key, payload.clone());
                    ChunkExtraction::Fresh(payload)
                }
                Err(e) => ChunkExtraction::Degraded(format!(
                    "chunk {}: {}",
                    chunk.sequence_index, e
                )),
            },
            Err(e) => {
                ChunkExtraction::Degraded(format!("chunk {}: {}", chunk.sequence_index, e))
            }
        }
    }

    async fn persist(
        &self,
        doc: &Document,
        chunks: &[DocumentChunk],
        entities: &[Entity],
        relationships: &[Relationship],
    ) -> anyhow::Result<Vec<String>> {
        let mut embed_warnings = Vec::new();

        self.store.add_document(doc).await?;
        for chunk in chunks {
            let vector = self.embed_chunk(&chunk.text, &mut embed_warnings).await;
            self.store.add_chunk(chunk, Some(&vector)).await?;
        }
        for entity in entities {
            self.store.add_entity(entity).await?;
        }
        for rel in relationships {
            self.store.add_relationship(rel).await?;
        }
        self.store
            .update_document_status(&doc.id, DocumentStatus::Completed)
            .await?;

        Ok(embed_warnings)
    }

    async fn embed_chunk(&self, text: &str, warnings: &mut Vec<String>) -> Vec<f32> {
        let normalized = normalize_for_embedding(text, self.config.embedding_max_chars);
        let key = content_key(&normalized);
        if let Some(vector) = self.embedding_cache.get(&key) {
            return vector;
        }
        match self.embedder.embed(&normalized).await {
            Ok(vector) => {
                self.embedding_cache.set(key, vector.clone());
                vector
            }
            Err(e) => {
                warnings.push(format!("embedding failed, zero vector substituted: {}", e));
                zero_vector(self.embedder.dims())
            }
        }
    }

    /// Terminal failure before anything was persisted.
    #[allow(clippy::too_many_arguments)]
    fn abort(
        &self,
        doc: Document,
        at: Stage,
        message: String,
        started: Instant,
        mut log: Vec<StageLogEntry>,
        warnings: Vec<String>,
        mut errors: Vec<StageError>,
    ) -> ProcessingResult {
        warn!(document_id = %doc.id, stage = at.as_str(), %message, "pipeline failed");
        stage(&mut log, at, StageStatus::Error, Some(message.clone()));
        errors.push(StageError { stage: at, message });
        ProcessingResult {
            document_id: doc.id,
            status: DocumentStatus::Failed,
            entities: Vec::new(),
            relationships: Vec::new(),
            warnings,
            errors,
            processing_time_ms: started.elapsed().as_millis() as u64,
            log,
        }
    }
}

/// Turn one chunk's payload into typed entities/relationships with
/// provenance, enforcing the two-entity rule for relationships.
fn collect_chunk_results(
    document_id: &str,
    chunk: &mut DocumentChunk,
    payload: ExtractionPayload,
    entities: &mut Vec<Entity>,
    relationships: &mut Vec<Relationship>,
    warnings: &mut Vec<String>,
) {
    let mut chunk_entity_ids = Vec::new();
    for raw in payload.entities {
        if normalize_entity_name(&raw.name).is_empty() {
            warnings.push(format!(
                "chunk {}: entity with empty name skipped",
                chunk.sequence_index
            ));
            continue;
        }
        let entity_type = if raw.entity_type.is_empty() {
            "Concept".to_string()
        } else {
            raw.entity_type
        };
        let mut entity = Entity::new(raw.name, entity_type, raw.description, raw.confidence);
        entity.add_provenance(document_id, &chunk.id);
        chunk_entity_ids.push(entity.id.clone());
        entities.push(entity);
    }

    if chunk_entity_ids.len() >= 2 {
        for raw in payload.relationships {
            let rel_type = if raw.rel_type.is_empty() {
                "related_to".to_string()
            } else {
                raw.rel_type
            };
            let mut rel = Relationship::new(
                entity_id(&raw.source),
                entity_id(&raw.target),
                rel_type,
                raw.description,
                raw.weight,
                raw.bidirectional,
                raw.confidence,
            );
            rel.add_provenance(document_id, &chunk.id);
            chunk.relationship_ids.push(rel.id.clone());
            relationships.push(rel);
        }
    } else if !payload.relationships.is_empty() {
        warnings.push(format!(
            "chunk {}: {} relationship(s) dropped (fewer than two entities extracted)",
            chunk.sequence_index,
            payload.relationships.len()
        ));
    }

    chunk.entity_ids = chunk_entity_ids;
    chunk.status = ChunkStatus::Completed;
}

fn annotate(
    properties: &mut serde_json::Map<String, serde_json::Value>,
    score: f64,
    category: &str,
) {
    if let Some(number) = serde_json::Number::from_f64((score * 1000.0).round() / 1000.0) {
        properties.insert("quality_score".to_string(), serde_json::Value::Number(number));
    }
    properties.insert(
        "quality_category".to_string(),
        serde_json::Value::String(category.to_string()),
    );
}

fn stage(log: &mut Vec<StageLogEntry>, at: Stage, status: StageStatus, detail: Option<String>) {
    debug!(stage = at.as_str(), status = ?status, detail = detail.as_deref().unwrap_or(""), "stage transition");
    log.push(StageLogEntry {
        stage: at,
        status,
        at: Utc::now(),
        detail,
    });
}

fn payload_size(payload: &ExtractionPayload) -> usize {
    payload.entities.len() * 96 + payload.relationships.len() * 128
}

/// Periodic cache sweeper with an explicit, controllable lifecycle.
///
/// Runs [`EvictingCache::sweep`] on both pipeline caches at a fixed
/// interval, independent of any in-flight document.
pub struct CacheSweeper {
    handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
}

impl CacheSweeper {
    pub fn start(
        extraction_cache: Arc<EvictingCache<ExtractionPayload>>,
        embedding_cache: Arc<EvictingCache<Vec<f32>>>,
        every: std::time::Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = extraction_cache.sweep() + embedding_cache.sweep();
                        if removed > 0 {
                            debug!(removed, "cache sweep removed expired entries");
                        }
                    }
                }
            }
        });
        Self { handle, cancel }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}
