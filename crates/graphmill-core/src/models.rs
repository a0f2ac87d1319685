//! Core data models for Graphmill.
//!
//! These types represent the documents, chunks, entities, and relationships
//! that flow through the extraction pipeline, plus the stage log and result
//! types the orchestrator reports back to callers.
//!
//! Identifiers are deterministic wherever the pipeline depends on collision:
//! an entity's ID is the normalized form of its name (so two mentions of the
//! same name merge), a relationship's ID is a content hash of its endpoints
//! and type, and a chunk's ID is a content hash of its document, position,
//! and text (so re-chunking an unchanged document is idempotent).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Lifecycle of a document as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// Processing state of a single chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Pending,
    Completed,
    Error,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ChunkStatus::Pending),
            "completed" => Some(ChunkStatus::Completed),
            "error" => Some(ChunkStatus::Error),
            _ => None,
        }
    }
}

/// Caller-supplied metadata attached to a document at ingestion time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: Option<String>,
    pub filename: Option<String>,
    /// Content-type hint (e.g. `"markdown"`). The classifier may override it.
    pub content_type: Option<String>,
    pub size_bytes: usize,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A document submitted for extraction. `content` is immutable once created;
/// only `status` advances as the pipeline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: DocumentMeta,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a pending document with a fresh UUID. `metadata.size_bytes`
    /// is derived from the content.
    pub fn new(content: impl Into<String>, mut metadata: DocumentMeta) -> Self {
        let content = content.into();
        metadata.size_bytes = content.len();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            metadata,
            status: DocumentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A bounded slice of a document's text — the unit of extraction.
///
/// Offsets index into the original document content for markdown, code,
/// plain-text, and XML chunking; JSON chunking re-serializes values, so
/// there the offsets are cumulative positions in the emitted chunk stream.
/// In both cases `end_offset > start_offset` and offsets are monotonically
/// non-decreasing across a document's chunk list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub sequence_index: usize,
    /// Nearest preceding markdown heading, when chunking markdown.
    pub heading: Option<String>,
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub relationship_ids: Vec<String>,
    pub status: ChunkStatus,
}

impl DocumentChunk {
    pub fn new(
        document_id: &str,
        sequence_index: usize,
        text: impl Into<String>,
        start_offset: usize,
        end_offset: usize,
        heading: Option<String>,
    ) -> Self {
        let text = text.into();
        Self {
            id: chunk_id(document_id, sequence_index, &text),
            document_id: document_id.to_string(),
            text,
            start_offset,
            end_offset,
            sequence_index,
            heading,
            entity_ids: Vec::new(),
            relationship_ids: Vec::new(),
            status: ChunkStatus::Pending,
        }
    }
}

/// A typed node in the knowledge graph.
///
/// The ID is the normalized name (see [`normalize_entity_name`]), so two
/// extractions of the same name — from any document — collide intentionally.
/// That collision is the deduplication key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: String,
    pub description: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub source_document_ids: BTreeSet<String>,
    #[serde(default)]
    pub source_chunk_ids: BTreeSet<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub merged_from_ids: Vec<String>,
}

impl Entity {
    pub fn new(
        name: impl Into<String>,
        entity_type: impl Into<String>,
        description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: entity_id(&name),
            name,
            entity_type: entity_type.into(),
            description: description.into(),
            properties: serde_json::Map::new(),
            source_document_ids: BTreeSet::new(),
            source_chunk_ids: BTreeSet::new(),
            confidence: confidence.clamp(0.0, 1.0),
            created_at: now,
            updated_at: now,
            merged_from_ids: Vec::new(),
        }
    }

    /// Record where this entity was extracted from.
    pub fn add_provenance(&mut self, document_id: &str, chunk_id: &str) {
        self.source_document_ids.insert(document_id.to_string());
        self.source_chunk_ids.insert(chunk_id.to_string());
    }
}

/// A typed, weighted edge between two entities.
///
/// Identity is a stable hash of `(source, target, type)`, so the same
/// relationship extracted twice resolves to one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub rel_type: String,
    pub description: String,
    pub weight: f64,
    pub bidirectional: bool,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub source_document_ids: BTreeSet<String>,
    #[serde(default)]
    pub source_chunk_ids: BTreeSet<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        source_entity_id: impl Into<String>,
        target_entity_id: impl Into<String>,
        rel_type: impl Into<String>,
        description: impl Into<String>,
        weight: f64,
        bidirectional: bool,
        confidence: f64,
    ) -> Self {
        let source_entity_id = source_entity_id.into();
        let target_entity_id = target_entity_id.into();
        let rel_type = rel_type.into();
        let now = Utc::now();
        Self {
            id: relationship_id(&source_entity_id, &target_entity_id, &rel_type),
            source_entity_id,
            target_entity_id,
            rel_type,
            description: description.into(),
            weight: weight.clamp(0.0, 1.0),
            bidirectional,
            properties: serde_json::Map::new(),
            source_document_ids: BTreeSet::new(),
            source_chunk_ids: BTreeSet::new(),
            confidence: confidence.clamp(0.0, 1.0),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_provenance(&mut self, document_id: &str, chunk_id: &str) {
        self.source_document_ids.insert(document_id.to_string());
        self.source_chunk_ids.insert(chunk_id.to_string());
    }

    /// Recompute the identity hash after an endpoint was re-pointed.
    pub fn rekey(&mut self) {
        self.id = relationship_id(&self.source_entity_id, &self.target_entity_id, &self.rel_type);
    }
}

/// Normalize an entity name into its canonical dedup key: lowercase,
/// whitespace collapsed to underscores, all other non-alphanumerics removed.
pub fn normalize_entity_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_sep = false;
        } else if ch.is_whitespace() && !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Deterministic entity ID: the normalized name itself.
pub fn entity_id(name: &str) -> String {
    normalize_entity_name(name)
}

/// Deterministic relationship ID: SHA-256 over `(source, target, type)`.
pub fn relationship_id(source_entity_id: &str, target_entity_id: &str, rel_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_entity_id.as_bytes());
    hasher.update(b"|");
    hasher.update(target_entity_id.as_bytes());
    hasher.update(b"|");
    hasher.update(rel_type.to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Deterministic chunk ID: SHA-256 over `(document_id, index, text)`.
pub fn chunk_id(document_id: &str, sequence_index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(sequence_index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Validating,
    Chunking,
    Extracting,
    Scoring,
    Deduplicating,
    Persisting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validating => "validating",
            Stage::Chunking => "chunking",
            Stage::Extracting => "extracting",
            Stage::Scoring => "scoring",
            Stage::Deduplicating => "deduplicating",
            Stage::Persisting => "persisting",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single stage transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Started,
    Completed,
    Error,
}

/// One timestamped entry in a pipeline run's stage log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLogEntry {
    pub stage: Stage,
    pub status: StageStatus,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// An error surfaced to the caller, attributed to the stage it arose in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Structured result of processing one document through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub document_id: String,
    pub status: DocumentStatus,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub warnings: Vec<String>,
    pub errors: Vec<StageError>,
    pub processing_time_ms: u64,
    pub log: Vec<StageLogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_entity_name() {
        assert_eq!(normalize_entity_name("Python"), "python");
        assert_eq!(normalize_entity_name("  Apache Kafka  "), "apache_kafka");
        assert_eq!(normalize_entity_name("C++ (language)"), "c_language");
        assert_eq!(normalize_entity_name("a  b"), "a_b");
        assert_eq!(normalize_entity_name(""), "");
    }

    #[test]
    fn test_entity_id_collides_on_case() {
        assert_eq!(entity_id("Python"), entity_id("python"));
        assert_eq!(entity_id("Apache Kafka"), entity_id("apache KAFKA"));
    }

    #[test]
    fn test_relationship_id_stable() {
        let a = relationship_id("python", "django", "uses");
        let b = relationship_id("python", "django", "USES");
        let c = relationship_id("django", "python", "uses");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_chunk_id_deterministic() {
        let a = chunk_id("doc1", 0, "hello");
        let b = chunk_id("doc1", 0, "hello");
        let c = chunk_id("doc1", 1, "hello");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_entity_confidence_clamped() {
        let e = Entity::new("X", "Concept", "", 1.7);
        assert_eq!(e.confidence, 1.0);
        let e = Entity::new("X", "Concept", "", -0.3);
        assert_eq!(e.confidence, 0.0);
    }

    #[test]
    fn test_document_size_bytes_derived() {
        let doc = Document::new("hello", DocumentMeta::default());
        assert_eq!(doc.metadata.size_bytes, 5);
        assert_eq!(doc.status, DocumentStatus::Pending);
    }
}
