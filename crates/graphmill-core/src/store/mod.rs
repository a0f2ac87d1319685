//! Storage abstraction for the knowledge graph.
//!
//! The [`GraphStore`] trait defines every operation the pipeline and query
//! surfaces need, enabling pluggable backends (SQLite, in-memory, future
//! remote stores). Each workspace/corpus gets its own isolated store
//! instance, handed to the orchestrator explicitly — there is no global
//! registry.
//!
//! Implementations must be `Send + Sync` to be shared across concurrent
//! document pipelines.

pub mod memory;

pub use memory::InMemoryGraphStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, DocumentChunk, DocumentStatus, Entity, Relationship};

/// A chunk returned from vector similarity search.
#[derive(Debug, Clone)]
pub struct ChunkMatch {
    pub chunk_id: String,
    pub document_id: String,
    /// Cosine similarity against the query vector.
    pub score: f64,
    /// Text excerpt for display.
    pub snippet: String,
}

/// Abstract graph storage backend.
///
/// All `add_*` operations are upserts keyed by the record's deterministic
/// ID. `delete_document` cascades: owned chunks and vectors are removed,
/// and entities/relationships lose that document from their provenance,
/// disappearing entirely once no document references them.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Insert or update a document.
    async fn add_document(&self, doc: &Document) -> Result<()>;

    /// Retrieve a document by ID.
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Advance a document's lifecycle status.
    async fn update_document_status(&self, id: &str, status: DocumentStatus) -> Result<()>;

    /// Insert or update a chunk, optionally with its embedding vector.
    async fn add_chunk(&self, chunk: &DocumentChunk, vector: Option<&[f32]>) -> Result<()>;

    /// All chunks of a document, ordered by sequence index.
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>>;

    /// Insert or update an entity.
    async fn add_entity(&self, entity: &Entity) -> Result<()>;

    /// Insert or update a relationship.
    async fn add_relationship(&self, rel: &Relationship) -> Result<()>;

    /// Snapshot of all entities in the corpus.
    async fn get_entities(&self) -> Result<Vec<Entity>>;

    /// Snapshot of all relationships in the corpus.
    async fn get_relationships(&self) -> Result<Vec<Relationship>>;

    /// Delete a document and cascade to everything it owns.
    async fn delete_document(&self, id: &str) -> Result<()>;

    /// Vector similarity search over chunk embeddings.
    async fn similar_chunks(&self, query: &[f32], limit: usize) -> Result<Vec<ChunkMatch>>;
}
