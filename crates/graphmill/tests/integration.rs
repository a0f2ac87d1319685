//! End-to-end pipeline tests over mock collaborators, plus SQLite store
//! round-trips against a temporary database.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use graphmill::db;
use graphmill::migrate;
use graphmill::pipeline::{PipelineConfig, PipelineOrchestrator};
use graphmill::sqlite_store::SqliteGraphStore;

use graphmill_core::chunk::ChunkingConfig;
use graphmill_core::models::{
    Document, DocumentChunk, DocumentMeta, DocumentStatus, Entity, Relationship, Stage,
};
use graphmill_core::store::{GraphStore, InMemoryGraphStore};
use graphmill_core::testing::{MockEmbedder, MockOracle};

fn doc(content: &str) -> Document {
    Document::new(content, DocumentMeta::default())
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        chunking: ChunkingConfig {
            max_chunk_size: 500,
            min_chunk_size: 10,
            overlap_size: 50,
        },
        ..PipelineConfig::default()
    }
}

fn orchestrator(
    store: Arc<dyn GraphStore>,
    oracle: Arc<MockOracle>,
    embedder: Arc<MockEmbedder>,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(store, oracle, embedder, test_config())
}

const ACME_PAYLOAD: &str = r#"{
    "entities": [
        {"name": "Acme", "type": "Organization", "description": "A tool maker.", "confidence": 0.9}
    ],
    "relationships": []
}"#;

const TWO_ENTITY_PAYLOAD: &str = r#"{
    "entities": [
        {"name": "Python", "type": "Technology", "description": "A language.", "confidence": 0.9},
        {"name": "Django", "type": "Technology", "description": "A web framework.", "confidence": 0.8}
    ],
    "relationships": [
        {"source": "Django", "target": "Python", "type": "built_with", "description": "Django is written in Python.", "weight": 0.9, "bidirectional": false, "confidence": 0.85}
    ]
}"#;

#[tokio::test]
async fn test_single_entity_document() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(MockOracle::new().with_default_response(ACME_PAYLOAD));
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle, embedder);

    let result = orch
        .process(doc("Acme builds developer tools for the modern enterprise."), &CancellationToken::new())
        .await;

    assert_eq!(result.status, DocumentStatus::Completed);
    assert_eq!(result.entities.len(), 1);
    assert!(result.relationships.is_empty());

    let entity = &result.entities[0];
    assert_eq!(entity.name, "Acme");
    assert_eq!(entity.id, "acme");
    assert!(entity.properties.contains_key("quality_score"));
    assert_eq!(entity.source_chunk_ids.len(), 1);

    // Persisted: document completed, chunk stored with its vector.
    let stored_doc = store.get_document(&result.document_id).await.unwrap().unwrap();
    assert_eq!(stored_doc.status, DocumentStatus::Completed);
    let chunks = store.get_chunks(&result.document_id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(entity.source_chunk_ids.contains(&chunks[0].id));
    let matches = store.similar_chunks(&[0.5; 8], 5).await.unwrap();
    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn test_relationship_extraction_and_persistence() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(MockOracle::new().with_default_response(TWO_ENTITY_PAYLOAD));
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle, embedder);

    let result = orch
        .process(doc("Django is a web framework written in Python."), &CancellationToken::new())
        .await;

    assert_eq!(result.status, DocumentStatus::Completed);
    assert_eq!(result.entities.len(), 2);
    assert_eq!(result.relationships.len(), 1);

    let rel = &result.relationships[0];
    assert_eq!(rel.source_entity_id, "django");
    assert_eq!(rel.target_entity_id, "python");
    assert_eq!(rel.rel_type, "built_with");
    assert!(rel.properties.contains_key("quality_score"));

    assert_eq!(store.get_relationships().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_extraction_cache_prevents_repeat_oracle_calls() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(MockOracle::new().with_default_response(ACME_PAYLOAD));
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle.clone(), embedder);

    let content = "Acme builds developer tools for the modern enterprise.";
    let first = orch.process(doc(content), &CancellationToken::new()).await;
    let calls_after_first = oracle.call_count();
    assert!(calls_after_first > 0);

    let second = orch.process(doc(content), &CancellationToken::new()).await;
    assert_eq!(oracle.call_count(), calls_after_first, "second run should be all cache hits");

    // Same entity, merged provenance across both documents.
    assert_eq!(second.entities.len(), 1);
    assert!(second.entities[0].source_document_ids.contains(&first.document_id));
    assert!(second.entities[0].source_document_ids.contains(&second.document_id));
    let entities = store.get_entities().await.unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].source_document_ids.len(), 2);
}

#[tokio::test]
async fn test_empty_document_fails_validation() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(MockOracle::new());
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle.clone(), embedder);

    let result = orch.process(doc("   \n  "), &CancellationToken::new()).await;

    assert_eq!(result.status, DocumentStatus::Failed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].stage, Stage::Validating);
    assert_eq!(oracle.call_count(), 0);
    // Nothing was persisted.
    assert!(store.get_document(&result.document_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_binary_content_fails_validation() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(MockOracle::new());
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store, oracle, embedder);

    let binary: String = "\u{0001}\u{0002}\u{0003}x".repeat(50);
    let result = orch.process(doc(&binary), &CancellationToken::new()).await;

    assert_eq!(result.status, DocumentStatus::Failed);
    assert!(result.errors[0].message.contains("binary"));
}

#[tokio::test]
async fn test_failed_oracle_degrades_not_fails() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(MockOracle::failing());
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle, embedder);

    let result = orch
        .process(doc("Perfectly good content that the oracle cannot handle."), &CancellationToken::new())
        .await;

    assert_eq!(result.status, DocumentStatus::Completed);
    assert!(result.entities.is_empty());
    assert!(result.errors.is_empty());
    assert!(!result.warnings.is_empty());
    // Chunks still persisted for retrieval.
    assert_eq!(store.get_chunks(&result.document_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_embedder_substitutes_zero_vector() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(MockOracle::new().with_default_response(ACME_PAYLOAD));
    let embedder = Arc::new(MockEmbedder::failing(8));
    let orch = orchestrator(store.clone(), oracle, embedder);

    let result = orch
        .process(doc("Acme builds developer tools for everyone."), &CancellationToken::new())
        .await;

    assert_eq!(result.status, DocumentStatus::Completed);
    assert!(result.warnings.iter().any(|w| w.contains("zero vector")));
}

#[tokio::test]
async fn test_cancellation_between_stages() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(MockOracle::new().with_default_response(ACME_PAYLOAD));
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle.clone(), embedder);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = orch.process(doc("Some valid content here."), &cancel).await;

    assert_eq!(result.status, DocumentStatus::Failed);
    assert!(result.errors[0].message.contains("cancelled"));
    assert_eq!(oracle.call_count(), 0);
    assert!(store.get_document(&result.document_id).await.unwrap().is_none());
}

/// Store wrapper whose entity writes always fail, for rollback tests.
struct FailingEntityStore {
    inner: InMemoryGraphStore,
}

#[async_trait]
impl GraphStore for FailingEntityStore {
    async fn add_document(&self, doc: &Document) -> Result<()> {
        self.inner.add_document(doc).await
    }
    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        self.inner.get_document(id).await
    }
    async fn update_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        self.inner.update_document_status(id, status).await
    }
    async fn add_chunk(&self, chunk: &DocumentChunk, vector: Option<&[f32]>) -> Result<()> {
        self.inner.add_chunk(chunk, vector).await
    }
    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        self.inner.get_chunks(document_id).await
    }
    async fn add_entity(&self, _entity: &Entity) -> Result<()> {
        anyhow::bail!("disk full")
    }
    async fn add_relationship(&self, rel: &Relationship) -> Result<()> {
        self.inner.add_relationship(rel).await
    }
    async fn get_entities(&self) -> Result<Vec<Entity>> {
        self.inner.get_entities().await
    }
    async fn get_relationships(&self) -> Result<Vec<Relationship>> {
        self.inner.get_relationships().await
    }
    async fn delete_document(&self, id: &str) -> Result<()> {
        self.inner.delete_document(id).await
    }
    async fn similar_chunks(
        &self,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<graphmill_core::store::ChunkMatch>> {
        self.inner.similar_chunks(query, limit).await
    }
}

#[tokio::test]
async fn test_persistence_error_rolls_back() {
    let store = Arc::new(FailingEntityStore {
        inner: InMemoryGraphStore::new(),
    });
    let oracle = Arc::new(MockOracle::new().with_default_response(ACME_PAYLOAD));
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle, embedder);

    let result = orch
        .process(doc("Acme builds developer tools for everyone."), &CancellationToken::new())
        .await;

    assert_eq!(result.status, DocumentStatus::Failed);
    assert_eq!(result.errors[0].stage, Stage::Persisting);
    // The partial writes (document, chunks) were rolled back.
    assert!(store.get_document(&result.document_id).await.unwrap().is_none());
    assert!(store.get_chunks(&result.document_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sqlite_store_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let pool = db::connect(&tmp.path().join("graph.sqlite")).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    // Idempotent.
    migrate::run_migrations(&pool).await.unwrap();
    let store = Arc::new(SqliteGraphStore::new(pool));

    let oracle = Arc::new(MockOracle::new().with_default_response(TWO_ENTITY_PAYLOAD));
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle, embedder);

    let result = orch
        .process(doc("Django is a web framework written in Python."), &CancellationToken::new())
        .await;
    assert_eq!(result.status, DocumentStatus::Completed);

    let entities = store.get_entities().await.unwrap();
    assert_eq!(entities.len(), 2);
    let python = entities.iter().find(|e| e.id == "python").unwrap();
    assert_eq!(python.name, "Python");
    assert!(python.properties.contains_key("quality_score"));
    assert!(python.source_document_ids.contains(&result.document_id));

    let relationships = store.get_relationships().await.unwrap();
    assert_eq!(relationships.len(), 1);
    assert_eq!(relationships[0].rel_type, "built_with");

    let chunks = store.get_chunks(&result.document_id).await.unwrap();
    assert_eq!(chunks.len(), 1);

    let matches = store.similar_chunks(&[0.5; 8], 5).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].document_id, result.document_id);

    // Cascade delete clears everything this document owned.
    store.delete_document(&result.document_id).await.unwrap();
    assert!(store.get_document(&result.document_id).await.unwrap().is_none());
    assert!(store.get_entities().await.unwrap().is_empty());
    assert!(store.get_relationships().await.unwrap().is_empty());
    assert!(store.similar_chunks(&[0.5; 8], 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_markdown_document_multi_chunk() {
    let store = Arc::new(InMemoryGraphStore::new());
    let oracle = Arc::new(
        MockOracle::new()
            .with_response("alpha section", ACME_PAYLOAD)
            .with_default_response(r#"{"entities": [], "relationships": []}"#),
    );
    let embedder = Arc::new(MockEmbedder::new(8));
    let orch = orchestrator(store.clone(), oracle, embedder);

    let content = format!(
        "# Alpha\nThe alpha section talks about Acme at length. {}\n# Beta\nThe beta section talks about something else entirely. {}",
        "alpha section filler. ".repeat(5),
        "beta filler. ".repeat(5)
    );
    let mut document = doc(&content);
    document.metadata.content_type = Some("markdown".to_string());

    let result = orch.process(document, &CancellationToken::new()).await;

    assert_eq!(result.status, DocumentStatus::Completed);
    let chunks = store.get_chunks(&result.document_id).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].heading.as_deref(), Some("Alpha"));
    assert_eq!(chunks[1].heading.as_deref(), Some("Beta"));
    // Only the alpha chunk produced an entity.
    assert_eq!(result.entities.len(), 1);
    assert_eq!(result.entities[0].source_chunk_ids.len(), 1);
    assert!(result.entities[0].source_chunk_ids.contains(&chunks[0].id));
}
