//! In-memory [`GraphStore`] implementation for testing and small corpora.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity over all stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::{Document, DocumentChunk, DocumentStatus, Entity, Relationship};

use super::{ChunkMatch, GraphStore};

struct StoredVector {
    chunk_id: String,
    document_id: String,
    vector: Vec<f32>,
}

/// In-memory graph store.
#[derive(Default)]
pub struct InMemoryGraphStore {
    docs: RwLock<HashMap<String, Document>>,
    chunks: RwLock<Vec<DocumentChunk>>,
    vectors: RwLock<Vec<StoredVector>>,
    entities: RwLock<HashMap<String, Entity>>,
    relationships: RwLock<HashMap<String, Relationship>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn add_document(&self, doc: &Document) -> Result<()> {
        self.docs.write().unwrap().insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn update_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        if let Some(doc) = self.docs.write().unwrap().get_mut(id) {
            doc.status = status;
            doc.updated_at = chrono::Utc::now();
        }
        Ok(())
    }

    async fn add_chunk(&self, chunk: &DocumentChunk, vector: Option<&[f32]>) -> Result<()> {
        {
            let mut chunks = self.chunks.write().unwrap();
            chunks.retain(|c| c.id != chunk.id);
            chunks.push(chunk.clone());
        }
        if let Some(vec) = vector {
            let mut vectors = self.vectors.write().unwrap();
            vectors.retain(|v| v.chunk_id != chunk.id);
            vectors.push(StoredVector {
                chunk_id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                vector: vec.to_vec(),
            });
        }
        Ok(())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let mut chunks: Vec<DocumentChunk> = self
            .chunks
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.sequence_index);
        Ok(chunks)
    }

    async fn add_entity(&self, entity: &Entity) -> Result<()> {
        self.entities
            .write()
            .unwrap()
            .insert(entity.id.clone(), entity.clone());
        Ok(())
    }

    async fn add_relationship(&self, rel: &Relationship) -> Result<()> {
        self.relationships
            .write()
            .unwrap()
            .insert(rel.id.clone(), rel.clone());
        Ok(())
    }

    async fn get_entities(&self) -> Result<Vec<Entity>> {
        let mut entities: Vec<Entity> = self.entities.read().unwrap().values().cloned().collect();
        entities.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entities)
    }

    async fn get_relationships(&self) -> Result<Vec<Relationship>> {
        let mut rels: Vec<Relationship> = self
            .relationships
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect();
        rels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rels)
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        self.docs.write().unwrap().remove(id);
        self.chunks.write().unwrap().retain(|c| c.document_id != id);
        self.vectors
            .write()
            .unwrap()
            .retain(|v| v.document_id != id);

        let mut dropped_entities = Vec::new();
        {
            let mut entities = self.entities.write().unwrap();
            for entity in entities.values_mut() {
                entity.source_document_ids.remove(id);
            }
            entities.retain(|eid, e| {
                if e.source_document_ids.is_empty() {
                    dropped_entities.push(eid.clone());
                    false
                } else {
                    true
                }
            });
        }

        let mut relationships = self.relationships.write().unwrap();
        for rel in relationships.values_mut() {
            rel.source_document_ids.remove(id);
        }
        relationships.retain(|_, r| {
            !r.source_document_ids.is_empty()
                && !dropped_entities.contains(&r.source_entity_id)
                && !dropped_entities.contains(&r.target_entity_id)
        });

        Ok(())
    }

    async fn similar_chunks(&self, query: &[f32], limit: usize) -> Result<Vec<ChunkMatch>> {
        let vectors = self.vectors.read().unwrap();
        let chunks = self.chunks.read().unwrap();
        let mut matches: Vec<ChunkMatch> = vectors
            .iter()
            .map(|v| {
                let snippet = chunks
                    .iter()
                    .find(|c| c.id == v.chunk_id)
                    .map(|c| c.text.chars().take(240).collect::<String>())
                    .unwrap_or_default();
                ChunkMatch {
                    chunk_id: v.chunk_id.clone(),
                    document_id: v.document_id.clone(),
                    score: cosine_similarity(query, &v.vector) as f64,
                    snippet,
                }
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }
}
