//! SQLite-backed [`GraphStore`] implementation.
//!
//! Provenance sets and property maps are stored as JSON text columns;
//! embedding vectors are little-endian f32 BLOBs. Vector search is
//! brute-force cosine similarity computed in Rust over all stored vectors.
//! Each corpus gets its own database file.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use graphmill_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use graphmill_core::models::{
    ChunkStatus, Document, DocumentChunk, DocumentMeta, DocumentStatus, Entity, Relationship,
};
use graphmill_core::store::{ChunkMatch, GraphStore};

/// SQLite implementation of the [`GraphStore`] trait.
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn from_json<T: serde::de::DeserializeOwned + Default>(text: &str) -> T {
    serde_json::from_str(text).unwrap_or_default()
}

fn ts_to_datetime(ts: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts, 0).unwrap_or_else(chrono::Utc::now)
}

fn row_to_entity(row: &sqlx::sqlite::SqliteRow) -> Entity {
    let properties_json: String = row.get("properties_json");
    let doc_ids_json: String = row.get("source_document_ids_json");
    let chunk_ids_json: String = row.get("source_chunk_ids_json");
    let merged_json: String = row.get("merged_from_json");
    Entity {
        id: row.get("id"),
        name: row.get("name"),
        entity_type: row.get("entity_type"),
        description: row.get("description"),
        properties: from_json(&properties_json),
        source_document_ids: from_json(&doc_ids_json),
        source_chunk_ids: from_json(&chunk_ids_json),
        confidence: row.get("confidence"),
        created_at: ts_to_datetime(row.get("created_at")),
        updated_at: ts_to_datetime(row.get("updated_at")),
        merged_from_ids: from_json(&merged_json),
    }
}

fn row_to_relationship(row: &sqlx::sqlite::SqliteRow) -> Relationship {
    let properties_json: String = row.get("properties_json");
    let doc_ids_json: String = row.get("source_document_ids_json");
    let chunk_ids_json: String = row.get("source_chunk_ids_json");
    Relationship {
        id: row.get("id"),
        source_entity_id: row.get("source_entity_id"),
        target_entity_id: row.get("target_entity_id"),
        rel_type: row.get("rel_type"),
        description: row.get("description"),
        weight: row.get("weight"),
        bidirectional: row.get::<i64, _>("bidirectional") != 0,
        properties: from_json(&properties_json),
        source_document_ids: from_json(&doc_ids_json),
        source_chunk_ids: from_json(&chunk_ids_json),
        confidence: row.get("confidence"),
        created_at: ts_to_datetime(row.get("created_at")),
        updated_at: ts_to_datetime(row.get("updated_at")),
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn add_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, filename, content_type, size_bytes, tags_json,
                                   content, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                filename = excluded.filename,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                tags_json = excluded.tags_json,
                content = excluded.content,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.metadata.title)
        .bind(&doc.metadata.filename)
        .bind(&doc.metadata.content_type)
        .bind(doc.metadata.size_bytes as i64)
        .bind(to_json(&doc.metadata.tags))
        .bind(&doc.content)
        .bind(doc.status.as_str())
        .bind(doc.created_at.timestamp())
        .bind(doc.updated_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            let status: String = row.get("status");
            let tags_json: String = row.get("tags_json");
            Document {
                id: row.get("id"),
                content: row.get("content"),
                metadata: DocumentMeta {
                    title: row.get("title"),
                    filename: row.get("filename"),
                    content_type: row.get("content_type"),
                    size_bytes: row.get::<i64, _>("size_bytes") as usize,
                    tags: from_json(&tags_json),
                },
                status: DocumentStatus::parse(&status).unwrap_or(DocumentStatus::Pending),
                created_at: ts_to_datetime(row.get("created_at")),
                updated_at: ts_to_datetime(row.get("updated_at")),
            }
        }))
    }

    async fn update_document_status(&self, id: &str, status: DocumentStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_chunk(&self, chunk: &DocumentChunk, vector: Option<&[f32]>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, sequence_index, text, start_offset, end_offset,
                                heading, status, entity_ids_json, relationship_ids_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                start_offset = excluded.start_offset,
                end_offset = excluded.end_offset,
                heading = excluded.heading,
                status = excluded.status,
                entity_ids_json = excluded.entity_ids_json,
                relationship_ids_json = excluded.relationship_ids_json
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.sequence_index as i64)
        .bind(&chunk.text)
        .bind(chunk.start_offset as i64)
        .bind(chunk.end_offset as i64)
        .bind(&chunk.heading)
        .bind(chunk.status.as_str())
        .bind(to_json(&chunk.entity_ids))
        .bind(to_json(&chunk.relationship_ids))
        .execute(&mut *tx)
        .await?;

        if let Some(vec) = vector {
            let blob = vec_to_blob(vec);
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, embedding)
                VALUES (?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE document_id = ? ORDER BY sequence_index ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let status: String = row.get("status");
                let entity_ids_json: String = row.get("entity_ids_json");
                let relationship_ids_json: String = row.get("relationship_ids_json");
                DocumentChunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    text: row.get("text"),
                    start_offset: row.get::<i64, _>("start_offset") as usize,
                    end_offset: row.get::<i64, _>("end_offset") as usize,
                    sequence_index: row.get::<i64, _>("sequence_index") as usize,
                    heading: row.get("heading"),
                    entity_ids: from_json(&entity_ids_json),
                    relationship_ids: from_json(&relationship_ids_json),
                    status: ChunkStatus::parse(&status).unwrap_or(ChunkStatus::Pending),
                }
            })
            .collect())
    }

    async fn add_entity(&self, entity: &Entity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entities (id, name, entity_type, description, properties_json,
                                  source_document_ids_json, source_chunk_ids_json,
                                  confidence, created_at, updated_at, merged_from_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                entity_type = excluded.entity_type,
                description = excluded.description,
                properties_json = excluded.properties_json,
                source_document_ids_json = excluded.source_document_ids_json,
                source_chunk_ids_json = excluded.source_chunk_ids_json,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at,
                merged_from_json = excluded.merged_from_json
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.name)
        .bind(&entity.entity_type)
        .bind(&entity.description)
        .bind(to_json(&entity.properties))
        .bind(to_json(&entity.source_document_ids))
        .bind(to_json(&entity.source_chunk_ids))
        .bind(entity.confidence)
        .bind(entity.created_at.timestamp())
        .bind(entity.updated_at.timestamp())
        .bind(to_json(&entity.merged_from_ids))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn add_relationship(&self, rel: &Relationship) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO relationships (id, source_entity_id, target_entity_id, rel_type,
                                       description, weight, bidirectional, properties_json,
                                       source_document_ids_json, source_chunk_ids_json,
                                       confidence, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                description = excluded.description,
                weight = excluded.weight,
                bidirectional = excluded.bidirectional,
                properties_json = excluded.properties_json,
                source_document_ids_json = excluded.source_document_ids_json,
                source_chunk_ids_json = excluded.source_chunk_ids_json,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rel.id)
        .bind(&rel.source_entity_id)
        .bind(&rel.target_entity_id)
        .bind(&rel.rel_type)
        .bind(&rel.description)
        .bind(rel.weight)
        .bind(rel.bidirectional as i64)
        .bind(to_json(&rel.properties))
        .bind(to_json(&rel.source_document_ids))
        .bind(to_json(&rel.source_chunk_ids))
        .bind(rel.confidence)
        .bind(rel.created_at.timestamp())
        .bind(rel.updated_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_entities(&self) -> Result<Vec<Entity>> {
        let rows = sqlx::query("SELECT * FROM entities ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_entity).collect())
    }

    async fn get_relationships(&self) -> Result<Vec<Relationship>> {
        let rows = sqlx::query("SELECT * FROM relationships ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_relationship).collect())
    }

    async fn delete_document(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunk_vectors WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        // Cascade provenance: entities and relationships lose this
        // document; records with no remaining provenance are removed.
        let entity_rows = sqlx::query("SELECT * FROM entities")
            .fetch_all(&mut *tx)
            .await?;
        let mut dropped_entities: Vec<String> = Vec::new();
        for row in &entity_rows {
            let mut entity = row_to_entity(row);
            if !entity.source_document_ids.remove(id) {
                continue;
            }
            if entity.source_document_ids.is_empty() {
                dropped_entities.push(entity.id.clone());
                sqlx::query("DELETE FROM entities WHERE id = ?")
                    .bind(&entity.id)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query("UPDATE entities SET source_document_ids_json = ? WHERE id = ?")
                    .bind(to_json(&entity.source_document_ids))
                    .bind(&entity.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        let rel_rows = sqlx::query("SELECT * FROM relationships")
            .fetch_all(&mut *tx)
            .await?;
        for row in &rel_rows {
            let mut rel = row_to_relationship(row);
            let touched = rel.source_document_ids.remove(id);
            let dangling = dropped_entities.contains(&rel.source_entity_id)
                || dropped_entities.contains(&rel.target_entity_id);
            if !touched && !dangling {
                continue;
            }
            if rel.source_document_ids.is_empty() || dangling {
                sqlx::query("DELETE FROM relationships WHERE id = ?")
                    .bind(&rel.id)
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query("UPDATE relationships SET source_document_ids_json = ? WHERE id = ?")
                    .bind(to_json(&rel.source_document_ids))
                    .bind(&rel.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn similar_chunks(&self, query: &[f32], limit: usize) -> Result<Vec<ChunkMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.document_id, cv.embedding,
                   COALESCE(substr(c.text, 1, 240), '') AS snippet
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut matches: Vec<ChunkMatch> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                ChunkMatch {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    score: cosine_similarity(query, &vec) as f64,
                    snippet: row.get("snippet"),
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
