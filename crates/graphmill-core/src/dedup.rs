//! Cross-document deduplication of entities and relationships.
//!
//! Incoming entities are keyed by their case-insensitive normalized name and
//! merged into whichever record already claims that key — either an earlier
//! entity from the same batch or one from the store snapshot the engine was
//! built with. A merge unions provenance, keeps the highest confidence,
//! prefers the longer description, and stamps `updated_at`; the surviving
//! record keeps the name casing of its first occurrence.
//!
//! Relationships are deduplicated by their `(source, target, type)` identity
//! hash after endpoints are re-pointed at surviving entity IDs, and any
//! relationship with an endpoint unknown to the merged result set is dropped
//! with a warning, never an error.
//!
//! The merge key is exact normalized-name equality. The scorer's
//! edit-distance similarity is intentionally not promoted into the merge
//! decision (see DESIGN.md).

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::Utc;

use crate::models::{normalize_entity_name, Entity, Relationship};

/// Result of one deduplication pass: the entities and relationships to
/// persist (new or merged), how many merges happened, and any warnings.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub merged_count: usize,
    pub warnings: Vec<String>,
}

/// Merges new extractions against a snapshot of the existing graph.
///
/// The snapshot is fetched once, at the start of a document's pipeline run;
/// concurrent documents may race on merge, which the design accepts as an
/// eventual-consistency tradeoff (the store reconciles by entity ID).
pub struct DeduplicationEngine {
    existing_by_key: HashMap<String, Entity>,
    existing_relationships: HashMap<String, Relationship>,
}

impl DeduplicationEngine {
    pub fn new(existing_entities: Vec<Entity>, existing_relationships: Vec<Relationship>) -> Self {
        let existing_by_key = existing_entities
            .into_iter()
            .map(|e| (normalize_entity_name(&e.name), e))
            .collect();
        let existing_relationships = existing_relationships
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        Self {
            existing_by_key,
            existing_relationships,
        }
    }

    /// Deduplicate a batch of newly extracted entities and relationships.
    pub fn deduplicate(
        &self,
        new_entities: Vec<Entity>,
        new_relationships: Vec<Relationship>,
    ) -> DedupOutcome {
        let mut warnings = Vec::new();
        let mut merged_count = 0usize;

        // key → surviving entity, in first-seen order.
        let mut merged: HashMap<String, Entity> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        // incoming entity id → surviving entity id.
        let mut id_remap: HashMap<String, String> = HashMap::new();

        for entity in new_entities {
            let key = normalize_entity_name(&entity.name);
            match merged.entry(key.clone()) {
                Entry::Occupied(mut slot) => {
                    let survivor = slot.get_mut();
                    id_remap.insert(entity.id.clone(), survivor.id.clone());
                    merge_entity(survivor, entity);
                    merged_count += 1;
                }
                Entry::Vacant(slot) => {
                    if let Some(existing) = self.existing_by_key.get(&key) {
                        let mut survivor = existing.clone();
                        id_remap.insert(entity.id.clone(), survivor.id.clone());
                        merge_entity(&mut survivor, entity);
                        merged_count += 1;
                        slot.insert(survivor);
                    } else {
                        id_remap.insert(entity.id.clone(), entity.id.clone());
                        slot.insert(entity);
                    }
                    order.push(key);
                }
            }
        }

        // Relationships: re-point endpoints at survivors, re-key, then
        // collapse duplicates and drop danglers.
        let mut relationships: HashMap<String, Relationship> = HashMap::new();
        let mut rel_order: Vec<String> = Vec::new();

        for mut rel in new_relationships {
            if let Some(survivor_id) = id_remap.get(&rel.source_entity_id) {
                rel.source_entity_id = survivor_id.clone();
            }
            if let Some(survivor_id) = id_remap.get(&rel.target_entity_id) {
                rel.target_entity_id = survivor_id.clone();
            }
            rel.rekey();

            if !self.endpoint_known(&rel.source_entity_id, &merged)
                || !self.endpoint_known(&rel.target_entity_id, &merged)
            {
                warnings.push(format!(
                    "dropped relationship '{}' ({} -> {}): unknown endpoint",
                    rel.rel_type, rel.source_entity_id, rel.target_entity_id
                ));
                continue;
            }

            match relationships.entry(rel.id.clone()) {
                Entry::Occupied(mut slot) => {
                    warnings.push(format!(
                        "duplicate relationship '{}' ({} -> {}), merged",
                        rel.rel_type, rel.source_entity_id, rel.target_entity_id
                    ));
                    merge_relationship(slot.get_mut(), rel);
                    merged_count += 1;
                }
                Entry::Vacant(slot) => {
                    if let Some(stored) = self.existing_relationships.get(&rel.id) {
                        let mut survivor = stored.clone();
                        merge_relationship(&mut survivor, rel);
                        merged_count += 1;
                        rel_order.push(survivor.id.clone());
                        slot.insert(survivor);
                    } else {
                        rel_order.push(rel.id.clone());
                        slot.insert(rel);
                    }
                }
            }
        }

        let entities = order
            .into_iter()
            .filter_map(|k| merged.remove(&k))
            .collect();
        let relationships = rel_order
            .into_iter()
            .filter_map(|id| relationships.remove(&id))
            .collect();

        DedupOutcome {
            entities,
            relationships,
            merged_count,
            warnings,
        }
    }

    fn endpoint_known(&self, entity_id: &str, merged: &HashMap<String, Entity>) -> bool {
        // Entity IDs are normalized names, so the map key doubles as the ID.
        merged.contains_key(entity_id)
            || self
                .existing_by_key
                .values()
                .any(|e| e.id == entity_id)
    }
}

fn merge_entity(target: &mut Entity, incoming: Entity) {
    target
        .source_document_ids
        .extend(incoming.source_document_ids);
    target.source_chunk_ids.extend(incoming.source_chunk_ids);
    if incoming.confidence > target.confidence {
        target.confidence = incoming.confidence;
    }
    if incoming.description.len() > target.description.len() {
        target.description = incoming.description;
    }
    for (key, value) in incoming.properties {
        target.properties.entry(key).or_insert(value);
    }
    if incoming.id != target.id && !target.merged_from_ids.contains(&incoming.id) {
        target.merged_from_ids.push(incoming.id);
    }
    target.updated_at = Utc::now();
}

fn merge_relationship(target: &mut Relationship, incoming: Relationship) {
    target
        .source_document_ids
        .extend(incoming.source_document_ids);
    target.source_chunk_ids.extend(incoming.source_chunk_ids);
    if incoming.confidence > target.confidence {
        target.confidence = incoming.confidence;
    }
    if incoming.weight > target.weight {
        target.weight = incoming.weight;
    }
    if incoming.description.len() > target.description.len() {
        target.description = incoming.description;
    }
    for (key, value) in incoming.properties {
        target.properties.entry(key).or_insert(value);
    }
    target.bidirectional = target.bidirectional || incoming.bidirectional;
    target.updated_at = Utc::now();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, confidence: f64, doc: &str) -> Entity {
        let mut e = Entity::new(name, "Technology", "", confidence);
        e.add_provenance(doc, &format!("{}-chunk", doc));
        e
    }

    #[test]
    fn test_case_insensitive_merge_converges() {
        let engine = DeduplicationEngine::new(vec![], vec![]);
        let out = engine.deduplicate(
            vec![entity("Python", 0.6, "d1"), entity("python", 0.9, "d2")],
            vec![],
        );

        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.merged_count, 1);
        let survivor = &out.entities[0];
        assert_eq!(survivor.name, "Python"); // first occurrence's casing
        assert_eq!(survivor.confidence, 0.9);
        assert!(survivor.source_document_ids.contains("d1"));
        assert!(survivor.source_document_ids.contains("d2"));
    }

    #[test]
    fn test_merge_against_store_snapshot() {
        let stored = entity("Rust", 0.5, "old-doc");
        let engine = DeduplicationEngine::new(vec![stored], vec![]);
        let out = engine.deduplicate(vec![entity("rust", 0.8, "new-doc")], vec![]);

        assert_eq!(out.entities.len(), 1);
        assert_eq!(out.merged_count, 1);
        let survivor = &out.entities[0];
        assert_eq!(survivor.name, "Rust");
        assert_eq!(survivor.confidence, 0.8);
        assert!(survivor.source_document_ids.contains("old-doc"));
        assert!(survivor.source_document_ids.contains("new-doc"));
    }

    #[test]
    fn test_distinct_entities_pass_through() {
        let engine = DeduplicationEngine::new(vec![], vec![]);
        let out = engine.deduplicate(
            vec![entity("Rust", 0.8, "d1"), entity("Go", 0.7, "d1")],
            vec![],
        );
        assert_eq!(out.entities.len(), 2);
        assert_eq!(out.merged_count, 0);
    }

    #[test]
    fn test_merge_idempotent() {
        let engine = DeduplicationEngine::new(vec![], vec![]);
        let first = engine.deduplicate(
            vec![entity("Python", 0.6, "d1"), entity("python", 0.9, "d2")],
            vec![],
        );
        // Feeding the merged output through again changes nothing.
        let engine2 = DeduplicationEngine::new(first.entities.clone(), vec![]);
        let second = engine2.deduplicate(first.entities.clone(), vec![]);
        assert_eq!(second.entities.len(), 1);
        assert_eq!(second.entities[0].confidence, first.entities[0].confidence);
        assert_eq!(
            second.entities[0].source_document_ids,
            first.entities[0].source_document_ids
        );
    }

    #[test]
    fn test_dangling_relationship_dropped_with_warning() {
        let engine = DeduplicationEngine::new(vec![], vec![]);
        let rel = Relationship::new("python", "ghost", "uses", "", 0.5, false, 0.5);
        let out = engine.deduplicate(vec![entity("Python", 0.9, "d1")], vec![rel]);

        assert!(out.relationships.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].contains("unknown endpoint"));
    }

    #[test]
    fn test_duplicate_relationships_collapse() {
        let engine = DeduplicationEngine::new(vec![], vec![]);
        let mut r1 = Relationship::new("python", "django", "uses", "", 0.5, false, 0.5);
        r1.add_provenance("d1", "c1");
        let mut r2 = Relationship::new("python", "django", "uses", "", 0.9, false, 0.8);
        r2.add_provenance("d2", "c2");

        let out = engine.deduplicate(
            vec![entity("Python", 0.9, "d1"), entity("Django", 0.9, "d1")],
            vec![r1, r2],
        );

        assert_eq!(out.relationships.len(), 1);
        let rel = &out.relationships[0];
        assert_eq!(rel.confidence, 0.8);
        assert_eq!(rel.weight, 0.9);
        assert!(rel.source_document_ids.contains("d1"));
        assert!(rel.source_document_ids.contains("d2"));
        assert!(out.warnings.iter().any(|w| w.contains("duplicate")));
    }

    #[test]
    fn test_relationship_to_existing_entity_kept() {
        let stored = entity("Linux", 0.9, "old");
        let engine = DeduplicationEngine::new(vec![stored], vec![]);
        let rel = Relationship::new("git", "linux", "runs_on", "", 0.7, false, 0.7);
        let out = engine.deduplicate(vec![entity("Git", 0.8, "d1")], vec![rel]);

        assert_eq!(out.relationships.len(), 1);
        assert!(out.warnings.is_empty());
    }
}
