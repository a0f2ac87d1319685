//! Multi-factor quality scoring for extracted artifacts.
//!
//! Each scorer evaluates a fixed set of named factors, every factor
//! producing a sub-score in `[0, 1]` from a banded threshold function. The
//! factor weights are data, not code: [`ScoringWeights`] deserializes from
//! configuration and defaults to the tables below, and a single generic
//! aggregator turns `(factor, weight)` pairs into a [`QualityAnalysis`].
//!
//! The aggregate score is the weight-clamped sum of contributions; the
//! confidence is `max(0.1, 1 − variance(factor scores))` — factors that
//! agree produce a more trustworthy aggregate. Scoring is pure: identical
//! inputs and context always produce identical output.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::models::{DocumentChunk, Entity, Relationship};

/// Factor weights for entity scoring. Must sum to 1.0.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityWeights {
    #[serde(default = "d_entity_name_length")]
    pub name_length: f64,
    #[serde(default = "d_entity_description_length")]
    pub description_length: f64,
    #[serde(default = "d_entity_uniqueness")]
    pub uniqueness: f64,
    #[serde(default = "d_entity_context_relevance")]
    pub context_relevance: f64,
    #[serde(default = "d_entity_cross_doc_frequency")]
    pub cross_doc_frequency: f64,
}

fn d_entity_name_length() -> f64 {
    0.15
}
fn d_entity_description_length() -> f64 {
    0.25
}
fn d_entity_uniqueness() -> f64 {
    0.20
}
fn d_entity_context_relevance() -> f64 {
    0.25
}
fn d_entity_cross_doc_frequency() -> f64 {
    0.15
}

impl Default for EntityWeights {
    fn default() -> Self {
        Self {
            name_length: d_entity_name_length(),
            description_length: d_entity_description_length(),
            uniqueness: d_entity_uniqueness(),
            context_relevance: d_entity_context_relevance(),
            cross_doc_frequency: d_entity_cross_doc_frequency(),
        }
    }
}

/// Factor weights for relationship scoring. Must sum to 1.0.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationshipWeights {
    #[serde(default = "d_rel_description_length")]
    pub description_length: f64,
    #[serde(default = "d_rel_type_specificity")]
    pub type_specificity: f64,
    #[serde(default = "d_rel_weight_strength")]
    pub weight_strength: f64,
    #[serde(default = "d_rel_context_relevance")]
    pub context_relevance: f64,
}

fn d_rel_description_length() -> f64 {
    0.30
}
fn d_rel_type_specificity() -> f64 {
    0.25
}
fn d_rel_weight_strength() -> f64 {
    0.25
}
fn d_rel_context_relevance() -> f64 {
    0.20
}

impl Default for RelationshipWeights {
    fn default() -> Self {
        Self {
            description_length: d_rel_description_length(),
            type_specificity: d_rel_type_specificity(),
            weight_strength: d_rel_weight_strength(),
            context_relevance: d_rel_context_relevance(),
        }
    }
}

/// Factor weights for chunk scoring. Must sum to 1.0.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkWeights {
    #[serde(default = "d_chunk_text_length")]
    pub text_length: f64,
    #[serde(default = "d_chunk_lexical_diversity")]
    pub lexical_diversity: f64,
    #[serde(default = "d_chunk_structure")]
    pub structure: f64,
    #[serde(default = "d_chunk_context_relevance")]
    pub context_relevance: f64,
}

fn d_chunk_text_length() -> f64 {
    0.30
}
fn d_chunk_lexical_diversity() -> f64 {
    0.25
}
fn d_chunk_structure() -> f64 {
    0.20
}
fn d_chunk_context_relevance() -> f64 {
    0.25
}

impl Default for ChunkWeights {
    fn default() -> Self {
        Self {
            text_length: d_chunk_text_length(),
            lexical_diversity: d_chunk_lexical_diversity(),
            structure: d_chunk_structure(),
            context_relevance: d_chunk_context_relevance(),
        }
    }
}

/// All three weight tables together, as they appear in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringWeights {
    #[serde(default)]
    pub entity: EntityWeights,
    #[serde(default)]
    pub relationship: RelationshipWeights,
    #[serde(default)]
    pub chunk: ChunkWeights,
}

impl ScoringWeights {
    /// Each table must sum to 1.0 (within floating-point tolerance).
    pub fn validate(&self) -> Result<(), String> {
        let sums = [
            (
                "entity",
                self.entity.name_length
                    + self.entity.description_length
                    + self.entity.uniqueness
                    + self.entity.context_relevance
                    + self.entity.cross_doc_frequency,
            ),
            (
                "relationship",
                self.relationship.description_length
                    + self.relationship.type_specificity
                    + self.relationship.weight_strength
                    + self.relationship.context_relevance,
            ),
            (
                "chunk",
                self.chunk.text_length
                    + self.chunk.lexical_diversity
                    + self.chunk.structure
                    + self.chunk.context_relevance,
            ),
        ];
        for (name, sum) in sums {
            if (sum - 1.0).abs() > 1e-6 {
                return Err(format!("{} weights sum to {}, expected 1.0", name, sum));
            }
        }
        Ok(())
    }
}

/// One factor's contribution to an aggregate score.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorScore {
    pub score: f64,
    pub weight: f64,
    pub contribution: f64,
    pub details: String,
}

/// Quality bucket at the 0.4 / 0.6 / 0.8 thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityCategory {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityCategory {
    pub fn from_score(score: f64) -> Self {
        if score < 0.4 {
            QualityCategory::Poor
        } else if score < 0.6 {
            QualityCategory::Fair
        } else if score < 0.8 {
            QualityCategory::Good
        } else {
            QualityCategory::Excellent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityCategory::Poor => "poor",
            QualityCategory::Fair => "fair",
            QualityCategory::Good => "good",
            QualityCategory::Excellent => "excellent",
        }
    }
}

/// Result of scoring one entity, relationship, or chunk. Ephemeral:
/// computed on demand, not persisted as its own record.
#[derive(Debug, Clone)]
pub struct QualityAnalysis {
    pub score: f64,
    pub confidence: f64,
    pub factors: BTreeMap<String, FactorScore>,
    pub category: QualityCategory,
    pub recommendations: Vec<String>,
}

/// Extra inputs a scorer may use. All optional; absent context scores
/// the relevant factors neutrally.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreContext<'a> {
    /// Document text (or a summary of it) for relevance checks.
    pub document_text: Option<&'a str>,
    /// Other entities extracted alongside, for the uniqueness factor.
    pub peer_entities: &'a [Entity],
}

struct Factor {
    name: &'static str,
    score: f64,
    weight: f64,
    details: String,
    advice: &'static str,
}

/// Generic weighted-factor aggregation shared by all three scorers.
fn aggregate(factors: Vec<Factor>) -> QualityAnalysis {
    let total: f64 = factors
        .iter()
        .map(|f| f.score * f.weight)
        .sum::<f64>()
        .clamp(0.0, 1.0);

    let n = factors.len() as f64;
    let mean: f64 = factors.iter().map(|f| f.score).sum::<f64>() / n;
    let variance: f64 = factors.iter().map(|f| (f.score - mean).powi(2)).sum::<f64>() / n;
    let confidence = (1.0 - variance).max(0.1);

    let recommendations: Vec<String> = factors
        .iter()
        .filter(|f| f.score < 0.5)
        .map(|f| format!("{}: {}", f.name, f.advice))
        .collect();

    let factor_map: BTreeMap<String, FactorScore> = factors
        .into_iter()
        .map(|f| {
            (
                f.name.to_string(),
                FactorScore {
                    score: f.score,
                    weight: f.weight,
                    contribution: f.score * f.weight,
                    details: f.details,
                },
            )
        })
        .collect();

    QualityAnalysis {
        score: total,
        confidence,
        factors: factor_map,
        category: QualityCategory::from_score(total),
        recommendations,
    }
}

/// Score an entity against the configured weight table.
pub fn score_entity(entity: &Entity, weights: &EntityWeights, ctx: &ScoreContext) -> QualityAnalysis {
    let name_len = entity.name.chars().count();
    let name_score = match name_len {
        0 | 1 => 0.1,
        2 | 3 => 0.4,
        4..=50 => 1.0,
        51..=100 => 0.8,
        _ => 0.6,
    };

    let duplicates = near_duplicate_count(entity, ctx.peer_entities);
    let uniqueness_score = match duplicates {
        0 => 1.0,
        1 => 0.7,
        2 => 0.5,
        _ => 0.3,
    };

    let relevance = context_relevance(
        &format!("{} {}", entity.name, entity.description),
        ctx.document_text,
    );

    let docs = entity.source_document_ids.len();
    let frequency_score = match docs {
        0 => 0.1,
        1 => 0.5,
        2 => 0.7,
        3..=5 => 0.9,
        _ => 1.0,
    };

    aggregate(vec![
        Factor {
            name: "name_length",
            score: name_score,
            weight: weights.name_length,
            details: format!("{} chars", name_len),
            advice: "use a fuller, more specific entity name",
        },
        Factor {
            name: "description_length",
            score: description_band(&entity.description),
            weight: weights.description_length,
            details: format!("{} chars", entity.description.chars().count()),
            advice: "add a description of what this entity is",
        },
        Factor {
            name: "uniqueness",
            score: uniqueness_score,
            weight: weights.uniqueness,
            details: format!("{} near-duplicate name(s)", duplicates),
            advice: "merge or disambiguate near-duplicate entities",
        },
        Factor {
            name: "context_relevance",
            score: relevance.0,
            weight: weights.context_relevance,
            details: relevance.1,
            advice: "entity barely appears in the source document",
        },
        Factor {
            name: "cross_doc_frequency",
            score: frequency_score,
            weight: weights.cross_doc_frequency,
            details: format!("seen in {} document(s)", docs),
            advice: "entity is mentioned in few documents",
        },
    ])
}

/// Score a relationship against the configured weight table.
pub fn score_relationship(
    rel: &Relationship,
    weights: &RelationshipWeights,
    ctx: &ScoreContext,
) -> QualityAnalysis {
    const GENERIC_TYPES: &[&str] = &["related_to", "relates_to", "related", "associated_with", "linked_to"];

    let ty = rel.rel_type.to_lowercase();
    let type_score = if GENERIC_TYPES.contains(&ty.as_str()) {
        0.3
    } else if ty.chars().count() < 3 {
        0.4
    } else {
        1.0
    };

    let weight_score = match rel.weight {
        w if w < 0.2 => 0.2,
        w if w < 0.4 => 0.5,
        w if w < 0.7 => 0.8,
        _ => 1.0,
    };

    let relevance = context_relevance(&rel.description, ctx.document_text);

    aggregate(vec![
        Factor {
            name: "description_length",
            score: description_band(&rel.description),
            weight: weights.description_length,
            details: format!("{} chars", rel.description.chars().count()),
            advice: "describe how the two entities relate",
        },
        Factor {
            name: "type_specificity",
            score: type_score,
            weight: weights.type_specificity,
            details: format!("type '{}'", rel.rel_type),
            advice: "replace the generic relationship type with a specific one",
        },
        Factor {
            name: "weight_strength",
            score: weight_score,
            weight: weights.weight_strength,
            details: format!("weight {:.2}", rel.weight),
            advice: "relationship carries little weight",
        },
        Factor {
            name: "context_relevance",
            score: relevance.0,
            weight: weights.context_relevance,
            details: relevance.1,
            advice: "relationship is weakly grounded in the source document",
        },
    ])
}

/// Score a chunk against the configured weight table.
pub fn score_chunk(chunk: &DocumentChunk, weights: &ChunkWeights, ctx: &ScoreContext) -> QualityAnalysis {
    let len = chunk.text.len();
    let length_score = match len {
        0..=49 => 0.2,
        50..=199 => 0.6,
        200..=4000 => 1.0,
        4001..=8000 => 0.8,
        _ => 0.5,
    };

    let tokens: Vec<String> = tokenize(&chunk.text);
    let unique: std::collections::BTreeSet<&String> = tokens.iter().collect();
    let diversity_ratio = if tokens.is_empty() {
        0.0
    } else {
        unique.len() as f64 / tokens.len() as f64
    };
    let diversity_score = if diversity_ratio >= 0.5 {
        1.0
    } else if diversity_ratio >= 0.3 {
        0.8
    } else if diversity_ratio >= 0.15 {
        0.5
    } else {
        0.2
    };

    let mut structure_score = 0.4;
    if chunk.heading.is_some() {
        structure_score += 0.3;
    }
    if chunk
        .text
        .trim_end()
        .ends_with(['.', '!', '?', '}', ']', '>'])
    {
        structure_score += 0.3;
    }

    let relevance = context_relevance(&chunk.text, ctx.document_text);

    aggregate(vec![
        Factor {
            name: "text_length",
            score: length_score,
            weight: weights.text_length,
            details: format!("{} bytes", len),
            advice: "chunk is outside the useful size range",
        },
        Factor {
            name: "lexical_diversity",
            score: diversity_score,
            weight: weights.lexical_diversity,
            details: format!("{:.2} unique-token ratio", diversity_ratio),
            advice: "chunk text is highly repetitive",
        },
        Factor {
            name: "structure",
            score: structure_score,
            weight: weights.structure,
            details: "heading/terminator check".to_string(),
            advice: "chunk lacks structural anchors",
        },
        Factor {
            name: "context_relevance",
            score: relevance.0,
            weight: weights.context_relevance,
            details: relevance.1,
            advice: "chunk diverges from the document context",
        },
    ])
}

fn description_band(description: &str) -> f64 {
    match description.chars().count() {
        0 => 0.1,
        1..=15 => 0.4,
        16..=300 => 1.0,
        301..=600 => 0.8,
        _ => 0.6,
    }
}

/// Token-overlap ratio of `text` against the document context. Returns the
/// score and a human-readable detail string. No context scores neutrally.
fn context_relevance(text: &str, document_text: Option<&str>) -> (f64, String) {
    let Some(context) = document_text else {
        return (0.5, "no document context".to_string());
    };
    let text_tokens = tokenize(text);
    if text_tokens.is_empty() {
        return (0.1, "no tokens".to_string());
    }
    let context_tokens: std::collections::BTreeSet<String> = tokenize(context).into_iter().collect();
    let overlap = text_tokens
        .iter()
        .filter(|t| context_tokens.contains(*t))
        .count();
    let ratio = overlap as f64 / text_tokens.len() as f64;
    (ratio, format!("{}/{} tokens in context", overlap, text_tokens.len()))
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Count peers whose name is a near-duplicate (edit-distance similarity
/// above 0.8) of this entity's, excluding the entity itself.
fn near_duplicate_count(entity: &Entity, peers: &[Entity]) -> usize {
    peers
        .iter()
        .filter(|p| p.id != entity.id)
        .filter(|p| name_similarity(&p.name, &entity.name) > 0.8)
        .count()
}

/// Edit-distance similarity in `[0, 1]`: `1 − levenshtein / max_len`,
/// computed on lowercased names.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / max_len as f64
}

/// Classic two-row Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
