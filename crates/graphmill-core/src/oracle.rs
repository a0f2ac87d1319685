//! Extraction-oracle boundary: the trait the pipeline calls and the
//! tolerant parser for what comes back.
//!
//! The oracle (an LLM behind an HTTP API, in production) receives a prompt
//! embedding the chunk text and returns JSON naming candidate entities and
//! relationships. Models do not always return clean JSON, so parsing is an
//! explicit two-stage affair: a strict parse first, then a bounded repair
//! pipeline — fence stripping, outermost-brace extraction, trailing-comma
//! removal, bare-key quoting — each stage re-attempting the parse. If every
//! stage fails the parser returns an error; the orchestrator maps that to an
//! empty payload and a warning, never a panic.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Input to the extraction oracle. The prompt embeds the chunk text, the
/// entity-type allowlist, and any known-entity context.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub prompt: String,
}

/// External system that converts chunk text into candidate entities and
/// relationships. Implementations live in the application crate.
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Provider name, for logs and reports.
    fn name(&self) -> &str;

    /// Run one extraction call, returning the raw model output.
    ///
    /// A single attempt from the pipeline's point of view; providers may
    /// retry transient transport errors internally.
    async fn extract(&self, request: &OracleRequest) -> Result<String>;
}

/// An entity as the oracle reports it, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEntity {
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// A relationship as the oracle reports it. `source` and `target` are
/// entity names, resolved to IDs by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub rel_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.5
}
fn default_weight() -> f64 {
    0.5
}

/// The oracle's parsed output for one chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionPayload {
    #[serde(default)]
    pub entities: Vec<RawEntity>,
    #[serde(default)]
    pub relationships: Vec<RawRelationship>,
}

impl ExtractionPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));
static BARE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("valid regex"));

/// Parse oracle output, repairing common LLM JSON defects.
///
/// Repair order: strict parse → fence strip → outermost-brace extraction →
/// trailing-comma removal → bare-key quoting. Each stage re-parses; the
/// first success wins.
pub fn parse_extraction_payload(raw: &str) -> Result<ExtractionPayload> {
    let mut candidate = raw.trim().to_string();
    if let Ok(payload) = serde_json::from_str(&candidate) {
        return Ok(payload);
    }

    candidate = strip_code_fences(&candidate);
    if let Ok(payload) = serde_json::from_str(&candidate) {
        return Ok(payload);
    }

    if let Some(span) = outermost_brace_span(&candidate) {
        candidate = span.to_string();
        if let Ok(payload) = serde_json::from_str(&candidate) {
            return Ok(payload);
        }
    }

    candidate = TRAILING_COMMA.replace_all(&candidate, "$1").into_owned();
    if let Ok(payload) = serde_json::from_str(&candidate) {
        return Ok(payload);
    }

    candidate = BARE_KEY
        .replace_all(&candidate, "$1\"$2\":")
        .into_owned();
    if let Ok(payload) = serde_json::from_str(&candidate) {
        return Ok(payload);
    }

    Err(PipelineError::Payload(format!(
        "not valid JSON after repair ({} bytes)",
        raw.len()
    )))
}

/// Drop markdown code-fence lines (```` ``` ```` and ```` ```json ````).
fn strip_code_fences(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// The span from the first `{` to the last `}`, when both exist.
fn outermost_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = r#"{
        "entities": [
            {"name": "Acme", "type": "Organization", "description": "A company.", "confidence": 0.9}
        ],
        "relationships": []
    }"#;

    #[test]
    fn test_strict_parse() {
        let payload = parse_extraction_payload(CLEAN).unwrap();
        assert_eq!(payload.entities.len(), 1);
        assert_eq!(payload.entities[0].name, "Acme");
        assert_eq!(payload.entities[0].entity_type, "Organization");
        assert!(payload.relationships.is_empty());
    }

    #[test]
    fn test_defaults_applied() {
        let payload = parse_extraction_payload(r#"{"entities": [{"name": "X"}]}"#).unwrap();
        assert_eq!(payload.entities[0].confidence, 0.5);
        assert_eq!(payload.entities[0].description, "");
        assert!(payload.relationships.is_empty());
    }

    #[test]
    fn test_fenced_payload_repaired() {
        let fenced = format!("```json\n{}\n```", CLEAN);
        let payload = parse_extraction_payload(&fenced).unwrap();
        assert_eq!(payload.entities.len(), 1);
    }

    #[test]
    fn test_surrounding_prose_repaired() {
        let chatty = format!("Here is the extraction you asked for:\n\n{}\n\nLet me know!", CLEAN);
        let payload = parse_extraction_payload(&chatty).unwrap();
        assert_eq!(payload.entities.len(), 1);
    }

    #[test]
    fn test_trailing_commas_repaired() {
        let fixable = r#"{"entities": [{"name": "A", "confidence": 0.8,},]}"#;
        let payload = parse_extraction_payload(fixable).unwrap();
        assert_eq!(payload.entities.len(), 1);

        let unfixable = r#"{"entities": [{"name": "A", "confidence": 0.8,}, More garbage"#;
        assert!(parse_extraction_payload(unfixable).is_err());
    }

    #[test]
    fn test_bare_keys_repaired() {
        let bare = r#"{entities: [{name: "B", type: "Person", confidence: 0.7}], relationships: []}"#;
        let payload = parse_extraction_payload(bare).unwrap();
        assert_eq!(payload.entities[0].name, "B");
        assert_eq!(payload.entities[0].entity_type, "Person");
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(parse_extraction_payload("I could not find anything.").is_err());
        assert!(parse_extraction_payload("").is_err());
    }

    #[test]
    fn test_relationship_fields() {
        let payload = parse_extraction_payload(
            r#"{"entities": [], "relationships": [
                {"source": "A", "target": "B", "type": "owns", "weight": 0.9, "bidirectional": true}
            ]}"#,
        )
        .unwrap();
        let rel = &payload.relationships[0];
        assert_eq!(rel.source, "A");
        assert_eq!(rel.rel_type, "owns");
        assert!(rel.bidirectional);
        assert_eq!(rel.confidence, 0.5);
    }
}
