//! Testing utilities: deterministic doubles for the external collaborators.
//!
//! Useful for exercising the pipeline without real LLM or network calls.
//! The mocks record every call so tests can assert on interaction counts
//! (e.g. that the cache actually prevented a second oracle call).

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::cache::Clock;
use crate::embedding::Embedder;
use crate::error::{PipelineError, Result};
use crate::oracle::{ExtractionOracle, OracleRequest};

/// A clock that only moves when told to. Lets TTL tests run instantly.
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: RwLock::new(Utc::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }
}

/// A mock extraction oracle returning canned JSON responses.
///
/// Responses are matched by substring against the prompt (which embeds the
/// chunk text), so a test can map each chunk to its own payload.
#[derive(Default)]
pub struct MockOracle {
    responses: RwLock<Vec<(String, String)>>,
    default_response: RwLock<Option<String>>,
    fail: bool,
    calls: RwLock<Vec<String>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `response` for any prompt containing `needle`.
    pub fn with_response(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses
            .write()
            .unwrap()
            .push((needle.into(), response.into()));
        self
    }

    /// Response used when no needle matches. Defaults to an empty payload.
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        *self.default_response.write().unwrap() = Some(response.into());
        self
    }

    /// Make every call fail, for degraded-path tests.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Number of oracle calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// The prompts received, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionOracle for MockOracle {
    fn name(&self) -> &str {
        "mock"
    }

    async fn extract(&self, request: &OracleRequest) -> Result<String> {
        self.calls.write().unwrap().push(request.prompt.clone());
        if self.fail {
            return Err(PipelineError::Extraction {
                reason: "mock oracle configured to fail".to_string(),
            });
        }
        let responses = self.responses.read().unwrap();
        for (needle, response) in responses.iter() {
            if request.prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        Ok(self
            .default_response
            .read()
            .unwrap()
            .clone()
            .unwrap_or_else(|| r#"{"entities": [], "relationships": []}"#.to_string()))
    }
}

/// A mock embedder producing deterministic pseudo-vectors from a content
/// hash, so identical texts embed identically.
pub struct MockEmbedder {
    dims: usize,
    fail: bool,
    calls: RwLock<usize>,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            fail: false,
            calls: RwLock::new(0),
        }
    }

    pub fn failing(dims: usize) -> Self {
        Self {
            dims,
            fail: true,
            calls: RwLock::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.read().unwrap()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-embedder"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        *self.calls.write().unwrap() += 1;
        if self.fail {
            return Err(PipelineError::Embedding("mock embedder configured to fail".to_string()));
        }
        let digest = Sha256::digest(text.as_bytes());
        Ok((0..self.dims)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (byte as f32 / 255.0) * 2.0 - 1.0
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_oracle_matches_by_needle() {
        let oracle = MockOracle::new()
            .with_response("alpha", r#"{"entities": [{"name": "A"}], "relationships": []}"#);

        let hit = oracle
            .extract(&OracleRequest {
                prompt: "text mentioning alpha here".to_string(),
            })
            .await
            .unwrap();
        assert!(hit.contains("\"A\""));

        let miss = oracle
            .extract(&OracleRequest {
                prompt: "nothing relevant".to_string(),
            })
            .await
            .unwrap();
        assert!(miss.contains("\"entities\": []"));
        assert_eq!(oracle.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::new(8);
        let a = embedder.embed("same text").await.unwrap();
        let b = embedder.embed("same text").await.unwrap();
        let c = embedder.embed("other text").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
        assert_eq!(embedder.call_count(), 3);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now() - t0, Duration::seconds(30));
    }
}
