//! Typed errors for the extraction pipeline.
//!
//! Uses `thiserror` for library errors (not `anyhow`). The taxonomy follows
//! how the orchestrator treats each failure: validation and persistence
//! errors are fatal for the document, extraction errors degrade the affected
//! chunk and processing continues.

use thiserror::Error;

/// Errors that can occur while processing a document.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Document failed validation (empty, oversized, or binary content).
    /// Fatal for the document; nothing is persisted.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// The extraction oracle call failed or returned unusable output even
    /// after repair. Degraded, not fatal: the chunk contributes nothing.
    #[error("extraction failed: {reason}")]
    Extraction { reason: String },

    /// Embedding generation failed. Degraded: a zero vector is substituted.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// A graph-store write failed. Fatal for the document; no assumption is
    /// made about partial writes already committed by the store.
    #[error("persistence failed: {0}")]
    Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Processing was cancelled between stages.
    #[error("operation cancelled")]
    Cancelled,

    /// Oracle output could not be parsed as an extraction payload.
    #[error("unusable oracle payload: {0}")]
    Payload(String),

    /// Configuration error surfaced from a provider.
    #[error("config error: {0}")]
    Config(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
