//! # Graphmill Core
//!
//! Shared, runtime-free logic for Graphmill: data models, content-type
//! classification, chunking, the evicting cache, quality scoring,
//! deduplication, the graph-store abstraction, and the oracle/embedder
//! traits.
//!
//! This crate contains no tokio, sqlx, network, or filesystem dependencies;
//! everything here is deterministic and directly testable. The application
//! crate wires these pieces to real providers and storage.

pub mod cache;
pub mod chunk;
pub mod classify;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod models;
pub mod oracle;
pub mod score;
pub mod store;
pub mod testing;
