//! # Graphmill
//!
//! A document-to-knowledge-graph extraction pipeline.
//!
//! Graphmill ingests free-form documents (markdown, source code, JSON, XML,
//! plain text), splits them into structure-aware chunks, asks an external
//! extraction oracle for entities and relationships, scores everything,
//! deduplicates against the existing graph, and persists the result to a
//! pluggable graph store with chunk embeddings for similarity queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────────────────────────┐   ┌──────────┐
//! │ Documents │──▶│ Pipeline                             │──▶│  SQLite  │
//! │ (fs, API) │   │ classify → chunk → extract → score   │   │ graph +  │
//! └───────────┘   │ → dedup → persist                    │   │ vectors  │
//!                 └───────┬──────────────────┬───────────┘   └────┬─────┘
//!                         ▼                  ▼                    ▼
//!                  ┌─────────────┐   ┌──────────────┐       ┌──────────┐
//!                  │ Extraction  │   │  Embedder    │       │   CLI    │
//!                  │ oracle (LLM)│   │ (vectors)    │       │ (gmill)  │
//!                  └─────────────┘   └──────────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gmill init                        # create database
//! gmill ingest ./docs               # chunk, extract, and persist
//! gmill entities                    # list the graph
//! gmill query "deployment process"  # vector similarity over chunks
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`pipeline`] | Stage-machine orchestration |
//! | [`oracle`] | Extraction-oracle providers + prompt assembly |
//! | [`embedding`] | Embedder providers |
//! | [`ingest`] | Filesystem ingestion |
//! | [`sqlite_store`] | SQLite graph store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod oracle;
pub mod pipeline;
pub mod sqlite_store;
