#![deny(missing_docs)]

//! Core library for the studyrag study-notes assistant.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Answer generation providers.
pub mod generation;
/// Vector index abstraction.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Text extraction from uploaded documents.
pub mod parsing;
/// Ingest and query pipeline.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Retry policy for external calls.
pub mod retry;
/// Upload storage on the local filesystem.
pub mod storage;
