//! Vector index abstraction shared by the processing pipeline and its backends.
//!
//! Vectors are partitioned by namespace (the student id). Every read, write, and delete names
//! its namespace explicitly; there is no implicit default partition.

use crate::qdrant::QdrantError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by vector index backends.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    /// Qdrant transport or status failure.
    #[error(transparent)]
    Qdrant(#[from] QdrantError),
    /// Backend-specific failure without a dedicated variant.
    #[error("Vector index request failed: {0}")]
    Backend(String),
}

/// Citation metadata stored with every chunk vector.
///
/// Holds enough to cite a chunk without re-reading the source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Identifier of the uploaded document.
    pub doc_id: String,
    /// Sanitized original filename.
    pub filename: String,
    /// Position of the chunk within its document, starting at zero.
    pub chunk_id: usize,
    /// Chunk text, truncated to the configured maximum.
    pub text: String,
}

/// Vector plus metadata ready for an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Stable identifier, `"{doc_id}-{chunk_id}"`.
    pub id: String,
    /// Embedding values.
    pub values: Vec<f32>,
    /// Citation metadata.
    pub metadata: ChunkMetadata,
}

impl VectorRecord {
    /// Derive the record identifier for a chunk of a document.
    pub fn chunk_identity(doc_id: &str, chunk_id: usize) -> String {
        format!("{doc_id}-{chunk_id}")
    }
}

/// A ranked match returned by [`VectorIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    /// Record identifier.
    pub id: String,
    /// Similarity score, higher is more relevant.
    pub score: f32,
    /// Stored citation metadata.
    pub metadata: ChunkMetadata,
}

/// Storage for chunk vectors, partitioned by namespace.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Write all records into `namespace` in one batch, returning how many were written.
    async fn upsert(
        &self,
        records: Vec<VectorRecord>,
        namespace: &str,
    ) -> Result<usize, VectorIndexError>;

    /// Return up to `top_k` matches in `namespace`, ordered by descending score.
    async fn query(
        &self,
        vector: Vec<f32>,
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, VectorIndexError>;

    /// Remove every vector belonging to `doc_id` within `namespace`.
    async fn delete_document(&self, namespace: &str, doc_id: &str)
    -> Result<(), VectorIndexError>;
}
