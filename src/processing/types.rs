//! Core data types and error definitions for the processing pipeline.

use crate::{
    embedding::EmbeddingClientError, generation::GenerationError, index::VectorIndexError,
    parsing::ParseError,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors produced while splitting page text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Chunk size of zero cannot make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave room for new text in every chunk.
    #[error("chunk overlap ({chunk_overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Configured chunk size in characters.
        chunk_size: usize,
        /// Configured overlap in characters.
        chunk_overlap: usize,
    },
}

/// Pipeline step whose collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// Document parsing.
    Parse,
    /// Text chunking.
    Chunk,
    /// Embedding generation.
    Embed,
    /// Vector index read or write.
    Index,
    /// Answer generation.
    Generate,
}

impl PipelineStage {
    /// Lowercase tag used in logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Index => "index",
            Self::Generate => "generate",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors emitted by the document processing pipeline.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Caller supplied missing or malformed input.
    #[error("{0}")]
    Validation(String),
    /// An external collaborator failed; `message` is its original error text.
    #[error("{stage} step failed: {message}")]
    Upstream {
        /// Step that failed.
        stage: PipelineStage,
        /// Original error message.
        message: String,
    },
    /// Upload could not be written to or removed from local storage.
    #[error("Failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

impl ProcessingError {
    /// Build a validation error from any message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    fn upstream(stage: PipelineStage, error: impl fmt::Display) -> Self {
        Self::Upstream {
            stage,
            message: error.to_string(),
        }
    }
}

impl From<ParseError> for ProcessingError {
    fn from(error: ParseError) -> Self {
        Self::upstream(PipelineStage::Parse, error)
    }
}

impl From<ChunkingError> for ProcessingError {
    fn from(error: ChunkingError) -> Self {
        Self::upstream(PipelineStage::Chunk, error)
    }
}

impl From<EmbeddingClientError> for ProcessingError {
    fn from(error: EmbeddingClientError) -> Self {
        Self::upstream(PipelineStage::Embed, error)
    }
}

impl From<VectorIndexError> for ProcessingError {
    fn from(error: VectorIndexError) -> Self {
        Self::upstream(PipelineStage::Index, error)
    }
}

impl From<GenerationError> for ProcessingError {
    fn from(error: GenerationError) -> Self {
        Self::upstream(PipelineStage::Generate, error)
    }
}

/// Raw upload handed to the ingest flow.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Filename as supplied by the client, before sanitization.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Identifier generated for the document.
    pub doc_id: String,
    /// Number of chunks written to the index.
    pub num_chunks: usize,
    /// Sanitized filename stored with every chunk.
    pub filename: String,
}

/// Reference to a chunk that informed an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    /// Source document identifier.
    pub doc_id: String,
    /// Source filename.
    pub filename: String,
    /// Chunk position within the document.
    pub chunk_id: usize,
    /// Similarity score reported by the index.
    pub score: f32,
}

/// Answer to a question plus the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskOutcome {
    /// Generated answer, or the fixed fallback when nothing matched.
    pub answer: String,
    /// Retrieved chunks in relevance order; empty on fallback.
    pub context_used: Vec<Citation>,
}

/// Topic summary; `topic` is omitted when no notes matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryOutcome {
    /// Echo of the requested topic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Generated summary or the fixed fallback.
    pub summary: String,
}

/// A single question/answer study card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flashcard {
    /// Prompt side of the card.
    pub question: String,
    /// Answer side of the card; empty when the model gave none.
    pub answer: String,
}

/// Generated flashcards for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashcardsOutcome {
    /// Cards in generation order.
    pub flashcards: Vec<Flashcard>,
}
