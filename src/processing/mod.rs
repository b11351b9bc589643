//! Study-notes pipeline: ingestion, retrieval, and generation orchestration.

pub mod chunking;
pub mod flashcards;
mod prompts;
mod service;
pub mod types;

pub use flashcards::FlashcardParse;
pub use service::{
    Collaborators, DEFAULT_ASK_TOP_K, DEFAULT_FLASHCARD_TOP_K, DEFAULT_SUMMARY_TOP_K,
    PipelineSettings, ProcessingApi, ProcessingService,
};
pub use types::{
    AskOutcome, ChunkingError, Citation, Flashcard, FlashcardsOutcome, IngestOutcome,
    PipelineStage, ProcessingError, SummaryOutcome, UploadedFile,
};
