use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_ingested: AtomicU64,
    chunks_ingested: AtomicU64,
    questions_answered: AtomicU64,
    summaries_generated: AtomicU64,
    flashcard_sets_generated: AtomicU64,
    flashcard_fallbacks: AtomicU64,
    empty_retrievals: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks written for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_ingested
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an answered question, including fallback answers.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a summary, including fallback summaries.
    pub fn record_summary(&self) {
        self.summaries_generated.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flashcard set; `fallback` marks a line-scan parse.
    pub fn record_flashcards(&self, fallback: bool) {
        self.flashcard_sets_generated
            .fetch_add(1, Ordering::Relaxed);
        if fallback {
            self.flashcard_fallbacks.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a retrieval that matched nothing.
    pub fn record_empty_retrieval(&self) {
        self.empty_retrievals.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_ingested: self.chunks_ingested.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            summaries_generated: self.summaries_generated.load(Ordering::Relaxed),
            flashcard_sets_generated: self.flashcard_sets_generated.load(Ordering::Relaxed),
            flashcard_fallbacks: self.flashcard_fallbacks.load(Ordering::Relaxed),
            empty_retrievals: self.empty_retrievals.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents ingested since startup.
    pub documents_ingested: u64,
    /// Chunks written across all ingested documents.
    pub chunks_ingested: u64,
    /// Questions answered, fallbacks included.
    pub questions_answered: u64,
    /// Summaries produced, fallbacks included.
    pub summaries_generated: u64,
    /// Flashcard sets produced.
    pub flashcard_sets_generated: u64,
    /// Flashcard sets recovered by scanning lines instead of parsing JSON.
    pub flashcard_fallbacks: u64,
    /// Retrievals that matched no chunks.
    pub empty_retrievals: u64,
}
