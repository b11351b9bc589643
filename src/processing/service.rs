//! Processing service coordinating parsing, chunking, embedding, retrieval, and generation.

use crate::{
    config::Config,
    embedding::{EmbeddingClient, EmbeddingMode, get_embedding_client},
    generation::{AnswerGenerator, get_answer_generator},
    index::{ChunkMetadata, IndexMatch, VectorIndex, VectorIndexError, VectorRecord},
    metrics::{MetricsSnapshot, PipelineMetrics},
    parsing::{DocumentFormat, DocumentParser, FileDocumentParser, ParseError},
    processing::{
        chunking::split_text,
        flashcards::FlashcardParse,
        prompts::{self, ANSWER_TEMPERATURE, ASK_FALLBACK, FLASHCARD_TEMPERATURE, SUMMARY_FALLBACK},
        types::{
            AskOutcome, Citation, FlashcardsOutcome, IngestOutcome, PipelineStage,
            ProcessingError, SummaryOutcome, UploadedFile,
        },
    },
    qdrant::QdrantService,
    retry::RetryPolicy,
    storage::{UploadStore, sanitize_filename},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Default number of chunks retrieved for a question.
pub const DEFAULT_ASK_TOP_K: usize = 6;
/// Default number of chunks retrieved for a summary.
pub const DEFAULT_SUMMARY_TOP_K: usize = 12;
/// Default number of chunks retrieved for flashcards.
pub const DEFAULT_FLASHCARD_TOP_K: usize = 10;

const PAGE_BUFFER: usize = 4;

/// Chunking parameters applied during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Maximum characters of chunk text stored with each vector.
    pub chunk_text_max_chars: usize,
}

impl PipelineSettings {
    /// Read chunking parameters from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            chunk_text_max_chars: config.chunk_text_max_chars,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            chunk_text_max_chars: 1200,
        }
    }
}

/// External collaborators the pipeline sequences.
#[derive(Clone)]
pub struct Collaborators {
    /// Turns stored uploads into page texts.
    pub parser: Arc<dyn DocumentParser>,
    /// Produces document and query vectors.
    pub embedder: Arc<dyn EmbeddingClient>,
    /// Stores and searches chunk vectors.
    pub index: Arc<dyn VectorIndex>,
    /// Writes answers, summaries, and flashcards.
    pub generator: Arc<dyn AnswerGenerator>,
}

/// Coordinates the ingest and query pipelines for every HTTP request.
///
/// The service owns long-lived handles to its collaborators, the upload store, and the metrics
/// registry. It is immutable after construction; build it once near process start and share it
/// through an `Arc`.
pub struct ProcessingService {
    collaborators: Collaborators,
    uploads: UploadStore,
    settings: PipelineSettings,
    retry: RetryPolicy,
    metrics: Arc<PipelineMetrics>,
}

/// Abstraction over the processing pipeline used by external surfaces.
#[async_trait]
pub trait ProcessingApi: Send + Sync {
    /// Store, parse, chunk, embed, and index an upload for `student_id`.
    async fn ingest(
        &self,
        student_id: &str,
        upload: UploadedFile,
    ) -> Result<IngestOutcome, ProcessingError>;

    /// Answer `question` from the student's notes.
    async fn ask(
        &self,
        student_id: &str,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<AskOutcome, ProcessingError>;

    /// Summarize `topic` from the student's notes.
    async fn summarize(
        &self,
        student_id: &str,
        topic: &str,
        top_k: Option<usize>,
    ) -> Result<SummaryOutcome, ProcessingError>;

    /// Generate flashcards for `topic` from the student's notes.
    async fn flashcards(
        &self,
        student_id: &str,
        topic: &str,
        top_k: Option<usize>,
    ) -> Result<FlashcardsOutcome, ProcessingError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl ProcessingService {
    /// Assemble a service from explicit collaborators.
    pub fn new(
        collaborators: Collaborators,
        uploads: UploadStore,
        settings: PipelineSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            collaborators,
            uploads,
            settings,
            retry,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Build the production pipeline from configuration and make sure the collection exists.
    pub async fn from_config(config: &Config) -> Result<Self, ProcessingError> {
        tracing::info!("Initializing embedding client");
        let embedder = get_embedding_client(config)?;
        let generator = get_answer_generator(config)?;
        let qdrant = QdrantService::new(config).map_err(VectorIndexError::from)?;
        let vector_size = config.embedding_dimension as u64;
        tracing::debug!(
            collection = %qdrant.collection(),
            vector_size,
            "Ensuring primary collection"
        );
        qdrant
            .ensure_collection(vector_size)
            .await
            .map_err(VectorIndexError::from)?;
        tracing::debug!(collection = %qdrant.collection(), "Primary collection ready");

        let collaborators = Collaborators {
            parser: Arc::new(FileDocumentParser),
            embedder,
            index: Arc::new(qdrant),
            generator,
        };
        Ok(Self::new(
            collaborators,
            UploadStore::new(config.upload_dir.clone()),
            PipelineSettings::from_config(config),
            config.retry_policy(),
        ))
    }

    /// Store an upload and index its chunks under the student's namespace.
    ///
    /// Records from every page are written in one batch at the end, so a parse or embedding
    /// failure leaves nothing in the index. A failed write triggers a best-effort delete of the
    /// document's points, and any failure after the upload was stored removes the stored file.
    pub async fn ingest(
        &self,
        student_id: &str,
        upload: UploadedFile,
    ) -> Result<IngestOutcome, ProcessingError> {
        const MISSING: &str = "student_id and file are required";
        let namespace = require(student_id, MISSING)?;
        require(&upload.filename, MISSING)?;
        // The stored name decides how the file is parsed.
        let filename = sanitize_filename(&upload.filename);
        if DocumentFormat::from_filename(&filename).is_none() {
            return Err(ProcessingError::validation(format!(
                "Unsupported file type for '{}'; allowed: {}",
                upload.filename,
                DocumentFormat::ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let doc_id = Uuid::new_v4().to_string();
        tracing::info!(
            namespace,
            doc_id = %doc_id,
            filename = %filename,
            bytes = upload.bytes.len(),
            "Ingesting upload"
        );
        let path = self.uploads.save(&doc_id, &filename, &upload.bytes).await?;

        match self.index_document(namespace, &doc_id, &filename, &path).await {
            Ok(num_chunks) => {
                self.metrics.record_document(num_chunks as u64);
                tracing::info!(
                    namespace,
                    doc_id = %doc_id,
                    chunks = num_chunks,
                    "Document indexed"
                );
                Ok(IngestOutcome {
                    doc_id,
                    num_chunks,
                    filename,
                })
            }
            Err(error) => {
                tracing::warn!(namespace, doc_id = %doc_id, error = %error, "Ingest failed");
                self.uploads.remove(&path).await;
                Err(error)
            }
        }
    }

    async fn index_document(
        &self,
        namespace: &str,
        doc_id: &str,
        filename: &str,
        path: &Path,
    ) -> Result<usize, ProcessingError> {
        let (mut pages, producer) = self.stream_pages(path.to_path_buf());
        let mut records = Vec::new();
        let mut chunk_counter = 0usize;
        let mut page_number = 0usize;

        while let Some(page) = pages.recv().await {
            let page = page?;
            page_number += 1;
            let chunks = split_text(
                &page,
                self.settings.chunk_size,
                self.settings.chunk_overlap,
            )?;
            if chunks.is_empty() {
                tracing::debug!(doc_id, page = page_number, "Page has no text");
                continue;
            }

            let texts: Vec<String> = chunks.into_iter().map(|(_, text)| text).collect();
            let vectors = self.embed(texts.clone(), EmbeddingMode::Document).await?;
            tracing::debug!(doc_id, page = page_number, chunks = texts.len(), "Page embedded");

            for (text, values) in texts.into_iter().zip(vectors) {
                records.push(VectorRecord {
                    id: VectorRecord::chunk_identity(doc_id, chunk_counter),
                    values,
                    metadata: ChunkMetadata {
                        doc_id: doc_id.to_string(),
                        filename: filename.to_string(),
                        chunk_id: chunk_counter,
                        text: truncate_chars(&text, self.settings.chunk_text_max_chars),
                    },
                });
                chunk_counter += 1;
            }
        }

        // A parser panic also ends the page stream.
        producer.await.map_err(|error| ProcessingError::Upstream {
            stage: PipelineStage::Parse,
            message: error.to_string(),
        })?;

        if records.is_empty() {
            tracing::info!(namespace, doc_id, pages = page_number, "Document produced no chunks");
            return Ok(0);
        }

        let index = &self.collaborators.index;
        let written = self
            .retry
            .run("vector_upsert", || index.upsert(records.clone(), namespace))
            .await;
        if let Err(error) = written {
            if let Err(cleanup) = index.delete_document(namespace, doc_id).await {
                tracing::warn!(namespace, doc_id, error = %cleanup, "Rollback delete failed");
            }
            return Err(error.into());
        }
        Ok(chunk_counter)
    }

    /// Run the blocking parser on its own thread and hand pages over as they are produced.
    fn stream_pages(
        &self,
        path: PathBuf,
    ) -> (
        tokio::sync::mpsc::Receiver<Result<String, ParseError>>,
        tokio::task::JoinHandle<()>,
    ) {
        let (sender, receiver) = tokio::sync::mpsc::channel(PAGE_BUFFER);
        let parser = Arc::clone(&self.collaborators.parser);
        let producer = tokio::task::spawn_blocking(move || {
            let pages = match parser.parse(&path) {
                Ok(pages) => pages,
                Err(error) => {
                    let _ = sender.blocking_send(Err(error));
                    return;
                }
            };
            for page in pages {
                // Receiver is gone once the ingest has already failed.
                if sender.blocking_send(page).is_err() {
                    break;
                }
            }
        });
        (receiver, producer)
    }

    async fn embed(
        &self,
        texts: Vec<String>,
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, ProcessingError> {
        let expected = texts.len();
        let embedder = &self.collaborators.embedder;
        let vectors = self
            .retry
            .run("embedding", || embedder.generate_embeddings(texts.clone(), mode))
            .await?;
        if vectors.len() != expected {
            return Err(ProcessingError::Upstream {
                stage: PipelineStage::Embed,
                message: format!("expected {expected} vectors, got {}", vectors.len()),
            });
        }
        Ok(vectors)
    }

    async fn retrieve(
        &self,
        namespace: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, ProcessingError> {
        let mut vectors = self
            .embed(vec![query.to_string()], EmbeddingMode::Query)
            .await?;
        let vector = vectors.pop().unwrap_or_default();
        let index = &self.collaborators.index;
        let matches = self
            .retry
            .run("vector_query", || index.query(vector.clone(), namespace, top_k))
            .await?;
        tracing::debug!(namespace, top_k, matches = matches.len(), "Retrieved chunks");
        if matches.is_empty() {
            self.metrics.record_empty_retrieval();
        }
        Ok(matches)
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &str,
        temperature: f64,
    ) -> Result<String, ProcessingError> {
        let generator = &self.collaborators.generator;
        let text = self
            .retry
            .run("generation", || generator.complete(prompt, context, temperature))
            .await?;
        Ok(text)
    }

    /// Answer a question from the student's notes, citing the chunks used.
    pub async fn ask(
        &self,
        student_id: &str,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<AskOutcome, ProcessingError> {
        const MISSING: &str = "student_id and question are required";
        let namespace = require(student_id, MISSING)?;
        let question = require(question, MISSING)?;
        let top_k = resolve_top_k(top_k, DEFAULT_ASK_TOP_K)?;

        let matches = self.retrieve(namespace, question, top_k).await?;
        self.metrics.record_question();
        if matches.is_empty() {
            tracing::info!(namespace, top_k, "No matching notes for question");
            return Ok(AskOutcome {
                answer: ASK_FALLBACK.to_string(),
                context_used: Vec::new(),
            });
        }

        let context = prompts::cited_context(&matches);
        let answer = self.generate(question, &context, ANSWER_TEMPERATURE).await?;
        tracing::info!(namespace, top_k, matches = matches.len(), "Question answered");

        let context_used = matches
            .into_iter()
            .map(|hit| Citation {
                doc_id: hit.metadata.doc_id,
                filename: hit.metadata.filename,
                chunk_id: hit.metadata.chunk_id,
                score: hit.score,
            })
            .collect();
        Ok(AskOutcome {
            answer,
            context_used,
        })
    }

    /// Produce an exam-oriented summary of a topic from the student's notes.
    pub async fn summarize(
        &self,
        student_id: &str,
        topic: &str,
        top_k: Option<usize>,
    ) -> Result<SummaryOutcome, ProcessingError> {
        const MISSING: &str = "student_id and topic are required";
        let namespace = require(student_id, MISSING)?;
        let topic = require(topic, MISSING)?;
        let top_k = resolve_top_k(top_k, DEFAULT_SUMMARY_TOP_K)?;

        let matches = self.retrieve(namespace, topic, top_k).await?;
        self.metrics.record_summary();
        if matches.is_empty() {
            tracing::info!(namespace, top_k, "No matching notes for summary");
            return Ok(SummaryOutcome {
                topic: None,
                summary: SUMMARY_FALLBACK.to_string(),
            });
        }

        let context = prompts::cited_context(&matches);
        let summary = self
            .generate(&prompts::summary_prompt(topic), &context, ANSWER_TEMPERATURE)
            .await?;
        tracing::info!(namespace, top_k, matches = matches.len(), "Topic summarized");
        Ok(SummaryOutcome {
            topic: Some(topic.to_string()),
            summary,
        })
    }

    /// Generate flashcards for a topic. Unparseable output degrades to question lines.
    pub async fn flashcards(
        &self,
        student_id: &str,
        topic: &str,
        top_k: Option<usize>,
    ) -> Result<FlashcardsOutcome, ProcessingError> {
        const MISSING: &str = "student_id and topic are required";
        let namespace = require(student_id, MISSING)?;
        let topic = require(topic, MISSING)?;
        let top_k = resolve_top_k(top_k, DEFAULT_FLASHCARD_TOP_K)?;

        let matches = self.retrieve(namespace, topic, top_k).await?;
        let context = prompts::flashcard_context(&matches, topic);
        let response = self
            .generate(&prompts::flashcard_prompt(topic), &context, FLASHCARD_TEMPERATURE)
            .await?;

        let parse = FlashcardParse::from_response(&response);
        let fallback = parse.is_fallback();
        self.metrics.record_flashcards(fallback);
        let flashcards = parse.into_cards();
        tracing::info!(
            namespace,
            top_k,
            matches = matches.len(),
            cards = flashcards.len(),
            fallback,
            "Flashcards generated"
        );
        Ok(FlashcardsOutcome { flashcards })
    }

    /// Return the current pipeline metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl ProcessingApi for ProcessingService {
    async fn ingest(
        &self,
        student_id: &str,
        upload: UploadedFile,
    ) -> Result<IngestOutcome, ProcessingError> {
        ProcessingService::ingest(self, student_id, upload).await
    }

    async fn ask(
        &self,
        student_id: &str,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<AskOutcome, ProcessingError> {
        ProcessingService::ask(self, student_id, question, top_k).await
    }

    async fn summarize(
        &self,
        student_id: &str,
        topic: &str,
        top_k: Option<usize>,
    ) -> Result<SummaryOutcome, ProcessingError> {
        ProcessingService::summarize(self, student_id, topic, top_k).await
    }

    async fn flashcards(
        &self,
        student_id: &str,
        topic: &str,
        top_k: Option<usize>,
    ) -> Result<FlashcardsOutcome, ProcessingError> {
        ProcessingService::flashcards(self, student_id, topic, top_k).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        ProcessingService::metrics_snapshot(self)
    }
}

fn require<'a>(value: &'a str, message: &str) -> Result<&'a str, ProcessingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ProcessingError::validation(message));
    }
    Ok(trimmed)
}

fn resolve_top_k(top_k: Option<usize>, default: usize) -> Result<usize, ProcessingError> {
    match top_k {
        Some(0) => Err(ProcessingError::validation("top_k must be greater than zero")),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

/// Keep at most `max_chars` characters of `text`.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => text[..offset].to_string(),
        None => text.to_string(),
    }
}
