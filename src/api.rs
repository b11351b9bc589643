//! HTTP surface for the study assistant.
//!
//! This module exposes a compact Axum router:
//!
//! - `GET /health` – Liveness probe.
//! - `POST /upload` – Multipart upload (`student_id`, `file`); stores, chunks, embeds, and indexes
//!   the document under the student's namespace.
//! - `POST /ask` – Answer a question from the student's notes with chunk citations.
//! - `POST /summarize` – Exam-oriented summary of a topic.
//! - `POST /flashcards` – Question/answer cards for a topic.
//! - `GET /metrics` – Ingestion and query counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools.
//!
//! Every failure is a JSON `{ "error": "..." }` body. Validation problems (including malformed
//! JSON) are `400`; collaborator failures are `502`, except on `/flashcards` where they are `500`.

use crate::processing::{ProcessingApi, ProcessingError, UploadedFile};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Deserializer, Serialize, de, de::DeserializeOwned};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Build the HTTP router; `upload_max_bytes` caps request bodies.
pub fn create_router<S>(service: Arc<S>, upload_max_bytes: usize) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_document::<S>))
        .route("/ask", post(ask::<S>))
        .route("/summarize", post(summarize::<S>))
        .route("/flashcards", post(flashcards::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .layer(DefaultBodyLimit::max(upload_max_bytes))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Success response for `POST /upload`.
#[derive(Serialize)]
struct UploadResponse {
    ok: bool,
    doc_id: String,
    num_chunks: usize,
    filename: String,
}

/// Accept a multipart upload and run the ingest pipeline.
///
/// Unknown form fields are ignored. The upload is buffered in memory up to the router's body
/// limit before being written to the upload directory.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: ProcessingApi,
{
    let mut multipart = multipart.map_err(|rejection| AppError {
        status: StatusCode::BAD_REQUEST,
        message: rejection.body_text(),
    })?;

    let mut student_id = None;
    let mut file = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("student_id") => student_id = Some(field.text().await?),
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                file = Some(UploadedFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let (Some(student_id), Some(file)) = (student_id, file) else {
        return Err(AppError::bad_request("student_id and file are required"));
    };
    let outcome = service.ingest(&student_id, file).await?;
    tracing::info!(
        doc_id = %outcome.doc_id,
        chunks = outcome.num_chunks,
        "Upload request completed"
    );
    Ok(Json(UploadResponse {
        ok: true,
        doc_id: outcome.doc_id,
        num_chunks: outcome.num_chunks,
        filename: outcome.filename,
    }))
}

/// Request body for `POST /ask`.
#[derive(Deserialize)]
struct AskRequest {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    question: Option<String>,
    /// Defaults to 6 when absent.
    #[serde(default, deserialize_with = "lenient_top_k")]
    top_k: Option<usize>,
}

async fn ask<S>(State(service): State<Arc<S>>, body: Bytes) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let request: AskRequest = parse_json(&body)?;
    let outcome = service
        .ask(
            request.student_id.as_deref().unwrap_or_default(),
            request.question.as_deref().unwrap_or_default(),
            request.top_k,
        )
        .await?;
    Ok(Json(outcome).into_response())
}

/// Request body shared by `POST /summarize` and `POST /flashcards`.
#[derive(Deserialize)]
struct TopicRequest {
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default, deserialize_with = "lenient_top_k")]
    top_k: Option<usize>,
}

async fn summarize<S>(State(service): State<Arc<S>>, body: Bytes) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let request: TopicRequest = parse_json(&body)?;
    let outcome = service
        .summarize(
            request.student_id.as_deref().unwrap_or_default(),
            request.topic.as_deref().unwrap_or_default(),
            request.top_k,
        )
        .await?;
    Ok(Json(outcome).into_response())
}

async fn flashcards<S>(State(service): State<Arc<S>>, body: Bytes) -> Result<Response, AppError>
where
    S: ProcessingApi,
{
    let request: TopicRequest = parse_json(&body)?;
    let outcome = service
        .flashcards(
            request.student_id.as_deref().unwrap_or_default(),
            request.topic.as_deref().unwrap_or_default(),
            request.top_k,
        )
        .await
        .map_err(|error| AppError::from_processing(error, StatusCode::INTERNAL_SERVER_ERROR))?;
    Ok(Json(outcome).into_response())
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Response
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot()).into_response()
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery by clients and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness probe returning { \"ok\": true }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "upload",
                method: "POST",
                path: "/upload",
                description: "Multipart upload with fields `student_id` and `file` (.pdf, .docx, .txt, .md). Chunks, embeds, and indexes the document. Response returns { \"ok\": true, \"doc_id\": string, \"num_chunks\": number, \"filename\": string }.",
                request_example: None,
            },
            CommandDescriptor {
                name: "ask",
                method: "POST",
                path: "/ask",
                description: "Answer a question from the student's notes. `top_k` is optional and may be a number or numeric string. Response returns { \"answer\": string, \"context_used\": [{ \"doc_id\", \"filename\", \"chunk_id\", \"score\" }] }.",
                request_example: Some(json!({
                    "student_id": "student-42",
                    "question": "What is the mechanism of action of ACE inhibitors?",
                    "top_k": 6
                })),
            },
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Exam-oriented summary of a topic from the student's notes. Response returns { \"topic\": string, \"summary\": string }.",
                request_example: Some(json!({
                    "student_id": "student-42",
                    "topic": "Renin-angiotensin-aldosterone system",
                    "top_k": 12
                })),
            },
            CommandDescriptor {
                name: "flashcards",
                method: "POST",
                path: "/flashcards",
                description: "Generate question/answer flashcards for a topic. Response returns { \"flashcards\": [{ \"question\", \"answer\" }] }.",
                request_example: Some(json!({
                    "student_id": "student-42",
                    "topic": "Diabetes mellitus",
                    "top_k": 10
                })),
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return ingestion and query counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

/// Accepts `top_k` as a JSON number or a numeric string such as `"6"`.
fn lenient_top_k<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TopK {
        Number(usize),
        Text(String),
    }

    match Option::<TopK>::deserialize(deserializer)? {
        None => Ok(None),
        Some(TopK::Number(value)) => Ok(Some(value)),
        Some(TopK::Text(text)) => text.trim().parse().map(Some).map_err(|_| {
            de::Error::custom(format!("top_k must be a non-negative integer, got {text:?}"))
        }),
    }
}

/// Bodies are parsed regardless of `Content-Type`.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|error| AppError::bad_request(format!("Invalid JSON body: {error}")))
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Map a pipeline error, using `upstream_status` for collaborator failures.
    fn from_processing(error: ProcessingError, upstream_status: StatusCode) -> Self {
        let status = match &error {
            ProcessingError::Validation(_) => StatusCode::BAD_REQUEST,
            ProcessingError::Upstream { .. } => upstream_status,
            ProcessingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(status = %status, error = %error, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %error, "Request rejected");
        }
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ProcessingError> for AppError {
    fn from(inner: ProcessingError) -> Self {
        Self::from_processing(inner, StatusCode::BAD_GATEWAY)
    }
}

impl From<MultipartError> for AppError {
    fn from(error: MultipartError) -> Self {
        Self {
            status: error.status(),
            message: error.body_text(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        AskOutcome, Citation, Flashcard, FlashcardsOutcome, IngestOutcome, PipelineStage,
        ProcessingApi, ProcessingError, SummaryOutcome, UploadedFile,
    };
    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    const BOUNDARY: &str = "studyrag-boundary";

    #[tokio::test]
    async fn commands_catalog_exposes_upload_and_ask() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let upload = commands
            .iter()
            .find(|cmd| cmd.name == "upload")
            .expect("upload command present");
        assert_eq!(upload.method, "POST");
        assert_eq!(upload.path, "/upload");
        assert!(commands.iter().any(|cmd| cmd.path == "/ask"));
        assert!(commands.len() >= 5);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(app(StubProcessingService::default()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn ask_forwards_fields_and_returns_citations() {
        let service = Arc::new(StubProcessingService::default());
        let router = create_router(service.clone(), 1024 * 1024);

        let (status, body) = send(
            router,
            post_json(
                "/ask",
                json!({ "student_id": "s1", "question": "What is GFR?", "top_k": 3 }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "stub answer");
        assert_eq!(body["context_used"][0]["filename"], "renal.pdf");
        assert_eq!(body["context_used"][0]["chunk_id"], 4);

        let calls = service.calls.lock().await.clone();
        assert_eq!(calls, vec![("ask".to_string(), "s1".to_string(), "What is GFR?".to_string(), Some(3))]);
    }

    #[tokio::test]
    async fn missing_fields_are_passed_as_empty_strings() {
        let service = Arc::new(StubProcessingService::default());
        let router = create_router(service.clone(), 1024 * 1024);

        let (status, _) = send(router, post_json("/summarize", json!({ "topic": "RAAS" }))).await;
        assert_eq!(status, StatusCode::OK);

        let calls = service.calls.lock().await.clone();
        assert_eq!(calls[0].1, "");
        assert_eq!(calls[0].3, None);
    }

    #[tokio::test]
    async fn numeric_string_top_k_is_accepted() {
        let service = Arc::new(StubProcessingService::default());
        let router = create_router(service.clone(), 1024 * 1024);

        let (status, _) = send(
            router.clone(),
            post_json("/flashcards", json!({ "student_id": "s1", "topic": "ATP", "top_k": " 7 " })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(
            router.clone(),
            post_json("/ask", json!({ "student_id": "s1", "question": "q?", "top_k": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            router,
            post_json("/ask", json!({ "student_id": "s1", "question": "q?", "top_k": "many" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("error").contains("top_k"));

        let calls = service.calls.lock().await.clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].3, Some(7));
        assert_eq!(calls[1].3, None);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/ask")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .expect("request");

        let (status, body) = send(app(StubProcessingService::default()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("error").contains("Invalid JSON"));
    }

    #[tokio::test]
    async fn json_without_content_type_is_accepted() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/flashcards")
            .body(Body::from(json!({ "student_id": "s1", "topic": "ATP" }).to_string()))
            .expect("request");

        let (status, body) = send(app(StubProcessingService::default()), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["flashcards"][0]["question"], "What is ATP?");
    }

    #[tokio::test]
    async fn error_statuses_follow_the_failure_kind() {
        let upstream = || StubProcessingService::failing(|| ProcessingError::Upstream {
            stage: PipelineStage::Generate,
            message: "model offline".into(),
        });
        let payload = json!({ "student_id": "s1", "question": "q", "topic": "t" });

        let (status, body) = send(app(upstream()), post_json("/ask", payload.clone())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().expect("error").contains("model offline"));

        let (status, _) = send(app(upstream()), post_json("/summarize", payload.clone())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, _) = send(app(upstream()), post_json("/flashcards", payload.clone())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let invalid = StubProcessingService::failing(|| {
            ProcessingError::validation("student_id and question are required")
        });
        let (status, body) = send(app(invalid), post_json("/ask", payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "student_id and question are required");
    }

    #[tokio::test]
    async fn upload_forwards_multipart_fields() {
        let service = Arc::new(StubProcessingService::default());
        let router = create_router(service.clone(), 1024 * 1024);

        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"student_id\"\r\n\r\ns1\r\n\
             --{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
             Content-Type: text/plain\r\n\r\nOsmosis notes\r\n--{BOUNDARY}--\r\n"
        );
        let (status, json) = send(router, multipart_request(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["doc_id"], "doc-1");
        assert_eq!(json["num_chunks"], 2);

        let uploads = service.uploads.lock().await.clone();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "s1");
        assert_eq!(uploads[0].1.filename, "notes.txt");
        assert_eq!(uploads[0].1.bytes, b"Osmosis notes");
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected_before_ingest() {
        let service = Arc::new(StubProcessingService::default());
        let router = create_router(service.clone(), 1024 * 1024);

        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"student_id\"\r\n\r\ns1\r\n--{BOUNDARY}--\r\n"
        );
        let (status, json) = send(router, multipart_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "student_id and file are required");
        assert!(service.uploads.lock().await.is_empty());
    }

    #[tokio::test]
    async fn upload_requires_multipart_body() {
        let (status, json) = send(
            app(StubProcessingService::default()),
            post_json("/upload", json!({ "student_id": "s1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn metrics_returns_snapshot() {
        let (status, body) = send(app(StubProcessingService::default()), get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documents_ingested"], 7);
        assert_eq!(body["flashcard_fallbacks"], 0);
    }

    fn app(service: StubProcessingService) -> Router {
        create_router(Arc::new(service), 1024 * 1024)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn post_json(uri: &str, payload: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    fn multipart_request(body: String) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("request")
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.expect("router response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    type QueryCall = (String, String, String, Option<usize>);

    #[derive(Default)]
    struct StubProcessingService {
        calls: Mutex<Vec<QueryCall>>,
        uploads: Mutex<Vec<(String, UploadedFile)>>,
        failure: Option<fn() -> ProcessingError>,
    }

    impl StubProcessingService {
        fn failing(failure: fn() -> ProcessingError) -> Self {
            Self {
                failure: Some(failure),
                ..Self::default()
            }
        }

        async fn record(
            &self,
            kind: &str,
            student_id: &str,
            text: &str,
            top_k: Option<usize>,
        ) -> Result<(), ProcessingError> {
            self.calls.lock().await.push((
                kind.to_string(),
                student_id.to_string(),
                text.to_string(),
                top_k,
            ));
            match self.failure {
                Some(failure) => Err(failure()),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl ProcessingApi for StubProcessingService {
        async fn ingest(
            &self,
            student_id: &str,
            upload: UploadedFile,
        ) -> Result<IngestOutcome, ProcessingError> {
            let filename = upload.filename.clone();
            self.uploads
                .lock()
                .await
                .push((student_id.to_string(), upload));
            Ok(IngestOutcome {
                doc_id: "doc-1".into(),
                num_chunks: 2,
                filename,
            })
        }

        async fn ask(
            &self,
            student_id: &str,
            question: &str,
            top_k: Option<usize>,
        ) -> Result<AskOutcome, ProcessingError> {
            self.record("ask", student_id, question, top_k).await?;
            Ok(AskOutcome {
                answer: "stub answer".into(),
                context_used: vec![Citation {
                    doc_id: "doc-1".into(),
                    filename: "renal.pdf".into(),
                    chunk_id: 4,
                    score: 0.5,
                }],
            })
        }

        async fn summarize(
            &self,
            student_id: &str,
            topic: &str,
            top_k: Option<usize>,
        ) -> Result<SummaryOutcome, ProcessingError> {
            self.record("summarize", student_id, topic, top_k).await?;
            Ok(SummaryOutcome {
                topic: Some(topic.to_string()),
                summary: "stub summary".into(),
            })
        }

        async fn flashcards(
            &self,
            student_id: &str,
            topic: &str,
            top_k: Option<usize>,
        ) -> Result<FlashcardsOutcome, ProcessingError> {
            self.record("flashcards", student_id, topic, top_k).await?;
            Ok(FlashcardsOutcome {
                flashcards: vec![Flashcard {
                    question: "What is ATP?".into(),
                    answer: "Energy currency".into(),
                }],
            })
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_ingested: 7,
                ..MetricsSnapshot::default()
            }
        }
    }
}
