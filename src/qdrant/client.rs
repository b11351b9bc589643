//! HTTP client wrapper for interacting with Qdrant.

use crate::config::Config;
use crate::index::{IndexMatch, VectorIndex, VectorIndexError, VectorRecord};
use crate::qdrant::{
    filters::{document_filter, namespace_filter},
    payload::{build_payload, current_timestamp_rfc3339, parse_metadata, point_id},
    types::{QdrantError, QueryResponse, QueryResponseResult},
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};

/// Lightweight HTTP client for Qdrant operations.
///
/// All students share one collection; the `namespace` payload field partitions it.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
}

impl QdrantService {
    /// Construct a new client from configuration.
    pub fn new(config: &Config) -> Result<Self, QdrantError> {
        let client = Client::builder().user_agent("studyrag/0.1").build()?;

        let base_url = normalize_base_url(&config.qdrant_url).map_err(QdrantError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection = %config.qdrant_collection_name,
            has_api_key = %config
                .qdrant_api_key
                .as_deref()
                .map(|value| !value.is_empty())
                .unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.qdrant_api_key.clone(),
            collection: config.qdrant_collection_name.clone(),
        })
    }

    /// Name of the collection this client writes to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection and its payload indexes when missing.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<(), QdrantError> {
        if !self.collection_exists().await? {
            tracing::debug!(collection = %self.collection, vector_size, "Creating collection");
            self.create_collection(vector_size).await?;
        }
        self.ensure_payload_indexes().await
    }

    /// Create or update the collection with the specified vector size.
    pub async fn create_collection(&self, vector_size: u64) -> Result<(), QdrantError> {
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Collection ensured/created");
        })
        .await
    }

    /// Ensure keyword indexes exist for the fields every request filters on.
    pub async fn ensure_payload_indexes(&self) -> Result<(), QdrantError> {
        for field in ["namespace", "doc_id"] {
            let body = json!({
                "field_name": field,
                "field_schema": "keyword",
            });

            let response = self
                .request(Method::PUT, &format!("collections/{}/index", self.collection))
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() {
                tracing::debug!(collection = %self.collection, field, "Payload index ensured");
            } else if response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, "Payload index already exists");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    /// Upload vectors into the collection, tagging each with `namespace`.
    pub async fn upsert_points(
        &self,
        records: Vec<VectorRecord>,
        namespace: &str,
    ) -> Result<usize, QdrantError> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let points: Vec<_> = records
            .iter()
            .map(|record| {
                json!({
                    "id": point_id(&record.id),
                    "vector": record.values,
                    "payload": build_payload(record, namespace, &now),
                })
            })
            .collect();

        let point_count = points.len();
        let response = self
            .request(Method::PUT, &format!("collections/{}/points", self.collection))
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                namespace,
                points = point_count,
                "Points upserted"
            );
        })
        .await?;

        Ok(point_count)
    }

    /// Similarity search restricted to `namespace`.
    pub async fn search_points(
        &self,
        vector: Vec<f32>,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<IndexMatch>, QdrantError> {
        let body = json!({
            "query": vector,
            "limit": limit,
            "with_payload": true,
            "filter": namespace_filter(namespace),
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, namespace, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        let matches = points
            .into_iter()
            .filter_map(|point| {
                let id = stringify_point_id(point.id);
                match point.payload.and_then(parse_metadata) {
                    Some(metadata) => Some(IndexMatch {
                        id,
                        score: point.score,
                        metadata,
                    }),
                    None => {
                        tracing::warn!(point = %id, "Skipping match with incomplete payload");
                        None
                    }
                }
            })
            .collect();

        Ok(matches)
    }

    /// Delete every point matching `filter`.
    pub async fn delete_by_filter(&self, filter: Value) -> Result<(), QdrantError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, "Points deleted by filter");
        })
        .await
    }

    async fn collection_exists(&self) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = QdrantError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantService {
    async fn upsert(
        &self,
        records: Vec<VectorRecord>,
        namespace: &str,
    ) -> Result<usize, VectorIndexError> {
        Ok(self.upsert_points(records, namespace).await?)
    }

    async fn query(
        &self,
        vector: Vec<f32>,
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<IndexMatch>, VectorIndexError> {
        Ok(self.search_points(vector, namespace, top_k).await?)
    }

    async fn delete_document(
        &self,
        namespace: &str,
        doc_id: &str,
    ) -> Result<(), VectorIndexError> {
        Ok(self
            .delete_by_filter(document_filter(namespace, doc_id))
            .await?)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: Value) -> String {
    match id {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
