//! Helpers for constructing and decoding Qdrant point payloads.

use crate::index::{ChunkMetadata, VectorRecord};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Build the payload object stored alongside each chunk vector.
pub(crate) fn build_payload(record: &VectorRecord, namespace: &str, timestamp_rfc3339: &str) -> Value {
    let metadata = &record.metadata;
    let mut payload = Map::new();
    payload.insert("namespace".into(), Value::String(namespace.to_string()));
    payload.insert("vector_id".into(), Value::String(record.id.clone()));
    payload.insert("doc_id".into(), Value::String(metadata.doc_id.clone()));
    payload.insert("filename".into(), Value::String(metadata.filename.clone()));
    payload.insert("chunk_id".into(), Value::from(metadata.chunk_id));
    payload.insert("text".into(), Value::String(metadata.text.clone()));
    payload.insert(
        "ingested_at".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Decode citation metadata from a stored payload.
///
/// Returns `None` when a required field is missing or has the wrong type.
pub(crate) fn parse_metadata(payload: Map<String, Value>) -> Option<ChunkMetadata> {
    serde_json::from_value(Value::Object(payload)).ok()
}

/// Qdrant only accepts UUIDs or integers as point ids, so chunk identities map onto a
/// name-based UUID. The same identity always yields the same point.
pub(crate) fn point_id(vector_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, vector_id.as_bytes()).to_string()
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> VectorRecord {
        VectorRecord {
            id: VectorRecord::chunk_identity("doc-1", 3),
            values: vec![0.5, 0.5],
            metadata: ChunkMetadata {
                doc_id: "doc-1".into(),
                filename: "cardio.pdf".into(),
                chunk_id: 3,
                text: "Preload is end-diastolic volume.".into(),
            },
        }
    }

    #[test]
    fn point_id_is_deterministic_uuid() {
        let first = point_id("doc-1-3");
        assert_eq!(first, point_id("doc-1-3"));
        assert_ne!(first, point_id("doc-1-4"));
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }

    #[test]
    fn payload_carries_citation_fields_and_namespace() {
        let payload = build_payload(&sample_record(), "student-7", "2025-01-01T00:00:00Z");
        assert_eq!(payload["namespace"], "student-7");
        assert_eq!(payload["vector_id"], "doc-1-3");
        assert_eq!(payload["doc_id"], "doc-1");
        assert_eq!(payload["filename"], "cardio.pdf");
        assert_eq!(payload["chunk_id"], 3);
        assert_eq!(payload["text"], "Preload is end-diastolic volume.");
        assert_eq!(payload["ingested_at"], "2025-01-01T00:00:00Z");
        assert_eq!(payload.as_object().map(Map::len), Some(7));
    }

    #[test]
    fn parse_metadata_round_trips_built_payload() {
        let record = sample_record();
        let payload = build_payload(&record, "student-7", "2025-01-01T00:00:00Z");
        let Value::Object(map) = payload else {
            panic!("payload should be an object");
        };
        assert_eq!(parse_metadata(map), Some(record.metadata));
    }

    #[test]
    fn parse_metadata_rejects_incomplete_payload() {
        let mut map = Map::new();
        map.insert("text".into(), Value::String("orphan".into()));
        assert!(parse_metadata(map).is_none());
    }
}
