//! Filter helpers scoping Qdrant requests to a namespace.

use serde_json::{Value, json};

/// Filter matching every point in `namespace`.
pub fn namespace_filter(namespace: &str) -> Value {
    json!({
        "must": [
            { "key": "namespace", "match": { "value": namespace } }
        ]
    })
}

/// Filter matching the points of one document within `namespace`.
pub fn document_filter(namespace: &str, doc_id: &str) -> Value {
    json!({
        "must": [
            { "key": "namespace", "match": { "value": namespace } },
            { "key": "doc_id", "match": { "value": doc_id } }
        ]
    })
}
