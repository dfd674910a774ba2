//! Payload - the opaque value attached to a capture slot
//!
//! Producers fill slots (sensor output, annotation values, metric values) with
//! a `Payload`; the schema is identified by the definition id stored next to it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Closed set of payload encodings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// No value (placeholder for slots still awaiting a report)
    #[default]
    Empty,

    /// Structured fields (bounding boxes, keypoints, object counts, ...)
    Json(serde_json::Value),

    /// Scalar series (e.g. per-label pixel counts)
    Values(Vec<f64>),

    /// Raw buffer (e.g. a read-back image)
    Blob(Bytes),

    /// Reference to data already persisted by the producer
    File { path: String },
}

impl Payload {
    /// Whether this is the `Empty` placeholder
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Short name of the encoding, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Json(_) => "json",
            Self::Values(_) => "values",
            Self::Blob(_) => "blob",
            Self::File { .. } => "file",
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Vec<f64>> for Payload {
    fn from(values: Vec<f64>) -> Self {
        Self::Values(values)
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::Blob(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_serialization() {
        let payload = Payload::Json(json!({ "count": 3 }));
        let text = serde_json::to_string(&payload).unwrap();
        assert_eq!(text, r#"{"kind":"json","data":{"count":3}}"#);

        let file = Payload::File {
            path: "rgb/step_4.png".into(),
        };
        let back: Payload = serde_json::from_str(&serde_json::to_string(&file).unwrap()).unwrap();
        assert_eq!(back, file);
    }

    #[test]
    fn test_kind_and_default() {
        assert!(Payload::default().is_empty());
        assert_eq!(Payload::from(vec![1.0, 2.0]).kind(), "values");
        assert_eq!(Payload::from(Bytes::from_static(b"px")).kind(), "blob");
    }
}
