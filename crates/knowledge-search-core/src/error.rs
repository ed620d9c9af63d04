//! Degradation records.
//!
//! Search never fails as a whole: when a sub-search or fetch fails, the
//! branch contributes nothing and one of these is attached to the
//! diagnostics instead.

use serde::Serialize;
use thiserror::Error;

use crate::models::RecordType;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchError {
    #[error("vector search failed for {record_type}: {message}")]
    VectorSearch {
        record_type: RecordType,
        message: String,
    },

    #[error("lexical search failed for {record_type}: {message}")]
    LexicalSearch {
        record_type: RecordType,
        message: String,
    },

    #[error("record fetch failed for {record_type}: {message}")]
    RecordFetch {
        record_type: RecordType,
        message: String,
    },

    #[error("skipped {record_type} '{id}': {reason}")]
    SkippedRecord {
        record_type: RecordType,
        id: String,
        reason: String,
    },

    #[error("search timed out after {timeout_ms} ms ({completed} of {total} record types finished)")]
    Timeout {
        timeout_ms: u64,
        completed: usize,
        total: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_serialize() {
        let err = SearchError::VectorSearch {
            record_type: RecordType::Topic,
            message: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "vector search failed for topic: connection refused"
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "vector_search");
        assert_eq!(json["record_type"], "topic");
    }
}
