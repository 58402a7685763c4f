//! Documents held by the retriever

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Metadata key under which query results carry their BM25 score
pub const SCORE_KEY: &str = "score";

/// An indexed text record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque identifier, unique within one retriever
    pub id: String,

    /// Raw text that gets tokenized and scored
    pub text: String,

    /// Free-form metadata carried through to results
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Create a document with a generated id
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), text)
    }

    /// Create a document with a caller-supplied id
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: Map::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Copy of the stored document with `metadata["score"]` set
    pub document: Document,
    /// BM25 score, higher is better
    pub score: f64,
}

impl ScoredDocument {
    pub(crate) fn new(document: &Document, score: f64) -> Self {
        let mut document = document.clone();
        document
            .metadata
            .insert(SCORE_KEY.to_string(), Value::from(score));
        Self { document, score }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Document::new("same text");
        let b = Document::new("same text");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_scored_document_annotates_copy() {
        let doc = Document::with_id("d1", "text").with_metadata("source", "tokyo_info");
        let hit = ScoredDocument::new(&doc, 1.5);

        assert_eq!(hit.document.metadata[SCORE_KEY], Value::from(1.5));
        assert_eq!(hit.document.metadata["source"], Value::from("tokyo_info"));
        assert!(!doc.metadata.contains_key(SCORE_KEY));
    }
}
