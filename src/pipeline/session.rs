//! Shared mapping passed from step to step

use crate::error::{Result, SnappyError};
use crate::retrieval::Document;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding the retrieved / loaded documents
pub const DOCUMENTS_KEY: &str = "documents";
/// Key holding the list of prompt messages, each `{role: content}`
pub const PROMPT_KEY: &str = "prompt";

/// JSON object threaded through a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session {
    values: Map<String, Value>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    /// Documents stored under `documents`; empty when the key is absent
    pub fn documents(&self) -> Result<Vec<Document>> {
        match self.values.get(DOCUMENTS_KEY) {
            None => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| SnappyError::Json {
                source: e,
                context: "Failed to read session documents".to_string(),
            }),
        }
    }

    pub fn set_documents(&mut self, documents: &[Document]) -> Result<()> {
        let value = serde_json::to_value(documents).map_err(|e| SnappyError::Json {
            source: e,
            context: "Failed to store session documents".to_string(),
        })?;
        self.values.insert(DOCUMENTS_KEY.to_string(), value);
        Ok(())
    }

    /// Prompt messages in insertion order
    pub fn prompt(&self) -> &[Value] {
        self.values
            .get(PROMPT_KEY)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append a `{role: content}` message to the prompt list
    pub fn push_prompt(&mut self, role: &str, content: impl Into<String>) {
        let mut message = Map::new();
        message.insert(role.to_string(), Value::String(content.into()));

        let entry = self
            .values
            .entry(PROMPT_KEY)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !entry.is_array() {
            tracing::warn!("Session key '{}' was not a list, replacing it", PROMPT_KEY);
            *entry = Value::Array(Vec::new());
        }
        if let Value::Array(messages) = entry {
            messages.push(Value::Object(message));
        }
    }
}

impl From<Map<String, Value>> for Session {
    fn from(values: Map<String, Value>) -> Self {
        Self::from_map(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_documents_round_trip() {
        let mut session = Session::new();
        assert!(session.documents().unwrap().is_empty());

        let docs = vec![Document::with_id("a", "text").with_metadata("source", "x")];
        session.set_documents(&docs).unwrap();
        assert_eq!(session.documents().unwrap(), docs);
    }

    #[test]
    fn test_malformed_documents() {
        let mut session = Session::new();
        session.insert(DOCUMENTS_KEY, json!("not a list"));
        assert!(matches!(
            session.documents(),
            Err(SnappyError::Json { .. })
        ));
    }

    #[test]
    fn test_prompt_messages() {
        let mut session = Session::new();
        assert!(session.prompt().is_empty());

        session.push_prompt("system", "You are helpful");
        session.push_prompt("human", "Hello");

        assert_eq!(
            session.prompt(),
            &[json!({"system": "You are helpful"}), json!({"human": "Hello"})]
        );
    }

    #[test]
    fn test_serializes_as_plain_object() {
        let mut session = Session::new();
        session.insert("query", "日本");
        assert_eq!(serde_json::to_value(&session).unwrap(), json!({"query": "日本"}));
    }
}
