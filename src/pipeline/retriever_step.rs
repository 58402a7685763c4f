use super::{Step, StepContext};
use crate::error::{Result, SnappyError};
use crate::pipeline::Session;
use crate::retrieval::{Bm25Retriever, Document};
use std::sync::Arc;

const DEFAULT_QUERY_KEY: &str = "query";

/// Queries a shared retriever and stores the hits under `documents`
///
/// Each stored document carries its BM25 score in `metadata["score"]`.
#[derive(Debug, Clone)]
pub struct RetrieverStep {
    retriever: Arc<Bm25Retriever>,
    query_key: String,
    k: Option<usize>,
}

impl RetrieverStep {
    pub fn new(retriever: Arc<Bm25Retriever>) -> Self {
        Self {
            retriever,
            query_key: DEFAULT_QUERY_KEY.to_string(),
            k: None,
        }
    }

    /// Session key holding the query text (default `query`)
    pub fn with_query_key(mut self, key: impl Into<String>) -> Self {
        self.query_key = key.into();
        self
    }

    /// Result count for this step; the retriever's default when unset
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

impl Step for RetrieverStep {
    fn name(&self) -> &str {
        "retriever"
    }

    fn run(&self, ctx: &StepContext<'_>, mut session: Session) -> Result<Session> {
        let query = match session.get(&self.query_key) {
            None => {
                return Err(SnappyError::MissingSessionKey {
                    key: self.query_key.clone(),
                })
            }
            Some(value) => value.as_str().ok_or_else(|| SnappyError::Step {
                step: self.name().to_string(),
                message: format!("session key '{}' is not a string", self.query_key),
            })?,
        };

        let hits = self.retriever.query(query, self.k)?;
        tracing::debug!(
            "Chain {} step {} retrieved {} documents",
            ctx.chain_id,
            ctx.step_index,
            hits.len()
        );

        let documents: Vec<Document> = hits.into_iter().map(|hit| hit.document).collect();
        session.set_documents(&documents)?;
        Ok(session)
    }
}
