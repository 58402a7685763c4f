use super::{Step, StepContext};
use crate::error::Result;
use crate::pipeline::Session;
use crate::retrieval::Bm25Retriever;
use std::sync::Arc;

/// Indexes the session's `documents` into a shared retriever
///
/// The documents stay in the session. Ids already present in the retriever
/// are skipped, so re-running a chain over the same input is harmless.
#[derive(Debug, Clone)]
pub struct StoreStep {
    retriever: Arc<Bm25Retriever>,
}

impl StoreStep {
    pub fn new(retriever: Arc<Bm25Retriever>) -> Self {
        Self { retriever }
    }

    pub fn retriever(&self) -> &Arc<Bm25Retriever> {
        &self.retriever
    }
}

impl Step for StoreStep {
    fn name(&self) -> &str {
        "store"
    }

    fn run(&self, ctx: &StepContext<'_>, session: Session) -> Result<Session> {
        let documents = session.documents()?;
        if documents.is_empty() {
            tracing::debug!(
                "Chain {} step {} has no documents to store",
                ctx.chain_id,
                ctx.step_index
            );
            return Ok(session);
        }

        let report = self.retriever.add_documents(documents);
        tracing::info!(
            "Chain {} step {} stored {} documents ({} skipped)",
            ctx.chain_id,
            ctx.step_index,
            report.added,
            report.skipped
        );
        Ok(session)
    }
}
