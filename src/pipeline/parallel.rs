//! Fan-out step running named branches on copies of one session

use super::{Step, StepContext};
use crate::error::Result;
use crate::pipeline::Session;
use rayon::prelude::*;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Runs each branch on its own clone of the input session
///
/// The output session holds one key per branch, mapped to that branch's
/// resulting session as a JSON object. Keys of the input that no branch
/// produces are not carried over.
#[derive(Clone, Default)]
pub struct Parallel {
    name: String,
    branches: Vec<(String, Arc<dyn Step>)>,
}

impl Parallel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branches: Vec::new(),
        }
    }

    /// Add a branch; a later branch with the same key replaces the earlier one
    pub fn branch<S: Step + 'static>(mut self, key: impl Into<String>, step: S) -> Self {
        let key = key.into();
        self.branches.retain(|(existing, _)| *existing != key);
        self.branches.push((key, Arc::new(step)));
        self
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

impl Step for Parallel {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &StepContext<'_>, session: Session) -> Result<Session> {
        let results: Vec<(String, Session)> = self
            .branches
            .par_iter()
            .map(|(key, step)| -> Result<(String, Session)> {
                let output = step.run(ctx, session.clone())?;
                Ok((key.clone(), output))
            })
            .collect::<Result<_>>()?;

        let mut merged = Map::new();
        for (key, output) in results {
            merged.insert(key, Value::Object(output.into_map()));
        }
        tracing::debug!(
            "Parallel step {} merged {} branches",
            self.name,
            merged.len()
        );
        Ok(Session::from_map(merged))
    }
}
