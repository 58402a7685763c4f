//! Pipeline composition
//!
//! A pipeline is an ordered list of steps, each a function of the shared
//! [`Session`]. Every pipeline carries a chain id; composing two pipelines
//! keeps the left one's id, so objects registered per `(chain_id, step)` in
//! the [`ComponentRegistry`] stay grouped under one logical chain.

mod parallel;
mod retriever_step;
mod session;
mod store_step;

pub use parallel::Parallel;
pub use retriever_step::RetrieverStep;
pub use session::{Session, DOCUMENTS_KEY, PROMPT_KEY};
pub use store_step::StoreStep;

use crate::error::Result;
use crate::registry::ComponentRegistry;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What a step knows about where it runs
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub chain_id: &'a str,
    pub step_index: usize,
    pub registry: Option<&'a ComponentRegistry>,
}

/// One unit of pipeline work
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    /// Chain id carried by the step, if it is a pipeline
    fn chain_id(&self) -> Option<&str> {
        None
    }

    fn run(&self, ctx: &StepContext<'_>, session: Session) -> Result<Session>;
}

/// Step backed by a closure
pub struct FnStep<F> {
    name: String,
    func: F,
}

impl<F> Step for FnStep<F>
where
    F: Fn(&StepContext<'_>, Session) -> Result<Session> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &StepContext<'_>, session: Session) -> Result<Session> {
        (self.func)(ctx, session)
    }
}

/// Wrap a closure as a named step
pub fn step<F>(name: impl Into<String>, func: F) -> FnStep<F>
where
    F: Fn(&StepContext<'_>, Session) -> Result<Session> + Send + Sync,
{
    FnStep {
        name: name.into(),
        func,
    }
}

/// Short random chain id (8 hex chars)
pub fn generate_chain_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Ordered steps sharing one chain id
#[derive(Clone)]
pub struct Pipeline {
    chain_id: String,
    steps: Vec<Arc<dyn Step>>,
    registry: Option<Arc<ComponentRegistry>>,
}

impl Pipeline {
    /// Empty pipeline with a fresh chain id
    pub fn new() -> Self {
        Self::with_chain_id(generate_chain_id())
    }

    pub fn with_chain_id(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            steps: Vec::new(),
            registry: None,
        }
    }

    /// Registry handed to every step through its context
    pub fn with_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Append a step
    pub fn then<S: Step + 'static>(self, step: S) -> Self {
        self.then_arc(Arc::new(step))
    }

    pub fn then_arc(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Append all of `other`'s steps; the result keeps this pipeline's chain id
    pub fn pipe(mut self, other: Pipeline) -> Self {
        self.steps.extend(other.steps);
        if self.registry.is_none() {
            self.registry = other.registry;
        }
        self
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order
    pub fn invoke(&self, session: Session) -> Result<Session> {
        self.run_steps(self.registry.as_deref(), session)
    }

    fn run_steps(
        &self,
        registry: Option<&ComponentRegistry>,
        mut session: Session,
    ) -> Result<Session> {
        for (step_index, step) in self.steps.iter().enumerate() {
            let ctx = StepContext {
                chain_id: &self.chain_id,
                step_index,
                registry,
            };
            tracing::debug!(
                "Chain {} step {} ({}) starting",
                self.chain_id,
                step_index,
                step.name()
            );
            session = step.run(&ctx, session).map_err(|e| {
                tracing::warn!(
                    "Chain {} step {} ({}) failed: {}",
                    self.chain_id,
                    step_index,
                    step.name(),
                    e
                );
                e
            })?;
        }
        Ok(session)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("chain_id", &self.chain_id)
            .field("steps", &self.step_names())
            .finish()
    }
}

/// A nested pipeline runs with its own chain id, falling back to the
/// parent's registry when it has none.
impl Step for Pipeline {
    fn name(&self) -> &str {
        &self.chain_id
    }

    fn chain_id(&self) -> Option<&str> {
        Some(&self.chain_id)
    }

    fn run(&self, ctx: &StepContext<'_>, session: Session) -> Result<Session> {
        let registry = self.registry.as_deref().or(ctx.registry);
        self.run_steps(registry, session)
    }
}

/// Build a pipeline from steps, in order
///
/// When the first step is itself a pipeline its chain id is carried
/// forward; otherwise a fresh one is generated.
pub fn compose<I>(steps: I) -> Pipeline
where
    I: IntoIterator<Item = Arc<dyn Step>>,
{
    let mut steps = steps.into_iter().peekable();
    let pipeline = match steps.peek().and_then(|first| first.chain_id()) {
        Some(chain_id) => Pipeline::with_chain_id(chain_id),
        None => Pipeline::new(),
    };
    steps.fold(pipeline, |pipeline, step| pipeline.then_arc(step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnappyError;
    use chrono::Duration;
    use serde_json::{json, Value};

    fn append(
        tag: &'static str,
    ) -> FnStep<impl Fn(&StepContext<'_>, Session) -> Result<Session> + Send + Sync> {
        step(tag, move |_ctx: &StepContext<'_>, mut session: Session| {
            let mut trail = session.get_str("trail").unwrap_or("").to_string();
            trail.push_str(tag);
            session.insert("trail", trail);
            Ok(session)
        })
    }

    #[test]
    fn test_steps_run_in_order() {
        let pipeline = Pipeline::new().then(append("a")).then(append("b")).then(append("c"));
        let out = pipeline.invoke(Session::new()).unwrap();
        assert_eq!(out.get_str("trail"), Some("abc"));
    }

    #[test]
    fn test_chain_id_generation() {
        let a = generate_chain_id();
        let b = generate_chain_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_pipe_keeps_left_chain_id() {
        let left = Pipeline::with_chain_id("left").then(append("a"));
        let right = Pipeline::with_chain_id("right").then(append("b"));
        let combined = left.pipe(right);

        assert_eq!(combined.chain_id(), "left");
        assert_eq!(combined.step_names(), vec!["a", "b"]);
        let out = combined.invoke(Session::new()).unwrap();
        assert_eq!(out.get_str("trail"), Some("ab"));
    }

    #[test]
    fn test_compose() {
        let steps: Vec<Arc<dyn Step>> = vec![Arc::new(append("x")), Arc::new(append("y"))];
        let pipeline = compose(steps);
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline.chain_id().len(), 8);
        assert_eq!(
            pipeline.invoke(Session::new()).unwrap().get_str("trail"),
            Some("xy")
        );
    }

    #[test]
    fn test_compose_keeps_leading_pipeline_id() {
        let head: Arc<dyn Step> =
            Arc::new(Pipeline::with_chain_id("head0001").then(append("a")));
        let tail: Arc<dyn Step> = Arc::new(append("b"));
        let pipeline = compose(vec![head, tail]);

        assert_eq!(pipeline.chain_id(), "head0001");
        assert_eq!(
            pipeline.invoke(Session::new()).unwrap().get_str("trail"),
            Some("ab")
        );
    }

    #[test]
    fn test_error_stops_pipeline() {
        let failing = step("fail", |_ctx: &StepContext<'_>, _session: Session| {
            Err(SnappyError::MissingSessionKey {
                key: "query".to_string(),
            })
        });
        let pipeline = Pipeline::new()
            .then(append("a"))
            .then(failing)
            .then(append("b"));

        assert!(matches!(
            pipeline.invoke(Session::new()),
            Err(SnappyError::MissingSessionKey { .. })
        ));
    }

    #[test]
    fn test_context_exposes_chain_and_registry() {
        let registry = Arc::new(ComponentRegistry::new(Duration::hours(1)));
        let record = |name: &'static str| {
            step(name, |ctx: &StepContext<'_>, session: Session| {
                if let Some(registry) = ctx.registry {
                    registry.set_chain_object(ctx.chain_id, ctx.step_index, ctx.step_index);
                }
                Ok(session)
            })
        };
        let pipeline = Pipeline::with_chain_id("chain-1")
            .with_registry(Arc::clone(&registry))
            .then(record("first"))
            .then(record("second"));

        pipeline.invoke(Session::new()).unwrap();

        let objects = registry.get_chain_objects("chain-1");
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].1.downcast_ref::<usize>(), Some(&1));
    }

    #[test]
    fn test_nested_pipeline_uses_parent_registry() {
        let registry = Arc::new(ComponentRegistry::new(Duration::hours(1)));
        let inner = Pipeline::with_chain_id("inner").then(step(
            "touch",
            |ctx: &StepContext<'_>, mut session: Session| {
                session.insert("has_registry", ctx.registry.is_some());
                session.insert("chain", ctx.chain_id);
                Ok(session)
            },
        ));
        let outer = Pipeline::with_chain_id("outer")
            .with_registry(registry)
            .then(inner);

        let out = outer.invoke(Session::new()).unwrap();
        assert_eq!(out.get("has_registry"), Some(&Value::Bool(true)));
        assert_eq!(out.get("chain"), Some(&json!("inner")));
    }
}
