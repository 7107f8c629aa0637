//! Turning unstructured text into task candidates.
//!
//! Every extractor implements [`Extractor`]; [`FirstNonEmpty`] stacks a
//! deterministic extractor in front of an AI-assisted one so the engine never
//! needs to know which layer produced the result.

pub mod ai;
pub mod requirements;
pub mod todo;

use async_trait::async_trait;
use thiserror::Error;

use crate::priority::Priority;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCandidate {
    pub description: String,
    pub priority: Priority,
    /// 1-based line in the source text, when the extractor knows it.
    pub line: Option<usize>,
}

impl TaskCandidate {
    pub fn new(description: impl Into<String>, priority: Priority, line: Option<usize>) -> Self {
        TaskCandidate {
            description: description.into(),
            priority,
            line,
        }
    }
}

/// An empty result is not an error; only an aborted model call propagates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Model call aborted")]
    Aborted,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, text: &str) -> Result<Vec<TaskCandidate>, ExtractError>;
}

/// Runs each layer in order and returns the first non-empty result.
pub struct FirstNonEmpty<'a> {
    layers: Vec<&'a dyn Extractor>,
}

impl<'a> FirstNonEmpty<'a> {
    pub fn new(layers: Vec<&'a dyn Extractor>) -> Self {
        FirstNonEmpty { layers }
    }
}

#[async_trait]
impl Extractor for FirstNonEmpty<'_> {
    fn name(&self) -> &'static str {
        "first-non-empty"
    }

    async fn extract(&self, text: &str) -> Result<Vec<TaskCandidate>, ExtractError> {
        for layer in &self.layers {
            let found = layer.extract(text).await?;
            if !found.is_empty() {
                tracing::debug!(layer = layer.name(), count = found.len(), "extractor produced candidates");
                return Ok(found);
            }
            tracing::debug!(layer = layer.name(), "extractor found nothing");
        }
        Ok(Vec::new())
    }
}
