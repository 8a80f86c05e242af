//! System prompt assembly from static fragments and dynamic generators

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::debug;

use crate::context::RunContext;
use crate::AgentError;

/// Failure raised by a dynamic prompt generator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PromptError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

type GeneratorFn<D> =
    dyn Fn(RunContext<D>) -> BoxFuture<'static, Result<String, PromptError>> + Send + Sync;

/// Prompt fragment computed from the run's dependencies
pub struct DynamicPrompt<D> {
    name: String,
    generator: Arc<GeneratorFn<D>>,
}

impl<D> Clone for DynamicPrompt<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            generator: Arc::clone(&self.generator),
        }
    }
}

impl<D: Send + Sync + 'static> DynamicPrompt<D> {
    pub fn new<F, Fut>(name: impl Into<String>, generator: F) -> Self
    where
        F: Fn(RunContext<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, PromptError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            generator: Arc::new(
                move |ctx| -> BoxFuture<'static, Result<String, PromptError>> {
                    Box::pin(generator(ctx))
                },
            ),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn generate(&self, ctx: RunContext<D>) -> Result<String, PromptError> {
        (self.generator)(ctx).await
    }
}

/// Builds the single system message for a run
pub struct SystemPromptBuilder<'a, D> {
    fragments: &'a [String],
    generators: &'a [DynamicPrompt<D>],
}

impl<'a, D: Send + Sync + 'static> SystemPromptBuilder<'a, D> {
    pub fn new(fragments: &'a [String], generators: &'a [DynamicPrompt<D>]) -> Self {
        Self {
            fragments,
            generators,
        }
    }

    /// Static fragments first, then each generator once, in registration
    /// order. The first generator failure aborts, and so does cancellation
    /// between generators.
    pub async fn build(&self, ctx: &RunContext<D>) -> crate::Result<String> {
        let mut parts: Vec<String> = self
            .fragments
            .iter()
            .filter(|f| !f.trim().is_empty())
            .cloned()
            .collect();

        for generator in self.generators {
            if ctx.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            debug!(prompt = generator.name(), "evaluating dynamic prompt");
            let part = generator
                .generate(ctx.clone())
                .await
                .map_err(|e| AgentError::SystemPrompt {
                    name: generator.name().to_string(),
                    message: e.to_string(),
                })?;
            if !part.trim().is_empty() {
                parts.push(part);
            }
        }

        Ok(parts.join("\n\n"))
    }
}
