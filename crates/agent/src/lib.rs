//! Tool-augmented agent runtime.
//!
//! An [`Agent`] binds a model to a tool registry, system prompts and an
//! optional result schema. [`Agent::run`] drives the conversation: it lets the
//! model call tools against caller-supplied dependencies, validates the final
//! answer and re-prompts within a bounded retry budget.

use thiserror::Error;

use agentry_provider::ProviderError;

pub mod agent;
pub mod context;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod schema;
pub mod tools;

pub use agent::{Agent, AgentBuilder};
pub use context::RunContext;
pub use orchestrator::{RunOutcome, RunResult};
pub use prompts::{DynamicPrompt, PromptError, SystemPromptBuilder};
pub use retry::{FailureKind, RetryBudget, RetryRecord, RunFailure, TransportRetryPolicy};
pub use schema::{ArgSchema, FieldKind, FieldSpec, ResultSchema, SchemaError, ValidationError};
pub use tools::{FunctionTool, ReturnType, ToolArgs, ToolOutcome, ToolRegistry, ToolTrait};

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    /// The model broke the tool-call contract
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("model error: {0}")]
    Provider(#[from] ProviderError),

    #[error("model unreachable after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("tool '{tool}' failed: {message}")]
    ToolFatal { tool: String, message: String },

    #[error("system prompt '{name}' failed: {message}")]
    SystemPrompt { name: String, message: String },

    #[error("invalid schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("duplicate tool '{0}'")]
    DuplicateTool(String),

    #[error("invalid agent configuration: {0}")]
    Config(String),

    #[error("{0}")]
    RetryExhausted(RunFailure),

    #[error("exceeded {0} tool rounds")]
    MaxIterations(u32),

    #[error("run cancelled")]
    Cancelled,
}

impl AgentError {
    /// Whether the run ended because the retry budget ran out
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, AgentError::RetryExhausted(_))
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
