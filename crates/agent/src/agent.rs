//! Agent definition and builder

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agentry_config::{AgentDefaults, TransportConfig};
use agentry_provider::{Provider, Tool};

use crate::context::RunContext;
use crate::prompts::{DynamicPrompt, PromptError};
use crate::retry::TransportRetryPolicy;
use crate::schema::ResultSchema;
use crate::tools::{ToolRegistry, ToolTrait, FINAL_RESULT_TOOL};
use crate::{AgentError, Result};

const FINAL_RESULT_DESCRIPTION: &str = "The final response which ends this conversation";

/// Immutable agent configuration, shareable across concurrent runs
pub struct Agent<D: Send + Sync + 'static> {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) model: String,
    pub(crate) system_prompts: Vec<String>,
    pub(crate) dynamic_prompts: Vec<DynamicPrompt<D>>,
    pub(crate) tools: ToolRegistry<D>,
    pub(crate) result_schema: Option<ResultSchema>,
    pub(crate) max_retries: u32,
    pub(crate) max_tool_rounds: u32,
    pub(crate) tool_timeout: Duration,
    pub(crate) transport_retry: TransportRetryPolicy,
    pub(crate) max_tokens: u32,
    pub(crate) temperature: f32,
}

impl<D: Send + Sync + 'static> Agent<D> {
    pub fn builder(provider: Arc<dyn Provider>) -> AgentBuilder<D> {
        AgentBuilder::new(provider)
    }

    /// Model name sent to the provider
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.names()
    }

    pub fn result_schema(&self) -> Option<&ResultSchema> {
        self.result_schema.as_ref()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn max_tool_rounds(&self) -> u32 {
        self.max_tool_rounds
    }

    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    /// Tool descriptions advertised to the model, output tool last
    pub fn tool_definitions(&self) -> Vec<Tool> {
        let mut defs = self.tools.definitions();
        if let Some(schema) = &self.result_schema {
            let description = schema
                .description()
                .map(|d| format!("{}: {}", FINAL_RESULT_DESCRIPTION, d))
                .unwrap_or_else(|| FINAL_RESULT_DESCRIPTION.to_string());
            defs.push(Tool::new(
                FINAL_RESULT_TOOL,
                description,
                schema.to_json_schema(),
            ));
        }
        defs
    }
}

pub struct AgentBuilder<D: Send + Sync + 'static> {
    provider: Arc<dyn Provider>,
    model: Option<String>,
    system_prompts: Vec<String>,
    dynamic_prompts: Vec<DynamicPrompt<D>>,
    tools: Vec<Arc<dyn ToolTrait<D>>>,
    result_schema: Option<ResultSchema>,
    max_retries: u32,
    max_tool_rounds: u32,
    tool_timeout: Duration,
    transport_retry: TransportRetryPolicy,
    max_tokens: u32,
    temperature: f32,
}

impl<D: Send + Sync + 'static> AgentBuilder<D> {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        let defaults = AgentDefaults::default();
        Self {
            provider,
            model: None,
            system_prompts: Vec::new(),
            dynamic_prompts: Vec::new(),
            tools: Vec::new(),
            result_schema: None,
            max_retries: defaults.max_retries,
            max_tool_rounds: defaults.max_tool_rounds,
            tool_timeout: Duration::from_secs(defaults.tool_timeout_secs),
            transport_retry: TransportRetryPolicy::default(),
            max_tokens: defaults.max_tokens,
            temperature: defaults.temperature,
        }
    }

    /// Model name passed to the provider; defaults to the provider's own
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompts.push(prompt.into());
        self
    }

    /// Prompt fragment computed from the dependencies once per run
    pub fn dynamic_prompt<F, Fut>(mut self, name: impl Into<String>, generator: F) -> Self
    where
        F: Fn(RunContext<D>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<String, PromptError>> + Send + 'static,
    {
        self.dynamic_prompts.push(DynamicPrompt::new(name, generator));
        self
    }

    pub fn tool<T: ToolTrait<D> + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn tool_arc(mut self, tool: Arc<dyn ToolTrait<D>>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn result_schema(mut self, schema: ResultSchema) -> Self {
        self.result_schema = Some(schema);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn transport_retry(mut self, policy: TransportRetryPolicy) -> Self {
        self.transport_retry = policy;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Apply the `agent` section of the config. The model identifier is
    /// resolved by the caller since it selects the provider.
    pub fn defaults(mut self, defaults: &AgentDefaults) -> Self {
        self.max_retries = defaults.max_retries;
        self.max_tool_rounds = defaults.max_tool_rounds;
        self.tool_timeout = Duration::from_secs(defaults.tool_timeout_secs);
        self.max_tokens = defaults.max_tokens;
        self.temperature = defaults.temperature;
        self
    }

    pub fn transport(mut self, transport: &TransportConfig) -> Self {
        self.transport_retry = TransportRetryPolicy::from(transport);
        self
    }

    pub fn build(self) -> Result<Agent<D>> {
        if self.max_tool_rounds == 0 {
            return Err(AgentError::Config(
                "max_tool_rounds must be at least 1".to_string(),
            ));
        }
        if self.tool_timeout.is_zero() {
            return Err(AgentError::Config("tool_timeout must be positive".to_string()));
        }

        let mut registry = ToolRegistry::new();
        for tool in self.tools {
            registry.register_arc(tool)?;
        }

        let model = self
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model());

        Ok(Agent {
            provider: self.provider,
            model,
            system_prompts: self.system_prompts,
            dynamic_prompts: self.dynamic_prompts,
            tools: registry,
            result_schema: self.result_schema,
            max_retries: self.max_retries,
            max_tool_rounds: self.max_tool_rounds,
            tool_timeout: self.tool_timeout,
            transport_retry: self.transport_retry,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        })
    }
}
