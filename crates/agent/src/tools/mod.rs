//! Tools: the callable surface an agent exposes to its model

pub mod function;

pub use function::{FunctionTool, FunctionToolBuilder};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use agentry_provider::Tool;

use crate::context::RunContext;
use crate::schema::{ArgSchema, ValidationError};
use crate::{AgentError, Result};

/// Name of the tool that carries a structured final answer
pub const FINAL_RESULT_TOOL: &str = "final_result";

/// Result of one tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Success; the value is shown to the model
    Ok(Value),
    /// Recoverable: the model should try again. Consumes a retry.
    Retry(String),
    /// Domain error reported to the model, not retried automatically
    Error(String),
    /// Network failure reaching the tool's backend. Re-invoked with the
    /// agent's transport backoff; never consumes a retry.
    Transient(String),
    /// Unrecoverable; ends the run
    Fatal(String),
}

impl ToolOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        ToolOutcome::Ok(Value::String(text.into()))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok(_))
    }
}

/// Declared return type, advertised in the tool description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    Text,
    Integer,
    Number,
    Boolean,
    #[default]
    Json,
}

impl ReturnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnType::Text => "string",
            ReturnType::Integer => "integer",
            ReturnType::Number => "number",
            ReturnType::Boolean => "boolean",
            ReturnType::Json => "object",
        }
    }
}

#[async_trait]
pub trait ToolTrait<D>: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> &ArgSchema;

    fn returns(&self) -> ReturnType {
        ReturnType::Json
    }

    /// Forces every call in the same model turn to run one after another
    fn sequential(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &RunContext<D>, args: ToolArgs) -> ToolOutcome;
}

pub fn to_provider_tool<D>(tool: &dyn ToolTrait<D>) -> Tool {
    let description = match tool.returns() {
        ReturnType::Json => tool.description().to_string(),
        other => format!("{} (returns {})", tool.description(), other.as_str()),
    };
    Tool::new(tool.name(), description, tool.parameters().to_json_schema())
}

/// Why raw arguments could not become [`ToolArgs`]
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentError {
    /// Not a JSON object at all
    Malformed(String),
    /// An object whose fields failed coercion
    Invalid(ValidationError),
}

/// Coerced tool arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs {
    values: Map<String, Value>,
}

impl ToolArgs {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Coerce a model's raw arguments against a tool's schema
    pub fn from_call(schema: &ArgSchema, raw: &Value) -> std::result::Result<Self, ArgumentError> {
        let decoded: Value;
        let raw = match raw {
            Value::String(text) if text.trim().is_empty() => {
                decoded = Value::Null;
                &decoded
            }
            Value::String(text) => {
                decoded = serde_json::from_str(text).map_err(|e| {
                    ArgumentError::Malformed(format!("arguments are not valid JSON: {}", e))
                })?;
                &decoded
            }
            other => other,
        };

        let empty = Map::new();
        let object = match raw {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(ArgumentError::Malformed(format!(
                    "arguments must be a JSON object, got {}",
                    other
                )))
            }
        };

        schema
            .validate_object(object)
            .map(Self::new)
            .map_err(ArgumentError::Invalid)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.str(name).unwrap_or(default)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.bool(name).unwrap_or(default)
    }

    /// Deserialize into a typed struct
    pub fn parse<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.values.clone()))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

/// Insertion-ordered tool registry
pub struct ToolRegistry<D> {
    tools: Vec<Arc<dyn ToolTrait<D>>>,
    index: HashMap<String, usize>,
}

impl<D> Clone for ToolRegistry<D> {
    fn clone(&self) -> Self {
        Self {
            tools: self.tools.clone(),
            index: self.index.clone(),
        }
    }
}

impl<D: Send + Sync + 'static> ToolRegistry<D> {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register<T: ToolTrait<D> + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Rejects duplicate names, the reserved output tool name and
    /// incoherent argument schemas
    pub fn register_arc(&mut self, tool: Arc<dyn ToolTrait<D>>) -> Result<()> {
        let name = tool.name().to_string();
        if name == FINAL_RESULT_TOOL {
            return Err(AgentError::Config(format!(
                "tool name '{}' is reserved",
                FINAL_RESULT_TOOL
            )));
        }
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        tool.parameters().check()?;

        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolTrait<D>>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i]))
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| to_provider_tool(t.as_ref()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<D: Send + Sync + 'static> Default for ToolRegistry<D> {
    fn default() -> Self {
        Self::new()
    }
}
