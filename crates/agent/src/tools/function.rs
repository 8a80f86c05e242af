//! Closure-backed tools

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::{ReturnType, ToolArgs, ToolOutcome, ToolTrait};
use crate::context::RunContext;
use crate::schema::{ArgSchema, FieldSpec};

type HandlerFn<D> = dyn Fn(RunContext<D>, ToolArgs) -> BoxFuture<'static, ToolOutcome> + Send + Sync;

/// Tool whose behaviour is an async closure over the run context
pub struct FunctionTool<D> {
    name: String,
    description: String,
    parameters: ArgSchema,
    returns: ReturnType,
    sequential: bool,
    handler: Arc<HandlerFn<D>>,
}

impl<D: Send + Sync + 'static> FunctionTool<D> {
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> FunctionToolBuilder<D> {
        FunctionToolBuilder {
            name: name.into(),
            description: description.into(),
            fields: Vec::new(),
            returns: ReturnType::Json,
            sequential: false,
            _deps: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<D: Send + Sync + 'static> ToolTrait<D> for FunctionTool<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ArgSchema {
        &self.parameters
    }

    fn returns(&self) -> ReturnType {
        self.returns
    }

    fn sequential(&self) -> bool {
        self.sequential
    }

    async fn execute(&self, ctx: &RunContext<D>, args: ToolArgs) -> ToolOutcome {
        (self.handler)(ctx.clone(), args).await
    }
}

pub struct FunctionToolBuilder<D> {
    name: String,
    description: String,
    fields: Vec<FieldSpec>,
    returns: ReturnType,
    sequential: bool,
    _deps: std::marker::PhantomData<fn() -> D>,
}

impl<D: Send + Sync + 'static> FunctionToolBuilder<D> {
    pub fn arg(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn string_arg(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.arg(FieldSpec::string(name).describe(description))
    }

    pub fn integer_arg(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.arg(FieldSpec::integer(name).describe(description))
    }

    pub fn number_arg(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.arg(FieldSpec::number(name).describe(description))
    }

    pub fn bool_arg(self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.arg(FieldSpec::boolean(name).describe(description))
    }

    pub fn returns(mut self, returns: ReturnType) -> Self {
        self.returns = returns;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.sequential = true;
        self
    }

    /// Attach the handler and finish. The argument schema is checked when
    /// the tool is registered.
    pub fn handler<F, Fut>(self, handler: F) -> FunctionTool<D>
    where
        F: Fn(RunContext<D>, ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutcome> + Send + 'static,
    {
        FunctionTool {
            name: self.name,
            description: self.description,
            parameters: ArgSchema::from_fields(self.fields),
            returns: self.returns,
            sequential: self.sequential,
            handler: Arc::new(move |ctx, args| -> BoxFuture<'static, ToolOutcome> {
                Box::pin(handler(ctx, args))
            }),
        }
    }
}
