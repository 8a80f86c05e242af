//! Agent run loop
//!
//! One run: compose the system prompt, send the conversation, dispatch any
//! requested tools, validate the final answer and re-prompt while the retry
//! budget lasts. The conversation only ever grows.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use agentry_provider::{
    ChatParams, ChatResponse, Conversation, Message, ToolCall, ToolChoice, Usage,
};

use crate::agent::Agent;
use crate::context::RunContext;
use crate::prompts::SystemPromptBuilder;
use crate::retry::{FailureKind, RetryBudget};
use crate::schema::{ResultSchema, ValidationError};
use crate::tools::{ArgumentError, ToolArgs, ToolOutcome, ToolTrait, FINAL_RESULT_TOOL};
use crate::{AgentError, Result};

/// Final state of a run: `Ok` is Done, `Err` is Failed or an abort
pub type RunOutcome = Result<RunResult>;

const FINAL_RESULT_PROCESSED: &str = "Final result processed.";
const NOT_EXECUTED: &str = "Tool not executed - a final result was already processed.";
const NOT_EXECUTED_REJECTED: &str = "Tool not executed - the final result was rejected.";
const EMPTY_RESPONSE_CORRECTION: &str =
    "Your response was empty. Reply with an answer or call one of the tools.";
const RETRY_SUFFIX: &str = "Fix the errors and try again.";

/// A completed run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Validated output, or the model's text when no schema is set
    pub output: Value,
    pub messages: Conversation,
    pub usage: Usage,
    pub retries_used: u32,
    /// Model responses received
    pub requests: u32,
    pub run_id: String,
}

impl RunResult {
    pub fn output_as<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(self.output.clone())
    }

    pub fn output_text(&self) -> Option<&str> {
        self.output.as_str()
    }
}

struct RunState<D> {
    ctx: RunContext<D>,
    conversation: Conversation,
    budget: RetryBudget,
    usage: Usage,
    requests: u32,
    tool_rounds: u32,
    /// Tools whose latest outcome was an error
    failed_tools: HashSet<String>,
}

enum Step {
    Continue,
    Done(Value),
}

enum Prepared<D> {
    Ready(Arc<dyn ToolTrait<D>>, ToolArgs),
    Invalid(ValidationError),
}

enum CallOutcome {
    Finished(ToolOutcome),
    Invalid(ValidationError),
    TimedOut,
    Cancelled,
}

impl<D: Send + Sync + 'static> Agent<D> {
    /// Run the agent on one user input with the given dependencies
    pub async fn run(&self, input: impl Into<String>, deps: D) -> RunOutcome {
        self.run_with_cancel(input, deps, CancellationToken::new())
            .await
    }

    /// Like [`Agent::run`], aborting with [`AgentError::Cancelled`] once the
    /// token fires
    pub async fn run_with_cancel(
        &self,
        input: impl Into<String>,
        deps: D,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("agent_run", run_id = %run_id, model = %self.model);
        self.drive(input.into(), deps, run_id, cancel)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        input: String,
        deps: D,
        run_id: String,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let ctx = RunContext::new(deps, run_id.clone(), cancel);
        if ctx.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let system = SystemPromptBuilder::new(&self.system_prompts, &self.dynamic_prompts)
            .build(&ctx)
            .await
            .map_err(|e| {
                error!(error = %e, "system prompt failed");
                e
            })?;

        let mut state = RunState {
            ctx,
            conversation: Conversation::new(),
            budget: RetryBudget::new(self.max_retries),
            usage: Usage::default(),
            requests: 0,
            tool_rounds: 0,
            failed_tools: HashSet::new(),
        };

        if !system.is_empty() {
            state.conversation.push(Message::system(system));
        }
        state.conversation.push(Message::user(input));

        info!(
            tools = self.tools.len(),
            max_retries = self.max_retries,
            structured = self.result_schema.is_some(),
            "run started"
        );

        loop {
            let response = self.request(&mut state).await?;

            let step = if response.has_tool_calls() {
                self.handle_tool_calls(&mut state, response).await?
            } else {
                self.handle_text(&mut state, response)?
            };

            if let Step::Done(output) = step {
                info!(
                    requests = state.requests,
                    retries = state.budget.used(),
                    tokens = state.usage.total_tokens,
                    "run completed"
                );
                return Ok(RunResult {
                    output,
                    messages: state.conversation,
                    usage: state.usage,
                    retries_used: state.budget.used(),
                    requests: state.requests,
                    run_id,
                });
            }
        }
    }

    /// One model round-trip, retrying transient transport failures
    async fn request(&self, state: &mut RunState<D>) -> Result<ChatResponse> {
        let params = ChatParams {
            model: self.model.clone(),
            messages: state.conversation.to_vec(),
            tools: self.tool_definitions(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tool_choice: ToolChoice::Auto,
        };
        let cancel = state.ctx.cancel_token().clone();
        let policy = &self.transport_retry;

        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            debug!(attempt, messages = params.messages.len(), "requesting model");
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                result = self.provider.chat(params.clone()) => result,
            };

            match result {
                Ok(response) => {
                    state.requests += 1;
                    state.usage += response.usage;
                    return Ok(response);
                }
                Err(e) if e.is_transient() && policy.should_retry(attempt) => {
                    let delay = policy.backoff_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient model error, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) if e.is_transient() => {
                    error!(attempts = attempt, error = %e, "model unreachable");
                    return Err(AgentError::Transport {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    error!(error = %e, "model request failed");
                    return Err(AgentError::Provider(e));
                }
            }
        }
    }

    fn consume(state: &mut RunState<D>, kind: FailureKind, detail: String) -> Result<()> {
        match state.budget.consume(kind, detail) {
            Ok(()) => {
                warn!(
                    kind = %kind,
                    remaining = state.budget.remaining(),
                    "recoverable failure, re-prompting"
                );
                state.ctx = state.ctx.clone().with_retry(state.budget.used());
                Ok(())
            }
            Err(failure) => {
                error!(kind = %kind, max_retries = failure.max_retries, "retry budget exhausted");
                Err(AgentError::RetryExhausted(failure))
            }
        }
    }

    /// Text answer, or an empty response
    fn handle_text(&self, state: &mut RunState<D>, response: ChatResponse) -> Result<Step> {
        let text = response.content.unwrap_or_default();

        if text.trim().is_empty() {
            state.conversation.push(Message::assistant(text));
            Self::consume(
                state,
                FailureKind::EmptyResponse,
                "model returned an empty response".to_string(),
            )?;
            state
                .conversation
                .push(Message::user(EMPTY_RESPONSE_CORRECTION));
            return Ok(Step::Continue);
        }

        state.conversation.push(Message::assistant(text.clone()));

        let Some(schema) = &self.result_schema else {
            return Ok(Step::Done(Value::String(text)));
        };

        match schema.validate(&text) {
            Ok(value) => Ok(Step::Done(value)),
            Err(e) => {
                debug!(fields = ?e.fields(), "text answer failed validation");
                Self::consume(state, FailureKind::Validation, e.to_string())?;
                state.conversation.push(Message::user(e.correction()));
                Ok(Step::Continue)
            }
        }
    }

    async fn handle_tool_calls(
        &self,
        state: &mut RunState<D>,
        response: ChatResponse,
    ) -> Result<Step> {
        let calls = response.tool_calls;
        state
            .conversation
            .push(Message::assistant_tool_calls(response.content, &calls));

        // An unknown name ends the run even when the same turn carries a
        // final result.
        for call in &calls {
            let is_final = call.name == FINAL_RESULT_TOOL && self.result_schema.is_some();
            if !is_final && !self.tools.has(&call.name) {
                error!(tool = %call.name, "model requested an unknown tool");
                return Err(AgentError::Protocol(format!(
                    "unknown tool '{}' (available: {})",
                    call.name,
                    self.tools.names().join(", ")
                )));
            }
        }

        if let Some(schema) = &self.result_schema {
            if let Some(pos) = calls.iter().position(|c| c.name == FINAL_RESULT_TOOL) {
                return self.handle_final_result(state, schema, &calls, pos);
            }
        }

        state.tool_rounds += 1;
        if state.tool_rounds > self.max_tool_rounds {
            error!(rounds = self.max_tool_rounds, "tool round ceiling reached");
            return Err(AgentError::MaxIterations(self.max_tool_rounds));
        }

        // Everything is resolved before anything runs, so a protocol
        // violation anywhere in the turn executes no tool at all.
        let mut prepared = Vec::with_capacity(calls.len());
        for call in &calls {
            let Some(tool) = self.tools.get(&call.name) else {
                return Err(AgentError::Protocol(format!("unknown tool '{}'", call.name)));
            };
            match ToolArgs::from_call(tool.parameters(), &call.arguments) {
                Ok(args) => prepared.push(Prepared::Ready(tool, args)),
                Err(ArgumentError::Malformed(msg)) => {
                    error!(tool = %call.name, call_id = %call.id, "malformed tool arguments");
                    return Err(AgentError::Protocol(format!(
                        "tool '{}' (call {}): {}",
                        call.name, call.id, msg
                    )));
                }
                Err(ArgumentError::Invalid(e)) => prepared.push(Prepared::Invalid(e)),
            }
        }

        for (call, item) in calls.iter().zip(&prepared) {
            if matches!(item, Prepared::Ready(..)) && state.failed_tools.contains(&call.name) {
                Self::consume(
                    state,
                    FailureKind::ToolReinvocation,
                    format!("tool '{}' called again after reporting an error", call.name),
                )?;
            }
        }

        let sequential = prepared
            .iter()
            .any(|p| matches!(p, Prepared::Ready(tool, _) if tool.sequential()));

        let ctx = &state.ctx;
        let dispatches = calls
            .iter()
            .zip(prepared)
            .map(|(call, item)| self.dispatch(ctx, call, item));

        let outcomes = if sequential {
            debug!(calls = calls.len(), "dispatching tools sequentially");
            let mut outcomes = Vec::with_capacity(calls.len());
            for dispatch in dispatches {
                outcomes.push(dispatch.await);
            }
            outcomes
        } else {
            debug!(calls = calls.len(), "dispatching tools concurrently");
            join_all(dispatches).await
        };

        if state.ctx.is_cancelled() || outcomes.iter().any(|o| matches!(o, CallOutcome::Cancelled))
        {
            return Err(AgentError::Cancelled);
        }

        for (call, outcome) in calls.iter().zip(outcomes) {
            let content = match outcome {
                CallOutcome::Finished(ToolOutcome::Ok(value)) => {
                    state.failed_tools.remove(&call.name);
                    render(value)
                }
                CallOutcome::Finished(ToolOutcome::Retry(msg)) => {
                    Self::consume(
                        state,
                        FailureKind::SoftRetry,
                        format!("{}: {}", call.name, msg),
                    )?;
                    format!("{}\n\n{}", msg, RETRY_SUFFIX)
                }
                CallOutcome::Finished(ToolOutcome::Error(msg)) => {
                    warn!(tool = %call.name, error = %msg, "tool reported an error");
                    state.failed_tools.insert(call.name.clone());
                    format!("Error: {}", msg)
                }
                CallOutcome::Finished(ToolOutcome::Transient(msg)) => {
                    warn!(tool = %call.name, error = %msg, "tool backend unreachable");
                    format!("Error: {}", msg)
                }
                CallOutcome::Finished(ToolOutcome::Fatal(msg)) => {
                    error!(tool = %call.name, error = %msg, "tool failed fatally");
                    return Err(AgentError::ToolFatal {
                        tool: call.name.clone(),
                        message: msg,
                    });
                }
                CallOutcome::Invalid(e) => {
                    Self::consume(
                        state,
                        FailureKind::ArgumentCoercion,
                        format!("{}: {}", call.name, e),
                    )?;
                    e.correction()
                }
                CallOutcome::TimedOut => {
                    warn!(tool = %call.name, timeout_secs = self.tool_timeout.as_secs_f64(), "tool timed out");
                    state.failed_tools.insert(call.name.clone());
                    format!(
                        "Error: tool '{}' timed out after {:.1}s",
                        call.name,
                        self.tool_timeout.as_secs_f64()
                    )
                }
                CallOutcome::Cancelled => return Err(AgentError::Cancelled),
            };
            state
                .conversation
                .push(Message::tool(&call.id, &call.name, content));
        }

        Ok(Step::Continue)
    }

    async fn dispatch(
        &self,
        ctx: &RunContext<D>,
        call: &ToolCall,
        item: Prepared<D>,
    ) -> CallOutcome {
        let (tool, args) = match item {
            Prepared::Ready(tool, args) => (tool, args),
            Prepared::Invalid(e) => return CallOutcome::Invalid(e),
        };
        if ctx.is_cancelled() {
            return CallOutcome::Cancelled;
        }

        let ctx = ctx.clone().with_timeout(self.tool_timeout);
        let started = Instant::now();
        debug!(tool = %call.name, call_id = %call.id, "executing tool");

        let outcome = tokio::select! {
            _ = ctx.cancelled() => CallOutcome::Cancelled,
            result = tokio::time::timeout(
                self.tool_timeout,
                self.execute_with_backoff(tool.as_ref(), &ctx, call, args),
            ) => {
                match result {
                    Ok(outcome) => CallOutcome::Finished(outcome),
                    Err(_) => CallOutcome::TimedOut,
                }
            }
        };

        debug!(
            tool = %call.name,
            call_id = %call.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool finished"
        );
        outcome
    }

    /// Run a tool, re-invoking it while it reports transient failures
    async fn execute_with_backoff(
        &self,
        tool: &dyn ToolTrait<D>,
        ctx: &RunContext<D>,
        call: &ToolCall,
        args: ToolArgs,
    ) -> ToolOutcome {
        let policy = &self.transport_retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match tool.execute(ctx, args.clone()).await {
                ToolOutcome::Transient(msg) if policy.should_retry(attempt) => {
                    let delay = policy.backoff_for(attempt);
                    warn!(
                        tool = %call.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "transient tool failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                outcome => return outcome,
            }
        }
    }

    fn handle_final_result(
        &self,
        state: &mut RunState<D>,
        schema: &ResultSchema,
        calls: &[ToolCall],
        pos: usize,
    ) -> Result<Step> {
        let final_call = &calls[pos];

        match schema.validate_value(&final_call.arguments) {
            Ok(value) => {
                for (i, call) in calls.iter().enumerate() {
                    let content = if i == pos {
                        FINAL_RESULT_PROCESSED
                    } else {
                        NOT_EXECUTED
                    };
                    state
                        .conversation
                        .push(Message::tool(&call.id, &call.name, content));
                }
                Ok(Step::Done(value))
            }
            Err(e) => {
                debug!(fields = ?e.fields(), "final result failed validation");
                Self::consume(state, FailureKind::Validation, e.to_string())?;
                let correction = e.correction();
                for (i, call) in calls.iter().enumerate() {
                    let content = if i == pos {
                        correction.as_str()
                    } else {
                        NOT_EXECUTED_REJECTED
                    };
                    state
                        .conversation
                        .push(Message::tool(&call.id, &call.name, content));
                }
                Ok(Step::Continue)
            }
        }
    }
}

/// Tool output as shown to the model
fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
