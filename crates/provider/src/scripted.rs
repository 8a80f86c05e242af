//! In-process models with deterministic behaviour.
//!
//! [`ScriptedProvider`] replays a fixed list of responses; [`FunctionProvider`]
//! computes each response from the request. Both record every request they
//! receive so callers can inspect what the orchestrator sent.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ChatParams, ChatResponse, Provider, ProviderError, Result, ToolCall};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Replays queued responses in order
pub struct ScriptedProvider {
    model: String,
    script: Mutex<VecDeque<Result<ChatResponse>>>,
    requests: Mutex<Vec<ChatParams>>,
    next_call_id: Mutex<usize>,
}

impl ScriptedProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            next_call_id: Mutex::new(0),
        }
    }

    fn call_id(&self) -> String {
        let mut next = lock(&self.next_call_id);
        *next += 1;
        format!("call_{}", next)
    }

    /// Queue an arbitrary response
    pub fn then(self, response: ChatResponse) -> Self {
        lock(&self.script).push_back(Ok(response));
        self
    }

    /// Queue a plain-text answer
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.then(ChatResponse::text(text))
    }

    /// Queue a single tool call
    pub fn then_tool_call(self, name: impl Into<String>, arguments: Value) -> Self {
        let call = ToolCall::new(self.call_id(), name, arguments);
        self.then(ChatResponse::tool_calls(vec![call]))
    }

    /// Queue several tool calls in one turn
    pub fn then_tool_calls<N: Into<String>>(self, calls: Vec<(N, Value)>) -> Self {
        let calls = calls
            .into_iter()
            .map(|(name, args)| ToolCall::new(self.call_id(), name, args))
            .collect();
        self.then(ChatResponse::tool_calls(calls))
    }

    /// Queue a client failure
    pub fn then_error(self, error: ProviderError) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ChatParams> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Responses not yet consumed
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        let served = {
            let mut requests = lock(&self.requests);
            requests.push(params);
            requests.len() - 1
        };
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::ScriptExhausted(served)))
    }

    fn default_model(&self) -> String {
        self.model.clone()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

type ResponderFn = dyn Fn(&ChatParams) -> Result<ChatResponse> + Send + Sync;

/// Computes each response from the incoming request
pub struct FunctionProvider {
    model: String,
    responder: Box<ResponderFn>,
    requests: Mutex<Vec<ChatParams>>,
}

impl FunctionProvider {
    pub fn new<F>(model: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&ChatParams) -> Result<ChatResponse> + Send + Sync + 'static,
    {
        Self {
            model: model.into(),
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatParams> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl Provider for FunctionProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        let response = (self.responder)(&params);
        lock(&self.requests).push(params);
        response
    }

    fn default_model(&self) -> String {
        self.model.clone()
    }

    fn is_configured(&self) -> bool {
        true
    }
}
