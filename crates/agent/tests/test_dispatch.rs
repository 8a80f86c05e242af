//! Tool dispatch: ordering, concurrency, failure classification

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentry_agent::{
    Agent, AgentError, FailureKind, FieldSpec, FunctionTool, RunContext, ToolArgs, ToolOutcome,
    TransportRetryPolicy,
};
use agentry_provider::{ChatResponse, FunctionProvider, Provider, Role, ScriptedProvider, ToolCall};
use serde_json::json;

use common::tool_results;

/// Records which tools finished, in completion order
#[derive(Default)]
struct Trace {
    finished: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl Trace {
    fn finish(&self, name: &str) {
        self.finished.lock().unwrap().push(name.to_string());
    }

    fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

fn sleeper(name: &'static str, millis: u64) -> FunctionTool<Arc<Trace>> {
    FunctionTool::builder(name, "Sleeps, then reports its name")
        .handler(move |ctx: RunContext<Arc<Trace>>, _args: ToolArgs| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            ctx.deps().finish(name);
            ToolOutcome::text(name)
        })
}

fn agent_with(
    provider: Arc<dyn Provider>,
    tools: Vec<FunctionTool<Arc<Trace>>>,
    max_retries: u32,
) -> Agent<Arc<Trace>> {
    let mut builder = Agent::builder(provider).max_retries(max_retries);
    for tool in tools {
        builder = builder.tool(tool);
    }
    builder.build().unwrap()
}

#[tokio::test]
async fn test_results_keep_request_order() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_calls(vec![("slow", json!({})), ("fast", json!({}))])
            .then_text("done"),
    );
    let trace = Arc::new(Trace::default());
    let agent = agent_with(provider, vec![sleeper("slow", 80), sleeper("fast", 1)], 0);

    let result = agent.run("go", trace.clone()).await.unwrap();

    // Dispatched together: the fast tool finished first
    assert_eq!(trace.finished(), vec!["fast", "slow"]);

    let tool_messages: Vec<_> = result.messages.by_role(Role::Tool).collect();
    assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(tool_messages[0].text(), "slow");
    assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("call_2"));
    assert_eq!(tool_messages[1].text(), "fast");
    assert_eq!(result.output_text(), Some("done"));
}

#[tokio::test]
async fn test_sequential_tool_serializes_batch() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_calls(vec![("slow", json!({})), ("ordered", json!({}))])
            .then_text("done"),
    );
    let trace = Arc::new(Trace::default());
    let ordered = FunctionTool::builder("ordered", "Must not overlap")
        .sequential()
        .handler(|ctx: RunContext<Arc<Trace>>, _args: ToolArgs| async move {
            ctx.deps().finish("ordered");
            ToolOutcome::text("ordered")
        });
    let agent = agent_with(provider, vec![sleeper("slow", 40), ordered], 0);

    agent.run("go", trace.clone()).await.unwrap();
    assert_eq!(trace.finished(), vec!["slow", "ordered"]);
}

#[tokio::test]
async fn test_unknown_tool_is_protocol_error_without_retry() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_calls(vec![("fast", json!({})), ("transfer_funds", json!({}))])
            .then_text("never reached"),
    );
    let trace = Arc::new(Trace::default());
    let agent = agent_with(provider.clone(), vec![sleeper("fast", 1)], 3);

    let err = agent.run("go", trace.clone()).await.unwrap_err();

    assert!(matches!(&err, AgentError::Protocol(msg) if msg.contains("transfer_funds")));
    assert_eq!(provider.request_count(), 1);
    // Nothing in the offending turn ran
    assert!(trace.finished().is_empty());
}

#[tokio::test]
async fn test_unknown_tool_beside_final_result_is_protocol_error() {
    let provider = Arc::new(ScriptedProvider::new("scripted").then_tool_calls(vec![
        ("transfer_funds", json!({})),
        (
            "final_result",
            json!({"support_advice": "ok", "block_card": false, "risk": 0}),
        ),
    ]));
    let agent = common::support_agent(provider.clone(), 2);

    let err = agent
        .run("Move my money", common::SupportDeps::new(123))
        .await
        .unwrap_err();

    assert!(matches!(&err, AgentError::Protocol(msg) if msg.contains("transfer_funds")));
    assert_eq!(provider.request_count(), 1);
}

#[tokio::test]
async fn test_non_object_arguments_are_protocol_error() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted").then_tool_call("fast", json!(["not", "an", "object"])),
    );
    let agent = agent_with(provider, vec![sleeper("fast", 1)], 3);

    let err = agent.run("go", Arc::new(Trace::default())).await.unwrap_err();
    assert!(matches!(err, AgentError::Protocol(_)));
}

#[tokio::test]
async fn test_argument_coercion_failure_is_fed_back() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("repeat", json!({"times": "lots"}))
            .then_tool_call("repeat", json!({"times": "2"}))
            .then_text("done"),
    );
    let trace = Arc::new(Trace::default());
    let repeat = FunctionTool::builder("repeat", "Repeats a word")
        .arg(FieldSpec::integer("times").range(Some(1.0), Some(5.0)))
        .handler(|ctx: RunContext<Arc<Trace>>, args: ToolArgs| async move {
            ctx.deps().calls.fetch_add(1, Ordering::SeqCst);
            let times = args.i64("times").unwrap_or(1) as usize;
            ToolOutcome::text("ha".repeat(times))
        });
    let agent = agent_with(provider, vec![repeat], 1);

    let result = agent.run("laugh", trace.clone()).await.unwrap();

    assert_eq!(trace.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.retries_used, 1);
    let results = tool_results(&result.messages);
    assert!(results[0].1.starts_with("1 validation error:\n- times: expected an integer"));
    assert!(results[0].1.ends_with("Fix the errors and try again."));
    assert_eq!(results[1].1, "haha");
}

#[tokio::test]
async fn test_soft_retry_consumes_budget() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("get_lat_lng", json!({"location_description": "nowhere"}))
            .then_tool_call("get_lat_lng", json!({"location_description": "London"}))
            .then_text("found it"),
    );
    let geocode = FunctionTool::builder("get_lat_lng", "Geocode a location")
        .string_arg("location_description", "A description of a location")
        .handler(|_ctx: RunContext<Arc<Trace>>, args: ToolArgs| async move {
            match args.str("location_description") {
                Some("London") => ToolOutcome::Ok(json!({"lat": 51.1, "lng": -0.1})),
                _ => ToolOutcome::Retry("Could not find the location".to_string()),
            }
        });
    let agent = agent_with(provider, vec![geocode], 1);

    let result = agent.run("weather?", Arc::new(Trace::default())).await.unwrap();

    assert_eq!(result.retries_used, 1);
    let results = tool_results(&result.messages);
    assert_eq!(
        results[0].1,
        "Could not find the location\n\nFix the errors and try again."
    );
    assert_eq!(results[1].1, "{\"lat\":51.1,\"lng\":-0.1}");
}

#[tokio::test]
async fn test_soft_retries_exhaust_budget() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("flaky", json!({}))
            .then_tool_call("flaky", json!({}))
            .then_text("never"),
    );
    let flaky = FunctionTool::builder("flaky", "Never works")
        .handler(|_ctx: RunContext<Arc<Trace>>, _args: ToolArgs| async {
            ToolOutcome::Retry("try again".to_string())
        });
    let agent = agent_with(provider.clone(), vec![flaky], 1);

    let err = agent.run("go", Arc::new(Trace::default())).await.unwrap_err();

    match err {
        AgentError::RetryExhausted(failure) => {
            assert_eq!(failure.last.kind, FailureKind::SoftRetry);
            assert_eq!(failure.attempts[0].kind, FailureKind::SoftRetry);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(provider.request_count(), 2);
}

#[tokio::test]
async fn test_tool_error_reported_without_consuming_budget() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("broken", json!({}))
            .then_text("I could not complete that"),
    );
    let broken = FunctionTool::builder("broken", "Always errors")
        .handler(|_ctx: RunContext<Arc<Trace>>, _args: ToolArgs| async {
            ToolOutcome::Error("backend unavailable".to_string())
        });
    let agent = agent_with(provider, vec![broken], 0);

    let result = agent.run("go", Arc::new(Trace::default())).await.unwrap();
    assert_eq!(result.retries_used, 0);
    assert_eq!(
        tool_results(&result.messages)[0].1,
        "Error: backend unavailable"
    );
}

fn flaky(healthy_after: usize) -> FunctionTool<Arc<Trace>> {
    FunctionTool::builder("flaky", "Fails transiently a few times")
        .handler(move |ctx: RunContext<Arc<Trace>>, _args: ToolArgs| async move {
            let call = ctx.deps().calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call > healthy_after {
                ToolOutcome::text("up")
            } else {
                ToolOutcome::Transient("connection reset".to_string())
            }
        })
}

#[tokio::test]
async fn test_transient_tool_failure_is_retried_with_backoff() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("flaky", json!({}))
            .then_text("done"),
    );
    let trace = Arc::new(Trace::default());
    let agent = Agent::builder(provider.clone())
        .tool(flaky(2))
        .max_retries(0)
        .transport_retry(TransportRetryPolicy::fixed(Duration::from_millis(1), 3))
        .build()
        .unwrap();

    let result = agent.run("go", trace.clone()).await.unwrap();

    assert_eq!(trace.calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.retries_used, 0);
    assert_eq!(provider.request_count(), 2);
    assert_eq!(tool_results(&result.messages)[0].1, "up");
}

#[tokio::test]
async fn test_exhausted_transient_failure_is_reported_to_model() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("flaky", json!({}))
            .then_text("the service is down"),
    );
    let trace = Arc::new(Trace::default());
    let agent = Agent::builder(provider)
        .tool(flaky(usize::MAX))
        .max_retries(0)
        .transport_retry(TransportRetryPolicy::fixed(Duration::from_millis(1), 2))
        .build()
        .unwrap();

    let result = agent.run("go", trace.clone()).await.unwrap();

    assert_eq!(trace.calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.retries_used, 0);
    assert_eq!(tool_results(&result.messages)[0].1, "Error: connection reset");
    assert_eq!(result.output_text(), Some("the service is down"));
}

#[tokio::test]
async fn test_reinvoking_failed_tool_consumes_budget() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("broken", json!({}))
            .then_tool_call("broken", json!({}))
            .then_text("never"),
    );
    let trace = Arc::new(Trace::default());
    let broken = FunctionTool::builder("broken", "Always errors")
        .handler(|ctx: RunContext<Arc<Trace>>, _args: ToolArgs| async move {
            ctx.deps().calls.fetch_add(1, Ordering::SeqCst);
            ToolOutcome::Error("backend unavailable".to_string())
        });
    let agent = agent_with(provider, vec![broken], 0);

    let err = agent.run("go", trace.clone()).await.unwrap_err();

    match err {
        AgentError::RetryExhausted(failure) => {
            assert_eq!(failure.last.kind, FailureKind::ToolReinvocation);
        }
        other => panic!("unexpected: {other:?}"),
    }
    // The second call never ran
    assert_eq!(trace.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fatal_tool_outcome_aborts() {
    let provider = Arc::new(ScriptedProvider::new("scripted").then_tool_call("doom", json!({})));
    let doom = FunctionTool::builder("doom", "Gives up")
        .handler(|_ctx: RunContext<Arc<Trace>>, _args: ToolArgs| async {
            ToolOutcome::Fatal("database connection lost".to_string())
        });
    let agent = agent_with(provider, vec![doom], 5);

    let err = agent.run("go", Arc::new(Trace::default())).await.unwrap_err();
    assert!(
        matches!(err, AgentError::ToolFatal { tool, message } if tool == "doom" && message == "database connection lost")
    );
}

#[tokio::test]
async fn test_tool_timeout_is_reported_to_model() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("glacial", json!({}))
            .then_text("gave up waiting"),
    );
    let agent = Agent::builder(provider)
        .tool(sleeper("glacial", 5_000))
        .tool_timeout(Duration::from_millis(20))
        .build()
        .unwrap();

    let result = agent.run("go", Arc::new(Trace::default())).await.unwrap();

    let results = tool_results(&result.messages);
    assert!(results[0].1.starts_with("Error: tool 'glacial' timed out"));
    assert_eq!(result.retries_used, 0);
}

#[tokio::test]
async fn test_handler_sees_deadline() {
    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("deadline", json!({}))
            .then_text("ok"),
    );
    let tool = FunctionTool::builder("deadline", "Reports its deadline")
        .handler(|ctx: RunContext<Arc<Trace>>, _args: ToolArgs| async move {
            match ctx.time_remaining() {
                Some(left) if left <= Duration::from_secs(3) => ToolOutcome::text("bounded"),
                _ => ToolOutcome::text("unbounded"),
            }
        });
    let agent = Agent::builder(provider)
        .tool(tool)
        .tool_timeout(Duration::from_secs(3))
        .build()
        .unwrap();

    let result = agent.run("go", Arc::new(Trace::default())).await.unwrap();
    assert_eq!(tool_results(&result.messages)[0].1, "bounded");
}

#[tokio::test]
async fn test_tool_round_ceiling() {
    let provider = Arc::new(FunctionProvider::new("loop", |params| {
        let id = format!("call_{}", params.messages.len());
        Ok(ChatResponse::tool_calls(vec![ToolCall::new(id, "fast", json!({}))]))
    }));
    let agent = Agent::builder(provider.clone())
        .tool(sleeper("fast", 0))
        .max_tool_rounds(3)
        .build()
        .unwrap();

    let err = agent.run("go", Arc::new(Trace::default())).await.unwrap_err();

    assert!(matches!(err, AgentError::MaxIterations(3)));
    assert_eq!(provider.request_count(), 4);
}

#[tokio::test]
async fn test_handlers_see_supplied_dependencies() {
    struct Deps {
        customer_id: u32,
        tag: String,
    }

    let provider = Arc::new(
        ScriptedProvider::new("scripted")
            .then_tool_call("whoami", json!({}))
            .then_text("done"),
    );
    let whoami = FunctionTool::builder("whoami", "Echoes the dependencies")
        .handler(|ctx: RunContext<Deps>, _args: ToolArgs| async move {
            ToolOutcome::Ok(json!({"id": ctx.deps().customer_id, "tag": ctx.deps().tag}))
        });
    let agent = Agent::builder(provider).tool(whoami).build().unwrap();

    let result = agent
        .run(
            "who am I?",
            Deps {
                customer_id: 31337,
                tag: "vip".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        tool_results(&result.messages)[0].1,
        "{\"id\":31337,\"tag\":\"vip\"}"
    );
}
