//! CLI tests for agentry

mod common;

use assert_cmd::Command;
use common::TestEnv;
use mockito::Matcher;
use predicates::prelude::*;
use serde_json::json;

fn agentry() -> Command {
    Command::new(env!("CARGO_BIN_EXE_agentry"))
}

#[test]
fn test_help_flag() {
    agentry()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tool-augmented LLM agents"))
        .stdout(predicate::str::contains("--model"))
        .stdout(predicate::str::contains("--verbose"));
}

#[test]
fn test_version_flag() {
    agentry()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_no_args_shows_usage() {
    agentry()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_bank_help() {
    agentry()
        .args(["bank", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-c, --customer"))
        .stdout(predicate::str::contains("-m, --message"));
}

#[test]
fn test_unknown_subcommand() {
    agentry()
        .arg("engage")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_init_writes_default_config() {
    let env = TestEnv::new().unwrap();

    env.command()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initializing agentry"))
        .stdout(predicate::str::contains("groq:llama-3.3-70b-versatile"));

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(env.config_file()).unwrap()).unwrap();
    assert_eq!(written["agent"]["max_retries"], 2);
    assert_eq!(written["transport"]["max_attempts"], 3);

    // A second init leaves the file alone
    env.command().arg("init").assert().success();
}

#[test]
fn test_status_without_config() {
    let env = TestEnv::new().unwrap();

    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[Missing]"))
        .stdout(predicate::str::contains("Model:     groq:llama-3.3-70b-versatile"));
}

#[test]
fn test_status_reports_keys_and_model_override() {
    let env = TestEnv::new().unwrap();

    env.command()
        .args(["status", "--model", "openai:gpt-4o"])
        .env("OPENAI_API_KEY", "sk-test")
        .assert()
        .success()
        .stdout(predicate::str::contains("Model:     openai:gpt-4o"))
        .stdout(predicate::str::is_match(r"openai\s+\[Set\]").unwrap())
        .stdout(predicate::str::is_match(r"groq\s+\[Missing\]").unwrap());
}

#[test]
fn test_invalid_config_fails() {
    let env = TestEnv::new().unwrap();
    env.write_config(&json!({"agent": {"max_tool_rounds": 0}}))
        .unwrap();

    env.command().arg("status").assert().failure().code(1);
}

#[test]
fn test_bank_without_api_key_fails() {
    let env = TestEnv::new().unwrap();

    env.command()
        .args(["bank", "-m", "What is my balance?"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no API key for groq"));
}

#[test]
fn test_bank_end_to_end_against_local_model() {
    let mut server = mockito::Server::new();
    let arguments = json!({
        "support_advice": "Hello John, your current account balance is $100.00.",
        "block_card": false,
        "risk": 1
    })
    .to_string();
    let chat = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(json!({"model": "qwen2.5:3b"})),
            Matcher::Regex("customer's name is".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "final_result", "arguments": arguments}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }],
                "usage": {"prompt_tokens": 50, "completion_tokens": 20, "total_tokens": 70}
            })
            .to_string(),
        )
        .create();

    let env = TestEnv::new().unwrap();
    env.write_config(&json!({
        "providers": {"ollama": {"api_base": server.url()}},
        "agent": {"model": "ollama:qwen2.5:3b"}
    }))
    .unwrap();

    env.command()
        .args(["bank", "-c", "1", "-m", "What is my balance?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("◆ What is my balance?"))
        .stdout(predicate::str::contains("$100.00"))
        .stdout(predicate::str::contains("Block card: no"))
        .stdout(predicate::str::contains(
            "Usage: 1 request(s), 50 prompt + 20 completion = 70 tokens",
        ));

    chat.assert();
}

#[test]
fn test_bank_unknown_customer_fails_without_model_call() {
    let mut server = mockito::Server::new();
    let chat = server
        .mock("POST", "/chat/completions")
        .expect(0)
        .create();

    let env = TestEnv::new().unwrap();
    env.write_config(&json!({
        "providers": {"ollama": {"api_base": server.url()}},
        "agent": {"model": "ollama:qwen2.5:3b"}
    }))
    .unwrap();

    env.command()
        .args(["bank", "-c", "99", "-m", "What is my balance?"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("99"));

    chat.assert();
}
