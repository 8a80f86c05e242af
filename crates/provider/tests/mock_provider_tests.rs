//! Mock Provider Tests
//!
//! The orchestrator only sees models through the `Provider` trait, so it must
//! stay mockable with mockall.

use async_trait::async_trait;
use mockall::mock;
use agentry_provider::{
    ChatParams, ChatResponse, Message, Provider, ProviderError, Role, ToolCall, Usage,
};
use serde_json::json;

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

#[tokio::test]
async fn test_mock_provider_chat_returns_success() {
    let mut mock = MockProvider::new();

    mock.expect_chat()
        .times(1)
        .returning(|_| Ok(ChatResponse::text("Hello from mock!")));

    let response = mock.chat(ChatParams::default()).await.unwrap();

    assert_eq!(response.content, Some("Hello from mock!".to_string()));
    assert!(!response.has_tool_calls());
}

#[tokio::test]
async fn test_mock_provider_chat_with_tool_calls() {
    let mut mock = MockProvider::new();

    mock.expect_chat()
        .times(1)
        .withf(|params| params.messages.len() == 1 && params.messages[0].role == Role::User)
        .returning(|_| {
            Ok(ChatResponse::tool_calls(vec![ToolCall::new(
                "mock_call_1",
                "lookup_balance",
                json!({"include_pending": true}),
            )])
            .with_usage(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }))
        });

    let params = ChatParams {
        model: "test-model".to_string(),
        messages: vec![Message::user("What is my balance?")],
        ..Default::default()
    };

    let response = mock.chat(params).await.unwrap();

    assert!(response.has_tool_calls());
    assert_eq!(response.tool_calls[0].name, "lookup_balance");
    assert_eq!(response.usage.total_tokens, 15);
}

#[tokio::test]
async fn test_mock_provider_transient_then_success() {
    let mut mock = MockProvider::new();
    let mut seq = mockall::Sequence::new();

    mock.expect_chat()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(ProviderError::RateLimited));
    mock.expect_chat()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(ChatResponse::text("ok")));

    let first = mock.chat(ChatParams::default()).await.unwrap_err();
    assert!(first.is_transient());

    let second = mock.chat(ChatParams::default()).await.unwrap();
    assert_eq!(second.content.as_deref(), Some("ok"));
}

#[tokio::test]
async fn test_mock_provider_malformed_response_is_not_transient() {
    let mut mock = MockProvider::new();

    mock.expect_chat()
        .times(1)
        .returning(|_| Err(ProviderError::InvalidResponse("no choices".to_string())));

    let err = mock.chat(ChatParams::default()).await.unwrap_err();
    assert!(!err.is_transient());
}

#[test]
fn test_mock_provider_default_model() {
    let mut mock = MockProvider::new();

    mock.expect_default_model()
        .times(1)
        .returning(|| "mock-model-v1".to_string());
    mock.expect_is_configured().times(1).returning(|| true);

    assert_eq!(mock.default_model(), "mock-model-v1");
    assert!(mock.is_configured());
}
