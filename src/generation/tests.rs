use super::*;
use crate::config::GenerationConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> GenerationConfig {
    GenerationConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        model: "test-chat-model".to_string(),
        max_tokens: 256,
        temperature: 0.3,
        ..GenerationConfig::default()
    }
}

async fn generate_blocking(
    client: ChatClient,
    messages: Vec<ChatMessage>,
) -> crate::Result<String> {
    tokio::task::spawn_blocking(move || client.generate(&messages))
        .await
        .expect("generate task panicked")
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })
}

#[test]
fn message_constructors_set_roles() {
    assert_eq!(ChatMessage::system("a").role, "system");
    assert_eq!(ChatMessage::user("b").role, "user");
}

#[tokio::test(flavor = "multi_thread")]
async fn generate_returns_trimmed_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "test-chat-model",
            "max_tokens": 256,
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion_body("  The answer. \n")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&server)).expect("client");
    let messages = vec![
        ChatMessage::system("You answer questions."),
        ChatMessage::user("What is the answer?"),
    ];
    let answer = generate_blocking(client, messages).await.expect("generate");

    assert_eq!(answer, "The answer.");
}

#[tokio::test(flavor = "multi_thread")]
async fn request_carries_conversation_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                { "role": "system", "content": "ctx" },
                { "role": "user", "content": "q" },
            ],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&server)).expect("client");
    let messages = vec![ChatMessage::system("ctx"), ChatMessage::user("q")];
    generate_blocking(client, messages).await.expect("generate");
}

#[tokio::test(flavor = "multi_thread")]
async fn overloaded_server_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("recovered")))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&server)).expect("client");
    let answer = generate_blocking(client, vec![ChatMessage::user("q")])
        .await
        .expect("generate");
    assert_eq!(answer, "recovered");
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&server)).expect("client");
    let result = generate_blocking(client, vec![ChatMessage::user("q")]).await;
    assert!(matches!(result, Err(RagError::Generation(_))));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_choices_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&server)).expect("client");
    let result = generate_blocking(client, vec![ChatMessage::user("q")]).await;
    assert!(matches!(result, Err(RagError::Generation(_))));
}

#[test]
fn base_url_path_prefix_is_preserved() {
    let config = GenerationConfig {
        base_url: "https://example.com/v1beta/openai".to_string(),
        ..GenerationConfig::default()
    };
    let client = ChatClient::new(&config).expect("client");
    assert_eq!(
        client.completions_url(),
        "https://example.com/v1beta/openai/chat/completions"
    );
}
