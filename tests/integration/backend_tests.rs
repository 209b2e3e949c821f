//! Provider adapter integration tests against a mock HTTP server

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use textgen_gateway::backend::{BackendRegistry, Credentials, Generation, TextBackend};
use textgen_gateway::config::{BackendSettings, Settings};
use textgen_gateway::gateway::{StreamEvent, StreamOrchestrator, StreamOutcome};
use textgen_gateway::AppError;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_for(name: &str, api_base: String, credentials: Option<&str>) -> Settings {
    let mut settings = Settings::default();
    settings.gateway.active_backend = name.to_string();
    settings.gateway.retry.base_delay_ms = 10;
    settings.gateway.retry.max_delay_ms = 40;
    settings.backends.insert(
        name.to_string(),
        BackendSettings {
            credentials: credentials.map(str::to_string),
            api_base: Some(api_base),
            timeout_ms: 5000,
            ..Default::default()
        },
    );
    settings
}

fn sse_body(payloads: &[&str]) -> String {
    payloads.iter().map(|p| format!("data: {}\n\n", p)).collect()
}

async fn fragments_of(backend: &Arc<dyn TextBackend>, prompt: &str) -> Vec<String> {
    match backend.generate(prompt, true).await.unwrap() {
        Generation::Streaming(stream) => stream.map(|item| item.unwrap()).collect().await,
        Generation::Complete(text) => vec![text],
    }
}

/// Error raised by a generation, whether at the start or mid-stream
async fn generation_error_of(backend: &Arc<dyn TextBackend>) -> AppError {
    match backend.generate("hello", true).await {
        Err(e) => e,
        Ok(generation) => generation
            .into_text()
            .await
            .err()
            .expect("generation should fail"),
    }
}

#[tokio::test]
async fn test_openai_compatible_streams_fragments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-4o", "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[
                r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
                r#"{"choices":[{"delta":{"content":"He"}}]}"#,
                r#"{"choices":[{"delta":{"content":"llo"}}]}"#,
                r#"{"choices":[{"delta":{"content":" world"}}]}"#,
                "[DONE]",
            ]),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for("chatgpt", format!("{}/v1", server.uri()), Some("sk-test"));
    let registry = BackendRegistry::new(&settings);
    let backend = registry.resolve("chatgpt").unwrap();

    assert_eq!(fragments_of(&backend, "hello").await, vec!["He", "llo", " world"]);
}

#[tokio::test]
async fn test_openai_compatible_non_streaming() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({ "stream": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hello world" } }]
        })))
        .mount(&server)
        .await;

    let settings = settings_for("deepseek", format!("{}/v1", server.uri()), Some("sk-test"));
    let registry = BackendRegistry::new(&settings);
    let backend = registry.resolve("deepseek").unwrap();

    let text = backend.generate("hello", false).await.unwrap().into_text().await.unwrap();
    assert_eq!(text, "Hello world");
}

#[tokio::test]
async fn test_non_success_status_is_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let settings = settings_for("chatgpt", format!("{}/v1", server.uri()), Some("sk-test"));
    let registry = BackendRegistry::new(&settings);
    let backend = registry.resolve("chatgpt").unwrap();

    let err = backend.generate("hello", true).await.unwrap_err();
    assert!(matches!(err, AppError::Generation(_)));
    assert!(err.to_string().contains("429"));
    assert!(err.to_string().contains("rate limited"));
}

#[tokio::test]
async fn test_anthropic_streams_text_deltas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            concat!(
                "event: message_start\n",
                "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
                "event: content_block_delta\n",
                "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
                "event: content_block_delta\n",
                "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n\n",
                "event: message_stop\n",
                "data: {\"type\":\"message_stop\"}\n\n",
            ),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let settings = settings_for("claude", server.uri(), Some("ak-test"));
    let registry = BackendRegistry::new(&settings);
    let backend = registry.resolve("claude").unwrap();

    assert_eq!(fragments_of(&backend, "hello").await, vec!["Hi", " there"]);
}

#[tokio::test]
async fn test_gemini_stream_and_probe_use_query_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-exp-1206:streamGenerateContent"))
        .and(query_param("key", "g-key"))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[
                r#"{"candidates":[{"content":{"parts":[{"text":"Bon"}],"role":"model"}}]}"#,
                r#"{"candidates":[{"content":{"parts":[{"text":"jour"}],"role":"model"}}]}"#,
            ]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(query_param("key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "models/gemini-pro" },
                { "name": "models/gemini-exp-1206" },
                { "name": "models/gemini-flash" },
                { "name": "models/gemini-nano" }
            ]
        })))
        .mount(&server)
        .await;

    let settings = settings_for("gemini", server.uri(), Some("g-key"));
    let registry = BackendRegistry::new(&settings);
    let backend = registry.resolve("gemini").unwrap();

    assert_eq!(fragments_of(&backend, "hello").await, vec!["Bon", "jour"]);

    let report = registry.test_connectivity("gemini", None).await;
    assert!(report.success, "{}", report.message);
    assert_eq!(
        report.message,
        "Connected. Available models: gemini-pro, gemini-exp-1206, gemini-flash..."
    );
    assert!(report.latency_ms.is_some());
    assert_eq!(backend.stats().total_count(), 1);
}

#[tokio::test]
async fn test_ollama_streams_ndjson_without_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({ "model": "llama3", "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            concat!(
                "{\"response\":\"Hel\",\"done\":false}\n",
                "{\"response\":\"lo\",\"done\":false}\n",
                "{\"response\":\"\",\"done\":true}\n",
            ),
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let settings = settings_for("ollama", server.uri(), None);
    let registry = BackendRegistry::new(&settings);
    let backend = registry.resolve("ollama").unwrap();

    assert_eq!(fragments_of(&backend, "hello").await, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn test_wenxin_exchanges_token_before_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/2.0/token"))
        .and(query_param("client_id", "api"))
        .and(query_param("client_secret", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok-1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions"))
        .and(query_param("access_token", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[r#"{"result":"你好"}"#, r#"{"result":"，世界"}"#]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let settings = settings_for("wenxinyiyang", server.uri(), Some("api:secret"));
    let registry = BackendRegistry::new(&settings);
    let backend = registry.resolve("wenxinyiyang").unwrap();

    assert_eq!(fragments_of(&backend, "hello").await, vec!["你好", "，世界"]);
}

#[tokio::test]
async fn test_connectivity_failure_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let settings = settings_for("chatgpt", format!("{}/v1", server.uri()), Some("sk-bad"));
    let registry = BackendRegistry::new(&settings);

    let report = registry.test_connectivity("chatgpt", None).await;
    assert!(!report.success);
    assert!(report.message.contains("401"));

    let backend = registry.resolve("chatgpt").unwrap();
    assert_eq!(backend.stats().total_count(), 1);
    assert_eq!(backend.stats().success_count(), 0);
}

#[tokio::test]
async fn test_override_credentials_probe_unconfigured_backend() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .and(header("authorization", "Bearer sk-override"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "deepseek-chat" }]
        })))
        .mount(&server)
        .await;

    let settings = settings_for("deepseek", format!("{}/v1", server.uri()), None);
    let registry = BackendRegistry::new(&settings);
    assert!(registry.resolve("deepseek").is_err());

    let report = registry
        .test_connectivity("deepseek", Some(Credentials::new("sk-override")))
        .await;
    assert!(report.success, "{}", report.message);
    assert_eq!(report.message, "Connected. Available models: deepseek-chat");
    assert!(!registry.is_loaded("deepseek"));
}

#[tokio::test]
async fn test_orchestrator_retries_after_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[r#"{"choices":[{"delta":{"content":"recovered"}}]}"#, "[DONE]"]),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for("chatgpt", format!("{}/v1", server.uri()), Some("sk-test"));
    let registry = Arc::new(BackendRegistry::new(&settings));
    let orchestrator = StreamOrchestrator::new(registry.clone(), (&settings.gateway.retry).into());

    let events: Vec<StreamEvent> = orchestrator.start(None, "hello").collect().await;
    let retries = events
        .iter()
        .filter(|event| matches!(event, StreamEvent::Retry(_)))
        .count();
    assert_eq!(retries, 2);
    assert_eq!(events[events.len() - 2], StreamEvent::Fragment("recovered".to_string()));
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Finished(StreamOutcome::Completed { attempts: 3, tokens: 1, .. }))
    ));

    let backend = registry.resolve("chatgpt").unwrap();
    assert_eq!(backend.stats().total_count(), 1);
    assert_eq!(backend.stats().success_count(), 1);
}

#[tokio::test]
async fn test_openai_compatible_in_band_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[
                r#"{"choices":[{"delta":{"content":"He"}}]}"#,
                r#"{"error":{"message":"quota exceeded"}}"#,
            ]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let settings = settings_for("chatgpt", format!("{}/v1", server.uri()), Some("sk-test"));
    let backend = BackendRegistry::new(&settings).resolve("chatgpt").unwrap();

    let err = generation_error_of(&backend).await;
    assert!(matches!(err, AppError::Generation(ref message) if message == "quota exceeded"));
}

#[tokio::test]
async fn test_anthropic_error_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            concat!(
                "event: message_start\n",
                "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
                "event: error\n",
                "data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
            ),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let settings = settings_for("claude", server.uri(), Some("ak-test"));
    let backend = BackendRegistry::new(&settings).resolve("claude").unwrap();

    let err = generation_error_of(&backend).await;
    assert!(matches!(err, AppError::Generation(ref message) if message == "Overloaded"));
}

#[tokio::test]
async fn test_gemini_error_object_in_stream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-exp-1206:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[r#"{"error":{"code":429,"message":"Resource exhausted"}}"#]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let settings = settings_for("gemini", server.uri(), Some("g-key"));
    let backend = BackendRegistry::new(&settings).resolve("gemini").unwrap();

    let err = generation_error_of(&backend).await;
    assert!(err.to_string().contains("Resource exhausted"));
}

#[tokio::test]
async fn test_gemini_unframed_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-exp-1206:streamGenerateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"{"error":{"code":400,"message":"API key not valid"}}"#,
            "application/json",
        ))
        .mount(&server)
        .await;

    let settings = settings_for("gemini", server.uri(), Some("g-key"));
    let backend = BackendRegistry::new(&settings).resolve("gemini").unwrap();

    let err = generation_error_of(&backend).await;
    assert!(err.to_string().contains("API key not valid"));
}

#[tokio::test]
async fn test_ollama_error_line() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            concat!(
                "{\"response\":\"Hel\",\"done\":false}\n",
                "{\"error\":\"model 'llama3' not found\"}\n",
            ),
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let settings = settings_for("ollama", server.uri(), None);
    let backend = BackendRegistry::new(&settings).resolve("ollama").unwrap();

    let err = generation_error_of(&backend).await;
    assert!(matches!(err, AppError::Generation(ref message) if message.contains("not found")));
}

async fn mount_wenxin_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok-1" })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_wenxin_error_body_with_success_status() {
    let server = MockServer::start().await;
    mount_wenxin_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error_code": 17,
            "error_msg": "Open api daily request limit reached"
        })))
        .mount(&server)
        .await;

    let settings = settings_for("wenxinyiyang", server.uri(), Some("api:secret"));
    let backend = BackendRegistry::new(&settings).resolve("wenxinyiyang").unwrap();

    let err = generation_error_of(&backend).await;
    assert!(matches!(err, AppError::Generation(_)));
    assert!(err.to_string().contains("ERNIE error 17"));
}

#[tokio::test]
async fn test_wenxin_error_body_is_retried_and_recorded_as_failure() {
    let server = MockServer::start().await;
    mount_wenxin_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/rpc/2.0/ai_custom/v1/wenxinworkshop/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error_code": 17,
            "error_msg": "Open api daily request limit reached"
        })))
        .expect(5)
        .mount(&server)
        .await;

    let settings = settings_for("wenxinyiyang", server.uri(), Some("api:secret"));
    let registry = Arc::new(BackendRegistry::new(&settings));
    let orchestrator = StreamOrchestrator::new(registry.clone(), (&settings.gateway.retry).into());

    let events: Vec<StreamEvent> = orchestrator.start(None, "hello").collect().await;
    assert!(!events.iter().any(|event| matches!(event, StreamEvent::Fragment(_))));
    match events.last() {
        Some(StreamEvent::Finished(StreamOutcome::Exhausted { attempts, message, .. })) => {
            assert_eq!(*attempts, 5);
            assert!(message.contains("daily request limit"));
        }
        other => panic!("unexpected final event: {:?}", other),
    }

    let backend = registry.resolve("wenxinyiyang").unwrap();
    assert_eq!(backend.stats().total_count(), 1);
    assert_eq!(backend.stats().success_count(), 0);
}

#[tokio::test]
async fn test_empty_stream_completes_without_fragments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            sse_body(&[r#"{"choices":[{"delta":{"role":"assistant"}}]}"#, "[DONE]"]),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for("chatgpt", format!("{}/v1", server.uri()), Some("sk-test"));
    let registry = Arc::new(BackendRegistry::new(&settings));
    let orchestrator = StreamOrchestrator::new(registry.clone(), (&settings.gateway.retry).into());

    let events: Vec<StreamEvent> = orchestrator.start(None, "hello").collect().await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        StreamEvent::Finished(StreamOutcome::Completed { attempts: 1, tokens: 0, .. })
    ));

    let backend = registry.resolve("chatgpt").unwrap();
    assert_eq!(backend.stats().success_count(), 1);
    assert!(backend.stats().token_usages().is_empty());
}
