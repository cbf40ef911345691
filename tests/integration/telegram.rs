//! Integration tests for the Telegram sink against a mock Bot API

use barwatch::services::sink::{DeliverySink, RetryingSink, SinkError};
use barwatch::services::telegram::TelegramSink;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sink_for(server: &MockServer) -> TelegramSink {
    TelegramSink::with_client(server.uri(), "TOKEN", reqwest::Client::new())
}

#[tokio::test]
async fn sends_markdown_message_to_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .and(body_json(json!({
            "chat_id": "12345",
            "text": "*BUY* AAA",
            "parse_mode": "MarkdownV2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    sink_for(&server).send("12345", "*BUY* AAA").await.unwrap();
}

#[tokio::test]
async fn client_error_is_rejected_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(400).set_body_string("Bad Request: can't parse entities"))
        .expect(1)
        .mount(&server)
        .await;

    let sink = RetryingSink::new(sink_for(&server), 3).with_min_delay(Duration::from_millis(1));
    let err = sink.send("12345", "*broken").await.unwrap_err();
    match err {
        SinkError::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("can't parse entities"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn throttling_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let sink = RetryingSink::new(sink_for(&server), 3).with_min_delay(Duration::from_millis(1));
    sink.send("12345", "hello").await.unwrap();
}

#[test]
fn retryable_errors() {
    assert!(SinkError::Transport("reset".into()).is_retryable());
    assert!(SinkError::Rejected { status: 503, body: String::new() }.is_retryable());
    assert!(!SinkError::Rejected { status: 403, body: String::new() }.is_retryable());
}
