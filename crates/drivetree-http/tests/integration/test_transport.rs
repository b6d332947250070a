//! Integration tests for HttpTransport
//!
//! Verifies header forwarding, streamed request/response bodies and status
//! passthrough against a wiremock server.

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use wiremock::matchers::{body_bytes, body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use drivetree_core::ports::transport::{AuthHeaders, ITransport, Method, RequestBody};
use drivetree_http::client::HttpTransport;

use crate::common;

// ============================================================================
// Downloads
// ============================================================================

#[tokio::test]
async fn test_get_returns_streamed_body() {
    let (server, transport) = common::setup().await;
    common::mount_content(&server, "/content/f1", b"Hello from the remote store").await;

    let response = transport
        .request(Method::Get, "/content/f1", &AuthHeaders::bearer("t"), None)
        .await
        .expect("request failed");

    assert_eq!(response.status, 200);
    assert!(response.is_success());
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], b"Hello from the remote store");
}

#[tokio::test]
async fn test_get_large_body() {
    let (server, transport) = common::setup().await;
    let content: Vec<u8> = (0..1_048_576).map(|i| (i % 251) as u8).collect();
    common::mount_content(&server, "/content/big", &content).await;

    let response = transport
        .request(Method::Get, "/content/big", &AuthHeaders::new(), None)
        .await
        .unwrap();

    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), content.len());
    assert_eq!(&body[..], &content[..]);
}

#[tokio::test]
async fn test_absolute_link_without_base() {
    let (server, _) = common::setup().await;
    common::mount_content(&server, "/content/abs", b"abs").await;

    let transport = HttpTransport::new();
    let url = format!("{}/content/abs", server.uri());
    let response = transport
        .request(Method::Get, &url, &AuthHeaders::new(), None)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
}

// ============================================================================
// Headers and statuses
// ============================================================================

#[tokio::test]
async fn test_auth_headers_forwarded_unmodified() {
    let (server, transport) = common::setup().await;

    Mock::given(method("DELETE"))
        .and(path("/files/f1"))
        .and(header("Authorization", "Bearer secret-token"))
        .and(header("If-Match", "*"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let headers = AuthHeaders::bearer("secret-token").with("If-Match", "*");
    let response = transport
        .request(Method::Delete, "/files/f1", &headers, None)
        .await
        .unwrap();

    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn test_non_success_status_is_not_an_error() {
    let (_server, transport) = common::setup().await;

    let response = transport
        .request(Method::Get, "/files/missing", &AuthHeaders::new(), None)
        .await
        .expect("a status line was received");

    assert_eq!(response.status, 404);
    assert!(!response.is_success());
}

#[tokio::test]
async fn test_connection_failure_is_an_error() {
    let transport = HttpTransport::new();
    let result = transport
        .request(Method::Get, "http://127.0.0.1:1/unreachable", &AuthHeaders::new(), None)
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_relative_link_without_base_is_an_error() {
    let transport = HttpTransport::new();
    let result = transport
        .request(Method::Get, "/files/root", &AuthHeaders::new(), None)
        .await;

    assert!(result.is_err());
}

// ============================================================================
// Uploads
// ============================================================================

#[tokio::test]
async fn test_post_sends_body_and_content_type() {
    let (server, transport) = common::setup().await;

    let metadata = serde_json::json!({ "title": "Photos" });
    Mock::given(method("POST"))
        .and(path("/files/id1/children"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(&metadata))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&server)
        .await;

    let body = RequestBody::from_bytes("application/json", serde_json::to_vec(&metadata).unwrap());
    let response = transport
        .request(Method::Post, "/files/id1/children", &AuthHeaders::new(), Some(body))
        .await
        .unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(&response.bytes().await.unwrap()[..], b"created");
}

#[tokio::test]
async fn test_put_streams_multi_chunk_body() {
    let (server, transport) = common::setup().await;

    Mock::given(method("PUT"))
        .and(path("/content/f1"))
        .and(body_bytes(b"hello streamed world".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let chunks = vec![
        Ok(Bytes::from_static(b"hello ")),
        Ok(Bytes::from_static(b"streamed ")),
        Ok(Bytes::from_static(b"world")),
    ];
    let body = RequestBody::from_stream("application/octet-stream", stream::iter(chunks).boxed());
    let response = transport
        .request(Method::Put, "/content/f1", &AuthHeaders::new(), Some(body))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_failing_body_stream_is_an_error() {
    let (server, transport) = common::setup().await;

    Mock::given(method("PUT"))
        .and(path("/content/f1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let chunks = vec![
        Ok(Bytes::from_static(b"partial")),
        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "disk gone")),
    ];
    let body = RequestBody::from_stream("application/octet-stream", stream::iter(chunks).boxed());
    let result = transport
        .request(Method::Put, "/content/f1", &AuthHeaders::new(), Some(body))
        .await;

    assert!(result.is_err(), "a truncated upload must not report success");
}
