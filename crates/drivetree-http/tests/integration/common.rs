//! Shared test helpers for the HTTP adapter integration tests
//!
//! Each helper mounts the necessary mock endpoints on a wiremock server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivetree_http::client::HttpTransport;

/// Starts a mock server and returns a transport whose base URL points at it.
pub async fn setup() -> (MockServer, HttpTransport) {
    let server = MockServer::start().await;
    let transport = HttpTransport::with_base_url(&server.uri()).expect("mock server URI");
    (server, transport)
}

/// Mounts a content endpoint returning `content` for GET `route`.
pub async fn mount_content(server: &MockServer, route: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(content.to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}

/// Mounts a listing page at GET `route`.
pub async fn mount_listing(server: &MockServer, route: &str, page: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_json(page))
        .mount(server)
        .await;
}

/// JSON for a folder item.
pub fn folder_item(server: &MockServer, id: &str, title: &str, parent: &str) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "mimeType": drivetree_http::feed::FOLDER_MIME_TYPE,
        "selfLink": format!("{}/files/{id}", server.uri()),
        "parents": [{ "selfLink": format!("{}/files/{parent}", server.uri()) }]
    })
}

/// JSON for a file item.
pub fn file_item(server: &MockServer, id: &str, title: &str, parent: &str) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "mimeType": "text/plain",
        "selfLink": format!("{}/files/{id}", server.uri()),
        "parents": [{ "selfLink": format!("{}/files/{parent}", server.uri()) }],
        "downloadUrl": format!("{}/content/{id}", server.uri()),
        "md5Checksum": "5d41402abc4b2a76b9719d911017c592",
        "etag": "\"1\""
    })
}
