//! Paged remote listings merged into the tree

use serde_json::json;

use drivetree_core::ports::transport::Method;
use drivetree_http::feed::JsonFeed;
use drivetree_sync::remote::fetch_listing;
use drivetree_sync::{ResourceError, State, TreeBuilder};

use crate::common::*;

fn listing_url() -> String {
    files_url("root") + "/children"
}

#[tokio::test]
async fn test_pages_followed_and_merged() {
    let mut h = Harness::new();
    let second_page = format!("{}?page=2", listing_url());
    h.transport.on_json(
        Method::Get,
        listing_url(),
        200,
        json!({
            "items": [folder_json("d1", "Docs", "root")],
            "nextLink": second_page
        }),
    );
    h.transport.on_json(
        Method::Get,
        second_page.clone(),
        200,
        json!({ "items": [file_json("f1", "a.txt", "d1", "a", "\"1\"")] }),
    );

    let url = drivetree_core::domain::newtypes::Href::new(listing_url()).unwrap();
    let entries = fetch_listing(h.transport.as_ref(), &JsonFeed, &url, &h.auth)
        .await
        .unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(
        h.transport.call_log(),
        vec![format!("GET {}", listing_url()), format!("GET {second_page}")]
    );

    let mut builder = TreeBuilder::new(&mut h.tree);
    assert_eq!(builder.apply_remote_all(entries).unwrap(), 2);
    assert_eq!(builder.pending_len(), 0);

    let file = h.node("Docs/a.txt");
    assert_eq!(h.tree.relative_path(file).unwrap(), "Docs/a.txt");
    assert_eq!(h.tree.state(file).unwrap(), State::NewRemote);
}

#[tokio::test]
async fn test_child_before_parent_in_listing() {
    let mut h = Harness::new();
    h.transport.on_json(
        Method::Get,
        listing_url(),
        200,
        json!({
            "items": [
                file_json("f1", "a.txt", "d2", "a", "\"1\""),
                folder_json("d2", "Inner", "d1"),
                folder_json("d1", "Outer", "root")
            ]
        }),
    );

    let url = drivetree_core::domain::newtypes::Href::new(listing_url()).unwrap();
    let entries = fetch_listing(h.transport.as_ref(), &JsonFeed, &url, &h.auth)
        .await
        .unwrap();
    TreeBuilder::new(&mut h.tree)
        .apply_remote_all(entries)
        .unwrap();

    assert_eq!(
        h.tree.relative_path(h.node("Outer/Inner/a.txt")).unwrap(),
        "Outer/Inner/a.txt"
    );
}

#[tokio::test]
async fn test_looping_pages_rejected() {
    let h = Harness::new();
    h.transport.on_json(
        Method::Get,
        listing_url(),
        200,
        json!({ "items": [], "nextLink": listing_url() }),
    );

    let url = drivetree_core::domain::newtypes::Href::new(listing_url()).unwrap();
    let err = fetch_listing(h.transport.as_ref(), &JsonFeed, &url, &h.auth)
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::Feed(_)));
    assert_eq!(h.transport.calls().len(), 1);
}

#[tokio::test]
async fn test_listing_status_error() {
    let h = Harness::new();
    h.transport.on(Method::Get, listing_url(), 403, "forbidden");

    let url = drivetree_core::domain::newtypes::Href::new(listing_url()).unwrap();
    let err = fetch_listing(h.transport.as_ref(), &JsonFeed, &url, &h.auth)
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::Status { status: 403, .. }));
    assert!(!err.is_retryable());
}
