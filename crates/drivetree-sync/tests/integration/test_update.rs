//! Per-node update: one request sequence per state

use drivetree_core::ports::transport::Method;
use drivetree_http::feed::FOLDER_MIME_TYPE;
use drivetree_sync::{ResourceError, ResourceTree, State, TreeError, UpdateOutcome};

use crate::common::*;

/// A file synced as "a" with revision "1"
async fn synced_file(h: &mut Harness) -> drivetree_sync::NodeId {
    h.write("a.txt", "a");
    h.pass(vec![file_json("f1", "a.txt", "root", "a", "\"1\"")])
        .await;
    let id = h.node("a.txt");
    assert_eq!(h.tree.state(id).unwrap(), State::Sync);
    id
}

#[tokio::test]
async fn test_sync_node_sends_nothing() {
    let mut h = Harness::new();
    let id = synced_file(&mut h).await;

    let outcome = h.reconciler.update(&mut h.tree, id, &h.auth).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Unchanged);
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn test_new_local_folder_created_remotely() {
    let mut h = Harness::new();
    std::fs::create_dir(h.root().join("Photos")).unwrap();
    h.merge(vec![]).await;
    let id = h.node("Photos");
    assert_eq!(h.tree.state(id).unwrap(), State::NewLocal);

    h.transport.on_json(
        Method::Post,
        files_url("root") + "/children",
        201,
        folder_json("p1", "Photos", "root"),
    );

    let outcome = h.reconciler.update(&mut h.tree, id, &h.auth).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::CreatedRemote);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].headers.get("Authorization"), Some("Bearer test-token"));
    let sent = calls[0].json();
    assert_eq!(sent["title"], "Photos");
    assert_eq!(sent["mimeType"], FOLDER_MIME_TYPE);
    assert_eq!(sent["parents"][0]["selfLink"], files_url("root"));

    let resource = h.tree.get(id).unwrap();
    assert_eq!(resource.state(), State::Sync);
    assert_eq!(resource.self_link(), Some(&link("p1")));
    assert_eq!(
        h.tree.find_by_resource_id(&resource.resource_id().unwrap()),
        Some(id)
    );
}

#[tokio::test]
async fn test_new_local_file_uploaded_then_registered() {
    let mut h = Harness::new();
    h.write("notes.txt", "hello");
    h.merge(vec![]).await;
    let id = h.node("notes.txt");

    h.transport.on_json(
        Method::Post,
        files_url("root") + "/uploads",
        200,
        receipt_json("f9"),
    );
    h.transport.on_json(
        Method::Post,
        files_url("root") + "/children",
        201,
        file_json("f9", "notes.txt", "root", "hello", "\"1\""),
    );

    let outcome = h.reconciler.update(&mut h.tree, id, &h.auth).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Uploaded);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].body, b"hello");
    let sent = calls[1].json();
    assert_eq!(sent["title"], "notes.txt");
    assert_eq!(sent["downloadUrl"], content_url("f9"));

    let resource = h.tree.get(id).unwrap();
    assert_eq!(resource.state(), State::Sync);
    assert_eq!(resource.self_link(), Some(&link("f9")));
    assert_eq!(
        resource.baseline().unwrap().checksum.as_ref().map(|c| c.as_str()),
        Some(md5_of("hello"))
    );
}

#[tokio::test]
async fn test_new_remote_file_downloaded() {
    let mut h = Harness::new();
    h.merge(vec![file_json("f1", "hello.txt", "root", "hello", "\"1\"")])
        .await;
    let id = h.node("hello.txt");
    assert_eq!(h.tree.state(id).unwrap(), State::NewRemote);

    h.transport.on(Method::Get, content_url("f1"), 200, "hello");

    let outcome = h.reconciler.update(&mut h.tree, id, &h.auth).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Downloaded);
    assert_eq!(h.read("hello.txt"), "hello");
    assert_eq!(h.listing(""), vec!["hello.txt"]);
    assert_eq!(h.tree.state(id).unwrap(), State::Sync);
    assert!(h.tree.get(id).unwrap().local().is_some());
}

#[tokio::test]
async fn test_new_remote_folder_created_locally() {
    let mut h = Harness::new();
    h.merge(vec![folder_json("d1", "Docs", "root")]).await;
    let id = h.node("Docs");

    let outcome = h.reconciler.update(&mut h.tree, id, &h.auth).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::CreatedLocal);
    assert!(h.root().join("Docs").is_dir());
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.tree.state(id).unwrap(), State::Sync);
}

#[tokio::test]
async fn test_failed_download_leaves_nothing_behind() {
    let mut h = Harness::new();
    h.merge(vec![file_json("f1", "hello.txt", "root", "hello", "\"1\"")])
        .await;
    let id = h.node("hello.txt");

    h.transport.on(Method::Get, content_url("f1"), 500, "boom");

    let err = h
        .reconciler
        .update(&mut h.tree, id, &h.auth)
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::Status { status: 500, .. }));
    assert!(err.is_retryable());
    assert_eq!(h.tree.state(id).unwrap(), State::NewRemote);
    assert!(h.listing("").is_empty());
}

#[tokio::test]
async fn test_failed_upload_keeps_new_local() {
    let mut h = Harness::new();
    h.write("notes.txt", "hello");
    h.merge(vec![]).await;
    let id = h.node("notes.txt");

    h.transport
        .fail(Method::Post, files_url("root") + "/uploads", "connection reset");

    let err = h
        .reconciler
        .update(&mut h.tree, id, &h.auth)
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::Transport { method: Method::Post, .. }));
    assert_eq!(h.transport.call_log(), vec![format!("POST {}/uploads", files_url("root"))]);
    let resource = h.tree.get(id).unwrap();
    assert_eq!(resource.state(), State::NewLocal);
    assert!(resource.self_link().is_none());
}

#[tokio::test]
async fn test_metadata_failure_discards_uploaded_content() {
    let mut h = Harness::new();
    h.write("notes.txt", "hello");
    h.merge(vec![]).await;
    let id = h.node("notes.txt");

    h.transport.on_json(
        Method::Post,
        files_url("root") + "/uploads",
        200,
        receipt_json("c9"),
    );
    h.transport
        .on(Method::Post, files_url("root") + "/children", 500, "");
    h.transport.on(Method::Delete, content_url("c9"), 204, "");

    let err = h
        .reconciler
        .update(&mut h.tree, id, &h.auth)
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::Status { status: 500, .. }));
    assert_eq!(
        h.transport.call_log(),
        vec![
            format!("POST {}/uploads", files_url("root")),
            format!("POST {}/children", files_url("root")),
            format!("DELETE {}", content_url("c9")),
        ]
    );
    let calls = h.transport.calls();
    assert_eq!(calls[2].headers.get("If-Match"), Some("*"));
    assert_eq!(calls[2].headers.get("Authorization"), Some("Bearer test-token"));

    let resource = h.tree.get(id).unwrap();
    assert_eq!(resource.state(), State::NewLocal);
    assert!(resource.self_link().is_none());
    assert_eq!(h.read("notes.txt"), "hello");
}

#[tokio::test]
async fn test_failed_cleanup_keeps_original_error() {
    let mut h = Harness::new();
    h.write("notes.txt", "hello");
    h.merge(vec![]).await;
    let id = h.node("notes.txt");

    h.transport.on_json(
        Method::Post,
        files_url("root") + "/uploads",
        200,
        receipt_json("c9"),
    );
    h.transport
        .fail(Method::Post, files_url("root") + "/children", "connection reset");
    h.transport.on(Method::Delete, content_url("c9"), 503, "");

    let err = h
        .reconciler
        .update(&mut h.tree, id, &h.auth)
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::Transport { method: Method::Post, .. }));
    assert_eq!(h.transport.calls().len(), 3);
    assert_eq!(h.tree.state(id).unwrap(), State::NewLocal);
}

#[tokio::test]
async fn test_local_change_put_to_content_link() {
    let mut h = Harness::new();
    synced_file(&mut h).await;

    h.write("a.txt", "b");
    h.pass(vec![file_json("f1", "a.txt", "root", "a", "\"1\"")])
        .await;
    let id = h.node("a.txt");
    assert_eq!(h.tree.state(id).unwrap(), State::LocalChanged);

    h.transport.on_json(
        Method::Put,
        content_url("f1"),
        200,
        file_json("f1", "a.txt", "root", "b", "\"2\""),
    );

    let outcome = h.reconciler.update(&mut h.tree, id, &h.auth).await.unwrap();
    assert_eq!(outcome, UpdateOutcome::Uploaded);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, Method::Put);
    assert_eq!(calls[0].body, b"b");

    let resource = h.tree.get(id).unwrap();
    assert_eq!(resource.state(), State::Sync);
    assert_eq!(resource.baseline().unwrap().revision.as_deref(), Some("\"2\""));
}

#[tokio::test]
async fn test_remote_change_downloaded() {
    let mut h = Harness::new();
    synced_file(&mut h).await;

    h.pass(vec![file_json("f1", "a.txt", "root", "c", "\"2\"")])
        .await;
    let id = h.node("a.txt");
    assert_eq!(h.tree.state(id).unwrap(), State::RemoteChanged);

    h.transport.on(Method::Get, content_url("f1"), 200, "c");

    let outcome = h.reconciler.update(&mut h.tree, id, &h.auth).await.unwrap();

    assert_eq!(outcome, UpdateOutcome::Downloaded);
    assert_eq!(h.read("a.txt"), "c");
    assert_eq!(h.tree.state(id).unwrap(), State::Sync);
}

#[tokio::test]
async fn test_parent_without_link_is_structural() {
    let mut h = Harness::new();
    h.tree = ResourceTree::new(h.dir.path(), None).unwrap();
    h.write("notes.txt", "hello");
    h.merge(vec![]).await;
    let id = h.node("notes.txt");

    let err = h
        .reconciler
        .update(&mut h.tree, id, &h.auth)
        .await
        .unwrap_err();

    assert!(matches!(err, ResourceError::Tree(TreeError::ParentNotRemote(_))));
    assert!(err.is_structural());
    assert!(h.transport.calls().is_empty());
}
