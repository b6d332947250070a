//! Shared fixtures: a recording fake transport and tree/reconciler setup

use std::path::Path;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;

use drivetree_conflict::PolicyEngine;
use drivetree_core::domain::conflict::Resolution;
use drivetree_core::domain::newtypes::Href;
use drivetree_core::ports::local_filesystem::ILocalFileSystem;
use drivetree_core::ports::transport::{
    AuthHeaders, ITransport, Method, RequestBody, TransportResponse,
};
use drivetree_http::feed::{JsonFeed, FOLDER_MIME_TYPE};
use drivetree_sync::{LocalFileSystemAdapter, Reconciler, ResourceTree, TreeBuilder};

pub const BASE: &str = "https://drive.test";

pub fn files_url(id: &str) -> String {
    format!("{BASE}/files/{id}")
}

pub fn content_url(id: &str) -> String {
    format!("{BASE}/content/{id}")
}

pub fn link(id: &str) -> Href {
    Href::new(files_url(id)).unwrap()
}

/// Hex MD5 of the fixture contents used by these tests
pub fn md5_of(content: &str) -> &'static str {
    match content {
        "" => "d41d8cd98f00b204e9800998ecf8427e",
        "a" => "0cc175b9c0f1b6a831c399e269772661",
        "b" => "92eb5ffee6ae2fec3ad71c777531578f",
        "c" => "4a8a08f09d37b73795649038408b5f33",
        "hello" => "5d41402abc4b2a76b9719d911017c592",
        other => panic!("no fixture checksum for {other:?}"),
    }
}

// ============================================================================
// Fake transport
// ============================================================================

/// One request as the transport saw it
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub url: String,
    pub headers: AuthHeaders,
    pub body: Vec<u8>,
}

impl Call {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

#[derive(Clone)]
enum Reply {
    Respond(u16, Vec<u8>),
    /// 201 with an item echoing the posted metadata under a new id
    Created(String),
    Fail(String),
    Hang,
}

struct Route {
    method: Method,
    url: String,
    reply: Reply,
}

/// Transport double that records every call and answers from a script
///
/// Unscripted requests get a 404. Request bodies are drained before the
/// reply is chosen, so a failing upload stream surfaces as an error.
#[derive(Default)]
pub struct FakeTransport {
    calls: Mutex<Vec<Call>>,
    routes: Mutex<Vec<Route>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self, method: Method, url: impl Into<String>, reply: Reply) {
        self.routes.lock().unwrap().push(Route {
            method,
            url: url.into(),
            reply,
        });
    }

    pub fn on(&self, method: Method, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) {
        self.script(method, url, Reply::Respond(status, body.into()));
    }

    pub fn on_json(&self, method: Method, url: impl Into<String>, status: u16, body: Value) {
        self.on(method, url, status, serde_json::to_vec(&body).unwrap());
    }

    /// Creation endpoint that echoes the posted metadata back as item `id`
    pub fn on_create(&self, url: impl Into<String>, id: &str) {
        self.script(Method::Post, url, Reply::Created(id.to_string()));
    }

    /// The request fails without a status, like a dropped connection
    pub fn fail(&self, method: Method, url: impl Into<String>, message: &str) {
        self.script(method, url, Reply::Fail(message.to_string()));
    }

    /// The request never completes
    pub fn hang(&self, method: Method, url: impl Into<String>) {
        self.script(method, url, Reply::Hang);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_log(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| format!("{} {}", c.method, c.url))
            .collect()
    }
}

#[async_trait::async_trait]
impl ITransport for FakeTransport {
    async fn request(
        &self,
        method: Method,
        url: &str,
        headers: &AuthHeaders,
        body: Option<RequestBody>,
    ) -> anyhow::Result<TransportResponse> {
        let mut sent = Vec::new();
        if let Some(mut body) = body {
            while let Some(chunk) = body.stream.next().await {
                sent.extend_from_slice(&chunk?);
            }
        }

        self.calls.lock().unwrap().push(Call {
            method,
            url: url.to_string(),
            headers: headers.clone(),
            body: sent.clone(),
        });

        let reply = self
            .routes
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.method == method && r.url == url)
            .map(|r| r.reply.clone());

        match reply {
            Some(Reply::Respond(status, body)) => Ok(TransportResponse::from_bytes(status, body)),
            Some(Reply::Created(id)) => {
                let posted: Value = serde_json::from_slice(&sent)?;
                let mut item = json!({
                    "title": posted["title"],
                    "mimeType": posted["mimeType"],
                    "selfLink": files_url(&id),
                    "parents": posted["parents"],
                    "etag": "\"1\""
                });
                if let Some(download_url) = posted.get("downloadUrl") {
                    item["downloadUrl"] = download_url.clone();
                }
                Ok(TransportResponse::from_bytes(201, serde_json::to_vec(&item)?))
            }
            Some(Reply::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(Reply::Hang) => std::future::pending().await,
            None => Ok(TransportResponse::from_bytes(404, Vec::new())),
        }
    }
}

// ============================================================================
// Feed documents
// ============================================================================

pub fn folder_json(id: &str, title: &str, parent: &str) -> Value {
    json!({
        "title": title,
        "mimeType": FOLDER_MIME_TYPE,
        "selfLink": files_url(id),
        "parents": [{ "selfLink": files_url(parent) }]
    })
}

pub fn file_json(id: &str, title: &str, parent: &str, content: &str, etag: &str) -> Value {
    json!({
        "title": title,
        "mimeType": "text/plain",
        "selfLink": files_url(id),
        "parents": [{ "selfLink": files_url(parent) }],
        "downloadUrl": content_url(id),
        "md5Checksum": md5_of(content),
        "etag": etag
    })
}

pub fn receipt_json(id: &str) -> Value {
    json!({ "downloadUrl": content_url(id) })
}

/// Parses a feed item the way a listing would deliver it
pub fn entry(item: Value) -> drivetree_core::domain::entry::Entry {
    use drivetree_core::ports::feed::IRemoteFeed;
    JsonFeed.parse_entry(&serde_json::to_vec(&item).unwrap()).unwrap()
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub dir: TempDir,
    pub transport: Arc<FakeTransport>,
    pub reconciler: Reconciler,
    pub tree: ResourceTree,
    pub auth: AuthHeaders,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(PolicyEngine::default())
    }

    pub fn with_resolution(resolution: Resolution) -> Self {
        Self::with_policy(PolicyEngine::fixed(resolution))
    }

    pub fn with_policy(policy: PolicyEngine) -> Self {
        let dir = TempDir::new().unwrap();
        let transport = FakeTransport::new();
        let reconciler = Reconciler::new(
            transport.clone(),
            Arc::new(JsonFeed::new()),
            Arc::new(LocalFileSystemAdapter::new()),
            policy,
        );
        let tree = ResourceTree::new(dir.path(), Some(link("root"))).unwrap();
        Self {
            dir,
            transport,
            reconciler,
            tree,
            auth: AuthHeaders::bearer("test-token"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.root().join(relative).exists()
    }

    /// Names in the sync root (or a subdirectory) in sorted order
    pub fn listing(&self, relative: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.root().join(relative))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Runs one merge: remote items, then a real scan of the sync root
    pub async fn merge(&mut self, remote: Vec<Value>) {
        let scan = LocalFileSystemAdapter::new()
            .scan(self.dir.path())
            .await
            .unwrap();
        let mut builder = TreeBuilder::new(&mut self.tree);
        builder
            .apply_remote_all(remote.into_iter().map(entry))
            .unwrap();
        builder.apply_local_all(&scan).unwrap();
    }

    /// A full pass: begin, merge, finish
    pub async fn pass(&mut self, remote: Vec<Value>) -> Vec<drivetree_sync::NodeId> {
        self.tree.begin_pass();
        self.merge(remote).await;
        self.tree.finish_pass()
    }

    pub fn node(&self, relative: &str) -> drivetree_sync::NodeId {
        let mut current = self.tree.root();
        for segment in relative.split('/') {
            current = self
                .tree
                .find_child(current, segment)
                .unwrap_or_else(|| panic!("no node at {relative}"));
        }
        current
    }
}
