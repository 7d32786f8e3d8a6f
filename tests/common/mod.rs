//! Scripted transport and drive fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use icloud_drive::auth::CodePrompt;
use icloud_drive::http::{HttpRequest, HttpResponse, HttpTransport};
use icloud_drive::{AccountData, DriveError, Result};

pub const DRIVEWS: &str = "http://drivews.test";
pub const DOCWS: &str = "http://docws.test";
pub const ROOT: &str = "FOLDER::com.apple.CloudDocs::root";

type Handler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;

/// Transport answering from per-URL queues, then from handlers.
#[derive(Default)]
pub struct MockTransport {
    scripted: Mutex<Vec<(String, VecDeque<Result<HttpResponse>>)>>,
    handlers: Mutex<Vec<(String, Handler)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a one-shot reply for URLs containing `pattern`.
    pub fn push(&self, pattern: &str, reply: Result<HttpResponse>) {
        let mut scripted = self.scripted.lock().unwrap();
        match scripted.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, queue)) => queue.push_back(reply),
            None => scripted.push((pattern.to_string(), VecDeque::from([reply]))),
        }
    }

    pub fn reply(&self, pattern: &str, response: HttpResponse) {
        self.push(pattern, Ok(response));
    }

    /// Answer every request matching `pattern` once its queue is drained.
    pub fn handle<F>(&self, pattern: &str, handler: F)
    where
        F: Fn(&HttpRequest) -> HttpResponse + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .push((pattern.to_string(), Box::new(handler)));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(pattern))
            .count()
    }

    pub fn bodies(&self, pattern: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.contains(pattern))
            .filter_map(|r| r.body.as_ref())
            .map(|b| serde_json::from_slice(b).unwrap())
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let queued = {
            let mut scripted = self.scripted.lock().unwrap();
            scripted
                .iter_mut()
                .find(|(p, queue)| request.url.contains(p.as_str()) && !queue.is_empty())
                .and_then(|(_, queue)| queue.pop_front())
        };
        if let Some(reply) = queued {
            return reply;
        }

        let handlers = self.handlers.lock().unwrap();
        match handlers.iter().find(|(p, _)| request.url.contains(p.as_str())) {
            Some((_, handler)) => Ok(handler(&request)),
            None => Err(DriveError::Transport(format!("no reply scripted for {}", request.url))),
        }
    }
}

/// Code prompt returning a fixed code and counting calls.
#[derive(Default)]
pub struct FixedCode {
    pub calls: AtomicUsize,
}

impl FixedCode {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CodePrompt for FixedCode {
    async fn get_code(&self) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("123456".to_string())
    }
}

pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("Content-Type", "application/json")
        .with_body(body.to_string())
}

pub fn account_json(drivews: &str) -> Value {
    json!({
        "appsOrder": ["iclouddrive"],
        "dsInfo": {"dsid": 12345, "fullName": "Test User"},
        "webservices": {
            "drivews": {"url": drivews, "status": "active"},
            "docws": {"url": DOCWS, "status": "active"}
        }
    })
}

pub fn account(drivews: &str) -> AccountData {
    serde_json::from_value(account_json(drivews)).unwrap()
}

pub fn folder_item(id: &str, name: &str) -> Value {
    json!({
        "type": "FOLDER",
        "drivewsid": format!("FOLDER::com.apple.CloudDocs::{}", id),
        "docwsid": id,
        "zone": "com.apple.CloudDocs",
        "name": name,
        "etag": "1"
    })
}

pub fn file_item(id: &str, name: &str, extension: &str) -> Value {
    json!({
        "type": "FILE",
        "drivewsid": format!("FILE::com.apple.CloudDocs::{}", id),
        "docwsid": id,
        "zone": "com.apple.CloudDocs",
        "name": name,
        "extension": extension,
        "size": 42,
        "etag": "1"
    })
}

pub fn folder_details(drivewsid: &str, name: &str, items: Vec<Value>) -> Value {
    json!({
        "drivewsid": drivewsid,
        "docwsid": drivewsid.rsplit("::").next().unwrap(),
        "zone": "com.apple.CloudDocs",
        "name": name,
        "etag": "1",
        "numberOfItems": items.len(),
        "items": items,
        "status": "OK"
    })
}

pub fn folder_id(docwsid: &str) -> String {
    format!("FOLDER::com.apple.CloudDocs::{}", docwsid)
}

/// Server-side tree answering retrieve-details from its current contents.
#[derive(Clone, Default)]
pub struct FakeDrive {
    pub folders: Arc<Mutex<HashMap<String, Value>>>,
}

impl FakeDrive {
    pub fn put(&self, details: Value) {
        let id = details["drivewsid"].as_str().unwrap().to_string();
        self.folders.lock().unwrap().insert(id, details);
    }

    pub fn remove(&self, drivewsid: &str) {
        self.folders.lock().unwrap().remove(drivewsid);
    }

    /// `/` -> `A` -> `B` -> `file.txt`
    pub fn sample() -> Self {
        let drive = FakeDrive::default();
        drive.put(folder_details(ROOT, "", vec![folder_item("A", "A")]));
        drive.put(folder_details(&folder_id("A"), "A", vec![folder_item("B", "B")]));
        drive.put(folder_details(
            &folder_id("B"),
            "B",
            vec![file_item("F", "file", "txt")],
        ));
        drive
    }

    pub fn install(&self, transport: &MockTransport) {
        let folders = Arc::clone(&self.folders);
        transport.handle("/retrieveItemDetailsInFolders", move |request| {
            let queries: Vec<Value> =
                serde_json::from_slice(request.body.as_deref().unwrap_or_default()).unwrap();
            let folders = folders.lock().unwrap();
            let rows: Vec<Value> = queries
                .iter()
                .map(|q| {
                    let id = q["drivewsid"].as_str().unwrap();
                    folders
                        .get(id)
                        .cloned()
                        .unwrap_or_else(|| json!({"drivewsid": id, "status": "ID_INVALID"}))
                })
                .collect();
            json_response(200, Value::Array(rows))
        });
    }
}

/// Ids requested by each retrieve-details call, in call order.
pub fn detail_batches(transport: &MockTransport) -> Vec<Vec<String>> {
    transport
        .bodies("/retrieveItemDetailsInFolders")
        .into_iter()
        .map(|body| {
            body.as_array()
                .unwrap()
                .iter()
                .map(|q| q["drivewsid"].as_str().unwrap().to_string())
                .collect()
        })
        .collect()
}
