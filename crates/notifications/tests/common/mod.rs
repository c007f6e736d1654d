//! Shared helpers for notification store tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use quantdash_core::types::Timestamp;
use quantdash_notifications::{
    MemoryStorage, NotificationStore, ResourceUpdate, UpdateCheckResponse, UpdateSource,
    UpdatesApiError,
};
use tokio::sync::Notify;

pub const STORE: &str = "etf-notifications";

/// Source whose answer the test controls between calls.
#[derive(Default)]
pub struct ScriptedSource {
    flagged: Mutex<Vec<String>>,
    failing: AtomicBool,
    calls: AtomicUsize,
    since: Mutex<Vec<Option<Timestamp>>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_flagged(&self, ids: &[&str]) {
        *self.flagged.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `since` argument of every call so far.
    pub fn since_args(&self) -> Vec<Option<Timestamp>> {
        self.since.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpdateSource for ScriptedSource {
    async fn check_updates(
        &self,
        since: Option<Timestamp>,
    ) -> Result<UpdateCheckResponse, UpdatesApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.since.lock().unwrap().push(since);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpdatesApiError::ApiError {
                status: 502,
                body: "upstream unavailable".into(),
            });
        }
        Ok(response_for(&self.flagged.lock().unwrap()))
    }
}

/// Source that blocks inside the request until released.
#[derive(Default)]
pub struct GatedSource {
    pub entered: Notify,
    pub release: Notify,
    calls: AtomicUsize,
}

impl GatedSource {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpdateSource for GatedSource {
    async fn check_updates(
        &self,
        _since: Option<Timestamp>,
    ) -> Result<UpdateCheckResponse, UpdatesApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(response_for(&["42".to_string()]))
    }
}

pub fn response_for(flagged: &[String]) -> UpdateCheckResponse {
    let mut updates: Vec<ResourceUpdate> = flagged
        .iter()
        .map(|id| ResourceUpdate {
            resource_id: id.clone(),
            has_new_data: true,
            last_updated: None,
        })
        .collect();
    updates.push(ResourceUpdate {
        resource_id: "unchanged".into(),
        has_new_data: false,
        last_updated: None,
    });
    UpdateCheckResponse {
        has_any_updates: !flagged.is_empty(),
        updates,
        checked_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap(),
    }
}

pub async fn memory_store(source: Arc<dyn UpdateSource>) -> (Arc<NotificationStore>, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let store = NotificationStore::load(STORE, source, storage.clone())
        .await
        .unwrap();
    (Arc::new(store), storage)
}

/// Serve exactly one HTTP request on a random local port.
///
/// Returns the base URL and a handle resolving to the raw request head.
pub async fn serve_once(
    status_line: &'static str,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        // GET requests carry no body, the head is enough.
        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf).into_owned()
    });

    (format!("http://{addr}"), handle)
}

/// Accept connections and never answer them.
///
/// Returns the base URL. Sockets stay open until the runtime ends.
pub async fn serve_silent() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{addr}")
}
