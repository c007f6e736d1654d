//! Shared helpers for job integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use quantdash_jobs::{AnalysisApiError, JobStarter, StartJobResponse, RegistryEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Starter that hands out fixed job ids in order.
pub struct FakeStarter {
    ids: Vec<&'static str>,
    calls: AtomicUsize,
}

impl FakeStarter {
    pub fn new(ids: Vec<&'static str>) -> Self {
        Self {
            ids,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStarter for FakeStarter {
    async fn start_job(&self, subject_key: &str) -> Result<StartJobResponse, AnalysisApiError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.ids.get(n) {
            Some(id) => Ok(StartJobResponse {
                job_id: id.to_string(),
                ticker: subject_key.to_string(),
            }),
            None => Err(AnalysisApiError::ApiError {
                status: 503,
                body: "no capacity".into(),
            }),
        }
    }
}

/// Wait for the next registry event, `None` after `limit`.
pub async fn next_event(
    rx: &mut broadcast::Receiver<RegistryEvent>,
    limit: Duration,
) -> Option<RegistryEvent> {
    tokio::time::timeout(limit, rx.recv()).await.ok()?.ok()
}

/// Serve exactly one HTTP request on a random local port.
///
/// Returns the base URL and a handle resolving to the raw request text.
pub async fn serve_once(
    status_line: &'static str,
    body: &'static str,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        request
    });

    (format!("http://{addr}"), handle)
}

/// Read headers plus a `content-length` body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
