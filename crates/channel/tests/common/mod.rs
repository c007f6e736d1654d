//! Shared helpers for channel integration tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quantdash_channel::memory::{MemoryConnector, MemoryPeer};
use quantdash_channel::{ChannelConfig, ChannelError, ChannelHandler, ChannelManager, Payload};
use tokio::sync::mpsc;

/// Everything a [`Recorder`] observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Message(Payload),
    Connect,
    Disconnect,
    Error(ChannelError),
}

/// Handler that forwards every callback to a channel.
pub struct Recorder {
    tx: mpsc::UnboundedSender<Observed>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl ChannelHandler for Recorder {
    async fn on_message(&self, payload: Payload) {
        let _ = self.tx.send(Observed::Message(payload));
    }

    async fn on_connect(&self) {
        let _ = self.tx.send(Observed::Connect);
    }

    async fn on_disconnect(&self) {
        let _ = self.tx.send(Observed::Disconnect);
    }

    async fn on_error(&self, error: &ChannelError) {
        let _ = self.tx.send(Observed::Error(error.clone()));
    }
}

pub struct Harness {
    pub manager: ChannelManager,
    pub connector: Arc<MemoryConnector>,
    pub peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Manager wired to an in-memory connector with default timings
/// (30 s keep-alive, 5 s reconnect delay).
pub fn harness() -> Harness {
    let (connector, peers) = MemoryConnector::new();
    let manager = ChannelManager::with_connector(
        "ws://test.invalid",
        ChannelConfig::default(),
        connector.clone(),
    );
    Harness {
        manager,
        connector,
        peers,
    }
}

/// Wait for the next accepted peer, failing the test after `limit`.
pub async fn next_peer(
    peers: &mut mpsc::UnboundedReceiver<MemoryPeer>,
    limit: Duration,
) -> Option<MemoryPeer> {
    tokio::time::timeout(limit, peers.recv()).await.ok().flatten()
}

/// Wait for the next observed callback, failing the test after `limit`.
pub async fn next_observed(
    rx: &mut mpsc::UnboundedReceiver<Observed>,
    limit: Duration,
) -> Option<Observed> {
    tokio::time::timeout(limit, rx.recv()).await.ok().flatten()
}
