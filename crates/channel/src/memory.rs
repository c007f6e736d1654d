//! In-process [`Connector`] backed by channels.
//!
//! Every successful `connect` produces a [`MemoryPeer`] on the accept
//! channel returned by [`MemoryConnector::new`]. The peer plays the
//! server: it pushes inbound frames, reads what the client sent, and
//! drops the connection by being dropped. Used by tests and offline
//! runs of the client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc as frame_channel;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::transport::{ChannelError, Connector, Frame, Transport};

pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    attempts: AtomicUsize,
    refuse_remaining: AtomicUsize,
}

impl MemoryConnector {
    /// Create a connector and the receiver on which accepted peers arrive.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<MemoryPeer>) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accept_tx,
            attempts: AtomicUsize::new(0),
            refuse_remaining: AtomicUsize::new(0),
        });
        (connector, accept_rx)
    }

    /// Fail the next `count` connection attempts with a connection error.
    pub fn refuse_next(&self, count: usize) {
        self.refuse_remaining.store(count, Ordering::SeqCst);
    }

    /// Number of connection attempts so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refuse_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(ChannelError::Connection(format!("{url}: connection refused")));
        }

        let (outbound_tx, outbound_rx) = frame_channel::unbounded::<Frame>();
        let (inbound_tx, inbound_rx) = frame_channel::unbounded::<Result<Frame, ChannelError>>();

        let peer = MemoryPeer {
            url: url.to_string(),
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        if self.accept_tx.send(peer).is_err() {
            tracing::debug!(url = %url, "No acceptor listening for memory peer");
        }

        let sink = outbound_tx.sink_map_err(|e| ChannelError::Protocol(e.to_string()));
        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(inbound_rx),
        })
    }
}

/// Server side of one in-memory connection.
pub struct MemoryPeer {
    url: String,
    inbound: frame_channel::UnboundedSender<Result<Frame, ChannelError>>,
    outbound: frame_channel::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// URL the client connected to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a text frame to the client. Returns `false` if the client
    /// side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.inbound
            .unbounded_send(Ok(Frame::Text(text.into())))
            .is_ok()
    }

    /// Push a receive error to the client without closing the connection.
    pub fn send_error(&self, error: ChannelError) -> bool {
        self.inbound.unbounded_send(Err(error)).is_ok()
    }

    /// Push a close frame to the client.
    pub fn send_close(&self) -> bool {
        self.inbound.unbounded_send(Ok(Frame::Close)).is_ok()
    }

    /// Next frame the client sent, or `None` once the client dropped
    /// the connection.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.next().await
    }

    /// Drop the connection from the server side.
    pub fn disconnect(self) {}
}
