//! Transport seam for push-channel subscriptions.
//!
//! A [`Connector`] opens one bidirectional connection and hands back a
//! split [`Transport`]: a sink of outbound [`Frame`]s and a stream of
//! inbound ones. [`WsConnector`] is the production implementation over
//! `tokio-tungstenite`; [`MemoryConnector`](crate::memory::MemoryConnector)
//! is an in-process one.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// A single application-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text payload (JSON or a bare literal such as `ping`).
    Text(String),
    /// The peer closed, or we are closing, the connection.
    Close,
}

impl Frame {
    fn into_message(self) -> Message {
        match self {
            Frame::Text(text) => Message::Text(text),
            Frame::Close => Message::Close(None),
        }
    }
}

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = ChannelError> + Send>>;

/// Inbound half of a transport. Ends (`None`) when the connection drops.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, ChannelError>> + Send>>;

/// One live connection, already split into its two halves.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens transport connections. Each call yields a brand-new connection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Transport, ChannelError>;
}

/// Build the endpoint URL for a topic: `<ws-base>/api/v1/ws/<topic>`.
pub fn channel_url(ws_base: &str, topic: &str) -> String {
    format!("{}/api/v1/ws/{}", ws_base.trim_end_matches('/'), topic)
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// [`Connector`] over `tokio-tungstenite`.
///
/// Protocol-level ping/pong and binary frames are handled by tungstenite
/// or ignored; only text and close frames reach the subscription.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ChannelError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connection(format!("Failed to connect to {url}: {e}")))?;

        tracing::debug!(url = %url, "WebSocket handshake complete");

        let (sink, stream) = ws_stream.split();

        let sink = sink
            .sink_map_err(|e| ChannelError::Protocol(e.to_string()))
            .with(|frame: Frame| future::ready(Ok::<_, ChannelError>(frame.into_message())));

        let stream = stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "WebSocket close frame received");
                    Some(Ok(Frame::Close))
                }
                // Ping/Pong are answered by tungstenite; binary is unused.
                Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                    None
                }
                Err(e) => Some(Err(ChannelError::Protocol(e.to_string()))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the channel layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish a transport connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A send or receive failed on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// `send` was called while the subscription was not open.
    #[error("Subscription to '{0}' is not connected")]
    NotConnected(String),

    /// `send` was called after `close`.
    #[error("Subscription to '{0}' is closed")]
    Closed(String),

    /// A frame could not be written within the send deadline.
    #[error("Send on '{0}' timed out")]
    SendTimeout(String),
}
