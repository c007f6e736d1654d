//! Per-topic subscription: state machine, session loop, and handle.
//!
//! Each subscription runs one spawned task that cycles
//! `Connecting -> Open -> Closed -> Connecting ...` until its
//! [`SubscriptionHandle`] is closed or dropped, at which point it ends in
//! a terminal `Closed`. While open, the task multiplexes keep-alive
//! probes, caller sends, inbound frames, and cancellation with
//! `tokio::select!`.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use quantdash_core::job_events::KEEP_ALIVE_PAYLOAD;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::handler::ChannelHandler;
use crate::messages::parse_payload;
use crate::reconnect::{wait_before_reconnect, ChannelConfig};
use crate::transport::{ChannelError, Connector, Frame, FrameSink, Transport};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

// ---------------------------------------------------------------------------
// SubscriptionHandle
// ---------------------------------------------------------------------------

/// Caller-side handle of an open subscription.
///
/// Dropping the handle closes the subscription.
pub struct SubscriptionHandle {
    topic: String,
    outbound: mpsc::UnboundedSender<String>,
    state: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Current state. Reports `Closed` as soon as [`close`](Self::close)
    /// has been called, even before the task has wound down.
    pub fn state(&self) -> ChannelState {
        if self.cancel.is_cancelled() {
            ChannelState::Closed
        } else {
            *self.state.borrow()
        }
    }

    /// Receiver that observes every state transition of the task.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Queue a text payload for the open connection.
    pub fn send(&self, payload: impl Into<String>) -> Result<(), ChannelError> {
        if self.cancel.is_cancelled() {
            return Err(ChannelError::Closed(self.topic.clone()));
        }
        if *self.state.borrow() != ChannelState::Open {
            return Err(ChannelError::NotConnected(self.topic.clone()));
        }
        self.outbound
            .send(payload.into())
            .map_err(|_| ChannelError::Closed(self.topic.clone()))
    }

    /// Close the subscription: cancel any pending reconnect timer and
    /// close the transport. Safe to call any number of times.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(topic = %self.topic, "Closing subscription");
            self.cancel.cancel();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("state", &self.state())
            .finish()
    }
}

/// Spawn the task for a new subscription and return its handle.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_subscription(
    topic: String,
    url: String,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn ChannelHandler>,
    config: ChannelConfig,
    cancel: CancellationToken,
) -> SubscriptionHandle {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);

    let task = SubscriptionTask {
        topic: topic.clone(),
        url,
        connector,
        handler,
        config,
        state_tx,
        outbound_rx,
        cancel: cancel.clone(),
    };
    tokio::spawn(task.run());

    SubscriptionHandle {
        topic,
        outbound: outbound_tx,
        state: state_rx,
        cancel,
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The subscription was closed by its owner.
    Cancelled,
    /// The transport went away on its own.
    Dropped,
}

struct SubscriptionTask {
    topic: String,
    url: String,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn ChannelHandler>,
    config: ChannelConfig,
    state_tx: watch::Sender<ChannelState>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl SubscriptionTask {
    /// Connect -> run session -> wait -> reconnect, until cancelled.
    async fn run(mut self) {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            self.set_state(ChannelState::Connecting);

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.connector.connect(&self.url) => result,
            };

            match connected {
                Ok(transport) => {
                    tracing::info!(topic = %self.topic, attempt, "Channel connected");
                    self.set_state(ChannelState::Open);
                    self.handler.on_connect().await;

                    let end = self.run_session(transport).await;
                    self.set_state(ChannelState::Closed);
                    self.handler.on_disconnect().await;

                    if end == SessionEnd::Cancelled {
                        break;
                    }
                    tracing::warn!(topic = %self.topic, "Channel connection lost");
                }
                Err(e) => {
                    tracing::warn!(
                        topic = %self.topic,
                        attempt,
                        error = %e,
                        "Channel connection attempt failed",
                    );
                    self.set_state(ChannelState::Closed);
                    self.handler.on_error(&e).await;
                }
            }

            if !wait_before_reconnect(self.config.reconnect_delay, &self.cancel).await {
                break;
            }
            tracing::info!(
                topic = %self.topic,
                attempt = attempt + 1,
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "Reconnecting channel",
            );
        }

        self.set_state(ChannelState::Closed);
        tracing::info!(topic = %self.topic, "Subscription task exited");
    }

    /// Drive one open connection until it drops or the subscription is
    /// cancelled.
    async fn run_session(&mut self, transport: Transport) -> SessionEnd {
        let Transport {
            mut sink,
            mut stream,
        } = transport;

        let period = self.config.keep_alive_interval;
        let mut keep_alive = tokio::time::interval_at(Instant::now() + period, period);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = self.send_frame(&mut sink, Frame::Close).await {
                        tracing::debug!(topic = %self.topic, error = %e, "Close frame not delivered");
                    }
                    return SessionEnd::Cancelled;
                }
                _ = keep_alive.tick() => {
                    tracing::trace!(topic = %self.topic, "Sending keep-alive probe");
                    let probe = Frame::Text(KEEP_ALIVE_PAYLOAD.to_string());
                    if let Err(e) = self.send_frame(&mut sink, probe).await {
                        tracing::warn!(topic = %self.topic, error = %e, "Keep-alive probe failed");
                        self.handler.on_error(&e).await;
                        if matches!(e, ChannelError::SendTimeout(_)) {
                            return SessionEnd::Dropped;
                        }
                    }
                }
                Some(payload) = self.outbound_rx.recv() => {
                    if let Err(e) = self.send_frame(&mut sink, Frame::Text(payload)).await {
                        tracing::warn!(topic = %self.topic, error = %e, "Channel send failed");
                        self.handler.on_error(&e).await;
                        if matches!(e, ChannelError::SendTimeout(_)) {
                            return SessionEnd::Dropped;
                        }
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.dispatch(&text).await,
                    Some(Ok(Frame::Close)) => {
                        tracing::info!(topic = %self.topic, "Peer closed channel");
                        return SessionEnd::Dropped;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(topic = %self.topic, error = %e, "Channel receive error");
                        self.handler.on_error(&e).await;
                    }
                    None => {
                        tracing::debug!(topic = %self.topic, "Channel stream exhausted");
                        return SessionEnd::Dropped;
                    }
                },
            }
        }
    }

    /// Write one frame, giving up after one keep-alive interval so a peer
    /// that stops reading cannot hold the session open.
    async fn send_frame(&self, sink: &mut FrameSink, frame: Frame) -> Result<(), ChannelError> {
        match tokio::time::timeout(self.config.keep_alive_interval, sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::SendTimeout(self.topic.clone())),
        }
    }

    /// Parse one text frame and hand it to the handler, filtering
    /// keep-alive replies.
    async fn dispatch(&self, text: &str) {
        let payload = parse_payload(text);
        if payload.is_keep_alive_ack() {
            tracing::trace!(topic = %self.topic, "Keep-alive acknowledged");
            return;
        }
        self.handler.on_message(payload).await;
    }

    fn set_state(&self, state: ChannelState) {
        self.state_tx.send_replace(state);
    }
}
