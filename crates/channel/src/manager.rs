//! Entry point for opening topic subscriptions.
//!
//! [`ChannelManager`] holds the endpoint base URL, the [`Connector`],
//! and the timing configuration shared by all its subscriptions. Each
//! call to [`open`](ChannelManager::open) spawns an independent
//! subscription task whose cancellation token is a child of the
//! manager's, so [`shutdown`](ChannelManager::shutdown) closes them all.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::handler::ChannelHandler;
use crate::reconnect::ChannelConfig;
use crate::subscription::{spawn_subscription, SubscriptionHandle};
use crate::transport::{channel_url, Connector, WsConnector};

pub struct ChannelManager {
    ws_base: String,
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl ChannelManager {
    /// Manager connecting over WebSocket to `ws_base` (e.g. `ws://host:8000`).
    pub fn new(ws_base: impl Into<String>, config: ChannelConfig) -> Self {
        Self::with_connector(ws_base, config, Arc::new(WsConnector))
    }

    /// Manager using a custom transport.
    pub fn with_connector(
        ws_base: impl Into<String>,
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            ws_base: ws_base.into(),
            connector,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Full endpoint URL for `topic`.
    pub fn url_for(&self, topic: &str) -> String {
        channel_url(&self.ws_base, topic)
    }

    /// Open a subscription to `topic`, delivering events to `handler`.
    ///
    /// Connection starts immediately in the background. Must be called
    /// from within a tokio runtime.
    pub fn open(
        &self,
        topic: impl Into<String>,
        handler: Arc<dyn ChannelHandler>,
    ) -> SubscriptionHandle {
        let topic = topic.into();
        let url = self.url_for(&topic);

        tracing::debug!(topic = %topic, url = %url, "Opening subscription");

        spawn_subscription(
            topic,
            url,
            Arc::clone(&self.connector),
            handler,
            self.config,
            self.cancel.child_token(),
        )
    }

    /// Close every subscription opened by this manager.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down channel manager");
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
