//! Subscription callbacks.

use async_trait::async_trait;

use crate::messages::Payload;
use crate::transport::ChannelError;

/// Callbacks invoked by a subscription task.
///
/// Every method has an empty default body, so implementors override
/// only the events they care about. Calls for one subscription are
/// awaited one at a time, in delivery order.
#[async_trait]
pub trait ChannelHandler: Send + Sync + 'static {
    /// An inbound payload arrived. Keep-alive replies are never passed here.
    async fn on_message(&self, _payload: Payload) {}

    /// The transport is established and the subscription is open.
    async fn on_connect(&self) {}

    /// The transport closed. A reconnection follows unless the
    /// subscription itself was closed.
    async fn on_disconnect(&self) {}

    /// A connect, send, or receive failed. Does not close the subscription.
    async fn on_error(&self, _error: &ChannelError) {}
}
