//! Reconnecting push-channel client.
//!
//! Provides the transport seam ([`Connector`]) with a WebSocket
//! implementation, typed message parsing, and per-topic subscriptions
//! that keep themselves alive and reconnect on a fixed delay until
//! closed.

pub mod handler;
pub mod manager;
pub mod memory;
pub mod messages;
pub mod reconnect;
pub mod subscription;
pub mod transport;

pub use handler::ChannelHandler;
pub use manager::ChannelManager;
pub use messages::{ChannelMessage, Payload};
pub use reconnect::ChannelConfig;
pub use subscription::{ChannelState, SubscriptionHandle};
pub use transport::{ChannelError, Connector, Frame, Transport, WsConnector};
