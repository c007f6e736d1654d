//! Persisted "what changed since I last looked" state.
//!
//! [`NotificationStore`] polls an [`UpdateSource`], keeps the set of
//! resource ids with unseen changes, and writes the durable subset to a
//! [`StateStorage`] after every mutation.

pub mod api;
pub mod poller;
pub mod state;
pub mod storage;
pub mod store;

pub use api::{EtfUpdatesApi, ResourceUpdate, UpdateCheckResponse, UpdateSource, UpdatesApiError};
pub use poller::{run_poller, DEFAULT_POLL_INTERVAL};
pub use state::{NotificationSnapshot, NotificationState, PersistedNotificationState, STORE_NAME};
pub use storage::{FileStorage, MemoryStorage, StateStorage, StorageError};
pub use store::{CheckOutcome, NotificationError, NotificationStore};
