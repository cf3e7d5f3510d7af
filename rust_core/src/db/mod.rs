//! Database access: connection pooling and the notification store.

pub mod pool;
pub mod store;

pub use pool::{create_pool, DbPoolConfig};
pub use store::{NotificationStore, PgNotificationStore};
