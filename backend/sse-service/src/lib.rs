pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod sse;

pub use config::{Config, SseConfig};
pub use error::{AppError, Result};
pub use models::{ClientIdentity, Notification, ServerMessage};
pub use sse::{ConnectionRegistry, Dispatcher, Publisher, Supervisor, Target};

/// Wire the registry, dispatcher, supervisor and publisher together
///
/// The returned values share one registry; the host keeps them for the
/// lifetime of the process.
pub fn build(config: SseConfig) -> (Supervisor, Publisher) {
    let registry = ConnectionRegistry::new();
    let dispatcher = Dispatcher::new(registry, config.max_notification_bytes);
    let publisher = Publisher::new(dispatcher.clone());
    (Supervisor::new(dispatcher, config), publisher)
}
