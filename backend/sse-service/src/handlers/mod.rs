/// HTTP handlers for sse-service
pub mod notifications;
pub mod stream;

pub use notifications::register_routes as register_notifications;
pub use stream::register_routes as register_stream;
