/// Server-Sent Events push delivery
///
/// Architecture:
/// 1. ConnectionRegistry: one live stream per client identity
/// 2. Target: resolves unicast / per-user / broadcast addressing to a snapshot
/// 3. Dispatcher: encodes once, writes to every resolved stream, isolates failures
/// 4. Supervisor: per-connection loop with keep-alive, quotas and teardown
/// 5. Publisher: staged builder on top of the dispatcher

pub mod connection;
pub mod dispatcher;
pub mod encoder;
pub mod publisher;
pub mod registry;
pub mod sink;
pub mod supervisor;
pub mod target;

pub use connection::{Connection, ConnectionState};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use encoder::encode;
pub use publisher::Publisher;
pub use registry::ConnectionRegistry;
pub use sink::{ChannelSink, EventSink, SinkError, WriterSink};
pub use supervisor::{ExitReason, Supervisor};
pub use target::Target;
