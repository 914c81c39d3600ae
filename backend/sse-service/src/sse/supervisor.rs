//! Per-connection lifecycle
//!
//! Every accepted stream gets one `listen` future that:
//! 1. Writes the `open` message and registers the connection
//! 2. Sends keep-alives and enforces the notification and lifetime quotas
//! 3. Tears the connection down exactly once, whatever ended it
use super::connection::{Connection, ConnectionState};
use super::dispatcher::{Delivery, Dispatcher};
use super::registry::ConnectionRegistry;
use super::sink::EventSink;
use crate::config::SseConfig;
use crate::metrics;
use crate::models::{ClientIdentity, ServerMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Upper bound on the farewell write for a client that stopped reading
const FAREWELL_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a connection left the `Open` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The client went away
    Cancelled,
    /// The stream was closed elsewhere: superseded, removed, or a failed write
    Closed,
    /// The `open` message could not be written
    HandshakeFailed,
    /// More notifications were delivered than allowed
    NotificationQuota { limit: u64 },
    /// The connection outlived its maximum lifetime
    LifetimeExpired { limit: Duration },
    /// The host is shutting down
    Shutdown,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::Cancelled => "cancelled",
            ExitReason::Closed => "closed",
            ExitReason::HandshakeFailed => "handshake_failed",
            ExitReason::NotificationQuota { .. } => "notification_quota",
            ExitReason::LifetimeExpired { .. } => "lifetime_expired",
            ExitReason::Shutdown => "shutdown",
        }
    }

    /// Last message to attempt before the stream is disposed
    fn farewell(&self, identity: &ClientIdentity) -> Option<ServerMessage> {
        match self {
            ExitReason::Cancelled | ExitReason::Closed | ExitReason::HandshakeFailed => None,
            ExitReason::NotificationQuota { .. } => Some(ServerMessage::Error(format!(
                "Client {} has reached the maximum number of notifications.",
                identity
            ))),
            ExitReason::LifetimeExpired { .. } | ExitReason::Shutdown => {
                Some(ServerMessage::Disconnected)
            }
        }
    }
}

#[derive(Clone)]
pub struct Supervisor {
    dispatcher: Dispatcher,
    config: Arc<SseConfig>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(dispatcher: Dispatcher, config: SseConfig) -> Self {
        Self {
            dispatcher,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        self.dispatcher.registry()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &SseConfig {
        &self.config
    }

    /// Ask every open connection to say goodbye and close
    pub fn shutdown(&self) {
        info!("closing all streams for shutdown");
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Serve one client stream until it ends
    ///
    /// # Arguments
    ///
    /// * `identity` - Who the stream belongs to
    /// * `sink` - Output side of the stream, owned by this connection from now on
    /// * `cancel` - Fired by the host when the client disconnects
    pub async fn listen(
        &self,
        identity: ClientIdentity,
        sink: Box<dyn EventSink>,
        cancel: CancellationToken,
    ) -> ExitReason {
        let connection = Connection::new(identity, sink);

        let handshake = tokio::select! {
            delivery = self
                .dispatcher
                .deliver_server_message(&connection, &ServerMessage::Connected) => Some(delivery),
            _ = cancel.cancelled() => None,
        };

        let reason = match handshake {
            None => ExitReason::Cancelled,
            Some(Delivery::Failed) => ExitReason::HandshakeFailed,
            Some(_) => {
                self.registry().add(connection.clone()).await;
                connection.set_state(ConnectionState::Open);

                let identity = connection.identity();
                info!(
                    user_id = %identity.user_id,
                    device_id = ?identity.device_id,
                    "stream opened"
                );

                self.run(&connection, &cancel).await
            }
        };

        self.teardown(&connection, &reason).await;
        reason
    }

    async fn run(&self, connection: &Arc<Connection>, cancel: &CancellationToken) -> ExitReason {
        loop {
            if let Some(reason) = self.check(connection, cancel) {
                return reason;
            }

            match self.config.ping_interval() {
                Some(interval) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = self.shutdown.cancelled() => {}
                        _ = connection.closed() => {}
                        _ = sleep(interval) => {
                            // A client that stopped reading must not pin the loop
                            tokio::select! {
                                _ = self
                                    .dispatcher
                                    .deliver_server_message(connection, &ServerMessage::KeepAlive) => {}
                                _ = cancel.cancelled() => {}
                                _ = self.shutdown.cancelled() => {}
                            }
                        }
                    }
                }
                None => {
                    // No keep-alive: wake only when one of the exit checks may have changed
                    let deadline = self.lifetime_deadline(connection);
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = self.shutdown.cancelled() => {}
                        _ = connection.closed() => {}
                        _ = connection.delivered() => {}
                        _ = async {
                            match deadline {
                                Some(deadline) => sleep_until(deadline).await,
                                None => std::future::pending().await,
                            }
                        } => {}
                    }
                }
            }
        }
    }

    fn check(&self, connection: &Connection, cancel: &CancellationToken) -> Option<ExitReason> {
        if cancel.is_cancelled() {
            return Some(ExitReason::Cancelled);
        }

        if self.shutdown.is_cancelled() {
            return Some(ExitReason::Shutdown);
        }

        if connection.is_closed() {
            return Some(ExitReason::Closed);
        }

        if let Some(limit) = self.config.max_notifications_per_connection {
            if connection.received_count() > limit {
                return Some(ExitReason::NotificationQuota { limit });
            }
        }

        if let Some(limit) = self.config.max_lifetime() {
            if connection.age() > limit {
                return Some(ExitReason::LifetimeExpired { limit });
            }
        }

        None
    }

    fn lifetime_deadline(&self, connection: &Connection) -> Option<Instant> {
        let limit = self.config.max_lifetime()?;
        let remaining = limit.saturating_sub(connection.age());
        // Wake just past the limit so the age check sees it exceeded.
        // A deadline past the clock's range never fires.
        Instant::now().checked_add(remaining + Duration::from_millis(1))
    }

    async fn teardown(&self, connection: &Arc<Connection>, reason: &ExitReason) {
        connection.set_state(ConnectionState::Closing);

        if let Some(message) = reason.farewell(connection.identity()) {
            if !connection.is_closed() {
                debug!(message = message.as_str(), "sending farewell");
                let farewell = self.dispatcher.deliver_server_message(connection, &message);
                if tokio::time::timeout(FAREWELL_TIMEOUT, farewell).await.is_err() {
                    debug!("farewell timed out, client is not reading");
                }
            }
        }

        self.registry().remove_connection(connection).await;
        connection.set_state(ConnectionState::Closed);
        metrics::connection_closed(reason.as_str());

        let identity = connection.identity();
        info!(
            user_id = %identity.user_id,
            device_id = ?identity.device_id,
            reason = reason.as_str(),
            received = connection.received_count(),
            "stream closed"
        );
    }
}
