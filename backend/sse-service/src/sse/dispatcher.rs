//! Notification dispatch
//!
//! Encodes a notification once and writes it to every resolved stream.
//! Delivery is best-effort and at-most-once: a failing stream is torn down on
//! the spot and the failure never reaches the caller.
use super::connection::Connection;
use super::encoder::encode;
use super::registry::ConnectionRegistry;
use super::target::Target;
use crate::metrics;
use crate::models::{ClientIdentity, Notification, ServerMessage};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of a send, for logging and API responses only
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Identities the send was addressed to
    pub attempted: usize,
    /// Streams the frame was written to
    pub delivered: usize,
    /// Streams torn down because the write failed
    pub failed: usize,
    /// Recipients skipped because the frame was too large
    pub dropped: usize,
}

impl DispatchReport {
    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Failed => self.failed += 1,
            Delivery::Dropped => self.dropped += 1,
            Delivery::NotConnected => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    Failed,
    Dropped,
    NotConnected,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: ConnectionRegistry,
    max_notification_bytes: Option<usize>,
}

impl Dispatcher {
    /// # Arguments
    ///
    /// * `registry` - Registry the dispatcher resolves identities against
    /// * `max_notification_bytes` - Encoded frames of this size or larger are dropped
    pub fn new(registry: ConnectionRegistry, max_notification_bytes: Option<usize>) -> Self {
        Self {
            registry,
            max_notification_bytes,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Send to a single identity
    ///
    /// Sending to an identity that is not connected does nothing.
    pub async fn send_one(
        &self,
        identity: &ClientIdentity,
        notification: &Notification,
    ) -> DispatchReport {
        self.send_many(std::slice::from_ref(identity), notification)
            .await
    }

    /// Send to every identity independently
    ///
    /// Writes run concurrently, so a stalled or broken stream only affects
    /// its own delivery.
    pub async fn send_many(
        &self,
        identities: &[ClientIdentity],
        notification: &Notification,
    ) -> DispatchReport {
        let mut report = DispatchReport {
            attempted: identities.len(),
            ..Default::default()
        };

        let frame = match self.prepare(notification) {
            Some(frame) => frame,
            None => {
                report.dropped = identities.len();
                return report;
            }
        };

        let deliveries = join_all(
            identities
                .iter()
                .map(|identity| self.write_to(identity, &frame, "payload")),
        )
        .await;

        for delivery in deliveries {
            report.record(delivery);
        }

        tracing::debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed,
            "notification dispatched"
        );
        report
    }

    /// Resolve `target` and send to the resulting snapshot
    pub async fn send(&self, target: &Target, notification: &Notification) -> DispatchReport {
        let identities = target.resolve(&self.registry).await;
        self.send_many(&identities, notification).await
    }

    pub async fn send_server_message(
        &self,
        identity: &ClientIdentity,
        message: &ServerMessage,
    ) -> DispatchReport {
        let mut report = DispatchReport {
            attempted: 1,
            ..Default::default()
        };

        if let Some(connection) = self.registry.get(identity).await {
            report.record(self.deliver_server_message(&connection, message).await);
        }
        report
    }

    /// Write a server message to a connection that may not be registered yet
    pub(crate) async fn deliver_server_message(
        &self,
        connection: &Arc<Connection>,
        message: &ServerMessage,
    ) -> Delivery {
        match self.prepare(&message.to_notification()) {
            Some(frame) => self.write(connection, &frame, "system").await,
            None => Delivery::Dropped,
        }
    }

    /// Encode and apply the size guard
    fn prepare(&self, notification: &Notification) -> Option<String> {
        let frame = encode(notification);

        match self.max_notification_bytes {
            Some(max) if frame.len() >= max => {
                tracing::debug!(
                    size = frame.len(),
                    max_bytes = max,
                    event = ?notification.event,
                    "dropping oversized notification"
                );
                metrics::notification_dropped("oversized");
                None
            }
            _ => Some(frame),
        }
    }

    async fn write_to(&self, identity: &ClientIdentity, frame: &str, kind: &str) -> Delivery {
        match self.registry.get(identity).await {
            Some(connection) => self.write(&connection, frame, kind).await,
            None => Delivery::NotConnected,
        }
    }

    async fn write(&self, connection: &Arc<Connection>, frame: &str, kind: &str) -> Delivery {
        match connection.write_frame(frame).await {
            Ok(()) => {
                connection.record_delivery();
                metrics::frame_delivered(kind);
                Delivery::Delivered
            }
            Err(e) => {
                let identity = connection.identity();
                tracing::debug!(
                    user_id = %identity.user_id,
                    device_id = ?identity.device_id,
                    error = %e,
                    "stream write failed, tearing down connection"
                );
                self.registry.remove_connection(connection).await;
                Delivery::Failed
            }
        }
    }
}
