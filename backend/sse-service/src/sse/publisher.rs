//! Staged notification builder
//!
//! ```ignore
//! publisher
//!     .new_notification()
//!     .id("42")
//!     .retry(10)
//!     .event("new_message")
//!     .json(&message)?
//!     .send_to_all()
//!     .await;
//! ```
//!
//! Each stage only offers the calls that may follow it, so fields are set in
//! wire order and `data` cannot be skipped.
use super::dispatcher::{DispatchReport, Dispatcher};
use super::target::Target;
use crate::models::{ClientIdentity, Notification};
use serde::Serialize;

#[derive(Clone)]
pub struct Publisher {
    dispatcher: Dispatcher,
}

impl Publisher {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn new_notification(&self) -> IdStage<'_> {
        IdStage {
            draft: Draft {
                dispatcher: &self.dispatcher,
                notification: Notification::new(String::new()),
            },
        }
    }

    /// Skip the builder for a notification assembled elsewhere
    pub fn prepared(&self, notification: Notification) -> ReadyToSend<'_> {
        ReadyToSend {
            dispatcher: &self.dispatcher,
            notification,
        }
    }
}

struct Draft<'a> {
    dispatcher: &'a Dispatcher,
    notification: Notification,
}

impl<'a> Draft<'a> {
    fn with_data(mut self, data: String) -> ReadyToSend<'a> {
        self.notification.data = data;
        ReadyToSend {
            dispatcher: self.dispatcher,
            notification: self.notification,
        }
    }

    fn with_json<T: Serialize>(self, value: &T) -> Result<ReadyToSend<'a>, serde_json::Error> {
        let data = serde_json::to_string(value)?;
        Ok(self.with_data(data))
    }
}

pub struct IdStage<'a> {
    draft: Draft<'a>,
}

impl<'a> IdStage<'a> {
    pub fn id(mut self, id: impl ToString) -> RetryStage<'a> {
        self.draft.notification.id = Some(id.to_string());
        RetryStage { draft: self.draft }
    }

    pub fn retry(self, retry: u32) -> EventStage<'a> {
        RetryStage { draft: self.draft }.retry(retry)
    }

    pub fn event(self, event: impl Into<String>) -> DataStage<'a> {
        EventStage { draft: self.draft }.event(event)
    }

    pub fn data(self, data: impl Into<String>) -> ReadyToSend<'a> {
        self.draft.with_data(data.into())
    }

    pub fn json<T: Serialize>(self, value: &T) -> Result<ReadyToSend<'a>, serde_json::Error> {
        self.draft.with_json(value)
    }
}

pub struct RetryStage<'a> {
    draft: Draft<'a>,
}

impl<'a> RetryStage<'a> {
    pub fn retry(mut self, retry: u32) -> EventStage<'a> {
        self.draft.notification.retry = Some(retry);
        EventStage { draft: self.draft }
    }

    pub fn event(self, event: impl Into<String>) -> DataStage<'a> {
        EventStage { draft: self.draft }.event(event)
    }

    pub fn data(self, data: impl Into<String>) -> ReadyToSend<'a> {
        self.draft.with_data(data.into())
    }

    pub fn json<T: Serialize>(self, value: &T) -> Result<ReadyToSend<'a>, serde_json::Error> {
        self.draft.with_json(value)
    }
}

pub struct EventStage<'a> {
    draft: Draft<'a>,
}

impl<'a> EventStage<'a> {
    pub fn event(mut self, event: impl Into<String>) -> DataStage<'a> {
        self.draft.notification.event = Some(event.into());
        DataStage { draft: self.draft }
    }

    pub fn data(self, data: impl Into<String>) -> ReadyToSend<'a> {
        self.draft.with_data(data.into())
    }

    pub fn json<T: Serialize>(self, value: &T) -> Result<ReadyToSend<'a>, serde_json::Error> {
        self.draft.with_json(value)
    }
}

pub struct DataStage<'a> {
    draft: Draft<'a>,
}

impl<'a> DataStage<'a> {
    pub fn data(self, data: impl Into<String>) -> ReadyToSend<'a> {
        self.draft.with_data(data.into())
    }

    pub fn json<T: Serialize>(self, value: &T) -> Result<ReadyToSend<'a>, serde_json::Error> {
        self.draft.with_json(value)
    }
}

/// A complete notification waiting for its recipients
pub struct ReadyToSend<'a> {
    dispatcher: &'a Dispatcher,
    notification: Notification,
}

impl<'a> ReadyToSend<'a> {
    pub fn notification(&self) -> &Notification {
        &self.notification
    }

    pub async fn send(&self, target: &Target) -> DispatchReport {
        self.dispatcher.send(target, &self.notification).await
    }

    pub async fn send_to(&self, identity: &ClientIdentity) -> DispatchReport {
        self.dispatcher.send_one(identity, &self.notification).await
    }

    pub async fn send_to_device(
        &self,
        user_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> DispatchReport {
        self.send_to(&ClientIdentity::device(user_id, device_id))
            .await
    }

    pub async fn send_many(&self, identities: &[ClientIdentity]) -> DispatchReport {
        self.dispatcher
            .send_many(identities, &self.notification)
            .await
    }

    pub async fn send_to_user_devices(&self, user_id: impl Into<String>) -> DispatchReport {
        self.send(&Target::AllDevicesOfUser(user_id.into())).await
    }

    pub async fn send_to_all(&self) -> DispatchReport {
        self.send(&Target::Broadcast).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::connection::Connection;
    use crate::sse::registry::ConnectionRegistry;
    use crate::sse::sink::ChannelSink;
    use serde_json::json;

    fn publisher() -> (Publisher, ConnectionRegistry) {
        let registry = ConnectionRegistry::new();
        let dispatcher = Dispatcher::new(registry.clone(), None);
        (Publisher::new(dispatcher), registry)
    }

    #[test]
    fn test_full_chain_builds_notification() {
        let (publisher, _registry) = publisher();
        let ready = publisher
            .new_notification()
            .id(7)
            .retry(10)
            .event("new_message")
            .data("hello");

        assert_eq!(
            ready.notification(),
            &Notification::new("hello")
                .with_id("7")
                .with_retry(10)
                .with_event("new_message")
        );
    }

    #[test]
    fn test_stages_can_be_skipped() {
        let (publisher, _registry) = publisher();

        let only_data = publisher.new_notification().data("x");
        assert_eq!(only_data.notification(), &Notification::new("x"));

        let event_only = publisher.new_notification().event("e").data("x");
        assert_eq!(
            event_only.notification(),
            &Notification::new("x").with_event("e")
        );

        let retry_only = publisher.new_notification().retry(3).data("x");
        assert_eq!(
            retry_only.notification(),
            &Notification::new("x").with_retry(3)
        );
    }

    #[test]
    fn test_json_payload() {
        let (publisher, _registry) = publisher();
        let ready = publisher
            .new_notification()
            .event("new_message")
            .json(&json!({"text": "hi"}))
            .unwrap();

        assert_eq!(ready.notification().data, r#"{"text":"hi"}"#);
    }

    #[tokio::test]
    async fn test_send_to_device() {
        let (publisher, registry) = publisher();
        let (sink, mut rx) = ChannelSink::channel(4);
        registry
            .add(Connection::new(
                ClientIdentity::device("alice", "phone"),
                Box::new(sink),
            ))
            .await;

        let report = publisher
            .new_notification()
            .event("new_message")
            .data("hi")
            .send_to_device("alice", "phone")
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(
            rx.recv().await.as_deref(),
            Some("event: new_message\ndata: hi\n\n")
        );
    }
}
