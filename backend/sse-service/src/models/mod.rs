use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one client stream
///
/// A user may hold several concurrent streams, one per device.
/// Connections without a device id are keyed by the user alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl ClientIdentity {
    pub fn new(user_id: impl Into<String>, device_id: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id,
        }
    }

    /// Identity addressing a user without a device qualifier
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(user_id, None)
    }

    pub fn device(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self::new(user_id, Some(device_id.into()))
    }

    pub fn belongs_to(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device_id {
            Some(device_id) => write!(f, "{}/{}", self.user_id, device_id),
            None => f.write_str(&self.user_id),
        }
    }
}

/// A single push event
///
/// Only `data` is mandatory; unset optional fields are left out of the
/// encoded frame entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<u32>,
}

impl Notification {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: data.into(),
            retry: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Messages originated by the server itself rather than by a publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent once, right after the stream is opened
    Connected,
    /// Periodic heartbeat
    KeepAlive,
    /// Sent when the server ends the stream on its own terms
    Disconnected,
    /// Sent when the stream is ended because of a failure
    Error(String),
}

impl ServerMessage {
    pub fn event(&self) -> &'static str {
        match self {
            ServerMessage::Connected => "open",
            ServerMessage::KeepAlive => "ping",
            ServerMessage::Disconnected => "disconnect",
            ServerMessage::Error(_) => "error",
        }
    }

    pub fn data(&self) -> &str {
        match self {
            ServerMessage::Connected => "The server is connected.",
            ServerMessage::KeepAlive => "keep_alive",
            ServerMessage::Disconnected => "The server is shutting down.",
            ServerMessage::Error(message) => message,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMessage::Connected => "connected",
            ServerMessage::KeepAlive => "keep_alive",
            ServerMessage::Disconnected => "disconnected",
            ServerMessage::Error(_) => "error",
        }
    }

    pub fn to_notification(&self) -> Notification {
        Notification::new(self.data()).with_event(self.event())
    }
}

impl From<ServerMessage> for Notification {
    fn from(message: ServerMessage) -> Self {
        message.to_notification()
    }
}
