//! Addressing: who a notification is for
use super::registry::ConnectionRegistry;
use crate::models::ClientIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Exactly one stream
    Unicast(ClientIdentity),
    /// Every stream the user currently has open
    AllDevicesOfUser(String),
    /// An explicit list of streams
    Many(Vec<ClientIdentity>),
    /// Every connected client
    Broadcast,
}

impl Target {
    /// Resolve against the registry as it is right now
    ///
    /// The result is a snapshot: streams registered after this call are not
    /// part of it, streams removed afterwards are skipped at send time.
    pub async fn resolve(&self, registry: &ConnectionRegistry) -> Vec<ClientIdentity> {
        match self {
            Target::Unicast(identity) => {
                if registry.exists(identity).await {
                    vec![identity.clone()]
                } else {
                    Vec::new()
                }
            }
            Target::AllDevicesOfUser(user_id) => registry.list_by_user(user_id).await,
            Target::Many(identities) => identities.clone(),
            Target::Broadcast => registry.list().await,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Unicast(_) => "unicast",
            Target::AllDevicesOfUser(_) => "user",
            Target::Many(_) => "many",
            Target::Broadcast => "broadcast",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::connection::Connection;
    use crate::sse::sink::ChannelSink;

    async fn register(registry: &ConnectionRegistry, identity: ClientIdentity) {
        let (sink, _rx) = ChannelSink::channel(4);
        registry.add(Connection::new(identity, Box::new(sink))).await;
    }

    #[tokio::test]
    async fn test_unicast_resolves_only_when_registered() {
        let registry = ConnectionRegistry::new();
        let identity = ClientIdentity::device("alice", "phone");

        assert!(Target::Unicast(identity.clone())
            .resolve(&registry)
            .await
            .is_empty());

        register(&registry, identity.clone()).await;
        assert_eq!(
            Target::Unicast(identity.clone()).resolve(&registry).await,
            vec![identity]
        );
    }

    #[tokio::test]
    async fn test_user_snapshot_excludes_later_devices() {
        let registry = ConnectionRegistry::new();
        register(&registry, ClientIdentity::device("alice", "phone")).await;
        register(&registry, ClientIdentity::device("bob", "phone")).await;

        let snapshot = Target::AllDevicesOfUser("alice".to_string())
            .resolve(&registry)
            .await;

        register(&registry, ClientIdentity::device("alice", "laptop")).await;

        assert_eq!(snapshot, vec![ClientIdentity::device("alice", "phone")]);
    }

    #[tokio::test]
    async fn test_broadcast_lists_everyone() {
        let registry = ConnectionRegistry::new();
        for i in 0..4 {
            register(&registry, ClientIdentity::user(format!("user-{}", i))).await;
        }

        assert_eq!(Target::Broadcast.resolve(&registry).await.len(), 4);
    }
}
