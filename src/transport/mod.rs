mod in_memory;

pub use in_memory::InMemoryNetwork;

use crate::actor::WeakActorClient;
use crate::replica::{RaftMessage, ReplicaId};

/// Transport moves protocol messages between members of a partition. Delivery may be lossy,
/// reordered, or duplicated; the protocol tolerates all three. On the receiving side the transport
/// hands each message to that member's `PartitionInbox`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, from: &ReplicaId, to: &ReplicaId, message: RaftMessage) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No route to replica {0:?}")]
    UnknownReplica(ReplicaId),
    #[error("Replica {0:?} is unreachable")]
    Disconnected(ReplicaId),
    #[error("Receiving partition has stopped")]
    PartitionStopped,
}

/// PartitionInbox is the receiving end of one partition replica. It doesn't keep the replica
/// alive.
#[derive(Clone)]
pub struct PartitionInbox {
    actor_client: WeakActorClient,
}

impl PartitionInbox {
    pub(crate) fn new(actor_client: WeakActorClient) -> Self {
        PartitionInbox { actor_client }
    }

    pub async fn deliver(&self, from: ReplicaId, message: RaftMessage) -> Result<(), TransportError> {
        match self.actor_client.upgrade() {
            Some(actor_client) => actor_client
                .deliver(from, message)
                .await
                .map_err(|_| TransportError::PartitionStopped),
            None => Err(TransportError::PartitionStopped),
        }
    }
}
