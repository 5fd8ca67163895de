use crate::replica::{RaftMessage, ReplicaId};
use crate::transport::{PartitionInbox, Transport, TransportError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// InMemoryNetwork connects partition replicas living in the same process. Clones share the same
/// network. Faults (isolation, message loss, latency) can be injected for tests.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    inboxes: HashMap<ReplicaId, PartitionInbox>,
    isolated: HashSet<ReplicaId>,
    faults: Option<Faults>,
}

struct Faults {
    rng: StdRng,
    drop_probability: f64,
    latency: RangeInclusive<Duration>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops each message with `drop_probability` and delays the rest by a random latency. Same
    /// seed, same sequence of decisions.
    pub fn with_faults(seed: u64, drop_probability: f64, latency: RangeInclusive<Duration>) -> Self {
        assert!(
            (0.0..=1.0).contains(&drop_probability),
            "Drop probability {} is not a probability",
            drop_probability
        );
        let network = Self::default();
        network.lock().faults.replace(Faults {
            rng: StdRng::seed_from_u64(seed),
            drop_probability,
            latency,
        });
        network
    }

    pub fn register(&self, replica_id: ReplicaId, inbox: PartitionInbox) {
        self.lock().inboxes.insert(replica_id, inbox);
    }

    pub fn deregister(&self, replica_id: &ReplicaId) {
        self.lock().inboxes.remove(replica_id);
    }

    /// Cuts every link to and from `replica_id`.
    pub fn isolate(&self, replica_id: &ReplicaId) {
        self.lock().isolated.insert(replica_id.clone());
    }

    pub fn heal(&self, replica_id: &ReplicaId) {
        self.lock().isolated.remove(replica_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NetworkState> {
        self.state.lock().expect("InMemoryNetwork mutex guard poison")
    }

    /// Decides the fate of one message: None if it's lost, otherwise the inbox and delay.
    fn route(&self, from: &ReplicaId, to: &ReplicaId) -> Result<Option<(PartitionInbox, Duration)>, TransportError> {
        let mut state = self.lock();
        if state.isolated.contains(from) || state.isolated.contains(to) {
            return Err(TransportError::Disconnected(to.clone()));
        }

        let inbox = match state.inboxes.get(to) {
            Some(inbox) => inbox.clone(),
            None => return Err(TransportError::UnknownReplica(to.clone())),
        };

        let delay = match state.faults.as_mut() {
            None => Duration::from_millis(0),
            Some(faults) => {
                if faults.rng.gen_bool(faults.drop_probability) {
                    return Ok(None);
                }
                faults.rng.gen_range(faults.latency.clone())
            }
        };

        Ok(Some((inbox, delay)))
    }
}

#[async_trait::async_trait]
impl Transport for InMemoryNetwork {
    async fn send(&self, from: &ReplicaId, to: &ReplicaId, message: RaftMessage) -> Result<(), TransportError> {
        let (inbox, delay) = match self.route(from, to)? {
            Some(route) => route,
            // Lost on the wire. Senders can't tell.
            None => return Ok(()),
        };

        if delay > Duration::from_millis(0) {
            tokio::time::sleep(delay).await;
        }
        inbox.deliver(from.clone(), message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorClient, Event};
    use crate::commitlog::Term;
    use crate::replica::VoteResponse;

    fn message() -> RaftMessage {
        RaftMessage::VoteResponse(VoteResponse {
            term: Term::new(1),
            granted: true,
        })
    }

    #[tokio::test]
    async fn delivers_to_registered_inbox() {
        let network = InMemoryNetwork::new();
        let (a, b) = (ReplicaId::new("a"), ReplicaId::new("b"));
        let (actor_client, mut actor_queue_rx) = ActorClient::new(10);
        network.register(b.clone(), PartitionInbox::new(actor_client.weak()));

        network.send(&a, &b, message()).await.unwrap();
        match actor_queue_rx.recv().await {
            Some(Event::Inbound { from, message: received }) => {
                assert_eq!(from, a);
                assert_eq!(received, message());
            }
            other => panic!("Unexpected event {:?}", other),
        }

        assert!(matches!(
            network.send(&b, &a, message()).await,
            Err(TransportError::UnknownReplica(_))
        ));

        network.isolate(&a);
        assert!(matches!(
            network.send(&a, &b, message()).await,
            Err(TransportError::Disconnected(_))
        ));
        network.heal(&a);
        network.send(&a, &b, message()).await.unwrap();

        drop(actor_client);
        drop(actor_queue_rx);
        assert!(matches!(
            network.send(&a, &b, message()).await,
            Err(TransportError::PartitionStopped)
        ));
    }

    #[tokio::test]
    async fn total_loss_drops_silently() {
        let network = InMemoryNetwork::with_faults(3, 1.0, Duration::from_millis(0)..=Duration::from_millis(0));
        let (a, b) = (ReplicaId::new("a"), ReplicaId::new("b"));
        let (actor_client, mut actor_queue_rx) = ActorClient::new(10);
        network.register(b.clone(), PartitionInbox::new(actor_client.weak()));

        network.send(&a, &b, message()).await.unwrap();
        assert!(actor_queue_rx.try_recv().is_err());
    }
}
