use std::collections::BTreeSet;
use std::fmt;

/// ReplicaId identifies one member of a partition's replication group.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        ReplicaId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ClusterTracker is the static membership view of a partition: who I am, who my peers are, and
/// how many of us it takes to form a quorum.
#[derive(Clone, Debug)]
pub struct ClusterTracker {
    my_replica_id: ReplicaId,
    // Sorted, so iteration order (and therefore outbound message order) is deterministic.
    peer_ids: Vec<ReplicaId>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ClusterTrackerError {
    #[error("My replica ID {0:?} is not in the member list")]
    MeNotInCluster(ReplicaId),
    #[error("Replica ID {0:?} is listed more than once")]
    DuplicateMember(ReplicaId),
}

impl ClusterTracker {
    pub fn create_valid_cluster(
        my_replica_id: ReplicaId,
        members: Vec<ReplicaId>,
    ) -> Result<Self, ClusterTrackerError> {
        let mut unique = BTreeSet::new();
        for member in members {
            if !unique.insert(member.clone()) {
                return Err(ClusterTrackerError::DuplicateMember(member));
            }
        }

        if !unique.remove(&my_replica_id) {
            return Err(ClusterTrackerError::MeNotInCluster(my_replica_id));
        }

        Ok(ClusterTracker {
            my_replica_id,
            peer_ids: unique.into_iter().collect(),
        })
    }

    pub fn my_replica_id(&self) -> &ReplicaId {
        &self.my_replica_id
    }

    pub fn peer_ids(&self) -> &[ReplicaId] {
        &self.peer_ids
    }

    pub fn contains_member(&self, id: &ReplicaId) -> bool {
        &self.my_replica_id == id || self.peer_ids.contains(id)
    }

    pub fn num_voting_replicas(&self) -> usize {
        self.peer_ids.len() + 1
    }

    pub fn quorum(&self) -> usize {
        get_majority_vote_count(self.num_voting_replicas())
    }
}

pub(crate) fn get_majority_vote_count(num_voting_replicas: usize) -> usize {
    (num_voting_replicas / 2) + 1
}
