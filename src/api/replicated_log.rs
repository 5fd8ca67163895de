use crate::actor::ActorClient;
use crate::applier::{encode_record, NewRecord, Operation, RecordType};
use crate::commitlog::{Position, Term};
use crate::replica;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::Arc;

/// ReplicatedLog is the partition's replicated log for the business engine to append records to.
/// Only the leader accepts writes.
#[derive(Clone)]
pub struct ReplicatedLog {
    actor_client: ActorClient,
    registered_versions: Arc<HashMap<(RecordType, Operation), BTreeSet<u16>>>,
}

impl ReplicatedLog {
    pub(crate) fn new(
        actor_client: ActorClient,
        registered_versions: HashMap<(RecordType, Operation), BTreeSet<u16>>,
    ) -> Self {
        ReplicatedLog {
            actor_client,
            registered_versions: Arc::new(registered_versions),
        }
    }

    /// Stamps the record with the current wall clock time and appends it. Success means the
    /// record is in the leader's log, not that it's committed; watch the `AppliedRecordStream`
    /// for that.
    ///
    /// Records no applier could apply are rejected here. Once committed they would halt every
    /// replica.
    pub async fn write_record(&self, record: NewRecord) -> Result<WriteRecordOutput, WriteError> {
        let version = self.resolve_version(&record)?;
        let timestamp = Utc::now().timestamp_millis().max(0) as u64;
        let data = encode_record(&record, version, timestamp);

        let output = self.actor_client.write_to_log(data).await?;

        Ok(WriteRecordOutput {
            term: output.term,
            position: output.position,
            timestamp,
            version,
        })
    }

    fn resolve_version(&self, record: &NewRecord) -> Result<u16, WriteError> {
        let unknown_applier = || WriteError::UnknownApplier {
            record_type: record.record_type,
            operation: record.operation,
            version: record.version,
        };

        let versions = self
            .registered_versions
            .get(&(record.record_type, record.operation))
            .ok_or_else(unknown_applier)?;

        match record.version {
            Some(version) if versions.contains(&version) => Ok(version),
            Some(_) => Err(unknown_applier()),
            None => versions.iter().next_back().copied().ok_or_else(unknown_applier),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecordOutput {
    pub term: Term,
    pub position: Position,
    /// Milliseconds since the unix epoch, as stamped on the record.
    pub timestamp: u64,
    pub version: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("I'm not leader, {leader_id} is")]
    LeaderRedirect { leader_id: String },

    // Can be retried with exponential backoff with recommended initial delay of 200ms. Likely an
    // election is in progress.
    #[error("Cluster is in a tough shape. No one is leader.")]
    NoLeader,

    // Not retryable. Nothing was appended.
    #[error("No applier registered for {record_type:?}/{operation:?} version {version:?}")]
    UnknownApplier {
        record_type: RecordType,
        operation: Operation,
        version: Option<u16>,
    },

    #[error("Failed to persist log")]
    LocalIoError(#[source] io::Error),

    // The replica stopped, either because a committed record couldn't be applied or because the
    // partition was dropped.
    #[error("Partition has halted")]
    PartitionHalted,
}

// ------- Conversions --------

impl From<replica::WriteToLogError> for WriteError {
    fn from(internal_error: replica::WriteToLogError) -> Self {
        match internal_error {
            replica::WriteToLogError::LeaderRedirect(leader_id) => WriteError::LeaderRedirect {
                leader_id: leader_id.into_inner(),
            },
            replica::WriteToLogError::NoLeader => WriteError::NoLeader,
            replica::WriteToLogError::LocalIoError(e) => WriteError::LocalIoError(e),
            replica::WriteToLogError::Halted | replica::WriteToLogError::ActorExited => WriteError::PartitionHalted,
        }
    }
}
