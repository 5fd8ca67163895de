use crate::api::{AppliedRecordStream, EventListener, ReplicatedLog};
use crate::transport::PartitionInbox;

/// Partition is the business engine's handle to one replica of one partition.
///
/// Dropping every `ReplicatedLog` clone stops the replica.
pub struct Partition {
    /// Append records here (leader only).
    pub replicated_log: ReplicatedLog,
    /// Every record once it's committed and applied, in position order.
    pub applied_records: AppliedRecordStream,
    /// Leadership changes and halts.
    pub event_listener: EventListener,
    /// Hand this to the transport so peers' messages reach this replica.
    pub inbox: PartitionInbox,
}
