use crate::actor::{ActorClient, Clock, RealClock, ReplicaActor, Ticker};
use crate::api::client::Partition;
use crate::api::commit_stream::create_applied_record_stream;
use crate::api::options::RaftOptionsValidated;
use crate::api::{EventListener, RaftOptions, ReplicatedLog};
use crate::applier::{ApplierRegistry, RecordProcessor};
use crate::commitlog::Log;
use crate::replica::{ClusterTracker, ClusterTrackerError, PersistentLocalState, Replica, ReplicaConfig, ReplicaId};
use crate::transport::{PartitionInbox, Transport};
use std::convert::TryFrom;
use std::sync::Arc;

pub struct PartitionConfig<L, P, S> {
    pub replica_id: String,
    /// Every member of the partition, including me.
    pub members: Vec<String>,
    pub logger: slog::Logger,
    pub options: RaftOptions,
    pub log: L,
    /// Term and vote. Must survive restarts exactly as long as `log` does.
    pub local_state: P,
    pub transport: Arc<dyn Transport>,
    /// Business state the appliers mutate.
    pub state: S,
    pub registry: ApplierRegistry<S>,
    /// Fixes the election timeout jitter. Leave `None` outside of tests.
    pub jitter_seed: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum PartitionCreationError {
    #[error("Invalid cluster info")]
    InvalidClusterInfo(#[from] ClusterTrackerError),
    #[error("Illegal options for configuring partition: {0}")]
    IllegalOptions(String),
}

/// Creates the replica and spawns its actor and ticker on the current tokio runtime. The replica
/// starts as a follower and applies whatever the log has already committed before handling
/// anything else.
pub fn create_partition<L, P, S>(config: PartitionConfig<L, P, S>) -> Result<Partition, PartitionCreationError>
where
    L: Log,
    P: PersistentLocalState,
    S: Send + 'static,
{
    let root_logger = config.logger;

    let options = RaftOptionsValidated::try_from(config.options)
        .map_err(|e| PartitionCreationError::IllegalOptions(e.to_string()))?;

    let my_replica_id = ReplicaId::new(config.replica_id);
    let members = config.members.into_iter().map(ReplicaId::new).collect();
    let cluster_tracker = ClusterTracker::create_valid_cluster(my_replica_id.clone(), members)?;

    let registered_versions = config.registry.registered_versions();
    let (publisher, applied_records) = create_applied_record_stream();
    let record_processor =
        RecordProcessor::new(root_logger.clone(), config.registry, config.state).with_publisher(publisher);

    let clock = RealClock;
    let (replica, status_listener) = Replica::new(ReplicaConfig {
        logger: root_logger.clone(),
        cluster_tracker,
        log: config.log,
        local_state: config.local_state,
        state_machine: record_processor,
        leader_heartbeat_duration: options.leader_heartbeat_duration,
        follower_min_timeout: options.follower_min_timeout,
        follower_max_timeout: options.follower_max_timeout,
        append_timeout: options.leader_append_timeout,
        max_append_batch: options.max_append_batch,
        jitter_seed: config.jitter_seed,
        now: clock.now(),
    });

    let (actor_client, actor_queue_rx) = ActorClient::new(options.actor_queue_size);

    let replica_actor = ReplicaActor::new(
        root_logger,
        actor_queue_rx,
        replica,
        config.transport,
        actor_client.weak(),
    );
    tokio::spawn(replica_actor.run_event_loop());

    let ticker = Ticker::new(clock, options.tick_interval, actor_client.weak());
    tokio::spawn(ticker.run());

    let inbox = PartitionInbox::new(actor_client.weak());

    Ok(Partition {
        replicated_log: ReplicatedLog::new(actor_client, registered_versions),
        applied_records,
        event_listener: EventListener::new(status_listener),
        inbox,
    })
}
