mod actor;
mod api;
mod applier;
mod commitlog;
mod replica;
mod transport;

pub use api::create_partition;
pub use api::file_logger;
pub use api::stdout_logger;
pub use api::AppliedRecordStream;
pub use api::ElectionEvent;
pub use api::Event;
pub use api::EventListener;
pub use api::FollowerEventData;
pub use api::Partition;
pub use api::PartitionConfig;
pub use api::PartitionCreationError;
pub use api::RaftOptions;
pub use api::ReplicatedLog;
pub use api::WriteError;
pub use api::WriteRecordOutput;
pub use applier::ApplierRegistry;
pub use applier::ApplyError;
pub use applier::CommitRecord;
pub use applier::NewRecord;
pub use applier::Operation;
pub use applier::RecordApplier;
pub use applier::RecordDecodeError;
pub use applier::RecordProcessor;
pub use applier::RecordType;
pub use applier::RegistrationError;
pub use applier::SchedulingError;
pub use applier::TaskCallback;
pub use applier::TaskId;
pub use applier::TaskScheduler;
pub use applier::DEFAULT_RECORD_VERSION;
pub use commitlog::AppendOutcome;
pub use commitlog::EntryDecodeError;
pub use commitlog::EntryKind;
pub use commitlog::FlushFuture;
pub use commitlog::InMemoryLog;
pub use commitlog::Log;
pub use commitlog::LogEntry;
pub use commitlog::Position;
pub use commitlog::Term;
pub use replica::AppendRequest;
pub use replica::AppendResponse;
pub use replica::ClusterTracker;
pub use replica::ClusterTrackerError;
pub use replica::FlushCompletion;
pub use replica::LogFlush;
pub use replica::OutboundMessage;
pub use replica::PersistentLocalState;
pub use replica::PollRequest;
pub use replica::PollResponse;
pub use replica::RaftMessage;
pub use replica::Replica;
pub use replica::ReplicaConfig;
pub use replica::ReplicaId;
pub use replica::ReplicaStatus;
pub use replica::Role;
pub use replica::StateMachine;
pub use replica::StatusListener;
pub use replica::VolatileLocalState;
pub use replica::VoteRequest;
pub use replica::VoteResponse;
pub use replica::WriteToLogError;
pub use replica::WriteToLogOutput;
pub use transport::InMemoryNetwork;
pub use transport::PartitionInbox;
pub use transport::Transport;
pub use transport::TransportError;

// Learning 1: `create::{root_mod}` should not have any code. Just `mod` and `pub use` statements.
// Learning 2: All `mod` statements, anywhere, should not be `pub`. Only export `pub` via individual
//             use statements.
//
// This keeps the `crate::{root_mod}` root_mod only responsible for exporting types to the rest of
// crate, and allows me to organize my root_mod impl however I want.
