mod election;
mod local_state;
mod messages;
mod peers;
mod replica;
mod replica_api;
mod state_machine;
mod write_ahead_log;

pub use election::ReplicaStatus;
pub use election::Role;
pub use election::StatusListener;
pub use local_state::PersistentLocalState;
pub use local_state::VolatileLocalState;
pub use messages::AppendRequest;
pub use messages::AppendResponse;
pub use messages::OutboundMessage;
pub use messages::PollRequest;
pub use messages::PollResponse;
pub use messages::RaftMessage;
pub use messages::VoteRequest;
pub use messages::VoteResponse;
pub use peers::ClusterTracker;
pub use peers::ClusterTrackerError;
pub use peers::ReplicaId;
pub use replica::Replica;
pub use replica::ReplicaConfig;
pub use replica_api::WriteToLogError;
pub use replica_api::WriteToLogOutput;
pub use state_machine::StateMachine;
pub use write_ahead_log::FlushCompletion;
pub use write_ahead_log::LogFlush;
