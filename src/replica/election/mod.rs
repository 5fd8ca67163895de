mod election_state;
mod leader_state;
mod state_change_listener;
mod timer;

pub(crate) use election_state::CurrentLeader;
pub(crate) use election_state::ElectionState;
pub(crate) use leader_state::LeaderStateTracker;
pub(crate) use leader_state::PeerState;
pub(crate) use leader_state::PeerStateUpdate;
pub(crate) use state_change_listener::new as status_channel;
pub use state_change_listener::ReplicaStatus;
pub use state_change_listener::Role;
pub(crate) use state_change_listener::StatusNotifier;
pub use state_change_listener::StatusListener;
pub(crate) use timer::ElectionTimer;
