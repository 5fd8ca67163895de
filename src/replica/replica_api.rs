use crate::commitlog::{Position, Term};
use crate::replica::peers::ReplicaId;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteToLogOutput {
    pub term: Term,
    pub position: Position,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteToLogError {
    #[error("I'm not leader, {0:?} is")]
    LeaderRedirect(ReplicaId),

    // Can be retried with exponential backoff with recommended initial delay of 200ms. Likely an
    // election is in progress.
    #[error("Cluster is in a tough shape. No one is leader.")]
    NoLeader,

    #[error("Failed to persist log")]
    LocalIoError(#[source] io::Error),

    #[error("Replica halted after failing to apply a committed entry")]
    Halted,

    #[error("Replica actor is dead RIP")]
    ActorExited,
}
