use crate::commitlog::{Position, Term};
use crate::replica::ReplicaId;
use tokio::sync::watch;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

/// ReplicaStatus is the externally observable state of one replica. Stalled `commit_position`
/// while a leader is known is how "no quorum" shows up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplicaStatus {
    pub role: Role,
    pub term: Term,
    pub leader: Option<ReplicaId>,
    pub last_position: Option<Position>,
    pub commit_position: Option<Position>,
    pub last_applied_position: Option<Position>,
    pub halted: bool,
}

pub(crate) fn new(initial_status: ReplicaStatus) -> (StatusNotifier, StatusListener) {
    let (snd, rcv) = watch::channel(initial_status);

    (StatusNotifier { snd }, StatusListener { rcv })
}

pub(crate) struct StatusNotifier {
    snd: watch::Sender<ReplicaStatus>,
}

impl StatusNotifier {
    pub(crate) fn notify_if_changed(&self, status: ReplicaStatus) {
        if *self.snd.borrow() != status {
            self.snd.send_replace(status);
        }
    }
}

#[derive(Clone)]
pub struct StatusListener {
    rcv: watch::Receiver<ReplicaStatus>,
}

impl StatusListener {
    /// Latest status. Doesn't wait.
    pub fn current(&self) -> ReplicaStatus {
        self.rcv.borrow().clone()
    }

    /// Waits for the status to change. Intermediate states between two calls are clobbered into
    /// the most recent one. None once the replica is gone.
    pub async fn next(&mut self) -> Option<ReplicaStatus> {
        match self.rcv.changed().await {
            Ok(_) => Some(self.rcv.borrow().clone()),
            Err(_) => None,
        }
    }
}
