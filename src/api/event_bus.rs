use crate::replica::{ReplicaStatus, Role, StatusListener};

/// An event that happened, as observed by the local partition replica.
///
/// Consuming events is subtle: intermediate states aren't queued. If several things happen
/// between two calls to `next_event()`, only the most recent state is reported.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    Election(ElectionEvent),
    /// The replica stopped after failing to apply a committed record. Terminal.
    Halted,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ElectionEvent {
    Leader,
    Candidate,
    Follower(FollowerEventData),
    FollowerNoLeader,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FollowerEventData {
    pub leader_replica_id: String,
}

pub struct EventListener {
    status_listener: StatusListener,
    last_event: Option<Event>,
}

impl EventListener {
    pub(crate) fn new(status_listener: StatusListener) -> Self {
        EventListener {
            status_listener,
            last_event: None,
        }
    }

    /// Full current status of the replica: role, term, and log positions. Doesn't wait.
    pub fn status(&self) -> ReplicaStatus {
        self.status_listener.current()
    }

    /// `next_event()` returns the next election (or halt) event that this local replica observes.
    /// Status changes that don't change the event, such as commit progress, are skipped. None
    /// once the replica is gone.
    pub async fn next_event(&mut self) -> Option<Event> {
        loop {
            let status = self.status_listener.next().await?;
            let event = Event::from(status);
            if self.last_event.as_ref() != Some(&event) {
                self.last_event.replace(event.clone());
                return Some(event);
            }
        }
    }
}

// ------- Conversions --------

impl From<ReplicaStatus> for Event {
    fn from(status: ReplicaStatus) -> Self {
        if status.halted {
            return Event::Halted;
        }

        Event::Election(match (status.role, status.leader) {
            (Role::Leader, _) => ElectionEvent::Leader,
            (Role::Candidate, _) => ElectionEvent::Candidate,
            (Role::Follower, Some(leader_id)) => ElectionEvent::Follower(FollowerEventData {
                leader_replica_id: leader_id.into_inner(),
            }),
            (Role::Follower, None) => ElectionEvent::FollowerNoLeader,
        })
    }
}
