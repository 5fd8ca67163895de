use crate::commitlog::{position_as_u64, Position};
use crate::replica::ReplicaId;
use std::cmp;
use std::collections::BTreeMap;
use tokio::time::{Duration, Instant};

pub(crate) struct LeaderStateTracker {
    peer_state: BTreeMap<ReplicaId, PeerState>,
    // Position of the initial entry this leader appended in its own term. Commit position may only
    // be advanced by the leader to this position or later.
    start_position: Position,
}

impl LeaderStateTracker {
    pub(super) fn new(peer_ids: &[ReplicaId], start_position: Position) -> Self {
        let peer_state = peer_ids
            .iter()
            .map(|peer_id| (peer_id.clone(), PeerState::new(start_position)))
            .collect();

        LeaderStateTracker {
            peer_state,
            start_position,
        }
    }

    pub(crate) fn peer_state_mut(&mut self, peer_id: &ReplicaId) -> Option<&mut PeerState> {
        self.peer_state.get_mut(peer_id)
    }

    /// Returns the position a quorum of the cluster holds, if it can be committed by this leader.
    pub(crate) fn tentative_commit_position(
        &self,
        leader_flushed_position: Option<Position>,
        quorum: usize,
    ) -> Option<Position> {
        let mut positions: Vec<Option<Position>> = self.peer_state.values().map(|ps| ps.matched).collect();
        positions.push(leader_flushed_position);

        match get_cluster_commit_position(positions, quorum) {
            Some(p) if p >= self.start_position => Some(p),
            _ => None,
        }
    }
}

/// Sorts every member's acknowledged position ascending (None is 0) and takes the value at rank
/// `count - quorum`; that position is held by at least `quorum` members.
pub(crate) fn get_cluster_commit_position(mut positions: Vec<Option<Position>>, quorum: usize) -> Option<Position> {
    assert!(
        quorum > 0 && quorum <= positions.len(),
        "Quorum {} is impossible with {} members",
        quorum,
        positions.len()
    );

    positions.sort();
    positions[positions.len() - quorum]
}

pub(crate) struct PeerState {
    // > index of the next log entry to send to that server
    // > (initialized to leader last log index + 1)
    next: Position,
    // > index of highest log entry known to be replicated on server
    // > (initialized to 0, increases monotonically)
    matched: Option<Position>,

    // SeqNo is a form of a logical clock that tracks a term leader's interactions with a peer. When
    // a replica becomes leader, it initializes last sent/received to 0. Each time leader sends a
    // request, it increments the last sent SeqNo and ensures the response will be associated with
    // that SeqNo. If a leader receives a SeqNo from earlier than a previously received SeqNo, it
    // discards it.
    last_sent_seq_no: u64,
    last_received_seq_no: u64,
    last_sent_at: Option<Instant>,
}

impl PeerState {
    fn new(next: Position) -> Self {
        PeerState {
            next,
            matched: None,
            last_sent_seq_no: 0,
            last_received_seq_no: 0,
            last_sent_at: None,
        }
    }

    pub(crate) fn next_and_preceding_position(&self) -> (Position, Option<Position>) {
        (self.next, self.next.checked_minus(1))
    }

    #[cfg(test)]
    pub(crate) fn matched(&self) -> Option<Position> {
        self.matched
    }

    pub(crate) fn handle_append_result(&mut self, logger: &slog::Logger, received_seq_no: u64, update: PeerStateUpdate) {
        if !self.ratchet_fwd_received_seq_no(received_seq_no) {
            slog::warn!(
                logger,
                "Dropping out of date seq-no({:?}): {:?}",
                received_seq_no,
                update
            );
            return;
        }

        match update {
            PeerStateUpdate::Success { last_position } => {
                self.matched = cmp::max(self.matched, last_position);
                self.next = self
                    .matched
                    .map(|m| m.plus(1))
                    .unwrap_or_else(Position::start_position);
            }
            PeerStateUpdate::PeerLogBehind { hint } => {
                // Rewind by one, or jump straight to the follower's hint if that's further back,
                // but never behind what the follower has already acknowledged.
                let floor = position_as_u64(self.matched) + 1;
                let rewound = cmp::min(self.next.as_u64().saturating_sub(1), position_as_u64(hint) + 1);
                self.next = Position::new(cmp::max(floor, rewound));
                slog::debug!(logger, "Rewound peer next position to {:?}", self.next);
            }
        }
    }

    /// One outstanding request per peer; no pipelining. A request that got no reply within the
    /// append timeout is treated as lost.
    pub(crate) fn can_send(&self, now: Instant, append_timeout: Duration) -> bool {
        if !self.has_outstanding_request() {
            return true;
        }

        match self.last_sent_at {
            None => true,
            Some(sent_at) => now >= sent_at + append_timeout,
        }
    }

    pub(crate) fn has_outstanding_request(&self) -> bool {
        self.last_received_seq_no < self.last_sent_seq_no
    }

    pub(crate) fn heartbeat_due(&self, now: Instant, heartbeat_interval: Duration) -> bool {
        match self.last_sent_at {
            None => true,
            Some(sent_at) => now >= sent_at + heartbeat_interval,
        }
    }

    pub(crate) fn next_seq_no(&mut self, now: Instant) -> u64 {
        self.last_sent_seq_no += 1;
        self.last_sent_at.replace(now);
        self.last_sent_seq_no
    }

    /// returns true if the state was mutated.
    fn ratchet_fwd_received_seq_no(&mut self, received_seq_no: u64) -> bool {
        if self.last_received_seq_no < received_seq_no && received_seq_no <= self.last_sent_seq_no {
            self.last_received_seq_no = received_seq_no;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
pub(crate) enum PeerStateUpdate {
    Success { last_position: Option<Position> },
    PeerLogBehind { hint: Option<Position> },
}
