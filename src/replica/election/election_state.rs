use crate::commitlog::{Position, Term};
use crate::replica::election::state_change_listener::Role;
use crate::replica::election::LeaderStateTracker;
use crate::replica::ReplicaId;
use std::collections::HashSet;
use std::fmt;

/// ElectionState is responsible for holding state specific to the stage in an election. Its
/// methods are responsible for "what" to do. It is NOT responsible for validating anything
/// specific to logs, terms, peers, etc. or knowing "when" to do something.
///
/// Entering a state creates that state's resources (poll round, vote tally, per-peer replication
/// trackers), and leaving it drops them.
pub(crate) struct ElectionState {
    state: State,
    my_replica_id: ReplicaId,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum CurrentLeader {
    Me,
    Other(ReplicaId),
    Unknown,
}

impl ElectionState {
    /// `new_follower()` creates a new ElectionState instance that starts out as a follower.
    pub(crate) fn new_follower(my_replica_id: ReplicaId) -> Self {
        ElectionState {
            state: State::Follower(FollowerState::with_leader_info(None)),
            my_replica_id,
        }
    }

    pub(crate) fn transition_to_follower(&mut self, new_leader: Option<ReplicaId>) {
        self.state = State::Follower(FollowerState::with_leader_info(new_leader));
    }

    pub(crate) fn transition_to_candidate_and_vote_for_self(&mut self) -> usize {
        let mut cs = CandidateState::new();

        // Vote for self
        let votes = cs.add_received_vote(self.my_replica_id.clone());

        self.state = State::Candidate(cs);
        votes
    }

    pub(crate) fn transition_to_leader(&mut self, peer_ids: &[ReplicaId], start_position: Position) {
        self.state = State::Leader(LeaderStateTracker::new(peer_ids, start_position));
    }

    /// Starts a fresh pre-vote round if follower, counting our own grant. Returns the grant count,
    /// or None if not a follower.
    pub(crate) fn start_poll_round_if_follower(&mut self, poll_term: Term) -> Option<usize> {
        if let State::Follower(fs) = &mut self.state {
            // Whoever we were following has gone quiet.
            fs.leader = None;

            let mut round = PollRound {
                term: poll_term,
                granted_by: HashSet::with_capacity(3),
            };
            round.granted_by.insert(self.my_replica_id.clone());
            fs.poll.replace(round);

            Some(1)
        } else {
            None
        }
    }

    /// Return number of poll grants received if polling for `poll_term`, or None otherwise.
    pub(crate) fn add_poll_grant_if_polling(&mut self, poll_term: Term, grant_from: ReplicaId) -> Option<usize> {
        match &mut self.state {
            State::Follower(FollowerState {
                poll: Some(round), ..
            }) if round.term == poll_term => {
                round.granted_by.insert(grant_from);
                Some(round.granted_by.len())
            }
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn poll_term(&self) -> Option<Term> {
        match &self.state {
            State::Follower(FollowerState {
                poll: Some(round), ..
            }) => Some(round.term),
            _ => None,
        }
    }

    /// Return number of votes received if candidate, or None if no longer Candidate.
    pub(crate) fn add_vote_if_candidate(&mut self, vote_from: ReplicaId) -> Option<usize> {
        if let State::Candidate(cs) = &mut self.state {
            Some(cs.add_received_vote(vote_from))
        } else {
            None
        }
    }

    pub(crate) fn set_leader_if_unknown(&mut self, leader: &ReplicaId) {
        if let State::Follower(fs) = &mut self.state {
            if fs.leader.is_none() {
                fs.leader.replace(leader.clone());
                fs.poll = None;
            }
        }
    }

    pub(crate) fn leader_state_mut(&mut self) -> Option<&mut LeaderStateTracker> {
        if let State::Leader(ls) = &mut self.state {
            Some(ls)
        } else {
            None
        }
    }

    pub(crate) fn current_leader(&self) -> CurrentLeader {
        match &self.state {
            State::Leader(_) => CurrentLeader::Me,
            State::Follower(FollowerState {
                leader: Some(leader), ..
            }) => CurrentLeader::Other(leader.clone()),
            State::Follower(FollowerState { leader: None, .. }) | State::Candidate(_) => CurrentLeader::Unknown,
        }
    }

    pub(crate) fn role(&self) -> Role {
        match &self.state {
            State::Leader(_) => Role::Leader,
            State::Candidate(_) => Role::Candidate,
            State::Follower(_) => Role::Follower,
        }
    }
}

impl fmt::Debug for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            State::Leader(_) => write!(f, "Leader"),
            State::Candidate(_) => write!(f, "Candidate"),
            State::Follower(FollowerState {
                leader: Some(leader), ..
            }) => write!(f, "Follower(Leader={:?})", leader),
            State::Follower(FollowerState {
                leader: None,
                poll: Some(round),
            }) => write!(f, "Follower(Leader=None, Polling={:?})", round.term),
            State::Follower(FollowerState { leader: None, .. }) => write!(f, "Follower(Leader=None)"),
        }
    }
}

enum State {
    Leader(LeaderStateTracker),
    Candidate(CandidateState),
    Follower(FollowerState),
}

struct CandidateState {
    received_votes_from: HashSet<ReplicaId>,
}

struct FollowerState {
    leader: Option<ReplicaId>,
    poll: Option<PollRound>,
}

struct PollRound {
    // The term we would campaign for if the poll succeeds.
    term: Term,
    granted_by: HashSet<ReplicaId>,
}

impl CandidateState {
    fn new() -> Self {
        Self {
            received_votes_from: HashSet::with_capacity(3),
        }
    }

    /// `add_received_vote()` returns the number of unique votes we've received after adding the
    /// provided `vote_from`
    fn add_received_vote(&mut self, vote_from: ReplicaId) -> usize {
        self.received_votes_from.insert(vote_from);
        self.received_votes_from.len()
    }
}

impl FollowerState {
    fn with_leader_info(leader: Option<ReplicaId>) -> Self {
        Self { leader, poll: None }
    }
}
