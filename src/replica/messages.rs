use crate::commitlog::{LogEntry, Position, Term};
use crate::replica::peers::ReplicaId;

/// RaftMessage is every message replicas exchange with each other. Encoding is the transport's
/// business; these are the fields only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RaftMessage {
    AppendRequest(AppendRequest),
    AppendResponse(AppendResponse),
    VoteRequest(VoteRequest),
    VoteResponse(VoteResponse),
    PollRequest(PollRequest),
    PollResponse(PollResponse),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendRequest {
    pub term: Term,
    pub leader_id: ReplicaId,
    /// (term, position) of the entry immediately before `entries[0]`. None if `entries` start at
    /// the beginning of the log.
    pub preceding: Option<(Term, Position)>,
    pub entries: Vec<LogEntry>,
    pub commit_position: Option<Position>,
    /// Echoed back in the response so the leader can discard out of order replies.
    pub seq_no: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendResponse {
    pub term: Term,
    pub succeeded: bool,
    /// On success, the last position known to match the leader's log. On failure, the last
    /// position the follower can confirm, as a hint for where the leader should resume.
    pub last_position: Option<Position>,
    pub seq_no: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRequest {
    pub term: Term,
    pub candidate_id: ReplicaId,
    pub last_entry: Option<(Term, Position)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteResponse {
    pub term: Term,
    pub granted: bool,
}

/// Pre-vote. `term` is the term the requester would campaign for; neither side persists anything
/// because of a poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollRequest {
    pub term: Term,
    pub candidate_id: ReplicaId,
    pub last_entry: Option<(Term, Position)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollResponse {
    /// Responder's current term.
    pub term: Term,
    /// The `PollRequest::term` this answers.
    pub poll_term: Term,
    pub granted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: ReplicaId,
    pub message: RaftMessage,
}

impl RaftMessage {
    pub fn term(&self) -> Term {
        match self {
            RaftMessage::AppendRequest(m) => m.term,
            RaftMessage::AppendResponse(m) => m.term,
            RaftMessage::VoteRequest(m) => m.term,
            RaftMessage::VoteResponse(m) => m.term,
            RaftMessage::PollRequest(m) => m.term,
            RaftMessage::PollResponse(m) => m.term,
        }
    }
}
