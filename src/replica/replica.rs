use crate::commitlog::{Log, LogEntry, Position, Term};
use crate::replica::election::{
    status_channel, CurrentLeader, ElectionState, ElectionTimer, PeerStateUpdate, ReplicaStatus, Role,
    StatusListener, StatusNotifier,
};
use crate::replica::local_state::PersistentLocalState;
use crate::replica::messages::{
    AppendRequest, AppendResponse, OutboundMessage, PollRequest, PollResponse, RaftMessage, VoteRequest,
    VoteResponse,
};
use crate::replica::peers::{ClusterTracker, ReplicaId};
use crate::replica::replica_api::{WriteToLogError, WriteToLogOutput};
use crate::replica::write_ahead_log::{FlushCompletion, LogFlush, WriteAheadLog};
use crate::replica::StateMachine;
use bytes::Bytes;
use std::sync::Arc;
use std::{cmp, io};
use tokio::time::{Duration, Instant};

pub struct ReplicaConfig<L, S, M>
where
    L: Log,
    S: PersistentLocalState,
    M: StateMachine,
{
    pub logger: slog::Logger,
    pub cluster_tracker: ClusterTracker,
    pub log: L,
    pub local_state: S,
    pub state_machine: M,
    pub leader_heartbeat_duration: Duration,
    pub follower_min_timeout: Duration,
    pub follower_max_timeout: Duration,
    pub append_timeout: Duration,
    pub max_append_batch: usize,
    pub jitter_seed: Option<u64>,
    pub now: Instant,
}

/// Replica is one member's consensus core for one partition. It's fully synchronous: every
/// `handle_*` method takes one event, mutates state, and leaves any messages to send in the
/// outbox. Time only moves forward when a tick is handled.
///
/// Log writes are only buffered by the handlers. The driver takes flushes with `take_flush()`,
/// awaits them, and reports back through `handle_flush_completed()`. Entries only count towards
/// commit, and are only acknowledged to the leader, once flushed.
pub struct Replica<L, S, M>
where
    L: Log,
    S: PersistentLocalState,
    M: StateMachine,
{
    logger: slog::Logger,
    my_replica_id: ReplicaId,
    cluster_tracker: ClusterTracker,
    local_state: S,
    election_state: ElectionState,
    wal: WriteAheadLog<L, M>,
    timer: ElectionTimer,
    now: Instant,
    outbox: Vec<OutboundMessage>,
    // A successful append response held back until the entries it acknowledges are flushed.
    pending_append_response: Option<(ReplicaId, AppendResponse)>,
    halted: bool,
    status_notifier: StatusNotifier,
    leader_heartbeat_duration: Duration,
    append_timeout: Duration,
    max_append_batch: usize,
}

impl<L, S, M> Replica<L, S, M>
where
    L: Log,
    S: PersistentLocalState,
    M: StateMachine,
{
    pub fn new(config: ReplicaConfig<L, S, M>) -> (Self, StatusListener) {
        assert!(config.max_append_batch > 0, "max_append_batch must be positive");

        let my_replica_id = config.cluster_tracker.my_replica_id().clone();
        let wal = WriteAheadLog::new(config.logger.clone(), config.log, config.state_machine);
        let timer = ElectionTimer::new(
            config.follower_min_timeout,
            config.follower_max_timeout,
            config.jitter_seed,
            config.now,
        );
        let election_state = ElectionState::new_follower(my_replica_id.clone());
        let initial_status = ReplicaStatus {
            role: election_state.role(),
            term: config.local_state.current_term(),
            leader: None,
            last_position: wal.latest_position(),
            commit_position: wal.commit_position(),
            last_applied_position: wal.last_applied_position(),
            halted: false,
        };
        let (status_notifier, status_listener) = status_channel(initial_status);

        let mut replica = Replica {
            logger: config.logger,
            my_replica_id,
            cluster_tracker: config.cluster_tracker,
            local_state: config.local_state,
            election_state,
            wal,
            timer,
            now: config.now,
            outbox: Vec::new(),
            pending_append_response: None,
            halted: false,
            status_notifier,
            leader_heartbeat_duration: config.leader_heartbeat_duration,
            append_timeout: config.append_timeout,
            max_append_batch: config.max_append_batch,
        };
        // Catch up on anything committed before a restart.
        replica.after_event();

        (replica, status_listener)
    }

    pub fn my_replica_id(&self) -> &ReplicaId {
        &self.my_replica_id
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn state_machine(&self) -> &M {
        self.wal.state_machine()
    }

    pub fn status(&self) -> ReplicaStatus {
        let leader = match self.election_state.current_leader() {
            CurrentLeader::Me => Some(self.my_replica_id.clone()),
            CurrentLeader::Other(leader_id) => Some(leader_id),
            CurrentLeader::Unknown => None,
        };

        ReplicaStatus {
            role: self.election_state.role(),
            term: self.local_state.current_term(),
            leader,
            last_position: self.wal.latest_position(),
            commit_position: self.wal.commit_position(),
            last_applied_position: self.wal.last_applied_position(),
            halted: self.halted,
        }
    }

    /// Messages produced by the events handled so far, in the order they were produced.
    pub fn take_outbox(&mut self) -> Vec<OutboundMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Starts flushing whatever was appended since the last flush. At most one flush is running at
    /// a time; take the next one after handling the previous one's completion.
    pub fn take_flush(&mut self) -> Option<LogFlush> {
        if self.halted {
            return None;
        }
        self.wal.start_flush()
    }

    pub fn handle_flush_completed(&mut self, completion: FlushCompletion, result: io::Result<()>) {
        if self.halted {
            return;
        }

        match self.wal.complete_flush(completion, result) {
            Ok(true) => {
                slog::debug!(self.logger, "Flushed log up to {:?}", self.wal.flushed_position());
                self.try_advance_commit();
                self.send_pending_append_response_if_flushed();
            }
            Ok(false) => {}
            // The next `take_flush()` retries.
            Err(e) => slog::error!(
                self.logger,
                "Failed to flush log up to {:?}: {:?}",
                completion.up_to(),
                e
            ),
        }

        self.after_event();
    }

    pub fn handle_tick(&mut self, now: Instant) {
        if self.halted {
            return;
        }
        self.now = cmp::max(self.now, now);

        match self.election_state.role() {
            Role::Leader => self.replicate_to_peers(false),
            Role::Follower => {
                if self.timer.is_elapsed(self.now) {
                    self.start_poll_round();
                }
            }
            Role::Candidate => {
                if self.timer.is_elapsed(self.now) {
                    slog::info!(self.logger, "Election timed out. Starting a new one.");
                    self.become_candidate();
                }
            }
        }

        self.after_event();
    }

    pub fn handle_write(&mut self, data: Bytes) -> Result<WriteToLogOutput, WriteToLogError> {
        if self.halted {
            return Err(WriteToLogError::Halted);
        }

        // Leader check
        match self.election_state.current_leader() {
            CurrentLeader::Me => { /* carry on */ }
            CurrentLeader::Other(leader_id) => return Err(WriteToLogError::LeaderRedirect(leader_id)),
            CurrentLeader::Unknown => return Err(WriteToLogError::NoLeader),
        }

        // TODO:2 throttle based on number of uncommitted entries.
        let term = self.local_state.current_term();
        let result = self
            .wal
            .append(LogEntry::record(term, data))
            .map(|position| WriteToLogOutput { term, position })
            .map_err(WriteToLogError::LocalIoError);

        if result.is_ok() {
            self.replicate_to_peers(false);
        }
        self.after_event();

        result
    }

    pub fn handle_message(&mut self, from: ReplicaId, message: RaftMessage) {
        if self.halted {
            return;
        }
        if !self.cluster_tracker.contains_member(&from) {
            slog::warn!(self.logger, "Dropping {:?} from non-member {:?}", message, from);
            return;
        }
        slog::debug!(self.logger, "ServerWire - {:?} from {:?}", message, from);

        match message {
            RaftMessage::AppendRequest(request) => {
                let response = self.handle_append_request(request);
                self.respond_to_append(from, response);
            }
            RaftMessage::AppendResponse(response) => self.handle_append_response(from, response),
            RaftMessage::VoteRequest(request) => {
                let response = self.handle_vote_request(request);
                self.send(from, RaftMessage::VoteResponse(response));
            }
            RaftMessage::VoteResponse(response) => self.handle_vote_response(from, response),
            RaftMessage::PollRequest(request) => {
                let response = self.handle_poll_request(request);
                self.send(from, RaftMessage::PollResponse(response));
            }
            RaftMessage::PollResponse(response) => self.handle_poll_response(from, response),
        }

        self.after_event();
    }

    fn send(&mut self, to: ReplicaId, message: RaftMessage) {
        self.outbox.push(OutboundMessage { to, message });
    }

    fn broadcast(&mut self, message: RaftMessage) {
        for peer_id in self.cluster_tracker.peer_ids().iter() {
            self.outbox.push(OutboundMessage {
                to: peer_id.clone(),
                message: message.clone(),
            });
        }
    }

    /// Applies whatever became committed while handling the event, then publishes status.
    fn after_event(&mut self) {
        if !self.halted {
            if let Err(e) = self.wal.apply_all_committed_entries() {
                if e.is_fatal() {
                    slog::crit!(self.logger, "Halting replica. Failed to apply committed entry: {}", e);
                    self.halted = true;
                    self.outbox.clear();
                } else {
                    slog::error!(self.logger, "Failed to apply committed entries, will retry: {}", e);
                }
            }
        }

        self.status_notifier.notify_if_changed(self.status());
    }

    // > If RPC request or response contains term T > currentTerm:
    // > set currentTerm = T, convert to follower (§5.1)
    fn step_down_if_term_increased(&mut self, observed_term: Term) -> bool {
        let increased = self.local_state.store_term_if_increased(observed_term);
        if increased {
            self.election_state.transition_to_follower(None);
            slog::info!(
                self.logger,
                "Observed increased term {:?}. Transitioned to follower.",
                observed_term
            );
        }
        increased
    }

    // ------- Elections -------

    fn start_poll_round(&mut self) {
        self.timer.reset(self.now);
        let poll_term = Term::new(self.local_state.current_term().as_u64() + 1);
        let grants = match self.election_state.start_poll_round_if_follower(poll_term) {
            Some(grants) => grants,
            None => return,
        };
        slog::info!(
            self.logger,
            "Timed out as follower. Polling for term {:?}. Election state: {:?}",
            poll_term,
            self.election_state
        );

        if grants >= self.cluster_tracker.quorum() {
            self.become_candidate();
            return;
        }

        self.broadcast(RaftMessage::PollRequest(PollRequest {
            term: poll_term,
            candidate_id: self.my_replica_id.clone(),
            last_entry: self.wal.latest_entry(),
        }));
    }

    fn handle_poll_request(&self, request: PollRequest) -> PollResponse {
        let current_term = self.local_state.current_term();
        let granted = if self.election_state.role() == Role::Leader {
            false
        } else if request.term < current_term {
            false
        } else if self.timer.heard_from_leader_recently(self.now) {
            false
        } else {
            self.is_candidate_log_gte_mine(request.last_entry)
        };
        slog::info!(
            self.logger,
            "Poll from {:?} for term {:?}: granted={}",
            request.candidate_id,
            request.term,
            granted
        );

        PollResponse {
            term: current_term,
            poll_term: request.term,
            granted,
        }
    }

    fn handle_poll_response(&mut self, from: ReplicaId, response: PollResponse) {
        if !response.granted {
            // A poll never bumps the responder's term, but it tells us we're behind.
            self.step_down_if_term_increased(response.term);
            return;
        }

        let grants = match self.election_state.add_poll_grant_if_polling(response.poll_term, from) {
            Some(grants) => grants,
            None => {
                slog::debug!(self.logger, "Ignoring poll grant for term {:?}", response.poll_term);
                return;
            }
        };

        let quorum = self.cluster_tracker.quorum();
        slog::info!(
            self.logger,
            "Received {}/{} poll grants for term {:?}",
            grants,
            self.cluster_tracker.num_voting_replicas(),
            response.poll_term
        );
        if grants >= quorum && self.local_state.current_term().as_u64() + 1 == response.poll_term.as_u64() {
            self.become_candidate();
        }
    }

    fn become_candidate(&mut self) {
        // Write-ahead log style: Vote for self on local state before transitioning to candidate.
        let new_term = self.local_state.increment_term_and_vote_for_self();
        let votes = self.election_state.transition_to_candidate_and_vote_for_self();
        self.pending_append_response = None;
        self.timer.reset(self.now);
        slog::info!(
            self.logger,
            "Changed to candidate for term {:?}. Election state: {:?}",
            new_term,
            self.election_state,
        );

        if votes >= self.cluster_tracker.quorum() {
            self.become_leader();
            return;
        }

        self.broadcast(RaftMessage::VoteRequest(VoteRequest {
            term: new_term,
            candidate_id: self.my_replica_id.clone(),
            last_entry: self.wal.latest_entry(),
        }));
    }

    fn handle_vote_request(&mut self, request: VoteRequest) -> VoteResponse {
        let decision = self.decide_vote(&request);
        let granted = decision == VoteDecision::Granted;
        if granted {
            self.timer.reset(self.now);
        }
        slog::info!(
            self.logger,
            "Vote for {:?} in term {:?}: {:?}",
            request.candidate_id,
            request.term,
            decision
        );

        VoteResponse {
            term: self.local_state.current_term(),
            granted,
        }
    }

    fn decide_vote(&mut self, request: &VoteRequest) -> VoteDecision {
        // Read our local term/vote state as 1 atomic action.
        let (current_term, mut opt_voted_for) = self.local_state.voted_for_current_term();

        // 1. Reply false if term < currentTerm (§5.1)
        if request.term < current_term {
            return VoteDecision::StaleTerm;
        }

        // Evaluated against the leader we were following before any term change below.
        let within_leader_lease =
            self.election_state.role() == Role::Follower && self.timer.heard_from_leader_recently(self.now);

        if self.step_down_if_term_increased(request.term) {
            // If we've increased the term, it means we haven't voted for anyone this term.
            opt_voted_for = None;
        }

        if within_leader_lease {
            return VoteDecision::LeaderLease;
        }

        // 2. If votedFor is null or candidateId, and candidate’s log is at
        // least as up-to-date as receiver’s log, grant vote (§5.2, §5.4).
        if let Some(voted_for) = opt_voted_for {
            if *voted_for != request.candidate_id {
                return VoteDecision::AlreadyVoted(voted_for);
            }
        }

        if !self.is_candidate_log_gte_mine(request.last_entry) {
            return VoteDecision::CandidateLogBehind;
        }

        let cas_success = self
            .local_state
            .store_vote_for_term_if_unvoted(request.term, request.candidate_id.clone());
        if cas_success {
            return VoteDecision::Granted;
        }

        // We lost CAS race. Re-read state and grant based on if previous winner made the same vote
        // as we would've.
        if let (reread_current_term, Some(reread_voted_for)) = self.local_state.voted_for_current_term() {
            if reread_current_term == request.term && reread_voted_for.as_ref() == &request.candidate_id {
                return VoteDecision::Granted;
            }
            return VoteDecision::AlreadyVoted(reread_voted_for);
        }

        VoteDecision::StaleTerm
    }

    fn is_candidate_log_gte_mine(&self, candidate_last_entry: Option<(Term, Position)>) -> bool {
        // > Raft determines which of two logs is more up-to-date
        // > by comparing the index and term of the last entries in the
        // > logs. If the logs have last entries with different terms, then
        // > the log with the later term is more up-to-date. If the logs
        // > end with the same term, then whichever log is longer is
        // > more up-to-date.
        match (self.wal.latest_entry(), candidate_last_entry) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((my_term, my_position)), Some((candidate_term, candidate_position))) => {
                if candidate_term != my_term {
                    return candidate_term > my_term;
                }

                candidate_position >= my_position
            }
        }
    }

    fn handle_vote_response(&mut self, from: ReplicaId, response: VoteResponse) {
        if self.step_down_if_term_increased(response.term) {
            return;
        }

        let current_term = self.local_state.current_term();
        if response.term != current_term {
            slog::info!(
                self.logger,
                "Received vote for outdated term {:?}, current term: {:?}.",
                response.term,
                current_term,
            );
            return;
        }
        if !response.granted {
            slog::info!(self.logger, "Vote not granted from {:?} for term {:?}", from, response.term);
            return;
        }

        let num_votes_received = match self.election_state.add_vote_if_candidate(from) {
            Some(v) => v,
            None => {
                slog::info!(
                    self.logger,
                    "Received vote for term {:?} after transitioning to a election state: {:?}",
                    response.term,
                    self.election_state,
                );
                return;
            }
        };

        slog::info!(
            self.logger,
            "Received {}/{} votes for term {:?}",
            num_votes_received,
            self.cluster_tracker.num_voting_replicas(),
            response.term,
        );
        if num_votes_received >= self.cluster_tracker.quorum() {
            self.become_leader();
        }
    }

    fn become_leader(&mut self) {
        let term = self.local_state.current_term();
        let start_position = match self.wal.append(LogEntry::leader_initial(term)) {
            Ok(position) => position,
            Err(e) => {
                slog::error!(self.logger, "Won election for term {:?} but failed to append initial entry: {:?}", term, e);
                self.election_state.transition_to_follower(None);
                return;
            }
        };

        self.election_state
            .transition_to_leader(self.cluster_tracker.peer_ids(), start_position);
        slog::info!(
            self.logger,
            "Became leader for term {:?} starting at {:?}. Election state: {:?}",
            term,
            start_position,
            self.election_state
        );

        self.replicate_to_peers(true);
        self.try_advance_commit();
    }

    // ------- Replication -------

    fn replicate_to_peers(&mut self, force: bool) {
        let peer_ids = self.cluster_tracker.peer_ids().to_vec();
        for peer_id in peer_ids.iter() {
            self.send_append_to_peer(peer_id, force);
        }
    }

    /// Sends the peer its next batch if it has entries waiting, its heartbeat is due, or `force`.
    /// Nothing is sent while a request to the peer is outstanding.
    fn send_append_to_peer(&mut self, peer_id: &ReplicaId, force: bool) {
        let current_term = self.local_state.current_term();
        let latest_position = self.wal.latest_position();

        let peer_state = match self.election_state.leader_state_mut() {
            None => return,
            Some(leader_state) => match leader_state.peer_state_mut(peer_id) {
                Some(peer_state) => peer_state,
                None => {
                    slog::error!(self.logger, "Peer {:?} missing from LeaderStateTracker", peer_id);
                    return;
                }
            },
        };

        if !peer_state.can_send(self.now, self.append_timeout) {
            return;
        }
        let (next_position, _) = peer_state.next_and_preceding_position();
        let has_pending_entries = latest_position.map_or(false, |latest| latest >= next_position);
        if !(force || has_pending_entries || peer_state.heartbeat_due(self.now, self.leader_heartbeat_duration)) {
            return;
        }

        match append_request_builder::new_append_request(
            current_term,
            self.my_replica_id.clone(),
            peer_state,
            &self.wal,
            self.max_append_batch,
            self.now,
        ) {
            Ok(request) => self.outbox.push(OutboundMessage {
                to: peer_id.clone(),
                message: RaftMessage::AppendRequest(request),
            }),
            Err(e) => slog::error!(
                self.logger,
                "Failed to read log while building AppendRequest for {:?}: {:?}",
                peer_id,
                e
            ),
        }
    }

    fn handle_append_request(&mut self, request: AppendRequest) -> AppendResponse {
        // 1. Reply false if term < currentTerm (§5.1)
        let current_term = self.local_state.current_term();
        if request.term < current_term {
            slog::info!(
                self.logger,
                "Rejecting AppendRequest from {:?}. Its term {:?} is out of date.",
                request.leader_id,
                request.term
            );
            return self.append_response(false, self.wal.latest_position(), request.seq_no);
        }

        let increased = self.local_state.store_term_if_increased(request.term);
        match self.election_state.role() {
            _ if increased => {
                self.election_state
                    .transition_to_follower(Some(request.leader_id.clone()));
                slog::info!(
                    self.logger,
                    "Following {:?} in new term {:?}",
                    request.leader_id,
                    request.term
                );
            }
            Role::Candidate => {
                self.election_state
                    .transition_to_follower(Some(request.leader_id.clone()));
                slog::info!(self.logger, "Lost election to {:?}", request.leader_id);
            }
            Role::Leader => {
                slog::error!(
                    self.logger,
                    "Received AppendRequest from {:?} but I'm leader of term {:?}. This should be impossible.",
                    request.leader_id,
                    request.term
                );
                return self.append_response(false, self.wal.latest_position(), request.seq_no);
            }
            Role::Follower => self.election_state.set_leader_if_unknown(&request.leader_id),
        }

        self.timer.record_leader_contact(self.now);

        match self.append_leader_entries(&request) {
            Ok(last_verified_position) => {
                // 5. If leaderCommit > commitIndex, set commitIndex = min(leaderCommit, index of last new entry)
                let new_commit_position = cmp::min(request.commit_position, last_verified_position);
                if new_commit_position > self.wal.commit_position() {
                    if let Some(new_commit_position) = new_commit_position {
                        if let Err(e) = self.wal.ratchet_fwd_commit_position(new_commit_position) {
                            slog::error!(self.logger, "Failed to store commit position: {:?}", e);
                        }
                    }
                }
                self.append_response(true, last_verified_position, request.seq_no)
            }
            Err(AppendEntriesError::PrecedingEntryMismatch { hint }) => {
                slog::info!(
                    self.logger,
                    "Log doesn't match leader at {:?}. Hinting {:?}",
                    request.preceding,
                    hint
                );
                self.append_response(false, hint, request.seq_no)
            }
            Err(AppendEntriesError::LocalIo(e)) => {
                slog::error!(self.logger, "IO failure while appending leader's entries: {:?}", e);
                self.append_response(false, self.wal.latest_position(), request.seq_no)
            }
        }
    }

    /// Returns the last position known to match the leader's log.
    fn append_leader_entries(&mut self, request: &AppendRequest) -> Result<Option<Position>, AppendEntriesError> {
        // 2. Reply false if [my] log doesn't contain an entry at [leader's]
        // prevLogIndex whose term matches [leader's] prevLogTerm (§5.3)
        if let Some((preceding_term, preceding_position)) = request.preceding {
            match self.wal.read(preceding_position)? {
                None => {
                    return Err(AppendEntriesError::PrecedingEntryMismatch {
                        hint: self.wal.latest_position(),
                    })
                }
                Some(my_preceding_entry) if my_preceding_entry.term != preceding_term => {
                    // Conflicting entry can't be committed; drop it and everything after.
                    self.wal.truncate(preceding_position)?;
                    return Err(AppendEntriesError::PrecedingEntryMismatch {
                        hint: preceding_position.checked_minus(1),
                    });
                }
                Some(_) => {}
            }
        }

        // 3. If [my] existing entry conflicts with [leader's new entries]
        // (same index but different terms), delete [my] existing entry and
        // all that follow it (§5.3)
        // 4. Append any new entries not already in the log
        let mut next_position = match request.preceding {
            None => Position::start_position(),
            Some((_, preceding_position)) => preceding_position.plus(1),
        };
        for new_entry in request.entries.iter() {
            if let Some(existing_entry) = self.wal.read(next_position)? {
                if existing_entry.term == new_entry.term {
                    next_position = next_position.plus(1);
                    continue;
                }
                self.wal.truncate(next_position)?;
            }

            let appended_position = self.wal.append(new_entry.clone())?;
            assert_eq!(
                appended_position, next_position,
                "Appended log entry to unexpected position."
            );
            next_position = next_position.plus(1);
        }

        Ok(next_position.checked_minus(1))
    }

    /// Successes are sent once everything they acknowledge is flushed. Only the latest held back
    /// response matters to the leader.
    fn respond_to_append(&mut self, leader_id: ReplicaId, response: AppendResponse) {
        if response.succeeded && response.last_position > self.wal.flushed_position() {
            self.pending_append_response = Some((leader_id, response));
            return;
        }

        self.pending_append_response = None;
        self.send(leader_id, RaftMessage::AppendResponse(response));
    }

    fn send_pending_append_response_if_flushed(&mut self) {
        let flushed_position = self.wal.flushed_position();
        let is_flushed = match &self.pending_append_response {
            Some((_, response)) => response.last_position <= flushed_position,
            None => false,
        };
        if !is_flushed {
            return;
        }
        if let Some((leader_id, response)) = self.pending_append_response.take() {
            self.send(leader_id, RaftMessage::AppendResponse(response));
        }
    }

    fn append_response(&self, succeeded: bool, last_position: Option<Position>, seq_no: u64) -> AppendResponse {
        AppendResponse {
            term: self.local_state.current_term(),
            succeeded,
            last_position,
            seq_no,
        }
    }

    fn handle_append_response(&mut self, from: ReplicaId, response: AppendResponse) {
        let logger = self
            .logger
            .new(slog::o!("Peer" => from.to_string(), "SeqNo" => response.seq_no));
        slog::debug!(logger, "Append response: {:?}", response);

        if self.step_down_if_term_increased(response.term) {
            return;
        }
        let current_term = self.local_state.current_term();
        if response.term != current_term {
            slog::info!(
                logger,
                "Received append response for outdated term {:?}, but we're on term {:?}",
                response.term,
                current_term
            );
            return;
        }

        // 1. Update peer log tracker
        let leader_state = match self.election_state.leader_state_mut() {
            Some(leader_state) => leader_state,
            None => {
                slog::info!(logger, "No longer leader");
                return;
            }
        };
        let update = if response.succeeded {
            PeerStateUpdate::Success {
                last_position: response.last_position,
            }
        } else {
            PeerStateUpdate::PeerLogBehind {
                hint: response.last_position,
            }
        };
        match leader_state.peer_state_mut(&from) {
            Some(peer_state) => peer_state.handle_append_result(&logger, response.seq_no, update),
            None => {
                slog::warn!(logger, "Peer not found while handling append response");
                return;
            }
        }

        // 2. Check for majority replication
        self.try_advance_commit();

        // 3. Keep the peer moving. A failed append is retried right away with the rewound position.
        self.send_append_to_peer(&from, !response.succeeded);
    }

    // > If there exists an N such that N > commitIndex, a majority
    // > of matchIndex[i] ≥ N, and log[N].term == currentTerm:
    // > set commitIndex = N (§5.3, §5.4).
    //
    // The leader's own match is its flushed position.
    fn try_advance_commit(&mut self) {
        let quorum = self.cluster_tracker.quorum();
        let flushed_position = self.wal.flushed_position();
        let tentative_commit_position = match self.election_state.leader_state_mut() {
            Some(leader_state) => leader_state.tentative_commit_position(flushed_position, quorum),
            None => return,
        };

        if let Some(new_commit_position) = tentative_commit_position {
            if Some(new_commit_position) > self.wal.commit_position() {
                if let Err(e) = self.wal.ratchet_fwd_commit_position(new_commit_position) {
                    slog::warn!(
                        self.logger,
                        "IO failure while storing new commit position {:?}: {:?}",
                        new_commit_position,
                        e
                    );
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum VoteDecision {
    Granted,
    StaleTerm,
    LeaderLease,
    AlreadyVoted(Arc<ReplicaId>),
    CandidateLogBehind,
}

enum AppendEntriesError {
    PrecedingEntryMismatch { hint: Option<Position> },
    LocalIo(io::Error),
}

impl From<io::Error> for AppendEntriesError {
    fn from(e: io::Error) -> Self {
        AppendEntriesError::LocalIo(e)
    }
}

mod append_request_builder {
    use crate::commitlog::{Log, Term};
    use crate::replica::election::PeerState;
    use crate::replica::messages::AppendRequest;
    use crate::replica::write_ahead_log::WriteAheadLog;
    use crate::replica::{ReplicaId, StateMachine};
    use std::io;
    use tokio::time::Instant;

    /// Reads everything the request needs before claiming a seq-no, so a read failure leaves the
    /// peer with no outstanding request.
    pub(super) fn new_append_request<L, M>(
        current_term: Term,
        my_id: ReplicaId,
        peer_state: &mut PeerState,
        wal: &WriteAheadLog<L, M>,
        max_append_batch: usize,
        now: Instant,
    ) -> Result<AppendRequest, io::Error>
    where
        L: Log,
        M: StateMachine,
    {
        let (next_position, opt_preceding_position) = peer_state.next_and_preceding_position();
        let preceding = match opt_preceding_position {
            None => None,
            Some(preceding_position) => Some((wal.read_required(preceding_position)?.term, preceding_position)),
        };

        let mut entries = Vec::new();
        if let Some(latest_position) = wal.latest_position() {
            let mut position = next_position;
            while position <= latest_position && entries.len() < max_append_batch {
                entries.push(wal.read_required(position)?);
                position = position.plus(1);
            }
        }

        Ok(AppendRequest {
            term: current_term,
            leader_id: my_id,
            preceding,
            entries,
            commit_position: wal.commit_position(),
            seq_no: peer_state.next_seq_no(now),
        })
    }
}
