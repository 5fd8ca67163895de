use crate::commitlog::Term;
use crate::replica::peers::ReplicaId;
use std::sync::Arc;

/// PersistentLocalState is used whenever the raft protocol requires that something is persisted to
/// a durable store to guarantee safety. Not everything that uses disk has to go through this, only
/// algorithm-correctness-critical ones.
///
/// Store methods should be implemented atomically via a CAS like operation. Similar to most CAS
/// method signatures, the CAS store methods will return true if we have mutated state.
pub trait PersistentLocalState: Send + 'static {
    /// Set current term to `new_term` atomically, iff it is larger than current term.
    ///
    /// CAS: Return true if we successfully mutated state.
    fn store_term_if_increased(&mut self, new_term: Term) -> bool;

    /// Store our vote for the latest term iff the latest term (internal state) is the same term as
    /// the one provided, and we have not stored a vote for the latest term.
    ///
    /// CAS: Return true if we successfully mutated state.
    fn store_vote_for_term_if_unvoted(&mut self, expected_current_term: Term, vote: ReplicaId) -> bool;

    /// Return the new term. Used when transitioning to candidate.
    fn increment_term_and_vote_for_self(&mut self) -> Term;

    fn current_term(&self) -> Term;
    fn voted_for_current_term(&self) -> (Term, Option<Arc<ReplicaId>>);
}

/// In-memory term/vote store. A restart forgets both, so only use this where the node's log is
/// also volatile.
pub struct VolatileLocalState {
    current_term: Term,
    voted_for_this_term: Option<Arc<ReplicaId>>,
    my_replica_id: Arc<ReplicaId>,
}

impl VolatileLocalState {
    pub fn new(my_replica_id: ReplicaId) -> Self {
        VolatileLocalState {
            current_term: Term::new(0),
            voted_for_this_term: None,
            my_replica_id: Arc::new(my_replica_id),
        }
    }
}

impl PersistentLocalState for VolatileLocalState {
    fn store_term_if_increased(&mut self, new_term: Term) -> bool {
        if new_term <= self.current_term {
            false
        } else {
            self.current_term = new_term;
            self.voted_for_this_term = None;
            true
        }
    }

    fn store_vote_for_term_if_unvoted(&mut self, expected_term: Term, vote: ReplicaId) -> bool {
        if expected_term == self.current_term && self.voted_for_this_term.is_none() {
            self.voted_for_this_term.replace(Arc::new(vote));
            true
        } else {
            false
        }
    }

    fn increment_term_and_vote_for_self(&mut self) -> Term {
        self.current_term.incr();
        self.voted_for_this_term.replace(self.my_replica_id.clone());

        self.current_term
    }

    fn current_term(&self) -> Term {
        self.current_term
    }

    fn voted_for_current_term(&self) -> (Term, Option<Arc<ReplicaId>>) {
        (self.current_term, self.voted_for_this_term.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_vote_per_term() {
        let mut state = VolatileLocalState::new(ReplicaId::new("me"));
        assert!(!state.store_term_if_increased(Term::new(0)));
        assert!(state.store_term_if_increased(Term::new(2)));

        assert!(!state.store_vote_for_term_if_unvoted(Term::new(1), ReplicaId::new("a")));
        assert!(state.store_vote_for_term_if_unvoted(Term::new(2), ReplicaId::new("a")));
        assert!(!state.store_vote_for_term_if_unvoted(Term::new(2), ReplicaId::new("b")));

        let (term, voted_for) = state.voted_for_current_term();
        assert_eq!(term, Term::new(2));
        assert_eq!(voted_for.as_deref(), Some(&ReplicaId::new("a")));

        // New term clears the vote.
        assert!(state.store_term_if_increased(Term::new(3)));
        assert_eq!(state.voted_for_current_term().1, None);

        assert_eq!(state.increment_term_and_vote_for_self(), Term::new(4));
        assert_eq!(state.voted_for_current_term().1.as_deref(), Some(&ReplicaId::new("me")));
    }
}
