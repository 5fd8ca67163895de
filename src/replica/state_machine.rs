use crate::applier::ApplyError;
use crate::commitlog::{LogEntry, Position};

/// StateMachine is the application specific view of applying the replicated log in sequential
/// consistent order.
pub trait StateMachine: Send + 'static {
    /// apply is called only when it's guaranteed that the provided entry has been committed (i.e.
    /// replicated to a majority), in increasing position order, exactly once per position. Because
    /// of this guarantee, you will never need to reverse an entry once you've been asked to apply
    /// it.
    ///
    /// Returning an error for which `ApplyError::is_fatal()` holds halts the partition.
    fn apply(&mut self, position: Position, entry: &LogEntry) -> Result<(), ApplyError>;

    /// Where applying resumes after a restart: the next entry handed to `apply()` is the one right
    /// after this position.
    fn last_applied_position(&self) -> Option<Position>;
}
