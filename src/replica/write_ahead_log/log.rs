use crate::applier::ApplyError;
use crate::commitlog::{AppendOutcome, FlushFuture, Log, LogEntry, Position, Term};
use crate::replica::StateMachine;
use std::{cmp, fmt, io};

/// WriteAheadLog is the raft-specific log facade.
///
/// Note: A log entry has 4 states (not modeled directly in code):
/// 1. Appended - written to the log, maybe not durable yet
/// 2. Flushed - durable locally, not yet replicated to majority
/// 3. Committed - durable on a majority
/// 4. Applied - a committed entry that has also been applied to the state machine
///
/// A log entry's state has no global truth. Each replica will have their own local view of what
/// state the log entry is in.
pub(crate) struct WriteAheadLog<L, M>
where
    L: Log,
    M: StateMachine,
{
    // Application's info/debug log.
    logger: slog::Logger,

    // This is the log that we're replicating.
    log: L,
    // Metadata about the highest log entry that we've locally written.
    latest_entry_metadata: Option<(Term, Position)>,
    // Everything up to here is durable. Never past `latest_entry_metadata`.
    flushed_position: Option<Position>,
    // Bumped on truncate. Flushes started in an older generation are ignored.
    flush_generation: u64,
    flush_in_flight: bool,

    // Committed entries are applied to this, in order.
    state_machine: M,
}

impl<L, M> WriteAheadLog<L, M>
where
    L: Log,
    M: StateMachine,
{
    pub(crate) fn new(logger: slog::Logger, log: L, state_machine: M) -> Self {
        let latest_entry_metadata = log.last_entry();
        if let Some(last_applied) = state_machine.last_applied_position() {
            if log.commit_position().map_or(true, |commit| last_applied > commit) {
                slog::warn!(
                    logger,
                    "State machine has applied {:?}, which is past the log's commit position {:?}",
                    last_applied,
                    log.commit_position()
                );
            }
        }

        WriteAheadLog {
            logger,
            log,
            latest_entry_metadata,
            // Whatever survived a restart is durable.
            flushed_position: latest_entry_metadata.map(|(_, position)| position),
            flush_generation: 0,
            flush_in_flight: false,
            state_machine,
        }
    }

    pub(crate) fn latest_entry(&self) -> Option<(Term, Position)> {
        self.latest_entry_metadata
    }

    pub(crate) fn latest_position(&self) -> Option<Position> {
        self.latest_entry_metadata.map(|(_, position)| position)
    }

    pub(crate) fn read(&self, position: Position) -> Result<Option<LogEntry>, io::Error> {
        self.log.read(position)
    }

    pub(crate) fn read_required(&self, position: Position) -> Result<LogEntry, io::Error> {
        match self.read(position)? {
            Some(entry) => Ok(entry),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No log entry at position {:?}", position),
            )),
        }
    }

    /// Remove anything starting at `position` and later.
    pub(crate) fn truncate(&mut self, position: Position) -> Result<(), io::Error> {
        let mut new_latest_entry_metadata = None;
        if let Some(new_latest_position) = position.checked_minus(1) {
            new_latest_entry_metadata = self
                .read(new_latest_position)?
                .map(|latest_entry| (latest_entry.term, new_latest_position));
        }

        self.log.truncate(position)?;
        slog::info!(self.logger, "Truncated log from {:?}", position);

        self.latest_entry_metadata = new_latest_entry_metadata;
        self.flushed_position = cmp::min(self.flushed_position, position.checked_minus(1));
        self.flush_generation += 1;
        Ok(())
    }

    /// Appends after the current last entry.
    pub(crate) fn append(&mut self, entry: LogEntry) -> Result<Position, io::Error> {
        let appended_term = entry.term;
        match self.log.append(self.latest_entry_metadata, entry)? {
            AppendOutcome::Appended(appended_position) => {
                // Only update state after log action completes.
                self.latest_entry_metadata = Some((appended_term, appended_position));
                Ok(appended_position)
            }
            AppendOutcome::Rejected => Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "Log rejected append after {:?}; it was changed underneath us",
                    self.latest_entry_metadata
                ),
            )),
        }
    }

    pub(crate) fn flushed_position(&self) -> Option<Position> {
        self.flushed_position
    }

    /// Starts a flush covering everything appended so far, unless one is already running or there
    /// is nothing new to flush.
    pub(crate) fn start_flush(&mut self) -> Option<LogFlush> {
        let up_to = self.latest_position();
        if self.flush_in_flight || up_to <= self.flushed_position {
            return None;
        }

        self.flush_in_flight = true;
        Some(LogFlush {
            completion: FlushCompletion {
                generation: self.flush_generation,
                up_to,
            },
            future: self.log.flush(),
        })
    }

    /// Records the outcome of a flush from `start_flush()`. Returns true if the flushed position
    /// moved.
    pub(crate) fn complete_flush(
        &mut self,
        completion: FlushCompletion,
        result: Result<(), io::Error>,
    ) -> Result<bool, io::Error> {
        self.flush_in_flight = false;
        result?;

        if completion.generation != self.flush_generation {
            slog::debug!(
                self.logger,
                "Ignoring flush up to {:?} started before a truncate",
                completion.up_to
            );
            return Ok(false);
        }
        if completion.up_to <= self.flushed_position {
            return Ok(false);
        }

        self.flushed_position = completion.up_to;
        Ok(true)
    }

    pub(crate) fn commit_position(&self) -> Option<Position> {
        self.log.commit_position()
    }

    pub(crate) fn last_applied_position(&self) -> Option<Position> {
        self.state_machine.last_applied_position()
    }

    pub(crate) fn state_machine(&self) -> &M {
        &self.state_machine
    }

    /// Moves the commit position forward. Unchanged is a no-op.
    pub(crate) fn ratchet_fwd_commit_position(&mut self, new_commit_position: Position) -> Result<(), io::Error> {
        if let Some(current) = self.commit_position() {
            if new_commit_position == current {
                return Ok(());
            }
            // Panic here, because it means we've either computed commit wrong, or lost data.
            assert!(
                new_commit_position > current,
                "Can't ratchet commit position backwards. Expected [input] {:?} > {:?} [current]",
                new_commit_position,
                current,
            );
        }

        // Assert we only mark as committed if we have the entry locally.
        let latest_position = self.latest_position();
        assert!(
            latest_position.map_or(false, |latest| latest >= new_commit_position),
            "Can't ratchet commit position forwards past our local log. Expected [latest log] {:?} >= {:?} [input]",
            latest_position,
            new_commit_position,
        );

        self.log.set_commit_position(new_commit_position)
    }

    /// apply_all_committed_entries applies all committed but unapplied entries in order.
    pub(crate) fn apply_all_committed_entries(&mut self) -> Result<(), ApplyError> {
        let commit_position = match self.commit_position() {
            Some(commit_position) => commit_position,
            None => return Ok(()),
        };

        // This may be a long running loop, and starve the replica event loop from handling
        // another event. It only runs long when a replica is catching up on commits.
        loop {
            let next_position = match self.state_machine.last_applied_position() {
                None => Position::start_position(),
                Some(last_applied) if last_applied < commit_position => last_applied.plus(1),
                Some(_) => return Ok(()),
            };

            let entry = self
                .read_required(next_position)
                .map_err(|source| ApplyError::LogRead {
                    position: next_position,
                    source,
                })?;
            self.state_machine.apply(next_position, &entry)?;
            assert_eq!(
                self.state_machine.last_applied_position(),
                Some(next_position),
                "State machine didn't record applying an entry"
            );
        }
    }
}

/// LogFlush is a pending flush of the log. Await `future` anywhere, then hand its output back to
/// the replica along with `completion`.
pub struct LogFlush {
    pub completion: FlushCompletion,
    pub future: FlushFuture,
}

impl fmt::Debug for LogFlush {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogFlush").field("completion", &self.completion).finish()
    }
}

/// Identifies which flush finished.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlushCompletion {
    generation: u64,
    up_to: Option<Position>,
}

impl FlushCompletion {
    pub fn up_to(&self) -> Option<Position> {
        self.up_to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::InMemoryLog;
    use bytes::Bytes;

    #[derive(Default)]
    struct RecordingStateMachine {
        applied: Vec<Position>,
    }

    impl StateMachine for RecordingStateMachine {
        fn apply(&mut self, position: Position, _: &LogEntry) -> Result<(), ApplyError> {
            self.applied.push(position);
            Ok(())
        }

        fn last_applied_position(&self) -> Option<Position> {
            self.applied.last().copied()
        }
    }

    fn wal() -> WriteAheadLog<InMemoryLog, RecordingStateMachine> {
        WriteAheadLog::new(
            slog::Logger::root(slog::Discard, slog::o!()),
            InMemoryLog::new(),
            RecordingStateMachine::default(),
        )
    }

    fn entry(term: u64) -> LogEntry {
        LogEntry::record(Term::new(term), Bytes::new())
    }

    #[test]
    fn applies_only_up_to_commit_position() {
        let mut wal = wal();
        for term in [1, 1, 2].iter() {
            wal.append(entry(*term)).unwrap();
        }
        assert_eq!(wal.latest_entry(), Some((Term::new(2), Position::new(3))));

        wal.apply_all_committed_entries().unwrap();
        assert!(wal.state_machine().applied.is_empty());

        wal.ratchet_fwd_commit_position(Position::new(2)).unwrap();
        wal.apply_all_committed_entries().unwrap();
        assert_eq!(wal.state_machine().applied, vec![Position::new(1), Position::new(2)]);

        // Idempotent.
        wal.ratchet_fwd_commit_position(Position::new(2)).unwrap();
        wal.apply_all_committed_entries().unwrap();
        assert_eq!(wal.last_applied_position(), Some(Position::new(2)));
    }

    #[test]
    fn truncate_rewinds_latest_entry() {
        let mut wal = wal();
        wal.append(entry(1)).unwrap();
        wal.append(entry(2)).unwrap();

        wal.truncate(Position::new(2)).unwrap();
        assert_eq!(wal.latest_entry(), Some((Term::new(1), Position::new(1))));
        assert_eq!(wal.append(entry(3)).unwrap(), Position::new(2));

        wal.truncate(Position::new(1)).unwrap();
        assert_eq!(wal.latest_entry(), None);
    }

    #[test]
    fn one_flush_at_a_time() {
        let mut wal = wal();
        assert!(wal.start_flush().is_none());

        wal.append(entry(1)).unwrap();
        let first = wal.start_flush().unwrap();
        wal.append(entry(1)).unwrap();
        assert!(wal.start_flush().is_none());

        assert!(wal.complete_flush(first.completion, Ok(())).unwrap());
        assert_eq!(wal.flushed_position(), Some(Position::new(1)));

        let second = wal.start_flush().unwrap();
        assert_eq!(second.completion.up_to(), Some(Position::new(2)));
        let failed = wal.complete_flush(second.completion, Err(io::Error::new(io::ErrorKind::Other, "disk full")));
        assert!(failed.is_err());
        assert_eq!(wal.flushed_position(), Some(Position::new(1)));

        // Failed flushes are retried by starting another one.
        let retry = wal.start_flush().unwrap();
        assert!(wal.complete_flush(retry.completion, Ok(())).unwrap());
        assert_eq!(wal.flushed_position(), Some(Position::new(2)));
    }

    #[test]
    fn flush_started_before_truncate_is_ignored() {
        let mut wal = wal();
        wal.append(entry(1)).unwrap();
        wal.append(entry(1)).unwrap();
        let stale = wal.start_flush().unwrap();

        wal.truncate(Position::new(2)).unwrap();
        wal.append(entry(2)).unwrap();
        assert!(!wal.complete_flush(stale.completion, Ok(())).unwrap());
        assert_eq!(wal.flushed_position(), None);

        let fresh = wal.start_flush().unwrap();
        assert!(wal.complete_flush(fresh.completion, Ok(())).unwrap());
        assert_eq!(wal.flushed_position(), Some(Position::new(2)));

        // Truncating below the flushed position pulls it back.
        wal.truncate(Position::new(2)).unwrap();
        assert_eq!(wal.flushed_position(), Some(Position::new(1)));
    }

    #[test]
    #[should_panic]
    fn commit_position_never_moves_backwards() {
        let mut wal = wal();
        wal.append(entry(1)).unwrap();
        wal.append(entry(1)).unwrap();
        wal.ratchet_fwd_commit_position(Position::new(2)).unwrap();
        let _ = wal.ratchet_fwd_commit_position(Position::new(1));
    }
}
