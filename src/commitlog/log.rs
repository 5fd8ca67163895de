use crate::commitlog::LogEntry;
use std::future::Future;
use std::pin::Pin;
use std::{fmt, io};

#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
struct U64NonZero(u64);

impl U64NonZero {
    fn new(val: u64) -> Self {
        assert_ne!(val, 0);
        U64NonZero(val)
    }
}

/// Position is the position of an entry in a partition's log; i.e. a log entry's index.
///
/// Positions start at 1. "No position" (empty log, nothing committed, nothing acknowledged) is
/// modeled as `Option<Position>::None`, which conveniently sorts before every `Some(_)`.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Position(U64NonZero);

impl Position {
    pub fn new(position: u64) -> Self {
        Position(U64NonZero::new(position))
    }

    pub fn new_usize(position: usize) -> Self {
        Self::new(position as u64)
    }

    /// Converts a wire value where 0 means "none".
    pub fn from_u64(position: u64) -> Option<Self> {
        match position {
            0 => None,
            p => Some(Self::new(p)),
        }
    }

    pub fn start_position() -> Self {
        Self::new(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0 .0
    }

    pub fn plus(&self, delta: u64) -> Position {
        Position::new(self.as_u64() + delta)
    }

    pub fn checked_minus(&self, delta: u64) -> Option<Position> {
        Self::from_u64(self.as_u64().saturating_sub(delta))
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0 .0)
    }
}

/// Converts an optional position into its wire value where 0 means "none".
pub fn position_as_u64(position: Option<Position>) -> u64 {
    position.map(|p| p.as_u64()).unwrap_or(0)
}

/// Term is the logical epoch of one election cycle and its leader.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Default)]
pub struct Term(u64);

impl Term {
    pub fn new(term: u64) -> Self {
        Term(term)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn incr(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended(Position),
    /// The preceding (term, position) didn't match the log's tail. Nothing was written.
    Rejected,
}

/// Resolves once the entries it was created for are durable.
pub type FlushFuture = Pin<Box<dyn Future<Output = Result<(), io::Error>> + Send + 'static>>;

/// Log is the term-aware, append only log of a single partition. It is a collaborator of the
/// consensus core: a durable impl lives outside this crate, `InMemoryLog` is the reference impl.
///
/// Log positions start from 1. There will be no entry existing at position 0.
pub trait Log: Send + 'static {
    /// append() appends `entry` iff `preceding` is exactly the log's current last entry (or the log
    /// is empty and `preceding` is None), then returns the position that was used.
    ///
    /// The entry is readable right away but isn't durable until a later `flush()` completes.
    fn append(&mut self, preceding: Option<(Term, Position)>, entry: LogEntry) -> Result<AppendOutcome, io::Error>;

    /// Starts making everything appended so far durable. The returned future must not borrow the
    /// log; it's awaited off the replica's thread while the replica keeps appending.
    fn flush(&mut self) -> FlushFuture;

    /// Read log entry at specified position.
    fn read(&self, position: Position) -> Result<Option<LogEntry>, io::Error>;

    /// Deletes anything starting at `from` and later.
    fn truncate(&mut self, from: Position) -> Result<(), io::Error>;

    /// Term and position of the most recently appended entry. Never the next free slot.
    fn last_entry(&self) -> Option<(Term, Position)>;

    fn is_last_entry(&self, last: Option<(Term, Position)>) -> bool {
        self.last_entry() == last
    }

    fn commit_position(&self) -> Option<Position>;

    fn set_commit_position(&mut self, position: Position) -> Result<(), io::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_arithmetic() {
        let p = Position::start_position();
        assert_eq!(p.plus(2), Position::new(3));
        assert_eq!(Position::new(3).checked_minus(1), Some(Position::new(2)));
        assert_eq!(p.checked_minus(1), None);
        assert_eq!(p.checked_minus(5), None);
        assert_eq!(Position::from_u64(0), None);
        assert_eq!(position_as_u64(None), 0);
        assert_eq!(position_as_u64(Some(Position::new(7))), 7);
    }

    #[test]
    fn none_sorts_before_any_position() {
        let mut values = vec![Some(Position::new(3)), None, Some(Position::new(1))];
        values.sort();
        assert_eq!(values, vec![None, Some(Position::new(1)), Some(Position::new(3))]);
    }
}
