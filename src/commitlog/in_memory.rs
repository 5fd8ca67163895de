use crate::commitlog::{AppendOutcome, FlushFuture, Log, LogEntry, Position, Term};
use bytes::Bytes;
use std::convert::TryFrom;
use std::io;

// The consensus core doesn't own durable storage. This models the contract in memory, which is
// what the test suite and single-process deployments run against.
pub struct InMemoryLog {
    // We don't *need* to convert these to bytes. We could just hold the original entry in memory,
    // but we want to exercise the conversion logic.
    log: Vec<Bytes>,
    // Kept alongside the bytes so `last_entry()` doesn't decode on every call.
    terms: Vec<Term>,
    commit_position: Option<Position>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        InMemoryLog {
            log: vec![],
            terms: vec![],
            commit_position: None,
        }
    }

    fn vec_index(position: Position) -> usize {
        // Log API states that Position starts from 1.
        (position.as_u64() - 1) as usize
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for InMemoryLog {
    fn append(&mut self, preceding: Option<(Term, Position)>, entry: LogEntry) -> Result<AppendOutcome, io::Error> {
        if !self.is_last_entry(preceding) {
            return Ok(AppendOutcome::Rejected);
        }

        self.terms.push(entry.term);
        self.log.push(entry.encode());

        Ok(AppendOutcome::Appended(Position::new_usize(self.log.len())))
    }

    // Memory is as durable as it gets.
    fn flush(&mut self) -> FlushFuture {
        Box::pin(async { Ok(()) })
    }

    fn read(&self, position: Position) -> Result<Option<LogEntry>, io::Error> {
        match self.log.get(Self::vec_index(position)) {
            None => Ok(None),
            Some(bytes) => LogEntry::try_from(bytes.clone())
                .map(Some)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }

    fn truncate(&mut self, from: Position) -> Result<(), io::Error> {
        if let Some(commit_position) = self.commit_position {
            if from <= commit_position {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "Refusing to truncate from {:?}, entries up to {:?} are committed",
                        from, commit_position
                    ),
                ));
            }
        }

        let vec_index = Self::vec_index(from);
        self.log.truncate(vec_index);
        self.terms.truncate(vec_index);
        Ok(())
    }

    fn last_entry(&self) -> Option<(Term, Position)> {
        self.terms
            .last()
            .map(|term| (*term, Position::new_usize(self.terms.len())))
    }

    fn commit_position(&self) -> Option<Position> {
        self.commit_position
    }

    fn set_commit_position(&mut self, position: Position) -> Result<(), io::Error> {
        if self.commit_position.map_or(false, |current| position < current) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Commit position can't move backwards",
            ));
        }
        if position.as_u64() > self.log.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Commit position can't be past the last appended entry",
            ));
        }

        self.commit_position = Some(position);
        Ok(())
    }
}
