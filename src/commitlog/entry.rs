use crate::commitlog::Term;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::convert::TryFrom;

/// Byte representation:
///
/// ```text
/// |                                             1                       |
/// | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 | 0 | 1 | 2 | 3 | 4 | 5 | ... |
/// +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+-...-+
/// |Vrs|Knd|       Term (8 bytes)          |   Data (variable size)  ... |
/// +---+---+-------------------------------+-------------------------...-+
/// ```
///
/// * `Vrs` - version of the serialized payload
/// * `Knd` - entry kind, see `EntryKind`
/// * `Term` - raft leadership term when this entry was created (big endian)
/// * `Data` - payload; an encoded `CommitRecord` for `EntryKind::Record`, empty otherwise
///
/// Not needed:
///
/// * Checksum is not needed, it's guaranteed by the underlying log.
/// * Size/length of `Data` is not needed; the underlying log gives us the correctly sized buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub term: Term,
    pub kind: EntryKind,
    pub data: Bytes,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Appended by a newly elected leader at the start of its term. Never dispatched to appliers.
    LeaderInitial,
    /// A business record written by a client.
    Record,
}

const LOG_ENTRY_FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 1 + 8;

impl LogEntry {
    pub fn leader_initial(term: Term) -> Self {
        LogEntry {
            term,
            kind: EntryKind::LeaderInitial,
            data: Bytes::new(),
        }
    }

    pub fn record(term: Term, data: Bytes) -> Self {
        LogEntry {
            term,
            kind: EntryKind::Record,
            data,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(HEADER_LEN + self.data.len());
        bytes.put_u8(LOG_ENTRY_FORMAT_VERSION);
        bytes.put_u8(self.kind.as_u8());
        bytes.put_u64(self.term.as_u64());
        bytes.put_slice(&self.data);

        bytes.freeze()
    }
}

impl EntryKind {
    fn as_u8(self) -> u8 {
        match self {
            EntryKind::LeaderInitial => 0,
            EntryKind::Record => 1,
        }
    }

    fn from_u8(kind: u8) -> Option<Self> {
        match kind {
            0 => Some(EntryKind::LeaderInitial),
            1 => Some(EntryKind::Record),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EntryDecodeError {
    #[error("Log entry is truncated: {0} bytes")]
    Truncated(usize),
    #[error("Unknown log entry format version {0}")]
    UnknownVersion(u8),
    #[error("Unknown log entry kind {0}")]
    UnknownKind(u8),
}

impl TryFrom<Bytes> for LogEntry {
    type Error = EntryDecodeError;

    fn try_from(mut bytes: Bytes) -> Result<Self, Self::Error> {
        if bytes.len() < HEADER_LEN {
            return Err(EntryDecodeError::Truncated(bytes.len()));
        }

        let version = bytes.get_u8();
        if version != LOG_ENTRY_FORMAT_VERSION {
            return Err(EntryDecodeError::UnknownVersion(version));
        }
        let raw_kind = bytes.get_u8();
        let kind = EntryKind::from_u8(raw_kind).ok_or(EntryDecodeError::UnknownKind(raw_kind))?;
        let term = Term::new(bytes.get_u64());

        Ok(LogEntry { term, kind, data: bytes })
    }
}
