use crate::commitlog::Position;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

/// RecordType is the business category of a record (e.g. job, timer, process instance). What the
/// numbers mean is up to the business engine.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct RecordType(pub u16);

/// Operation is what happened to a record of some `RecordType` (created, completed, ...).
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Operation(pub u16);

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordType({})", self.0)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operation({})", self.0)
    }
}

/// CommitRecord is the decoded payload of one committed log entry. The timestamp is the one
/// stamped by the leader when it accepted the write; it is the only notion of "now" appliers get.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRecord {
    pub position: Position,
    /// Milliseconds since the unix epoch.
    pub timestamp: u64,
    pub record_type: RecordType,
    pub operation: Operation,
    pub version: u16,
    pub session_id: u64,
    pub value: Bytes,
}

/// NewRecord is what a client asks to be written. Position and timestamp are assigned on the
/// write path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewRecord {
    pub record_type: RecordType,
    pub operation: Operation,
    /// None means "latest version registered for this record type and operation".
    pub version: Option<u16>,
    pub session_id: u64,
    pub value: Bytes,
}

/// Byte representation:
///
/// ```text
/// | Fmt | Timestamp (8) | RecordType (2) | Operation (2) | Version (2) | Session (8) | Value ... |
/// ```
///
/// All integers big endian.
const RECORD_FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 1 + 8 + 2 + 2 + 2 + 8;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordDecodeError {
    #[error("Record is truncated: {0} bytes")]
    Truncated(usize),
    #[error("Unknown record format version {0}")]
    UnknownFormat(u8),
}

pub(crate) fn encode_record(record: &NewRecord, version: u16, timestamp: u64) -> Bytes {
    let mut bytes = BytesMut::with_capacity(HEADER_LEN + record.value.len());
    bytes.put_u8(RECORD_FORMAT_VERSION);
    bytes.put_u64(timestamp);
    bytes.put_u16(record.record_type.0);
    bytes.put_u16(record.operation.0);
    bytes.put_u16(version);
    bytes.put_u64(record.session_id);
    bytes.put_slice(&record.value);

    bytes.freeze()
}

impl CommitRecord {
    pub fn decode(position: Position, mut bytes: Bytes) -> Result<Self, RecordDecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(RecordDecodeError::Truncated(bytes.len()));
        }

        let format = bytes.get_u8();
        if format != RECORD_FORMAT_VERSION {
            return Err(RecordDecodeError::UnknownFormat(format));
        }

        Ok(CommitRecord {
            position,
            timestamp: bytes.get_u64(),
            record_type: RecordType(bytes.get_u16()),
            operation: Operation(bytes.get_u16()),
            version: bytes.get_u16(),
            session_id: bytes.get_u64(),
            value: bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_assigns_position() {
        let new_record = NewRecord {
            record_type: RecordType(3),
            operation: Operation(1),
            version: None,
            session_id: 99,
            value: Bytes::from_static(b"job"),
        };
        let encoded = encode_record(&new_record, 2, 1_600_000_000_000);
        let decoded = CommitRecord::decode(Position::new(12), encoded).unwrap();

        assert_eq!(
            decoded,
            CommitRecord {
                position: Position::new(12),
                timestamp: 1_600_000_000_000,
                record_type: RecordType(3),
                operation: Operation(1),
                version: 2,
                session_id: 99,
                value: Bytes::from_static(b"job"),
            }
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        assert_eq!(
            CommitRecord::decode(Position::new(1), Bytes::from_static(b"abc")),
            Err(RecordDecodeError::Truncated(3))
        );
        assert_eq!(
            CommitRecord::decode(Position::new(1), Bytes::from(vec![7u8; HEADER_LEN])),
            Err(RecordDecodeError::UnknownFormat(7))
        );
    }
}
