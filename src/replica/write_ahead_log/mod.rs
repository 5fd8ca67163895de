//! This module is a raft-specific facade over the `commitlog::Log` collaborator: it caches the
//! log's tail, tracks how much of it is durable, guards the commit position, and feeds committed
//! entries to the state machine.

mod log;

pub use log::FlushCompletion;
pub use log::LogFlush;
pub(crate) use log::WriteAheadLog;
