mod entry;
mod in_memory;
mod log;

pub use entry::EntryDecodeError;
pub use entry::EntryKind;
pub use entry::LogEntry;
pub use in_memory::InMemoryLog;
pub use log::position_as_u64;
pub use log::AppendOutcome;
pub use log::FlushFuture;
pub use log::Log;
pub use log::Position;
pub use log::Term;
