//! This mod is meant to hold most of the code for the library's client-facing API.
mod client;
mod commit_stream;
mod event_bus;
mod logging;
mod options;
mod replicated_log;
mod wiring;

pub use client::Partition;
pub use commit_stream::AppliedRecordStream;
pub use event_bus::ElectionEvent;
pub use event_bus::Event;
pub use event_bus::EventListener;
pub use event_bus::FollowerEventData;
pub use logging::file_logger;
pub use logging::stdout_logger;
pub use options::RaftOptions;
pub use replicated_log::ReplicatedLog;
pub use replicated_log::WriteError;
pub use replicated_log::WriteRecordOutput;
pub use wiring::create_partition;
pub use wiring::PartitionConfig;
pub use wiring::PartitionCreationError;

// So the record processor can publish applied records.
pub(crate) use commit_stream::AppliedRecordPublisher;
