use chrono::Utc;
use slog::Drain;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

/// A terminal logger tagged with the replica's ID.
pub fn stdout_logger(replica_id: impl Into<String>) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("ReplicaId" => replica_id.into()))
}

/// A logger writing to `{directory}/{replica_id}_{utc start time}_info.log`.
pub fn file_logger(directory: impl AsRef<Path>, replica_id: impl Into<String>) -> Result<slog::Logger, io::Error> {
    let replica_id = replica_id.into();
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    let log_path = directory
        .as_ref()
        .join(format!("{}_{}_info.log", replica_id, now));
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Ok(slog::Logger::root(drain, slog::o!("ReplicaId" => replica_id)))
}
