use crate::api::AppliedRecordPublisher;
use crate::applier::{ApplierRegistry, ApplyError, CommitRecord, TaskScheduler};
use crate::commitlog::{EntryKind, LogEntry, Position};
use crate::replica::StateMachine;

/// RecordProcessor turns committed log entries into business state mutations: decode, dispatch to
/// the registered applier, drain deferred callbacks, then fire whatever scheduled tasks the
/// record's timestamp made due.
pub struct RecordProcessor<S> {
    logger: slog::Logger,
    registry: ApplierRegistry<S>,
    state: S,
    scheduler: TaskScheduler<S>,
    last_applied: Option<Position>,
    publisher: Option<AppliedRecordPublisher>,
}

impl<S: Send + 'static> RecordProcessor<S> {
    pub fn new(logger: slog::Logger, registry: ApplierRegistry<S>, state: S) -> Self {
        RecordProcessor {
            logger,
            registry,
            state,
            scheduler: TaskScheduler::new(),
            last_applied: None,
            publisher: None,
        }
    }

    pub(crate) fn with_publisher(mut self, publisher: AppliedRecordPublisher) -> Self {
        self.publisher.replace(publisher);
        self
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn scheduler(&self) -> &TaskScheduler<S> {
        &self.scheduler
    }

    fn apply_record(&mut self, record: &CommitRecord) -> Result<(), ApplyError> {
        self.scheduler.open_processing_window(record.timestamp);
        let result = self.registry.dispatch(&mut self.state, record, &mut self.scheduler);
        if result.is_ok() {
            self.scheduler.run_immediate(&mut self.state);
            self.scheduler.fire_due_tasks(&mut self.state);
        }
        self.scheduler.close_processing_window();

        result
    }
}

impl<S: Send + 'static> StateMachine for RecordProcessor<S> {
    fn apply(&mut self, position: Position, entry: &LogEntry) -> Result<(), ApplyError> {
        if let Some(last_applied) = self.last_applied {
            assert!(
                position > last_applied,
                "Entries must be applied in order. Expected {:?} > {:?}",
                position,
                last_applied
            );
        }

        match entry.kind {
            EntryKind::LeaderInitial => {
                slog::debug!(self.logger, "Skipping leader initial entry at {:?}", position);
            }
            EntryKind::Record => {
                let record = CommitRecord::decode(position, entry.data.clone())
                    .map_err(|source| ApplyError::MalformedRecord { position, source })?;
                self.apply_record(&record)?;

                if let Some(publisher) = &self.publisher {
                    publisher.notify_applied(&self.logger, record);
                }
            }
        }

        self.last_applied.replace(position);
        Ok(())
    }

    fn last_applied_position(&self) -> Option<Position> {
        self.last_applied
    }
}
