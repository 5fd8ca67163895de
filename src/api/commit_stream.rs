use crate::applier::CommitRecord;
use tokio::sync::mpsc;

pub(crate) fn create_applied_record_stream() -> (AppliedRecordPublisher, AppliedRecordStream) {
    let (tx, rx) = mpsc::unbounded_channel();

    let publisher = AppliedRecordPublisher { sender: tx };
    let stream = AppliedRecordStream { receiver: rx };

    (publisher, stream)
}

pub(crate) struct AppliedRecordPublisher {
    sender: mpsc::UnboundedSender<CommitRecord>,
}

impl AppliedRecordPublisher {
    pub(crate) fn notify_applied(&self, logger: &slog::Logger, record: CommitRecord) {
        if self.sender.send(record).is_err() {
            slog::debug!(logger, "AppliedRecordStream has disconnected.");
        }
    }
}

/// AppliedRecordStream notifies the business engine of every record that has been committed and
/// applied to the partition's state, in position order.
pub struct AppliedRecordStream {
    receiver: mpsc::UnboundedReceiver<CommitRecord>,
}

impl AppliedRecordStream {
    /// next returns the next applied record, or None once the partition has stopped (e.g. halted).
    pub async fn next(&mut self) -> Option<CommitRecord> {
        self.receiver.recv().await
    }

    /// Like `next()`, but doesn't wait.
    pub fn try_next(&mut self) -> Option<CommitRecord> {
        self.receiver.try_recv().ok()
    }
}
