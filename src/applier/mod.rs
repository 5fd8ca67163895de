//! Deterministic application of committed records to business state: the applier registry, the
//! deferred/scheduled task queue, and the `StateMachine` that ties them to the replicated log.

mod processor;
mod record;
mod registry;
mod scheduler;

pub use processor::RecordProcessor;
pub use record::CommitRecord;
pub use record::NewRecord;
pub use record::Operation;
pub use record::RecordDecodeError;
pub use record::RecordType;
pub use registry::ApplierRegistry;
pub use registry::ApplyError;
pub use registry::RecordApplier;
pub use registry::RegistrationError;
pub use registry::DEFAULT_RECORD_VERSION;
pub use scheduler::SchedulingError;
pub use scheduler::TaskCallback;
pub use scheduler::TaskId;
pub use scheduler::TaskScheduler;

pub(crate) use record::encode_record;
