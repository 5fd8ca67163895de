use crate::applier::{CommitRecord, Operation, RecordType, TaskScheduler};
use crate::commitlog::Position;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io;

pub const DEFAULT_RECORD_VERSION: u16 = 1;

/// RecordApplier is a deterministic mutation of business state for one kind of committed record.
/// It must not read a live clock, randomness, or anything else that differs between replicas.
pub trait RecordApplier<S>: Send {
    fn apply(&self, state: &mut S, record: &CommitRecord, scheduler: &mut TaskScheduler<S>);
}

impl<S, F> RecordApplier<S> for F
where
    F: Fn(&mut S, &CommitRecord, &mut TaskScheduler<S>) + Send,
{
    fn apply(&self, state: &mut S, record: &CommitRecord, scheduler: &mut TaskScheduler<S>) {
        self(state, record, scheduler)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Applier for {record_type:?}/{operation:?} version {version} is already registered")]
    DuplicateApplier {
        record_type: RecordType,
        operation: Operation,
        version: u16,
    },
    #[error("Applier version must be greater than 0")]
    InvalidVersion,
    #[error("No applier registered for {0:?}")]
    MissingAppliers(Vec<(RecordType, Operation)>),
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("No applier registered for {record_type:?}/{operation:?}")]
    NoApplierForOperation {
        record_type: RecordType,
        operation: Operation,
    },
    #[error("No applier registered for {record_type:?}/{operation:?} version {version}, latest is {latest}")]
    NoApplierForVersion {
        record_type: RecordType,
        operation: Operation,
        version: u16,
        latest: u16,
    },
    #[error("Committed entry at {position:?} is not a valid record")]
    MalformedRecord {
        position: Position,
        source: crate::applier::RecordDecodeError,
    },
    #[error("Failed to read committed entry at {position:?}")]
    LogRead { position: Position, source: io::Error },
}

impl ApplyError {
    /// Everything except a failed read means a committed entry can never be applied. Skipping it
    /// would make this replica's state diverge, so the partition has to stop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ApplyError::LogRead { .. })
    }
}

/// ApplierRegistry maps (record type, operation, version) to the applier for it. Filled once at
/// startup; the business engine hands it over when creating the partition.
pub struct ApplierRegistry<S> {
    appliers: HashMap<(RecordType, Operation), BTreeMap<u16, Box<dyn RecordApplier<S>>>>,
}

impl<S> ApplierRegistry<S> {
    pub fn new() -> Self {
        ApplierRegistry {
            appliers: HashMap::new(),
        }
    }

    pub fn register<A>(&mut self, record_type: RecordType, operation: Operation, applier: A) -> Result<(), RegistrationError>
    where
        A: RecordApplier<S> + 'static,
    {
        self.register_version(record_type, operation, DEFAULT_RECORD_VERSION, applier)
    }

    pub fn register_version<A>(
        &mut self,
        record_type: RecordType,
        operation: Operation,
        version: u16,
        applier: A,
    ) -> Result<(), RegistrationError>
    where
        A: RecordApplier<S> + 'static,
    {
        if version == 0 {
            return Err(RegistrationError::InvalidVersion);
        }

        let versions = self.appliers.entry((record_type, operation)).or_insert_with(BTreeMap::new);
        if versions.contains_key(&version) {
            return Err(RegistrationError::DuplicateApplier {
                record_type,
                operation,
                version,
            });
        }
        versions.insert(version, Box::new(applier));

        Ok(())
    }

    pub fn latest_version(&self, record_type: RecordType, operation: Operation) -> Option<u16> {
        self.appliers
            .get(&(record_type, operation))
            .and_then(|versions| versions.keys().next_back().copied())
    }

    /// Snapshot of every registered version per key. The write path checks records against it
    /// after the registry itself has moved into the partition.
    pub(crate) fn registered_versions(&self) -> HashMap<(RecordType, Operation), BTreeSet<u16>> {
        self.appliers
            .iter()
            .map(|(key, versions)| (*key, versions.keys().copied().collect()))
            .collect()
    }

    /// Lets the business engine fail at startup instead of halting on the first unknown record.
    pub fn ensure_registered(&self, expected: &[(RecordType, Operation)]) -> Result<(), RegistrationError> {
        let missing: Vec<_> = expected
            .iter()
            .filter(|key| !self.appliers.contains_key(*key))
            .copied()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistrationError::MissingAppliers(missing))
        }
    }

    pub(crate) fn dispatch(
        &self,
        state: &mut S,
        record: &CommitRecord,
        scheduler: &mut TaskScheduler<S>,
    ) -> Result<(), ApplyError> {
        let versions = self
            .appliers
            .get(&(record.record_type, record.operation))
            .ok_or_else(|| ApplyError::NoApplierForOperation {
                record_type: record.record_type,
                operation: record.operation,
            })?;

        match versions.get(&record.version) {
            Some(applier) => {
                applier.apply(state, record, scheduler);
                Ok(())
            }
            None => Err(ApplyError::NoApplierForVersion {
                record_type: record.record_type,
                operation: record.operation,
                version: record.version,
                latest: versions.keys().next_back().copied().unwrap_or(0),
            }),
        }
    }
}

impl<S> Default for ApplierRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    const JOB: RecordType = RecordType(1);
    const CREATED: Operation = Operation(1);
    const COMPLETED: Operation = Operation(2);

    fn push(n: u16) -> impl Fn(&mut Vec<u16>, &CommitRecord, &mut TaskScheduler<Vec<u16>>) + Send {
        move |state, _, _| state.push(n)
    }

    fn record(operation: Operation, version: u16) -> CommitRecord {
        CommitRecord {
            position: Position::new(1),
            timestamp: 0,
            record_type: JOB,
            operation,
            version,
            session_id: 0,
            value: Bytes::from_static(b"x"),
        }
    }

    #[test]
    fn registration_rules() {
        let mut registry: ApplierRegistry<Vec<u16>> = ApplierRegistry::new();
        registry.register(JOB, CREATED, push(1)).unwrap();
        assert_eq!(
            registry.register(JOB, CREATED, push(0)),
            Err(RegistrationError::DuplicateApplier {
                record_type: JOB,
                operation: CREATED,
                version: 1
            })
        );
        assert_eq!(
            registry.register_version(JOB, CREATED, 0, push(0)),
            Err(RegistrationError::InvalidVersion)
        );
        registry
            .register_version(JOB, CREATED, 3, push(3))
            .unwrap();

        assert_eq!(registry.latest_version(JOB, CREATED), Some(3));
        let registered = registry.registered_versions();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[&(JOB, CREATED)].iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(registry.latest_version(JOB, COMPLETED), None);
        assert!(registry.ensure_registered(&[(JOB, CREATED)]).is_ok());
        assert_eq!(
            registry.ensure_registered(&[(JOB, CREATED), (JOB, COMPLETED)]),
            Err(RegistrationError::MissingAppliers(vec![(JOB, COMPLETED)]))
        );
    }

    #[test]
    fn dispatch_by_version() {
        let mut registry: ApplierRegistry<Vec<u16>> = ApplierRegistry::new();
        registry.register(JOB, CREATED, push(1)).unwrap();
        registry
            .register_version(JOB, CREATED, 2, push(2))
            .unwrap();

        let mut state = vec![];
        let mut scheduler = TaskScheduler::new();
        registry.dispatch(&mut state, &record(CREATED, 2), &mut scheduler).unwrap();
        registry.dispatch(&mut state, &record(CREATED, 1), &mut scheduler).unwrap();
        assert_eq!(state, vec![2, 1]);

        match registry.dispatch(&mut state, &record(CREATED, 5), &mut scheduler) {
            Err(ApplyError::NoApplierForVersion { version: 5, latest: 2, .. }) => {}
            other => panic!("Unexpected {:?}", other),
        }
        match registry.dispatch(&mut state, &record(COMPLETED, 1), &mut scheduler) {
            Err(e @ ApplyError::NoApplierForOperation { .. }) => assert!(e.is_fatal()),
            other => panic!("Unexpected {:?}", other),
        }
    }
}
