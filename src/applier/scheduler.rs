use std::collections::{BTreeMap, HashMap, VecDeque};
use std::convert::TryFrom;
use std::time::Duration;

pub type TaskCallback<S> = Box<dyn FnMut(&mut S, &mut TaskScheduler<S>) + Send>;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TaskId(u64);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("Tasks can only be scheduled while a committed record is being applied")]
    OutsideProcessingWindow,
    #[error("Recurring tasks need a non-zero interval")]
    ZeroInterval,
}

struct ScheduledTask<S> {
    interval: Option<u64>,
    callback: TaskCallback<S>,
}

/// TaskScheduler is the deferred/scheduled task queue of one partition.
///
/// Time here is deterministic: milliseconds taken from the timestamps of applied records, never a
/// live clock. Every replica replaying the same log fires the same tasks in the same order.
pub struct TaskScheduler<S> {
    now: u64,
    next_task_id: u64,
    in_processing_window: bool,
    // Tasks to run right after the current record's mutation, FIFO.
    immediate: VecDeque<TaskCallback<S>>,
    // Ordered by (due, registration order).
    pending: BTreeMap<(u64, TaskId), ScheduledTask<S>>,
    due_by_id: HashMap<TaskId, u64>,
    // The recurring task currently firing, and whether it cancelled itself.
    firing: Option<(TaskId, bool)>,
}

impl<S> TaskScheduler<S> {
    pub fn new() -> Self {
        TaskScheduler {
            now: 0,
            next_task_id: 0,
            in_processing_window: false,
            immediate: VecDeque::new(),
            pending: BTreeMap::new(),
            due_by_id: HashMap::new(),
            firing: None,
        }
    }

    /// Deterministic time in milliseconds: the largest record timestamp seen so far.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    /// Runs `callback` once, right after the current record's mutation and before the next record.
    pub fn execute<F>(&mut self, callback: F) -> Result<(), SchedulingError>
    where
        F: FnMut(&mut S, &mut TaskScheduler<S>) + Send + 'static,
    {
        self.check_processing_window()?;
        self.immediate.push_back(Box::new(callback));
        Ok(())
    }

    /// Runs `callback` once, at the first tick where deterministic time reaches `now() + delay`.
    pub fn schedule<F>(&mut self, delay: Duration, callback: F) -> Result<TaskId, SchedulingError>
    where
        F: FnMut(&mut S, &mut TaskScheduler<S>) + Send + 'static,
    {
        self.check_processing_window()?;
        let due = self.now.saturating_add(as_millis(delay));
        Ok(self.insert(due, None, Box::new(callback)))
    }

    /// Runs `callback` at `now() + initial_delay`, then every `interval` after each firing.
    pub fn schedule_at_fixed_rate<F>(
        &mut self,
        initial_delay: Duration,
        interval: Duration,
        callback: F,
    ) -> Result<TaskId, SchedulingError>
    where
        F: FnMut(&mut S, &mut TaskScheduler<S>) + Send + 'static,
    {
        self.check_processing_window()?;
        let interval = as_millis(interval);
        if interval == 0 {
            return Err(SchedulingError::ZeroInterval);
        }

        let due = self.now.saturating_add(as_millis(initial_delay));
        Ok(self.insert(due, Some(interval), Box::new(callback)))
    }

    /// Returns true if the task was still pending and is now cancelled.
    pub fn cancel(&mut self, task_id: TaskId) -> bool {
        if let Some((firing_id, cancelled)) = &mut self.firing {
            if *firing_id == task_id && !*cancelled {
                *cancelled = true;
                return true;
            }
        }

        match self.due_by_id.remove(&task_id) {
            Some(due) => self.pending.remove(&(due, task_id)).is_some(),
            None => false,
        }
    }

    fn insert(&mut self, due: u64, interval: Option<u64>, callback: TaskCallback<S>) -> TaskId {
        let task_id = TaskId(self.next_task_id);
        self.next_task_id += 1;
        self.reinsert(task_id, due, ScheduledTask { interval, callback });

        task_id
    }

    fn reinsert(&mut self, task_id: TaskId, due: u64, task: ScheduledTask<S>) {
        self.pending.insert((due, task_id), task);
        self.due_by_id.insert(task_id, due);
    }

    fn check_processing_window(&self) -> Result<(), SchedulingError> {
        if self.in_processing_window {
            Ok(())
        } else {
            Err(SchedulingError::OutsideProcessingWindow)
        }
    }

    pub(crate) fn open_processing_window(&mut self, record_timestamp: u64) {
        self.now = self.now.max(record_timestamp);
        self.in_processing_window = true;
    }

    pub(crate) fn close_processing_window(&mut self) {
        self.in_processing_window = false;
    }

    /// Drains deferred `execute()` callbacks, including ones queued by the callbacks themselves.
    pub(crate) fn run_immediate(&mut self, state: &mut S) {
        while let Some(mut callback) = self.immediate.pop_front() {
            callback(state, self);
        }
    }

    /// Fires every task due at or before `now()`, in (due, registration) order.
    pub(crate) fn fire_due_tasks(&mut self, state: &mut S) {
        loop {
            let key = match self.pending.keys().next() {
                Some(&(due, task_id)) if due <= self.now => (due, task_id),
                _ => break,
            };
            let task_id = key.1;
            let mut task = match self.pending.remove(&key) {
                Some(task) => task,
                None => break,
            };
            self.due_by_id.remove(&task_id);

            self.firing = Some((task_id, false));
            (task.callback)(state, self);
            let cancelled_itself = matches!(self.firing.take(), Some((_, true)));
            self.run_immediate(state);

            if let (Some(interval), false) = (task.interval, cancelled_itself) {
                // Saturated at the end of time, the next firing can never come.
                let next_due = self.now.saturating_add(interval);
                if next_due > self.now {
                    self.reinsert(task_id, next_due, task);
                }
            }
        }
    }
}

impl<S> Default for TaskScheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}

// Delays beyond u64 milliseconds mean "never" in practice, so they clamp instead of wrapping.
fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    type Fired = Vec<(&'static str, u64)>;

    fn tick(scheduler: &mut TaskScheduler<Fired>, state: &mut Fired, time: u64) {
        scheduler.open_processing_window(time);
        scheduler.run_immediate(state);
        scheduler.fire_due_tasks(state);
        scheduler.close_processing_window();
    }

    #[test]
    fn rejects_calls_outside_processing_window() {
        let mut scheduler: TaskScheduler<Fired> = TaskScheduler::new();
        assert_eq!(
            scheduler.execute(|_, _| {}),
            Err(SchedulingError::OutsideProcessingWindow)
        );
        assert_eq!(
            scheduler.schedule(Duration::from_millis(5), |_, _| {}),
            Err(SchedulingError::OutsideProcessingWindow)
        );

        scheduler.open_processing_window(0);
        assert_eq!(
            scheduler.schedule_at_fixed_rate(Duration::from_millis(1), Duration::from_millis(0), |_, _| {}),
            Err(SchedulingError::ZeroInterval)
        );
    }

    #[test]
    fn delayed_and_recurring_tasks_follow_record_time() {
        let mut scheduler = TaskScheduler::new();
        let mut fired: Fired = vec![];

        scheduler.open_processing_window(100);
        scheduler
            .schedule(Duration::from_millis(5), |fired: &mut Fired, s| fired.push(("once", s.now())))
            .unwrap();
        scheduler
            .schedule_at_fixed_rate(Duration::from_millis(5), Duration::from_millis(5), |fired: &mut Fired, s| {
                fired.push(("every", s.now()))
            })
            .unwrap();
        scheduler.close_processing_window();

        tick(&mut scheduler, &mut fired, 104);
        assert!(fired.is_empty());

        // Wall clock may have moved arbitrarily far; only record time matters.
        tick(&mut scheduler, &mut fired, 105);
        assert_eq!(fired, vec![("once", 105), ("every", 105)]);

        // A record with an older timestamp doesn't move time backwards.
        tick(&mut scheduler, &mut fired, 90);
        assert_eq!(fired.len(), 2);

        tick(&mut scheduler, &mut fired, 111);
        assert_eq!(fired, vec![("once", 105), ("every", 105), ("every", 111)]);
        assert_eq!(scheduler.now(), 111);

        // Rescheduled relative to the firing tick: next at 116, not 115.
        tick(&mut scheduler, &mut fired, 115);
        assert_eq!(fired.len(), 3);
        tick(&mut scheduler, &mut fired, 116);
        assert_eq!(fired.last(), Some(&("every", 116)));
    }

    #[test]
    fn execute_runs_in_order_before_due_tasks() {
        let mut scheduler = TaskScheduler::new();
        let mut fired: Fired = vec![];

        scheduler.open_processing_window(10);
        scheduler.schedule(Duration::from_millis(0), |f: &mut Fired, _| f.push(("due", 0))).unwrap();
        scheduler.execute(|f: &mut Fired, _| f.push(("first", 0))).unwrap();
        scheduler
            .execute(|f: &mut Fired, s| {
                f.push(("second", 0));
                s.execute(|f: &mut Fired, _| f.push(("nested", 0))).unwrap();
            })
            .unwrap();
        scheduler.run_immediate(&mut fired);
        scheduler.fire_due_tasks(&mut fired);
        scheduler.close_processing_window();

        assert_eq!(fired, vec![("first", 0), ("second", 0), ("nested", 0), ("due", 0)]);
    }

    #[test]
    fn same_due_time_fires_in_registration_order() {
        let mut scheduler = TaskScheduler::new();
        let mut fired: Fired = vec![];

        scheduler.open_processing_window(0);
        scheduler.schedule(Duration::from_millis(10), |f: &mut Fired, _| f.push(("b", 0))).unwrap();
        scheduler.schedule(Duration::from_millis(5), |f: &mut Fired, _| f.push(("a", 0))).unwrap();
        scheduler.schedule(Duration::from_millis(10), |f: &mut Fired, _| f.push(("c", 0))).unwrap();
        scheduler.close_processing_window();

        tick(&mut scheduler, &mut fired, 20);
        assert_eq!(fired, vec![("a", 0), ("b", 0), ("c", 0)]);
    }

    #[test]
    fn cancel() {
        let mut scheduler = TaskScheduler::new();
        let mut fired: Fired = vec![];

        scheduler.open_processing_window(0);
        let once = scheduler.schedule(Duration::from_millis(5), |f: &mut Fired, _| f.push(("once", 0))).unwrap();
        scheduler
            .schedule_at_fixed_rate(Duration::from_millis(5), Duration::from_millis(5), |f: &mut Fired, s| {
                f.push(("every", s.now()));
                if s.now() >= 10 {
                    // Cancels itself via its own id, which is the second id handed out.
                    assert!(s.cancel(TaskId(1)));
                }
            })
            .unwrap();
        scheduler.close_processing_window();

        assert!(scheduler.cancel(once));
        assert!(!scheduler.cancel(once));

        tick(&mut scheduler, &mut fired, 5);
        tick(&mut scheduler, &mut fired, 10);
        tick(&mut scheduler, &mut fired, 15);
        assert_eq!(fired, vec![("every", 5), ("every", 10)]);
        assert_eq!(scheduler.num_pending(), 0);
    }

    #[test]
    fn huge_delays_saturate_instead_of_wrapping() {
        let mut scheduler = TaskScheduler::new();
        let mut fired: Fired = vec![];

        scheduler.open_processing_window(1000);
        let beyond_u64_millis = Duration::from_millis(u64::MAX) + Duration::from_millis(1001);
        scheduler
            .schedule(beyond_u64_millis, |f: &mut Fired, s| f.push(("far", s.now())))
            .unwrap();
        scheduler.close_processing_window();

        tick(&mut scheduler, &mut fired, 2000);
        assert!(fired.is_empty());
        assert_eq!(scheduler.num_pending(), 1);

        // Near the end of time, delays clamp to it.
        scheduler.open_processing_window(u64::MAX - 10);
        scheduler
            .schedule(Duration::from_millis(20), |f: &mut Fired, s| f.push(("late", s.now())))
            .unwrap();
        scheduler.close_processing_window();

        tick(&mut scheduler, &mut fired, u64::MAX - 1);
        assert!(fired.is_empty());
        tick(&mut scheduler, &mut fired, u64::MAX);
        assert_eq!(fired, vec![("far", u64::MAX), ("late", u64::MAX)]);
    }

    #[test]
    fn recurring_task_stops_at_the_end_of_time() {
        let mut scheduler = TaskScheduler::new();
        let mut fired: Fired = vec![];

        scheduler.open_processing_window(u64::MAX - 1);
        scheduler
            .schedule_at_fixed_rate(Duration::from_millis(1), Duration::from_millis(5), |f: &mut Fired, s| {
                f.push(("every", s.now()))
            })
            .unwrap();
        scheduler.close_processing_window();

        tick(&mut scheduler, &mut fired, u64::MAX);
        assert_eq!(fired, vec![("every", u64::MAX)]);
        assert_eq!(scheduler.num_pending(), 0);
    }
}
