use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use tokio::time::{Duration, Instant};

/// ElectionTimer is the follower/candidate timeout, as plain time arithmetic. Nothing here sleeps;
/// the replica asks `is_elapsed()` whenever a tick arrives.
pub(crate) struct ElectionTimer {
    timeout_range: RangeInclusive<Duration>,
    rng: StdRng,
    deadline: Instant,
    last_leader_contact: Option<Instant>,
}

impl ElectionTimer {
    /// `jitter_seed` makes the randomized timeouts reproducible (simulations, tests).
    pub(crate) fn new(min_timeout: Duration, max_timeout: Duration, jitter_seed: Option<u64>, now: Instant) -> Self {
        let rng = match jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut timer = ElectionTimer {
            timeout_range: RangeInclusive::new(min_timeout, max_timeout),
            rng,
            deadline: now,
            last_leader_contact: None,
        };
        timer.reset(now);

        timer
    }

    /// Pick a new randomized deadline relative to `now`.
    pub(crate) fn reset(&mut self, now: Instant) {
        let rand_timeout = self.rng.gen_range(self.timeout_range.clone());
        self.deadline = now + rand_timeout;
    }

    pub(crate) fn record_leader_contact(&mut self, now: Instant) {
        self.last_leader_contact.replace(now);
        self.reset(now);
    }

    pub(crate) fn is_elapsed(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// True while a leader's lease (the minimum election timeout since its last contact) holds.
    /// Polls and votes are refused during this window so that a partitioned node rejoining with a
    /// higher term can't depose a healthy leader.
    pub(crate) fn heard_from_leader_recently(&self, now: Instant) -> bool {
        match self.last_leader_contact {
            None => false,
            Some(contact) => now < contact + *self.timeout_range.start(),
        }
    }

    #[cfg(test)]
    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_millis(500);
    const MAX: Duration = Duration::from_millis(1500);

    #[test]
    fn deadline_is_within_range() {
        let start = Instant::now();
        let mut timer = ElectionTimer::new(MIN, MAX, Some(7), start);
        for i in 0..50 {
            let now = start + Duration::from_millis(i * 10);
            timer.reset(now);
            assert!(timer.deadline() >= now + MIN);
            assert!(timer.deadline() <= now + MAX);
            assert!(!timer.is_elapsed(now + MIN - Duration::from_millis(1)));
            assert!(timer.is_elapsed(now + MAX));
        }
    }

    #[test]
    fn seeded_timers_agree() {
        let start = Instant::now();
        let a = ElectionTimer::new(MIN, MAX, Some(42), start);
        let b = ElectionTimer::new(MIN, MAX, Some(42), start);
        assert_eq!(a.deadline(), b.deadline());
    }

    #[test]
    fn leader_lease() {
        let start = Instant::now();
        let mut timer = ElectionTimer::new(MIN, MAX, Some(1), start);
        assert!(!timer.heard_from_leader_recently(start));

        timer.record_leader_contact(start);
        assert!(timer.heard_from_leader_recently(start + MIN - Duration::from_millis(1)));
        assert!(!timer.heard_from_leader_recently(start + MIN));
        assert!(!timer.is_elapsed(start + MIN - Duration::from_millis(1)));
    }
}
