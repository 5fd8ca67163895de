use tokio::time::Instant;

/// Clock is the only source of time for the ticker. The replica itself never reads a clock; it's
/// handed `now` with every tick.
#[async_trait::async_trait]
pub(crate) trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    async fn sleep_until(&mut self, deadline: Instant);
}

#[derive(Copy, Clone)]
pub(crate) struct RealClock;

#[async_trait::async_trait]
impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&mut self, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
pub(crate) use mock::mocked_clock;

#[cfg(test)]
mod mock {
    use super::Clock;
    use tokio::sync::watch;
    use tokio::time::{Duration, Instant};

    /// A clock that only moves when the test says so. All clones observe the same time.
    pub(crate) fn mocked_clock() -> (MockClock, MockClockController) {
        let (tx, rx) = watch::channel(Instant::now());

        (MockClock { current_time: rx }, MockClockController { current_time: tx })
    }

    #[derive(Clone)]
    pub(crate) struct MockClock {
        current_time: watch::Receiver<Instant>,
    }

    #[async_trait::async_trait]
    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current_time.borrow()
        }

        async fn sleep_until(&mut self, deadline: Instant) {
            while *self.current_time.borrow() < deadline {
                if self.current_time.changed().await.is_err() {
                    // Controller is gone; time will never reach the deadline.
                    std::future::pending::<()>().await;
                }
            }
        }
    }

    pub(crate) struct MockClockController {
        current_time: watch::Sender<Instant>,
    }

    impl MockClockController {
        pub(crate) fn now(&self) -> Instant {
            *self.current_time.borrow()
        }

        /// Sleepers wake once per call at most, so step in increments no larger than the
        /// granularity the test cares about.
        pub(crate) fn advance(&self, duration: Duration) {
            let new_now = self.now() + duration;
            self.current_time.send_replace(new_now);
        }
    }
}
