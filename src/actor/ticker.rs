use crate::actor::time::Clock;
use crate::actor::WeakActorClient;
use tokio::time::Duration;

/// Ticker drives all of a replica's timeouts. Every `interval` it hands the actor the current
/// time; election deadlines, heartbeats, and append retries are evaluated against it there.
///
/// The ticker only holds a weak handle, so it stops once the actor is gone.
pub(crate) struct Ticker<C: Clock> {
    clock: C,
    interval: Duration,
    actor_client: WeakActorClient,
}

impl<C: Clock> Ticker<C> {
    pub(crate) fn new(clock: C, interval: Duration, actor_client: WeakActorClient) -> Self {
        Ticker {
            clock,
            interval,
            actor_client,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut next_wake = self.clock.now();
        loop {
            next_wake += self.interval;
            self.clock.sleep_until(next_wake).await;

            let actor_client = match self.actor_client.upgrade() {
                Some(actor_client) => actor_client,
                None => return,
            };
            if actor_client.tick(self.clock.now()).await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::time::mocked_clock;
    use crate::actor::{ActorClient, Event};

    #[tokio::test]
    async fn ticks_follow_the_clock() {
        let interval = Duration::from_millis(20);
        let (actor_client, mut actor_queue_rx) = ActorClient::new(10);
        let (clock, controller) = mocked_clock();
        let start = controller.now();
        tokio::spawn(Ticker::new(clock, interval, actor_client.weak()).run());

        tokio::time::timeout(Duration::from_millis(10), actor_queue_rx.recv())
            .await
            .expect_err("Expected no tick before the clock moves");

        controller.advance(interval);
        match actor_queue_rx.recv().await {
            Some(Event::Tick(now)) => assert_eq!(now, start + interval),
            other => panic!("Unexpected event {:?}", other),
        }

        // Ticker stops once every strong handle and the queue are gone.
        drop(actor_client);
        drop(actor_queue_rx);
        controller.advance(interval);
    }
}
