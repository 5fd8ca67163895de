mod ticker;
mod time;

pub(crate) use ticker::Ticker;
pub(crate) use time::Clock;
pub(crate) use time::RealClock;

use crate::commitlog::Log;
use crate::replica::{
    FlushCompletion, LogFlush, OutboundMessage, PersistentLocalState, RaftMessage, Replica, ReplicaId, StateMachine,
    WriteToLogError, WriteToLogOutput,
};
use crate::transport::Transport;
use bytes::Bytes;
use std::error::Error;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

// Log appends and state machine interaction are synchronous, inside the actor. Log flushes and
// outbound network sends leave the actor on their own spawned tasks; a flush comes back as a
// `FlushCompleted` event.
#[derive(Debug)]
pub(crate) enum Event {
    // Leader: Write to log, replicate eagerly.
    // Candidate/Follower: Redirect or reject.
    WriteToLog(Bytes, Callback<WriteToLogOutput, WriteToLogError>),

    // Any protocol message from a peer. Responses are themselves inbound messages later on.
    Inbound { from: ReplicaId, message: RaftMessage },

    // Leader: heartbeats and retries of lost appends.
    // Candidate/Follower: check election deadline.
    Tick(Instant),

    // Leader: count newly durable entries towards commit.
    // Follower: send the append response that was waiting on them.
    FlushCompleted(FlushCompletion, io::Result<()>),
}

#[derive(Debug)]
pub(crate) struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    fn send(self, message: Result<O, E>) {
        // Caller may have given up waiting. That's fine.
        let _ = self.0.send(message);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Replica actor has exited")]
pub(crate) struct ActorExited;

#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub(crate) fn new(queue_size: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(queue_size);
        (ActorClient { sender: tx }, rx)
    }

    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn write_to_log(&self, data: Bytes) -> Result<WriteToLogOutput, WriteToLogError> {
        let (tx, rx) = oneshot::channel();
        if self.send(Event::WriteToLog(data, Callback(tx))).await.is_err() {
            return Err(WriteToLogError::ActorExited);
        }

        rx.await.unwrap_or(Err(WriteToLogError::ActorExited))
    }

    pub(crate) async fn deliver(&self, from: ReplicaId, message: RaftMessage) -> Result<(), ActorExited> {
        self.send(Event::Inbound { from, message }).await
    }

    pub(crate) async fn tick(&self, now: Instant) -> Result<(), ActorExited> {
        self.send(Event::Tick(now)).await
    }

    pub(crate) async fn flush_completed(
        &self,
        completion: FlushCompletion,
        result: io::Result<()>,
    ) -> Result<(), ActorExited> {
        self.send(Event::FlushCompleted(completion, result)).await
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        self.sender.send(event).await.map_err(|_| ActorExited)
    }
}

/// WeakActorClient is held by things that shouldn't keep the actor alive: the ticker, the
/// network's inbox, and the actor itself.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl WeakActorClient {
    pub(crate) fn upgrade(&self) -> Option<ActorClient> {
        self.sender.upgrade().map(|sender| ActorClient { sender })
    }
}

/// ReplicaActor is replica logic in actor model.
pub(crate) struct ReplicaActor<L, S, M>
where
    L: Log,
    S: PersistentLocalState,
    M: StateMachine,
{
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    replica: Replica<L, S, M>,
    transport: Arc<dyn Transport>,
    // Where flush completions are posted back to.
    myself: WeakActorClient,
}

impl<L, S, M> ReplicaActor<L, S, M>
where
    L: Log,
    S: PersistentLocalState,
    M: StateMachine,
{
    pub(crate) fn new(
        logger: slog::Logger,
        receiver: mpsc::Receiver<Event>,
        replica: Replica<L, S, M>,
        transport: Arc<dyn Transport>,
        myself: WeakActorClient,
    ) -> Self {
        ReplicaActor {
            logger,
            receiver,
            replica,
            transport,
            myself,
        }
    }

    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.handle_event(event);
            self.start_log_flush();
            self.flush_outbox();

            if self.replica.is_halted() {
                slog::crit!(self.logger, "Replica halted. Exiting event loop.");
                break;
            }
        }

        slog::info!(self.logger, "Replica event loop exited");
    }

    // This must NOT be async. Any long running work must be spawned on another task and/or come
    // as a message to this actor.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::WriteToLog(data, callback) => {
                let result = self.replica.handle_write(data);
                callback.send(result);
            }
            Event::Inbound { from, message } => self.replica.handle_message(from, message),
            Event::Tick(now) => self.replica.handle_tick(now),
            Event::FlushCompleted(completion, result) => self.replica.handle_flush_completed(completion, result),
        }
    }

    fn start_log_flush(&mut self) {
        let LogFlush { completion, future } = match self.replica.take_flush() {
            Some(flush) => flush,
            None => return,
        };

        let myself = self.myself.clone();
        let logger = self.logger.clone();
        tokio::spawn(async move {
            let result = future.await;
            let delivered = match myself.upgrade() {
                Some(actor_client) => actor_client.flush_completed(completion, result).await.is_ok(),
                None => false,
            };
            if !delivered {
                slog::debug!(logger, "Actor exited before flush up to {:?} completed", completion.up_to());
            }
        });
    }

    fn flush_outbox(&mut self) {
        for OutboundMessage { to, message } in self.replica.take_outbox() {
            let transport = self.transport.clone();
            let from = self.replica.my_replica_id().clone();
            let logger = self.logger.clone();
            tokio::spawn(async move {
                slog::debug!(logger, "ClientWire - {:?} to {:?}", message, to);
                if let Err(e) = transport.send(&from, &to, message).await {
                    slog::debug!(logger, "Failed to send to {:?}: {}", to, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::time::mocked_clock;
    use crate::applier::ApplyError;
    use crate::commitlog::{InMemoryLog, LogEntry, Position};
    use crate::replica::{ClusterTracker, ReplicaConfig, Role, VolatileLocalState};
    use crate::transport::InMemoryNetwork;
    use tokio::time::Duration;

    #[derive(Default)]
    struct CountingStateMachine {
        last_applied: Option<Position>,
    }

    impl StateMachine for CountingStateMachine {
        fn apply(&mut self, position: Position, _: &LogEntry) -> Result<(), ApplyError> {
            self.last_applied.replace(position);
            Ok(())
        }

        fn last_applied_position(&self) -> Option<Position> {
            self.last_applied
        }
    }

    #[tokio::test]
    async fn single_member_actor_becomes_leader_on_ticks() {
        let logger = slog::Logger::root(slog::Discard, slog::o!());
        let my_id = ReplicaId::new("solo");
        let (clock, controller) = mocked_clock();
        let (replica, mut status) = Replica::new(ReplicaConfig {
            logger: logger.clone(),
            cluster_tracker: ClusterTracker::create_valid_cluster(my_id.clone(), vec![my_id.clone()]).unwrap(),
            log: InMemoryLog::new(),
            local_state: VolatileLocalState::new(my_id.clone()),
            state_machine: CountingStateMachine::default(),
            leader_heartbeat_duration: Duration::from_millis(10),
            follower_min_timeout: Duration::from_millis(50),
            follower_max_timeout: Duration::from_millis(60),
            append_timeout: Duration::from_millis(30),
            max_append_batch: 8,
            jitter_seed: Some(1),
            now: clock.now(),
        });

        let (actor_client, actor_queue_rx) = ActorClient::new(10);
        let actor = ReplicaActor::new(
            logger,
            actor_queue_rx,
            replica,
            Arc::new(InMemoryNetwork::new()),
            actor_client.weak(),
        );
        tokio::spawn(actor.run_event_loop());
        tokio::spawn(Ticker::new(clock, Duration::from_millis(10), actor_client.weak()).run());

        assert!(matches!(
            actor_client.write_to_log(Bytes::from_static(b"x")).await,
            Err(WriteToLogError::NoLeader)
        ));

        for _ in 0..6 {
            controller.advance(Duration::from_millis(10));
            tokio::task::yield_now().await;
        }
        while status.current().role != Role::Leader {
            status.next().await.unwrap();
        }

        let output = actor_client.write_to_log(Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(output.position, Position::new(2));

        // Commit only follows the flush, which comes back through the actor's queue.
        while status.current().commit_position < Some(output.position) {
            status.next().await.unwrap();
        }
        assert_eq!(status.current().last_applied_position, Some(output.position));
    }
}
