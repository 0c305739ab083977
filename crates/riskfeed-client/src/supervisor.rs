//! Connection supervisor actor.
//!
//! One Tokio task owns the connection state, the reconnect counter, the live
//! connection task and the pending reconnect timer. It reads two queues:
//!
//! - commands, unbounded: `Connect`, `Disconnect`, `Status` and `Shutdown`
//!   from the [`Client`](crate::Client), plus `TimerFired` from the
//!   reconnect timer
//! - connection events, bounded: `Opened`, `Frame` and `Lost` from the
//!   connection task
//!
//! Commands always win when both queues are ready, so `disconnect()` takes
//! effect before any frame still queued from the old connection. The
//! connection queue is bounded so a server that outpaces the handlers stalls
//! its own reader instead of growing memory.
//!
//! Every connection attempt gets a fresh generation number. Events tagged
//! with an older generation come from a transport or timer that was
//! superseded (by `disconnect()` or a newer attempt) and are ignored, so a
//! cancelled timer can never reopen the connection.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use riskfeed_core::{BackoffPolicy, ConnectionState, Endpoint, Frame, TransportError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::dispatcher::TopicDispatcher;
use crate::transport::Transport;

/// Frames the connection task may read ahead of dispatch.
pub(crate) const CONNECTION_QUEUE_CAPACITY: usize = 64;

/// Point-in-time view of the supervisor, answered in queue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupervisorStatus {
    /// Current connection state.
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last success or `connect()`.
    pub reconnect_attempts: u32,
    /// Whether a reconnect timer is scheduled.
    pub reconnect_pending: bool,
    /// Whether a connection task (opening or open) exists.
    pub transport_live: bool,
}

#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    Status(oneshot::Sender<SupervisorStatus>),
    Shutdown,
    TimerFired { generation: u64 },
}

/// Reported by a connection task, tagged with its generation.
#[derive(Debug)]
pub(crate) enum ConnectionEvent {
    Opened,
    Frame(Frame),
    Lost(TransportError),
}

type Tagged = (u64, ConnectionEvent);

/// The caller's side of a running supervisor.
pub(crate) struct SupervisorHandle {
    pub(crate) commands: mpsc::UnboundedSender<Command>,
    pub(crate) state: watch::Receiver<ConnectionState>,
    pub(crate) attempts: Arc<AtomicU32>,
}

/// Receiving ends consumed by [`Supervisor::run`].
pub(crate) struct Inbox {
    commands: mpsc::UnboundedReceiver<Command>,
    connection: mpsc::Receiver<Tagged>,
}

pub(crate) struct Supervisor {
    endpoint: Endpoint,
    transport: Arc<dyn Transport>,
    policy: Arc<dyn BackoffPolicy>,
    dispatcher: Arc<TopicDispatcher>,
    commands: mpsc::UnboundedSender<Command>,
    connection_tx: mpsc::Sender<Tagged>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    attempts: Arc<AtomicU32>,
    generation: u64,
    connection: Option<JoinHandle<()>>,
    pending_timer: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Spawn the actor on the current Tokio runtime.
    pub(crate) fn spawn(
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn BackoffPolicy>,
        dispatcher: Arc<TopicDispatcher>,
    ) -> SupervisorHandle {
        let (supervisor, inbox, handle) = Self::new(endpoint, transport, policy, dispatcher);
        drop(tokio::spawn(supervisor.run(inbox)));
        handle
    }

    fn new(
        endpoint: Endpoint,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn BackoffPolicy>,
        dispatcher: Arc<TopicDispatcher>,
    ) -> (Self, Inbox, SupervisorHandle) {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (connection_tx, connection_rx) = mpsc::channel(CONNECTION_QUEUE_CAPACITY);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let attempts = Arc::new(AtomicU32::new(0));

        let supervisor = Self {
            endpoint,
            transport,
            policy,
            dispatcher,
            commands: commands.clone(),
            connection_tx,
            state: ConnectionState::Disconnected,
            state_tx,
            attempts: Arc::clone(&attempts),
            generation: 0,
            connection: None,
            pending_timer: None,
        };
        let inbox = Inbox {
            commands: commands_rx,
            connection: connection_rx,
        };
        let handle = SupervisorHandle {
            commands,
            state,
            attempts,
        };
        (supervisor, inbox, handle)
    }

    async fn run(mut self, mut inbox: Inbox) {
        debug!(endpoint = %self.endpoint, "supervisor started");
        loop {
            tokio::select! {
                biased;
                Some(command) = inbox.commands.recv() => {
                    if !self.on_command(command) {
                        break;
                    }
                }
                Some((generation, event)) = inbox.connection.recv() => match event {
                    ConnectionEvent::Opened => self.on_opened(generation),
                    ConnectionEvent::Frame(frame) => self.on_frame(generation, &frame),
                    ConnectionEvent::Lost(error) => self.on_lost(generation, &error),
                },
                else => break,
            }
        }
        debug!(endpoint = %self.endpoint, "supervisor stopped");
    }

    /// Apply one command. Returns `false` once the actor should stop.
    fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Shutdown => {
                self.disconnect();
                return false;
            }
            Command::TimerFired { generation } => self.on_timer(generation),
        }
        true
    }

    fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            state: self.state,
            reconnect_attempts: self.attempts.load(Ordering::SeqCst),
            reconnect_pending: self.pending_timer.is_some(),
            transport_live: self.connection.is_some(),
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        info!(endpoint = %self.endpoint, from = %self.state, to = %next, "connection state changed");
        self.state = next;
        let _ = self.state_tx.send_replace(next);
    }

    fn connect(&mut self) {
        if self.state.is_active() {
            debug!(state = %self.state, "connect ignored, already active");
            return;
        }
        self.attempts.store(0, Ordering::SeqCst);
        self.open();
    }

    fn disconnect(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.pending_timer.take() {
            timer.abort();
        }
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Start a new connection attempt under a fresh generation.
    fn open(&mut self) {
        self.generation += 1;
        if let Some(stale) = self.connection.take() {
            stale.abort();
        }
        self.set_state(ConnectionState::Connecting);
        metrics::counter!("riskfeed_transport_opens_total").increment(1);

        let task = run_connection(
            Arc::clone(&self.transport),
            self.endpoint.clone(),
            self.generation,
            self.connection_tx.clone(),
        );
        self.connection = Some(tokio::spawn(task));
    }

    fn on_opened(&mut self, generation: u64) {
        if generation != self.generation {
            trace!(generation, "stale open ignored");
            return;
        }
        self.attempts.store(0, Ordering::SeqCst);
        self.set_state(ConnectionState::Connected);
    }

    fn on_frame(&self, generation: u64, frame: &Frame) {
        if generation != self.generation {
            trace!(generation, "stale frame ignored");
            return;
        }
        match frame.decode() {
            Ok((topic, payload)) => {
                let report = self.dispatcher.dispatch(topic, &payload);
                trace!(
                    topic = %topic,
                    invoked = report.invoked,
                    failed = report.failed,
                    "frame dispatched"
                );
            }
            Err(err) => {
                metrics::counter!("riskfeed_frames_dropped_total").increment(1);
                warn!(topic = %err.topic, error = %err.source, "dropping undecodable frame");
            }
        }
    }

    fn on_lost(&mut self, generation: u64, err: &TransportError) {
        if generation != self.generation {
            trace!(generation, "stale connection loss ignored");
            return;
        }
        self.connection = None;

        let attempt = self.attempts.load(Ordering::SeqCst).saturating_add(1);
        self.attempts.store(attempt, Ordering::SeqCst);

        if self.policy.should_retry(attempt) {
            let delay = self.policy.delay_for(attempt);
            warn!(
                endpoint = %self.endpoint,
                error = %err,
                kind = err.error_kind(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "connection lost, scheduling reconnect"
            );
            self.set_state(ConnectionState::Reconnecting);

            let commands = self.commands.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = commands.send(Command::TimerFired { generation });
            });
            if let Some(previous) = self.pending_timer.replace(timer) {
                previous.abort();
            }
        } else {
            error!(
                endpoint = %self.endpoint,
                error = %err,
                kind = err.error_kind(),
                attempt,
                "connection lost, retries exhausted"
            );
            self.set_state(ConnectionState::Failed);
        }
    }

    fn on_timer(&mut self, generation: u64) {
        if generation != self.generation || self.state != ConnectionState::Reconnecting {
            trace!(generation, "stale reconnect timer ignored");
            return;
        }
        self.pending_timer = None;
        metrics::counter!("riskfeed_reconnects_total").increment(1);
        info!(
            endpoint = %self.endpoint,
            attempt = self.attempts.load(Ordering::SeqCst),
            "reconnecting"
        );
        self.open();
    }
}

/// Drive one connection: open, then forward frames until the stream ends.
///
/// Waits for room in the bounded queue before reading the next frame.
async fn run_connection(
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    generation: u64,
    events: mpsc::Sender<Tagged>,
) {
    let opened = transport.open(&endpoint).await;
    drop(transport);
    let mut frames = match opened {
        Ok(frames) => frames,
        Err(error) => {
            let _ = events.send((generation, ConnectionEvent::Lost(error))).await;
            return;
        }
    };
    if events.send((generation, ConnectionEvent::Opened)).await.is_err() {
        return;
    }

    let error = loop {
        match frames.next().await {
            Some(Ok(frame)) => {
                if events
                    .send((generation, ConnectionEvent::Frame(frame)))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Some(Err(error)) => break error,
            None => break TransportError::Closed,
        }
    };
    let _ = events.send((generation, ConnectionEvent::Lost(error))).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use riskfeed_core::FixedBackoff;
    use serde_json::Value;

    use super::*;
    use crate::dispatcher::handler;
    use crate::mock::{MockConnection, MockTransport};

    fn parts(transport: MockTransport) -> (Supervisor, Inbox, SupervisorHandle) {
        Supervisor::new(
            Endpoint::from("/events/jobs"),
            Arc::new(transport),
            Arc::new(FixedBackoff::new(Duration::from_secs(5), 5)),
            Arc::new(TopicDispatcher::new()),
        )
    }

    fn spawn_with(transport: MockTransport) -> SupervisorHandle {
        let (supervisor, inbox, handle) = parts(transport);
        drop(tokio::spawn(supervisor.run(inbox)));
        handle
    }

    async fn status(handle: &SupervisorHandle) -> SupervisorStatus {
        let (reply, rx) = oneshot::channel();
        handle.commands.send(Command::Status(reply)).unwrap();
        rx.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn starts_disconnected_with_nothing_live() {
        let handle = spawn_with(MockTransport::failing());
        let status = status(&handle).await;
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert_eq!(status.reconnect_attempts, 0);
        assert!(!status.reconnect_pending);
        assert!(!status.transport_live);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_loss_and_timer_are_ignored() {
        let (mut supervisor, _inbox, _handle) = parts(MockTransport::new([MockConnection::Hold]));
        supervisor.connect();
        let current = supervisor.generation;
        supervisor.on_opened(current);

        supervisor.on_lost(current - 1, &TransportError::Closed);
        supervisor.on_timer(current - 1);

        let status = supervisor.status();
        assert_eq!(status.state, ConnectionState::Connected);
        assert_eq!(status.reconnect_attempts, 0);
        assert!(!status.reconnect_pending);
        assert!(status.transport_live);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_frame_is_not_dispatched() {
        let (mut supervisor, _inbox, _handle) = parts(MockTransport::new([MockConnection::Hold]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        supervisor.dispatcher.subscribe(
            "message",
            handler(move |payload: &Value| {
                sink.lock().push(payload.clone());
                Ok(())
            }),
        );

        supervisor.connect();
        let old = supervisor.generation;
        supervisor.disconnect();
        supervisor.on_frame(old, &Frame::message("1"));
        supervisor.on_frame(supervisor.generation, &Frame::message("2"));

        assert_eq!(*seen.lock(), vec![serde_json::json!(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_holds_exactly_one_timer() {
        let mut handle = spawn_with(MockTransport::failing());
        handle.commands.send(Command::Connect).unwrap();
        let _ = handle
            .state
            .wait_for(|s| *s == ConnectionState::Reconnecting)
            .await
            .unwrap();

        let status = status(&handle).await;
        assert_eq!(status.reconnect_attempts, 1);
        assert!(status.reconnect_pending);
        assert!(!status.transport_live);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_jumps_ahead_of_queued_frames() {
        let (mut supervisor, inbox, handle) = parts(MockTransport::new([MockConnection::Hold]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        supervisor.dispatcher.subscribe(
            "message",
            handler(move |payload: &Value| {
                sink.lock().push(payload.clone());
                Ok(())
            }),
        );

        supervisor.connect();
        let generation = supervisor.generation;
        for n in 0..3 {
            supervisor
                .connection_tx
                .try_send((generation, ConnectionEvent::Frame(Frame::message(n.to_string()))))
                .unwrap();
        }
        handle.commands.send(Command::Disconnect).unwrap();
        drop(tokio::spawn(supervisor.run(inbox)));

        let status = status(&handle).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!status.transport_live);
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn connection_queue_is_bounded() {
        let (supervisor, _inbox, _handle) = parts(MockTransport::failing());
        assert_eq!(supervisor.connection_tx.max_capacity(), CONNECTION_QUEUE_CAPACITY);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_the_actor() {
        let handle = spawn_with(MockTransport::new([MockConnection::Hold]));
        handle.commands.send(Command::Connect).unwrap();
        handle.commands.send(Command::Shutdown).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(handle.commands.is_closed());
        assert_eq!(*handle.state.borrow(), ConnectionState::Disconnected);
    }
}
