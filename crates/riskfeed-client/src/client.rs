//! Public handle over the supervisor and the dispatcher.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use riskfeed_core::{
    BackoffPolicy, ConnectionState, Endpoint, FixedBackoff, RiskfeedSettings, TransportError,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error};

use crate::dispatcher::{HandlerRef, TopicDispatcher};
use crate::sse::SseTransport;
use crate::supervisor::{Command, Supervisor, SupervisorStatus};
use crate::transport::Transport;

/// A reconnecting subscription client for one endpoint.
///
/// `connect`, `disconnect`, `subscribe` and `unsubscribe` never block and
/// never fail: connection problems surface only through [`Client::state`]
/// and the logs. The connection state is updated by a background task, so
/// a state read immediately after `connect()` may still show the previous
/// state; [`Client::status`] waits for every earlier command to be applied.
///
/// Dropping the client disconnects and stops the background task.
/// Constructors must be called within a Tokio runtime.
pub struct Client {
    endpoint: Endpoint,
    dispatcher: Arc<TopicDispatcher>,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    attempts: Arc<AtomicU32>,
}

impl Client {
    /// Client over HTTP SSE with the default 5 s / 5 attempt backoff.
    ///
    /// There is no base URL here, so `endpoint` must be absolute. A relative
    /// endpoint such as `/events/jobs` needs [`Client::from_settings`] with
    /// `baseUrl` set; passed here, every attempt fails and the client ends
    /// in `Failed`.
    pub fn new(endpoint: impl Into<Endpoint>) -> Self {
        let endpoint = endpoint.into();
        let transport = SseTransport::new();
        if let Err(err) = transport.resolve(&endpoint) {
            error!(
                endpoint = %endpoint,
                error = %err,
                "endpoint cannot be opened, every connect will fail"
            );
        }
        Self::with_transport(
            endpoint,
            Arc::new(transport),
            Arc::new(FixedBackoff::default()),
        )
    }

    /// Client over HTTP SSE configured from settings (base URL, headers,
    /// timeouts, backoff).
    pub fn from_settings(
        endpoint: impl Into<Endpoint>,
        settings: &RiskfeedSettings,
    ) -> Result<Self, TransportError> {
        let transport = SseTransport::from_settings(settings)?;
        let policy = FixedBackoff::from_settings(&settings.reconnect);
        Ok(Self::with_transport(
            endpoint,
            Arc::new(transport),
            Arc::new(policy),
        ))
    }

    /// Client over an arbitrary transport and backoff policy.
    pub fn with_transport(
        endpoint: impl Into<Endpoint>,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn BackoffPolicy>,
    ) -> Self {
        let endpoint = endpoint.into();
        let dispatcher = Arc::new(TopicDispatcher::new());
        let handle = Supervisor::spawn(
            endpoint.clone(),
            transport,
            policy,
            Arc::clone(&dispatcher),
        );
        Self {
            endpoint,
            dispatcher,
            commands: handle.commands,
            state: handle.state,
            attempts: handle.attempts,
        }
    }

    /// Open the connection. No-op while connecting, connected or waiting to
    /// reconnect; from `Disconnected` or `Failed` it resets the reconnect
    /// counter and starts a fresh attempt.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Cancel any pending reconnect, close the connection and go to
    /// `Disconnected`. Safe in every state.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Register `handler` for `topic`. Works in every connection state and
    /// survives reconnects.
    pub fn subscribe(&self, topic: impl Into<String>, handler: HandlerRef) {
        self.dispatcher.subscribe(topic, handler);
    }

    /// Remove the first registration of `handler` under `topic`, if any.
    pub fn unsubscribe(&self, topic: &str, handler: &HandlerRef) {
        let _ = self.dispatcher.unsubscribe(topic, handler);
    }

    /// The subscription table shared with the supervisor.
    pub fn dispatcher(&self) -> &Arc<TopicDispatcher> {
        &self.dispatcher
    }

    /// The endpoint every connection attempt targets.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Latest published connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every published state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Consecutive failed attempts since the last success or `connect()`.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Snapshot taken after every command sent so far has been applied.
    pub async fn status(&self) -> SupervisorStatus {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Status(reply)).is_ok() {
            if let Ok(status) = rx.await {
                return status;
            }
        }
        SupervisorStatus {
            state: self.state(),
            reconnect_attempts: self.reconnect_attempts(),
            reconnect_pending: false,
            transport_live: false,
        }
    }

    /// Wait until the state satisfies `predicate` and return it.
    pub async fn wait_for(&self, predicate: impl Fn(ConnectionState) -> bool) -> ConnectionState {
        let mut rx = self.state.clone();
        let reached = rx.wait_for(|state| predicate(*state)).await.map(|state| *state);
        reached.unwrap_or_else(|_| *rx.borrow())
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!(endpoint = %self.endpoint, "supervisor already stopped");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}
