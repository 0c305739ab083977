//! The seam between the supervisor and the wire.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use riskfeed_core::{Endpoint, Frame, TransportError};

/// Frames from one open connection.
///
/// The stream ending (`None`) means the server closed the connection; an
/// `Err` item means it broke. Either way the supervisor stops polling it and
/// goes down the reconnect path.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Opens server-push connections.
///
/// One call to [`Transport::open`] is one connection attempt. Dropping the
/// returned stream closes the connection.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `endpoint`. Resolves once the server has
    /// accepted the stream (the "opened" lifecycle event).
    async fn open(&self, endpoint: &Endpoint) -> Result<FrameStream, TransportError>;
}

/// Wrap `frames` so that a silence longer than `limit` yields
/// [`TransportError::IdleTimeout`]. `None` leaves the stream untouched.
pub fn with_idle_timeout<S>(frames: S, limit: Option<Duration>) -> FrameStream
where
    S: Stream<Item = Result<Frame, TransportError>> + Send + 'static,
{
    match limit {
        Some(limit) => Box::pin(
            tokio_stream::StreamExt::timeout(frames, limit)
                .map(move |item| item.unwrap_or(Err(TransportError::IdleTimeout(limit)))),
        ),
        None => Box::pin(frames),
    }
}
