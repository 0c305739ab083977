//! Scripted transport for deterministic tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use riskfeed_core::{Endpoint, Frame, TransportError};

use crate::transport::{FrameStream, Transport};

/// Scripted outcome of one `open()` call.
#[derive(Clone, Debug)]
pub enum MockConnection {
    /// `open()` fails with this error.
    Fail(TransportError),
    /// Open succeeds, yields the frames, then the server closes the stream.
    Frames(Vec<Frame>),
    /// Open succeeds, yields the frames, then the stream breaks with the error.
    FramesThenError(Vec<Frame>, TransportError),
    /// Open succeeds, yields the frames, then stays open forever.
    FramesThenHold(Vec<Frame>),
    /// Open succeeds and the stream stays silent forever.
    Hold,
}

/// Transport that plays back a script, one entry per `open()` call.
///
/// Once the script is exhausted every further open fails with a
/// connection-refused error.
pub struct MockTransport {
    script: Mutex<VecDeque<MockConnection>>,
    opens: AtomicUsize,
}

impl MockTransport {
    /// Play `script` back, one entry per open.
    pub fn new(script: impl IntoIterator<Item = MockConnection>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            opens: AtomicUsize::new(0),
        }
    }

    /// A transport whose every open is refused.
    pub fn failing() -> Self {
        Self::new([])
    }

    /// Number of `open()` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _endpoint: &Endpoint) -> Result<FrameStream, TransportError> {
        let _ = self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        let frames = |frames: Vec<Frame>| {
            stream::iter(frames.into_iter().map(Ok::<Frame, TransportError>))
        };
        match next {
            None => Err(TransportError::Request("connection refused".to_string())),
            Some(MockConnection::Fail(error)) => Err(error),
            Some(MockConnection::Frames(list)) => Ok(Box::pin(frames(list))),
            Some(MockConnection::FramesThenError(list, error)) => {
                Ok(Box::pin(frames(list).chain(stream::iter([Err(error)]))))
            }
            Some(MockConnection::FramesThenHold(list)) => {
                Ok(Box::pin(frames(list).chain(stream::pending())))
            }
            Some(MockConnection::Hold) => {
                Ok(Box::pin(stream::pending::<Result<Frame, TransportError>>()))
            }
        }
    }
}
