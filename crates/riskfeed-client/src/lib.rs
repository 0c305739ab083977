//! # riskfeed-client
//!
//! Reconnecting server-push subscription client.
//!
//! - [`Client`]: the public handle; `connect`/`disconnect`/`subscribe`/`unsubscribe`
//! - [`TopicDispatcher`]: topic → ordered handler list, failure-isolated fan-out
//! - [`Transport`] / [`SseTransport`]: how a connection is opened and read
//! - [`mock::MockTransport`]: scripted transport for tests
//!
//! ```no_run
//! # async fn demo() {
//! use riskfeed_client::{handler, Client};
//!
//! let client = Client::new("https://risk.example.com/events/jobs");
//! client.subscribe("job.status_changed", handler(|payload| {
//!     println!("{payload}");
//!     Ok(())
//! }));
//! client.connect();
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod dispatcher;
pub mod sse;
pub mod supervisor;
pub mod transport;

pub mod mock;

pub use client::Client;
pub use dispatcher::{handler, DispatchReport, Handler, HandlerRef, TopicDispatcher};
pub use riskfeed_core::{ConnectionState, Endpoint, Frame, TransportError};
pub use sse::SseTransport;
pub use supervisor::SupervisorStatus;
pub use transport::{FrameStream, Transport};
