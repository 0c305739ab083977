//! Transport-neutral server-push frames.
//!
//! A [`Frame`] is what a transport hands the supervisor: an optional event
//! name and a text body. [`Frame::topic`] applies the reserved-topic rule and
//! [`Frame::decode`] performs the only payload processing the client does,
//! a generic JSON decode.

use serde_json::Value;

use crate::constants::DEFAULT_TOPIC;
use crate::errors::DecodeError;

/// One server-push message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
    /// Explicit event name, if the server sent one.
    pub event: Option<String>,
    /// Raw body text (multi-line `data:` fields already joined by the parser).
    pub data: String,
    /// Last-event id, if present. Informational only; nothing is replayed.
    pub id: Option<String>,
}

impl Frame {
    /// An unnamed frame, routed to [`DEFAULT_TOPIC`].
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
        }
    }

    /// A frame carrying an explicit event name.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: data.into(),
            id: None,
        }
    }

    /// Topic this frame is dispatched to.
    ///
    /// Frames without an event name (or with an empty one) go to the
    /// reserved default topic; named frames go to their own topic only.
    pub fn topic(&self) -> &str {
        match self.event.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => DEFAULT_TOPIC,
        }
    }

    /// Decode the body into `(topic, payload)`.
    pub fn decode(&self) -> Result<(&str, Value), DecodeError> {
        let topic = self.topic();
        serde_json::from_str(&self.data)
            .map(|payload| (topic, payload))
            .map_err(|source| DecodeError {
                topic: topic.to_string(),
                source,
            })
    }
}
