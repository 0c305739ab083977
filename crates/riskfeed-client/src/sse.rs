//! HTTP server-sent-events transport.
//!
//! `GET <endpoint>` with `Accept: text/event-stream`, body parsed by
//! `eventsource-stream`. Relative endpoints are resolved against the
//! configured base URL. Waiting for the response headers is bounded by the
//! open timeout; once the stream is up only the idle timeout applies.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{Event, Eventsource};
use futures::StreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CACHE_CONTROL,
};
use reqwest::Url;
use riskfeed_core::{
    Endpoint, Frame, RiskfeedSettings, TransportError, DEFAULT_OPEN_TIMEOUT_MS, DEFAULT_TOPIC,
};
use tracing::{debug, instrument};

use crate::transport::{with_idle_timeout, FrameStream, Transport};

/// [`Transport`] over a `reqwest` client.
#[derive(Clone, Debug)]
pub struct SseTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
    headers: HeaderMap,
    open_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl Default for SseTransport {
    fn default() -> Self {
        Self {
            client: reqwest::Client::default(),
            base_url: None,
            headers: HeaderMap::new(),
            open_timeout: Duration::from_millis(DEFAULT_OPEN_TIMEOUT_MS),
            idle_timeout: None,
        }
    }
}

impl SseTransport {
    /// Transport with reqwest's defaults, no base URL and no extra headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the full settings tree (`baseUrl` and `transport`).
    pub fn from_settings(settings: &RiskfeedSettings) -> Result<Self, TransportError> {
        let transport = &settings.transport;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(transport.connect_timeout_ms))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let mut sse = Self {
            client,
            base_url: None,
            headers: HeaderMap::new(),
            open_timeout: Duration::from_millis(transport.open_timeout_ms),
            idle_timeout: transport.idle_timeout_ms.map(Duration::from_millis),
        };
        if let Some(base_url) = &settings.base_url {
            sse = sse.with_base_url(base_url)?;
        }
        for (name, value) in &transport.headers {
            sse = sse.with_header(name, value)?;
        }
        if let Some(token) = &transport.bearer_token {
            sse = sse.with_header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
        }
        Ok(sse)
    }

    /// Resolve relative endpoints against `base_url`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(base_url).map_err(|e| TransportError::InvalidEndpoint {
            endpoint: base_url.to_string(),
            reason: e.to_string(),
        })?;
        self.base_url = Some(url);
        Ok(self)
    }

    /// Send `name: value` on every open.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, TransportError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| TransportError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| TransportError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let _ = self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Fail the open when the response headers take longer than `limit`.
    #[must_use]
    pub fn with_open_timeout(mut self, limit: Duration) -> Self {
        self.open_timeout = limit;
        self
    }

    /// Fail the stream when no frame arrives within `limit`.
    #[must_use]
    pub fn with_idle_timeout(mut self, limit: Duration) -> Self {
        self.idle_timeout = Some(limit);
        self
    }

    /// The absolute URL an open of `endpoint` would request.
    pub fn resolve(&self, endpoint: &Endpoint) -> Result<Url, TransportError> {
        let invalid = |reason: String| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };
        if endpoint.is_absolute() {
            return Url::parse(endpoint.as_str()).map_err(|e| invalid(e.to_string()));
        }
        match &self.base_url {
            Some(base) => base
                .join(endpoint.as_str())
                .map_err(|e| invalid(e.to_string())),
            None => Err(invalid("relative endpoint without a base URL".to_string())),
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    async fn open(&self, endpoint: &Endpoint) -> Result<FrameStream, TransportError> {
        let url = self.resolve(endpoint)?;
        debug!(url = %url, "opening event stream");

        let request = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();
        let resp = tokio::time::timeout(self.open_timeout, request)
            .await
            .map_err(|_| TransportError::OpenTimeout(self.open_timeout))?
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let frames = resp.bytes_stream().eventsource().map(|item| {
            item.map(frame_from_event)
                .map_err(|e| TransportError::Stream(e.to_string()))
        });
        Ok(with_idle_timeout(frames, self.idle_timeout))
    }
}

/// The parser reports unnamed events as `message`; both map to `event: None`.
fn frame_from_event(event: Event) -> Frame {
    let name = (!event.event.is_empty() && event.event != DEFAULT_TOPIC).then_some(event.event);
    let id = (!event.id.is_empty()).then_some(event.id);
    Frame {
        event: name,
        data: event.data,
        id,
    }
}
