//! HTTP plumbing shared by the two HTTP transports.

use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::RwLock;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;

use super::rpc::{find_response, JsonRpcRequest};
use crate::error::TransportError;

const SESSION_HEADER: &str = "mcp-session-id";

/// POSTs JSON-RPC envelopes and decodes what comes back.
pub(crate) struct HttpPoster {
    client: reqwest::Client,
    headers: HeaderMap,
    session_id: RwLock<Option<String>>,
}

impl HttpPoster {
    pub(crate) fn new(
        client: reqwest::Client,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client,
            headers: header_map(headers)?,
            session_id: RwLock::new(None),
        })
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// POST a request and return the matching response if the body has one.
    ///
    /// `Ok(None)` means the server accepted the request and will answer
    /// elsewhere (on the push stream).
    pub(crate) async fn post_request(
        &self,
        url: &str,
        id: i64,
        method: &str,
        params: Value,
    ) -> Result<Option<Result<Value, TransportError>>, TransportError> {
        let body = JsonRpcRequest::request(id, method, params);
        let response = self.post(url, &body).await?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if let Ok(mut slot) = self.session_id.write() {
                *slot = Some(session.to_string());
            }
        }

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("text/event-stream"))
            .unwrap_or(false);

        if is_event_stream {
            let mut frames = pin!(sse_frames(response.bytes_stream()));
            while let Some(frame) = frames.next().await {
                let frame = frame?;
                if frame.event != "message" {
                    continue;
                }
                if let Ok(value) = serde_json::from_str::<Value>(&frame.data) {
                    if let Some(found) = find_response(value, id)? {
                        return Ok(Some(found));
                    }
                }
            }
            return Ok(None);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| TransportError::Protocol(format!("Invalid JSON response: {}", e)))?;
        find_response(value, id)
    }

    pub(crate) async fn post_notification(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<(), TransportError> {
        let body = JsonRpcRequest::notification(method, params);
        self.post(url, &body).await?;
        Ok(())
    }

    /// POST an already-built message, ignoring the response body.
    pub(crate) async fn post_message(&self, url: &str, message: &Value) -> Result<(), TransportError> {
        self.post(url, message).await?;
        Ok(())
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<reqwest::Response, TransportError> {
        let mut request = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id.read().ok().and_then(|s| s.clone()) {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("{} - {}", status, body)));
        }
        Ok(response)
    }
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Http(format!("Invalid header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Http(format!("Invalid header value for '{}': {}", name.as_str(), e)))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// One server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Decode a byte stream as server-sent events.
///
/// Bytes are buffered until an event is complete, so a chunk boundary
/// inside a multi-byte character is harmless. Comments (keep-alives) yield
/// nothing; an event without a name is a `message`.
pub(crate) fn sse_frames<S, B, E>(bytes: S) -> impl Stream<Item = Result<SseFrame, TransportError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    bytes.eventsource().map(|item| match item {
        Ok(event) => Ok(SseFrame {
            event: if event.event.is_empty() {
                "message".to_string()
            } else {
                event.event
            },
            data: event.data,
        }),
        Err(e) => Err(TransportError::Http(format!("Event stream error: {}", e))),
    })
}
