//! Stream-HTTP transport: a server-push connection plus POSTed requests.
//!
//! Requests are POSTed to the configured URL, or to the URL announced by an
//! `endpoint` event on the push stream. Responses are taken from the POST
//! body when it carries the matching id, otherwise from the push stream.

use std::collections::BTreeMap;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::http::{sse_frames, HttpPoster, SseFrame};
use super::rpc::{reply_to_server_request, JsonRpcMessage, PendingRequests, RpcChannel};
use crate::error::TransportError;

/// How long `connect` waits for an `endpoint` event before using the
/// configured URL.
const ENDPOINT_WAIT: Duration = Duration::from_millis(500);

pub(crate) struct StreamHttpChannel {
    provider: String,
    poster: Arc<HttpPoster>,
    state: Arc<PushState>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the push-stream reader.
struct PushState {
    base: Url,
    post_url: RwLock<String>,
    pending: Arc<PendingRequests>,
    stream_open: AtomicBool,
    endpoint_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl PushState {
    fn post_url(&self) -> String {
        self.post_url
            .read()
            .map(|u| u.clone())
            .unwrap_or_else(|_| self.base.to_string())
    }

    /// Apply one push frame. Returns a reply to POST back, if any.
    fn handle(&self, provider: &str, frame: SseFrame) -> Option<Value> {
        match frame.event.as_str() {
            "endpoint" => {
                match self.base.join(frame.data.trim()) {
                    Ok(url) => {
                        info!(provider, endpoint = %url, "Provider announced message endpoint");
                        if let Ok(mut slot) = self.post_url.write() {
                            *slot = url.to_string();
                        }
                        if let Some(tx) = self.endpoint_tx.lock().ok().and_then(|mut t| t.take()) {
                            let _ = tx.send(());
                        }
                    }
                    Err(e) => warn!(provider, error = %e, "Ignoring invalid endpoint event"),
                }
                None
            }
            "message" => {
                let message = match serde_json::from_str::<JsonRpcMessage>(&frame.data) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(provider, error = %e, "Unparseable push message");
                        return None;
                    }
                };
                if message.is_server_request() {
                    return Some(reply_to_server_request(&message));
                }
                if let Some(id) = message.response_id() {
                    self.pending.resolve(id, message.into_result());
                }
                None
            }
            other => {
                debug!(provider, event = other, "Ignoring push event");
                None
            }
        }
    }
}

impl StreamHttpChannel {
    pub(crate) async fn connect(
        provider: &str,
        client: reqwest::Client,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        let base = Url::parse(url).map_err(|e| TransportError::Http(format!("Invalid URL '{}': {}", url, e)))?;
        let poster = Arc::new(HttpPoster::new(client, headers)?);
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let state = Arc::new(PushState {
            base,
            post_url: RwLock::new(url.to_string()),
            pending: PendingRequests::new(),
            stream_open: AtomicBool::new(false),
            endpoint_tx: Mutex::new(Some(endpoint_tx)),
        });

        let response = poster
            .client()
            .get(url)
            .headers(poster.headers().clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let reader = if response.status().is_success() {
            state.stream_open.store(true, Ordering::SeqCst);
            let handle = tokio::spawn(read_push_stream(
                provider.to_string(),
                response,
                Arc::clone(&state),
                Arc::clone(&poster),
            ));
            if tokio::time::timeout(ENDPOINT_WAIT, endpoint_rx).await.is_err() {
                debug!(provider, "No endpoint event, posting to the configured URL");
            }
            Some(handle)
        } else {
            debug!(provider, status = %response.status(), "Push stream unavailable, using POST responses only");
            None
        };

        Ok(Self {
            provider: provider.to_string(),
            poster,
            state,
            reader: Mutex::new(reader),
        })
    }
}

async fn read_push_stream(
    provider: String,
    response: reqwest::Response,
    state: Arc<PushState>,
    poster: Arc<HttpPoster>,
) {
    let mut frames = pin!(sse_frames(response.bytes_stream()));

    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(provider = %provider, error = %e, "Push stream error");
                break;
            }
        };
        if let Some(reply) = state.handle(&provider, frame) {
            if let Err(e) = poster.post_message(&state.post_url(), &reply).await {
                warn!(provider = %provider, error = %e, "Failed to answer server request");
            }
        }
    }

    debug!(provider = %provider, "Push stream ended");
    state.stream_open.store(false, Ordering::SeqCst);
    state.pending.fail_waiting(None);
}

#[async_trait]
impl RpcChannel for StreamHttpChannel {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let slot = self.state.pending.register()?;
        let url = self.state.post_url();
        match self.poster.post_request(&url, slot.id, method, params).await? {
            Some(result) => result,
            None if self.state.stream_open.load(Ordering::SeqCst) => slot.wait().await,
            None => Err(TransportError::Protocol(format!(
                "Missing response for request id {}",
                slot.id
            ))),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), TransportError> {
        if self.state.pending.is_closed() {
            return Err(TransportError::closed());
        }
        self.poster
            .post_notification(&self.state.post_url(), method, params)
            .await
    }

    async fn close(&self) {
        let reader = self.reader.lock().ok().and_then(|mut r| r.take());
        self.state.pending.close(None);
        if let Some(handle) = reader {
            handle.abort();
            debug!(provider = %self.provider, "Push stream closed");
        }
    }
}

impl Drop for StreamHttpChannel {
    fn drop(&mut self) {
        // A session dropped without `close` (a start timeout) must not
        // leave the push reader holding its connection.
        if let Some(handle) = self.reader.get_mut().ok().and_then(|r| r.take()) {
            handle.abort();
        }
        self.state.pending.close(None);
    }
}
