//! Server-sent event decoding for `execute`.

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

/// Decode a response body into frames. Keep-alive comments yield nothing.
pub fn frames<S, B, E>(bytes: S) -> impl Stream<Item = Result<Frame, String>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    bytes.eventsource().map(|item| {
        item.map(|event| Frame {
            event: event.event,
            data: event.data,
        })
        .map_err(|e| e.to_string())
    })
}
