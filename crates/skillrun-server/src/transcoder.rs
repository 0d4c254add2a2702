//! Execution events to server-sent events.

use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::DropGuard;
use tracing::warn;

use skillrun_core::ExecutionEvent;

/// Type alias for boxed SSE stream.
pub type SseEventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// One SSE frame: `event: <type>` with the event as JSON data.
pub fn frame(event: &ExecutionEvent) -> Event {
    match Event::default().event(event.type_name()).json_data(event) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(seq = event.seq, error = %e, "Failed to encode event");
            Event::default()
                .event("error")
                .data(format!("{{\"seq\":{},\"message\":\"unencodable event\"}}", event.seq))
        }
    }
}

/// Stream a run's events to the client.
///
/// The stream ends when the run closes its channel, which happens right
/// after `done`. If the client goes away first, dropping the stream drops
/// `guard`, which cancels the run.
pub fn stream(
    events: mpsc::Receiver<ExecutionEvent>,
    guard: DropGuard,
    keep_alive: Duration,
) -> Sse<SseEventStream> {
    let mut guard = Some(guard);
    let frames = ReceiverStream::new(events).map(move |event| {
        if event.is_done() {
            if let Some(guard) = guard.take() {
                guard.disarm();
            }
        }
        Ok::<_, Infallible>(frame(&event))
    });

    let frames: SseEventStream = Box::pin(frames);
    Sse::new(frames).keep_alive(KeepAlive::new().interval(keep_alive))
}
