//! Server-Sent Events support

use crate::controller::{SseEvent, Snapshot};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Convert broadcast stream to SSE stream, starting with the snapshot
pub fn sse_stream(
    snapshot: Snapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<SseEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(event_stream(snapshot, broadcast_rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

/// The `init` event followed by broadcast events.
///
/// Ends when the receiver lags so the client reconnects and gets a fresh
/// snapshot instead of silently missing events.
fn event_stream(
    snapshot: Snapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<SseEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let init = futures::stream::once(async move { Ok(init_event(&snapshot)) });

    let broadcasts = BroadcastStream::new(broadcast_rx).map_while(|result| match result {
        Ok(event) => Some(Ok(sse_event_to_axum(event))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE client lagged, closing stream");
            None
        }
    });

    init.chain(broadcasts)
}

fn init_event(snapshot: &Snapshot) -> Event {
    let data = json!({
        "type": "init",
        "messages": snapshot.messages,
        "pending": snapshot.pending
    });
    Event::default().event("init").data(data.to_string())
}

fn sse_event_to_axum(event: SseEvent) -> Event {
    let (event_type, data) = sse_event_payload(event);
    Event::default().event(event_type).data(data.to_string())
}

fn sse_event_payload(event: SseEvent) -> (&'static str, serde_json::Value) {
    match event {
        SseEvent::Message { message } => (
            "message",
            json!({
                "type": "message",
                "message": message
            }),
        ),
        SseEvent::Pending { pending } => (
            "pending",
            json!({
                "type": "pending",
                "pending": pending
            }),
        ),
        SseEvent::DraftCleared => (
            "draft_cleared",
            json!({
                "type": "draft_cleared"
            }),
        ),
        SseEvent::Cleared => (
            "cleared",
            json!({
                "type": "cleared"
            }),
        ),
    }
}
