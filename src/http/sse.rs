//! Server-Sent Events framing for streaming chat completions.

use crate::types::ChatCompletionChunk;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::time::Duration;

/// Builds the SSE body stream: one `data: {...}` event per chunk (each
/// delayed by its computed latency), followed by the literal
/// `data: [DONE]` terminator frame.
pub fn chat_stream(
    chunks: Vec<(ChatCompletionChunk, Duration)>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    crate::metrics::stream_opened();
    let body = stream::unfold(chunks.into_iter(), |mut remaining| async move {
        let (chunk, delay) = remaining.next()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let json = serde_json::to_string(&chunk).unwrap_or_default();
        Some((Ok(Event::default().data(json)), remaining))
    })
    .chain(stream::once(async { Ok(Event::default().data("[DONE]")) }));

    // Dropping the stream is the only signal axum gives a handler for
    // "client disconnected mid-stream"; this fires on that path as well
    // as on normal completion.
    let events = OnDrop::new(body, crate::metrics::stream_closed);
    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Wraps a stream so a callback runs once, whenever the stream is dropped
/// — whether it ran to completion or was abandoned mid-iteration because
/// the client disconnected.
struct OnDrop<S, F: FnMut()> {
    inner: S,
    on_drop: F,
}

impl<S, F: FnMut()> OnDrop<S, F> {
    fn new(inner: S, on_drop: F) -> Self {
        Self { inner, on_drop }
    }
}

impl<S: Stream + Unpin, F: FnMut() + Unpin> Stream for OnDrop<S, F> {
    type Item = S::Item;
    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S, F: FnMut()> Drop for OnDrop<S, F> {
    fn drop(&mut self) {
        (self.on_drop)();
    }
}
