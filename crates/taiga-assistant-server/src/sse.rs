use axum::{
    body::Body,
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use std::{
    convert::Infallible,
    pin::Pin,
    sync::atomic::{AtomicBool, Ordering},
    task::{Context, Poll},
};
use taiga_assistant::protocol::StreamEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Long-lived `text/event-stream` body fed by an [`EventSink`]
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            Body::from_stream(self),
        )
            .into_response()
    }
}

/// Write side of the stream.
///
/// `close` writes the `done` marker at most once; anything sent afterwards is dropped.
/// The response body ends when the sink is dropped.
pub struct EventSink {
    tx: mpsc::Sender<String>,
    closed: AtomicBool,
}

impl EventSink {
    pub fn channel(buffer: usize) -> (EventSink, SseResponse) {
        let (tx, rx) = mpsc::channel(buffer);
        let sink = EventSink {
            tx,
            closed: AtomicBool::new(false),
        };
        (sink, SseResponse::new(ReceiverStream::new(rx)))
    }

    /// Returns false once the stream is closed or the client has gone away
    pub async fn send(&self, event: &StreamEvent) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        self.tx.send(event.encode()).await.is_ok()
    }

    /// Returns true only for the call that actually closed the stream
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(StreamEvent::Done.encode()).await;
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves when the client drops the response
    pub async fn disconnected(&self) {
        self.tx.closed().await
    }
}
