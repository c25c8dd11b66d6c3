//! Progress delivery from a producer task to a streaming response.
//!
//! The producer owns an [`EventSink`]; the transport consumes the paired
//! stream. Delivery is fire-and-forget: once the consumer has gone away every
//! `emit` is a no-op, and the producer keeps running to its terminal state.

use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;

/// Queue depth between a producer and its consumer
pub const EVENT_BUFFER: usize = 32;

pub struct EventSink<E> {
    tx: mpsc::Sender<E>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Send> EventSink<E> {
    pub async fn emit(&self, event: E) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("event consumer disconnected; dropping event");
        }
    }
}

/// A bounded sink and the stream that drains it. The stream ends once every
/// sink clone has been dropped.
pub fn event_channel<E: Send + 'static>(
    capacity: usize,
) -> (EventSink<E>, impl Stream<Item = E> + Send + 'static) {
    let (tx, rx) = mpsc::channel(capacity);
    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((event, rx))
    });
    (EventSink { tx }, events)
}
