//! Task-backed response streams.

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A stream fed by a spawned producer task.
///
/// Dropping the stream aborts the producer, so an abandoned call never
/// leaves a task behind.
pub struct ResponseStream<T> {
    task: JoinHandle<()>,
    receiver: mpsc::Receiver<T>,
}

impl<T: Send + 'static> ResponseStream<T> {
    /// Spawns `producer` with the sending half of a channel of `buffer`
    /// slots. Must be called from within a tokio runtime.
    pub fn spawn<F>(buffer: usize, producer: impl FnOnce(mpsc::Sender<T>) -> F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        Self {
            task: tokio::spawn(producer(sender)),
            receiver,
        }
    }
}

impl<T> Stream for ResponseStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl<T> Drop for ResponseStream<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
