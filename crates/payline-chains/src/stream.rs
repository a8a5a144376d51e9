use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

/// A progressive per-chain result stream: parallel workers push into a
/// bounded channel, one item per chain, in completion order. Dropping the
/// stream aborts any workers still in flight, so an abandoned consumer never
/// leaks tasks or timers.
pub struct ProgressiveStream<T> {
    inner: ReceiverStream<T>,
    workers: Vec<JoinHandle<()>>,
}

impl<T> ProgressiveStream<T> {
    pub(crate) fn new(rx: mpsc::Receiver<T>, workers: Vec<JoinHandle<()>>) -> Self {
        Self { inner: ReceiverStream::new(rx), workers }
    }
}

impl<T> Stream for ProgressiveStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

impl<T> Drop for ProgressiveStream<T> {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.abort();
        }
    }
}
