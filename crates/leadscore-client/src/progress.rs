//! Percent-complete reporting for uploads.
//!
//! A [`ProgressSender`] feeds a [`ProgressEvents`] stream. Reported values
//! never go backwards, `Advanced` tops out at 99, and the stream ends right
//! after its single terminal event ([`ProgressEvent::Completed`] or
//! [`ProgressEvent::Failed`]).

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Percent complete, strictly greater than the previous `Advanced` value.
    Advanced(u8),
    /// The operation finished; equivalent to 100%.
    Completed,
    Failed,
}

impl ProgressEvent {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressEvent::Completed | ProgressEvent::Failed)
    }
}

/// Creates a connected sender/stream pair.
#[must_use]
pub fn channel() -> (ProgressSender, ProgressEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = ProgressSender {
        tx,
        shared: Arc::new(Shared {
            percent: AtomicU8::new(0),
            finished: AtomicBool::new(false),
        }),
    };
    (sender, ProgressEvents { rx, done: false })
}

#[derive(Debug)]
struct Shared {
    percent: AtomicU8,
    finished: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    shared: Arc<Shared>,
}

impl ProgressSender {
    /// Reports `percent` complete. Values at or below the last report, and
    /// anything after a terminal event, are dropped.
    pub fn advance(&self, percent: u8) {
        if self.shared.finished.load(Ordering::Acquire) {
            return;
        }
        let percent = percent.min(99);
        let previous = self.shared.percent.fetch_max(percent, Ordering::AcqRel);
        if percent > previous {
            let _ = self.tx.send(ProgressEvent::Advanced(percent));
        }
    }

    /// Reports `sent` of `total` bytes transferred.
    pub fn advance_bytes(&self, sent: u64, total: u64) {
        if total == 0 {
            return;
        }
        let percent = u8::try_from(sent.min(total) * 100 / total).unwrap_or(100);
        self.advance(percent);
    }

    pub fn complete(&self) {
        self.finish(ProgressEvent::Completed);
    }

    pub fn fail(&self) {
        self.finish(ProgressEvent::Failed);
    }

    /// Last reported percent; 100 once completed.
    #[must_use]
    pub fn percent(&self) -> u8 {
        self.shared.percent.load(Ordering::Acquire)
    }

    fn finish(&self, event: ProgressEvent) {
        if self.shared.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        if event == ProgressEvent::Completed {
            self.shared.percent.store(100, Ordering::Release);
        }
        let _ = self.tx.send(event);
    }
}

/// Finite stream of [`ProgressEvent`]s. Also ends if every sender is dropped
/// without a terminal event.
#[derive(Debug)]
pub struct ProgressEvents {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
    done: bool,
}

impl Stream for ProgressEvents {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.done = true;
                    self.rx.close();
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn values_are_monotonic_and_stream_ends_after_completion() {
        let (tx, events) = channel();
        tx.advance(10);
        tx.advance(5);
        tx.advance(10);
        tx.advance(40);
        tx.complete();
        tx.advance(70);

        let seen: Vec<_> = events.collect().await;
        assert_eq!(
            seen,
            vec![
                ProgressEvent::Advanced(10),
                ProgressEvent::Advanced(40),
                ProgressEvent::Completed,
            ]
        );
        assert_eq!(tx.percent(), 100);
    }

    #[tokio::test]
    async fn advanced_is_capped_below_completion() {
        let (tx, events) = channel();
        tx.advance(250);
        tx.advance_bytes(10, 10);
        tx.fail();

        let seen: Vec<_> = events.collect().await;
        assert_eq!(
            seen,
            vec![ProgressEvent::Advanced(99), ProgressEvent::Failed]
        );
    }

    #[tokio::test]
    async fn only_the_first_terminal_event_is_sent() {
        let (tx, events) = channel();
        tx.fail();
        tx.complete();

        let seen: Vec<_> = events.collect().await;
        assert_eq!(seen, vec![ProgressEvent::Failed]);
        assert_eq!(tx.percent(), 0);
    }

    #[tokio::test]
    async fn dropping_every_sender_ends_the_stream() {
        let (tx, events) = channel();
        tx.advance_bytes(1, 4);
        drop(tx);

        let seen: Vec<_> = events.collect().await;
        assert_eq!(seen, vec![ProgressEvent::Advanced(25)]);
    }
}
