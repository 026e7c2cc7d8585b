//! # Streaming Results
//!
//! A [`ValueStream`] delivers a stream-kind call's elements in production
//! order and ends in exactly one terminal state: completed, failed with a
//! typed exception value, or cancelled by the caller.
//!
//! Cancellation is cooperative. Closing the receiving side makes the
//! production task's next send fail, at which point it winds down; no element
//! is delivered after [`ValueStream::cancel`] returns, but the handler may
//! finish producing the element it was working on.
use crate::value::Value;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Events the production task feeds into the channel.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Item(Value),
    Completed,
    Failed(Value),
}

/// How a stream ended.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEnd {
    /// The handler signalled exhaustion.
    Completed,
    /// The handler raised mid-stream; already-delivered elements remain valid.
    Failed(Value),
    /// The caller revoked interest before exhaustion.
    Cancelled,
}

/// An ordered, possibly unbounded sequence of result values.
#[derive(Debug)]
pub struct ValueStream {
    rx: ReceiverStream<StreamEvent>,
    end: Option<StreamEnd>,
}

impl ValueStream {
    pub(crate) fn new(rx: mpsc::Receiver<StreamEvent>) -> Self {
        Self {
            rx: ReceiverStream::new(rx),
            end: None,
        }
    }

    /// Revokes interest in further elements.
    ///
    /// Guarantees no further elements are delivered; the production task
    /// observes the closed channel on its next send and stops.
    pub fn cancel(&mut self) {
        if self.end.is_none() {
            self.rx.close();
            self.end = Some(StreamEnd::Cancelled);
        }
    }

    /// The terminal state, once the stream has reached one.
    pub fn end(&self) -> Option<&StreamEnd> {
        self.end.as_ref()
    }
}

impl Stream for ValueStream {
    type Item = Value;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        let this = self.get_mut();
        if this.end.is_some() {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.rx).poll_next(cx) {
            Poll::Ready(Some(StreamEvent::Item(value))) => Poll::Ready(Some(value)),
            Poll::Ready(Some(StreamEvent::Completed)) => {
                this.end = Some(StreamEnd::Completed);
                Poll::Ready(None)
            }
            Poll::Ready(Some(StreamEvent::Failed(exc))) => {
                this.end = Some(StreamEnd::Failed(exc));
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                // The production task went away without a terminal event.
                this.end = Some(StreamEnd::Failed(super::internal_exception(
                    "stream producer dropped before completing",
                )));
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
