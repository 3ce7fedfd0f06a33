//! Stream throttling utilities

use futures::Stream;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{Instant, Sleep, sleep};

/// Extension trait to add throttling to any Stream
pub trait ThrottleExt: Stream {
    /// Throttle the stream to emit at most once per `period`
    ///
    /// The first item after a quiet period is emitted immediately. Items that
    /// arrive while a period is running collapse into the latest one, which is
    /// emitted when the period ends. A pending item is flushed when the inner
    /// stream ends.
    fn throttle(self, period: Duration) -> Throttle<Self>
    where
        Self: Sized,
    {
        Throttle::new(self, period)
    }
}

impl<T: Stream> ThrottleExt for T {}

pin_project! {
    /// A stream combinator that throttles emission rate
    pub struct Throttle<S: Stream> {
        #[pin]
        stream: S,
        #[pin]
        sleep: Sleep,
        period: Duration,
        pending: Option<S::Item>,
        // A period started by the last emission is still running
        window_open: bool,
        done: bool,
    }
}

impl<S: Stream> Throttle<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        Self {
            stream,
            sleep: sleep(Duration::ZERO),
            period,
            pending: None,
            window_open: false,
            done: false,
        }
    }
}

impl<S: Stream> Stream for Throttle<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        // Drain everything ready, keeping only the latest
        while !*this.done {
            match this.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => *this.pending = Some(item),
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => break,
            }
        }

        if *this.done {
            return Poll::Ready(this.pending.take());
        }

        let window_elapsed = *this.window_open && this.sleep.as_mut().poll(cx).is_ready();
        if window_elapsed {
            *this.window_open = false;
        }

        if this.pending.is_some() && !*this.window_open {
            this.sleep.as_mut().reset(Instant::now() + *this.period);
            *this.window_open = true;
            return Poll::Ready(this.pending.take());
        }

        Poll::Pending
    }
}
