//! Latest-wins rate limiting for update streams.

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior, interval};

/// Extension trait adding [`Coalesce`] to any stream.
pub trait CoalesceExt: Stream {
    /// Emit at most one item per `period`, always the newest one seen.
    ///
    /// Idle periods emit nothing. When the inner stream ends, the newest
    /// unsent item is flushed before the coalesced stream ends too.
    fn coalesce(self, period: Duration) -> Coalesce<Self>
    where
        Self: Sized,
    {
        Coalesce::new(self, period)
    }
}

impl<T: Stream> CoalesceExt for T {}

pin_project! {
    /// Stream returned by [`CoalesceExt::coalesce`].
    pub struct Coalesce<S: Stream> {
        #[pin]
        stream: S,
        ticks: Interval,
        latest: Option<S::Item>,
        finished: bool,
    }
}

impl<S: Stream> Coalesce<S> {
    pub fn new(stream: S, period: Duration) -> Self {
        let mut ticks = interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { stream, ticks, latest: None, finished: false }
    }
}

impl<S: Stream> Stream for Coalesce<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        if !*this.finished {
            loop {
                match this.stream.as_mut().poll_next(cx) {
                    Poll::Ready(Some(item)) => *this.latest = Some(item),
                    Poll::Ready(None) => {
                        *this.finished = true;
                        break;
                    }
                    Poll::Pending => break,
                }
            }
        }

        if *this.finished {
            return Poll::Ready(this.latest.take());
        }
        if this.latest.is_none() {
            return Poll::Pending;
        }

        ready!(this.ticks.poll_tick(cx));
        Poll::Ready(this.latest.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_to_their_newest_item() {
        let items = stream::iter(1..=5).coalesce(Duration::from_millis(100));
        assert_eq!(items.collect::<Vec<_>>().await, vec![5]);
    }

    #[tokio::test(start_paused = true)]
    async fn steady_producer_is_thinned_but_last_value_survives() {
        let producer = stream::unfold(0u32, |n| async move {
            if n == 10 {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            Some((n, n + 1))
        });

        let seen: Vec<u32> = producer.coalesce(Duration::from_millis(300)).collect().await;

        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
        assert_eq!(seen.last(), Some(&9));
        assert!(seen.len() >= 3 && seen.len() < 10, "{seen:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_source_does_not_end_the_stream() {
        let mut items =
            stream::iter(vec![1]).chain(stream::pending()).coalesce(Duration::from_millis(50));

        assert_eq!(items.next().await, Some(1));
        assert!(tokio::time::timeout(Duration::from_secs(1), items.next()).await.is_err());
    }
}
