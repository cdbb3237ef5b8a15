//! Element-wise stream combinators: transform, filter, artificial delay.

use async_trait::async_trait;
use std::marker::PhantomData;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{StreamError, StreamResult};
use crate::stream::core::Stream;

/// Transform combinator, built with [`StreamExt::map`](crate::StreamExt::map).
pub struct Map<S, U, F> {
    pub(crate) stream: S,
    pub(crate) f: F,
    pub(crate) _phantom: PhantomData<fn() -> U>,
}

#[async_trait]
impl<S, U, F> Stream for Map<S, U, F>
where
    S: Stream,
    F: FnMut(S::Item) -> StreamResult<U> + Send,
    U: Send,
{
    type Item = U;

    async fn next(&mut self, ctx: &CancellationToken) -> Option<StreamResult<U>> {
        match self.stream.next(ctx).await? {
            Ok(item) => Some((self.f)(item)),
            Err(e) => Some(Err(e)),
        }
    }

    // One-to-one, so the source's count is ours.
    fn remaining(&self) -> Option<usize> {
        self.stream.remaining()
    }
}

/// Filter combinator, built with [`StreamExt::select`](crate::StreamExt::select).
pub struct Select<S, F> {
    pub(crate) stream: S,
    pub(crate) predicate: F,
}

#[async_trait]
impl<S, F> Stream for Select<S, F>
where
    S: Stream,
    F: FnMut(&S::Item) -> bool + Send,
{
    type Item = S::Item;

    async fn next(&mut self, ctx: &CancellationToken) -> Option<StreamResult<S::Item>> {
        // Explicit loop: an arbitrarily long run of filtered-out items must
        // not grow the call stack.
        loop {
            match self.stream.next(ctx).await {
                Some(Ok(item)) => {
                    if (self.predicate)(&item) {
                        return Some(Ok(item));
                    }
                }
                other => return other,
            }
        }
    }
}

/// Fixed-delay combinator, built with [`StreamExt::delay`](crate::StreamExt::delay).
///
/// Pulls an item, then waits `duration` or until the context is cancelled,
/// whichever comes first. On cancellation the fetched item is discarded and
/// [`StreamError::Cancelled`] is returned. Test aid only.
pub struct Delay<S> {
    pub(crate) stream: S,
    pub(crate) duration: Duration,
}

#[async_trait]
impl<S: Stream> Stream for Delay<S> {
    type Item = S::Item;

    async fn next(&mut self, ctx: &CancellationToken) -> Option<StreamResult<S::Item>> {
        let item = self.stream.next(ctx).await?;
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Some(Err(StreamError::Cancelled)),
            _ = tokio::time::sleep(self.duration) => Some(item),
        }
    }

    fn remaining(&self) -> Option<usize> {
        self.stream.remaining()
    }
}
