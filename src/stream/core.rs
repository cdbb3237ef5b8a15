//! Core stream contract: an async, pull-based iterator over fallible items.
//!
//! End-of-stream is expressed in the type: `next` returns `None` once the
//! stream is exhausted, `Some(Err(_))` on failure and `Some(Ok(item))`
//! otherwise. There is no end-of-stream sentinel error anywhere in the crate,
//! so "no more errors after end-of-stream" is not a discipline callers have to
//! remember; it falls out of the `Option`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StreamResult;
use crate::stream::combinators::{Delay, Map, Select};
use std::marker::PhantomData;
use std::time::Duration;

/// Pull-based async stream of fallible items.
///
/// Streams are single-consumer: `next` takes `&mut self` and no implementation
/// in this crate is safe for concurrent pulls. The `ctx` token is the caller's
/// cancellation context; implementations that block (timers, database round
/// trips, network writes) must observe it and return
/// [`StreamError::Cancelled`](crate::error::StreamError::Cancelled) promptly.
///
/// # Examples
/// ```
/// use rowstream::{from_iter, drain, StreamExt};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let ctx = CancellationToken::new();
/// let mut doubled = from_iter(vec![1, 2, 3]).map(|x| Ok(x * 2));
/// let (items, err) = drain(&mut doubled, &ctx).await;
/// assert_eq!(items, vec![2, 4, 6]);
/// assert!(err.is_none());
/// # }
/// ```
#[async_trait]
pub trait Stream: Send {
    type Item: Send;

    /// Pull the next item, or `None` at end-of-stream.
    async fn next(&mut self, ctx: &CancellationToken) -> Option<StreamResult<Self::Item>>;

    /// How many items remain, when the stream knows without consuming them.
    ///
    /// Purely a performance hint for sinks preallocating capacity; returning
    /// `None` never changes observable behavior.
    fn remaining(&self) -> Option<usize> {
        None
    }
}

// Boxed streams delegate, so sources can be type-erased behind
// `Box<dyn Stream<Item = T>>`.
#[async_trait]
impl<S: Stream + ?Sized> Stream for Box<S> {
    type Item = S::Item;

    async fn next(&mut self, ctx: &CancellationToken) -> Option<StreamResult<Self::Item>> {
        (**self).next(ctx).await
    }

    fn remaining(&self) -> Option<usize> {
        (**self).remaining()
    }
}

/// Extension trait providing stream combinators
pub trait StreamExt: Stream + Sized {
    /// Transform each item with `f`.
    ///
    /// One-to-one and order-preserving. Source errors and transform errors
    /// propagate identically; neither is retried.
    fn map<U, F>(self, f: F) -> Map<Self, U, F>
    where
        F: FnMut(Self::Item) -> StreamResult<U> + Send,
        U: Send;

    /// Keep only items for which `predicate` returns true.
    ///
    /// Skips items without reordering or duplicating; errors are never
    /// discarded, only predicate-false items.
    fn select<F>(self, predicate: F) -> Select<Self, F>
    where
        F: FnMut(&Self::Item) -> bool + Send;

    /// Emit each item only after `duration` has elapsed. Test aid.
    fn delay(self, duration: Duration) -> Delay<Self>;
}

impl<S: Stream + Sized> StreamExt for S {
    fn map<U, F>(self, f: F) -> Map<Self, U, F>
    where
        F: FnMut(Self::Item) -> StreamResult<U> + Send,
        U: Send,
    {
        Map {
            stream: self,
            f,
            _phantom: PhantomData,
        }
    }

    fn select<F>(self, predicate: F) -> Select<Self, F>
    where
        F: FnMut(&Self::Item) -> bool + Send,
    {
        Select {
            stream: self,
            predicate,
        }
    }

    fn delay(self, duration: Duration) -> Delay<Self> {
        Delay {
            stream: self,
            duration,
        }
    }
}
