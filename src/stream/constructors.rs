//! Stream constructors: in-memory sequence sources and foreign-stream bridges.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt as FuturesStreamExt};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;

use crate::error::{StreamError, StreamResult};
use crate::stream::core::Stream;

/// Create a stream from a finite in-memory sequence.
///
/// The resulting stream reports an exact [`remaining`](Stream::remaining)
/// count and keeps returning `None` once exhausted; its storage empties as it
/// is consumed, so pulls past the end are free.
pub fn from_iter<I>(iter: I) -> Iter<I::Item>
where
    I: IntoIterator,
    I::Item: Send,
{
    Iter {
        items: iter.into_iter().collect(),
    }
}

/// In-memory sequence source, see [`from_iter`].
pub struct Iter<T> {
    items: VecDeque<T>,
}

#[async_trait]
impl<T: Send> Stream for Iter<T> {
    type Item = T;

    async fn next(&mut self, ctx: &CancellationToken) -> Option<StreamResult<T>> {
        // Exhaustion wins over cancellation: once end-of-stream has been
        // returned it stays end-of-stream, cancelled context or not.
        if self.items.is_empty() {
            return None;
        }
        if ctx.is_cancelled() {
            return Some(Err(StreamError::Cancelled));
        }
        self.items.pop_front().map(Ok)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

/// Bridge a `futures` stream of fallible items into the pull contract.
///
/// Useful for feeding the responder from drivers that already expose their
/// result sets as `futures::Stream` (most async database crates do).
pub fn from_futures_stream<T: Send>(stream: BoxStream<'static, StreamResult<T>>) -> FuturesAdapter<T> {
    FuturesAdapter {
        inner: stream,
        done: false,
    }
}

/// Adapter over a boxed `futures` stream, see [`from_futures_stream`].
pub struct FuturesAdapter<T> {
    inner: BoxStream<'static, StreamResult<T>>,
    done: bool,
}

#[async_trait]
impl<T: Send> Stream for FuturesAdapter<T> {
    type Item = T;

    async fn next(&mut self, ctx: &CancellationToken) -> Option<StreamResult<T>> {
        // Sticky end-of-stream: never touch the wrapped stream (or the
        // context) again once it has ended.
        if self.done {
            return None;
        }
        if ctx.is_cancelled() {
            return Some(Err(StreamError::Cancelled));
        }
        let item = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Some(Err(StreamError::Cancelled)),
            item = self.inner.next() => item,
        };
        if item.is_none() {
            self.done = true;
        }
        item
    }
}
