//! Sinks: drain a stream into an ordered in-memory sequence.

use tokio_util::sync::CancellationToken;

use crate::error::{StreamError, StreamResult};
use crate::stream::core::Stream;

/// Pull `stream` to completion, collecting items in emission order.
///
/// Cancellation is checked before every pull. When the stream advertises a
/// [`remaining`](Stream::remaining) count, the output vector is preallocated
/// to it; the hint never changes what is returned.
///
/// Returns `(items, None)` only on a clean end-of-stream. On any error the
/// partial prefix collected so far is returned alongside it, and the caller
/// decides whether partial results are usable.
pub async fn drain<S: Stream>(
    stream: &mut S,
    ctx: &CancellationToken,
) -> (Vec<S::Item>, Option<StreamError>) {
    let mut items = Vec::with_capacity(stream.remaining().unwrap_or(0));
    loop {
        if ctx.is_cancelled() {
            return (items, Some(StreamError::Cancelled));
        }
        match stream.next(ctx).await {
            Some(Ok(item)) => items.push(item),
            Some(Err(e)) => return (items, Some(e)),
            None => return (items, None),
        }
    }
}

/// Like [`drain`], but fails the whole operation on the first error.
///
/// Convenience for callers that have no use for a partial prefix.
pub async fn drain_all<S: Stream>(
    stream: &mut S,
    ctx: &CancellationToken,
) -> StreamResult<Vec<S::Item>> {
    let (items, err) = drain(stream, ctx).await;
    match err {
        None => Ok(items),
        Some(e) => Err(e),
    }
}
