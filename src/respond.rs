//! Streaming JSON responder.
//!
//! A [`Responder`] drains a [`Stream`](crate::Stream) and incrementally
//! writes one top-level JSON array to a response body. Each element is
//! serialized independently; brackets and separators are followed by a line
//! break, so a long-running response stays human-scannable while it streams.

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, StreamResult};
use crate::stream::core::Stream;

/// Byte-stream response-writing capability.
///
/// `flush` is the optional explicit-flush capability: the default is a no-op,
/// and a writer that cannot flush only loses the latency bound, never
/// correctness.
#[async_trait]
pub trait ResponseWriter: Send {
    async fn write_all(&mut self, buf: &[u8]) -> StreamResult<()>;

    /// Push buffered bytes towards the client. Optional capability.
    async fn flush(&mut self) -> StreamResult<()> {
        Ok(())
    }
}

/// Adapter exposing any tokio writer (e.g. an HTTP body writer) as a
/// [`ResponseWriter`].
pub struct IoResponseWriter<W> {
    inner: W,
}

impl<W> IoResponseWriter<W> {
    pub fn new(inner: W) -> Self {
        IoResponseWriter { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ResponseWriter for IoResponseWriter<W> {
    async fn write_all(&mut self, buf: &[u8]) -> StreamResult<()> {
        self.inner.write_all(buf).await?;
        Ok(())
    }

    async fn flush(&mut self) -> StreamResult<()> {
        self.inner.flush().await?;
        Ok(())
    }
}

/// Builder for [`Responder`]. `source` is mandatory; `flush` cadence defaults
/// to 0 (never explicitly flush) and `context` to a token that is never
/// cancelled.
pub struct ResponderBuilder<S> {
    source: Option<S>,
    flush: usize,
    ctx: CancellationToken,
}

impl<S: Stream> ResponderBuilder<S> {
    pub fn new() -> Self {
        ResponderBuilder {
            source: None,
            flush: 0,
            ctx: CancellationToken::new(),
        }
    }

    /// Stream of items to serialize.
    pub fn source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }

    /// Explicitly flush after every `flush` items written; 0 disables
    /// explicit flushing and relies on transport defaults.
    pub fn flush(mut self, flush: usize) -> Self {
        self.flush = flush;
        self
    }

    /// Cancellation context governing pulls from the source stream. It does
    /// not cancel in-flight network writes.
    pub fn context(mut self, ctx: CancellationToken) -> Self {
        self.ctx = ctx;
        self
    }

    /// Validate the configuration and produce a [`Responder`]. No I/O is
    /// performed until [`respond`](Responder::respond) is called.
    pub fn build(self) -> Result<Responder<S>, ConfigError> {
        let source = self.source.ok_or(ConfigError::MissingField("source"))?;
        Ok(Responder {
            source,
            flush: self.flush,
            ctx: self.ctx,
        })
    }
}

impl<S: Stream> Default for ResponderBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains a stream into an incrementally-written JSON array response.
pub struct Responder<S> {
    source: S,
    flush: usize,
    ctx: CancellationToken,
}

impl<S> std::fmt::Debug for Responder<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("flush", &self.flush)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

impl<S> Responder<S>
where
    S: Stream,
    S::Item: Serialize,
{
    pub fn builder() -> ResponderBuilder<S> {
        ResponderBuilder::new()
    }

    /// Drain the source and write it to `out` as a JSON array.
    ///
    /// Wire format for items 1, 2, 3: `[\n1,\n2,\n3\n]\n`.
    ///
    /// Failure mode: by the time any element has been written, the HTTP
    /// status and part of the body are already committed, so there is no way
    /// to signal an error at the HTTP level. On any stream, serialization or
    /// write error this method fails fast: it returns the error immediately
    /// and deliberately does not write the closing bracket, leaving the
    /// client with a visibly truncated array. The caller is expected to
    /// sever the connection. This is a documented limitation, not a masked
    /// one.
    pub async fn respond<W: ResponseWriter>(mut self, out: &mut W) -> StreamResult<()> {
        out.write_all(b"[\n").await?;

        let mut countdown = self.flush;
        let mut first = true;
        while let Some(pulled) = self.source.next(&self.ctx).await {
            let item = match pulled {
                Ok(item) => item,
                Err(e) => {
                    log::error!("stream failed mid-response, aborting committed body: {}", e);
                    return Err(e);
                }
            };
            if !first {
                out.write_all(b",\n").await?;
            }
            first = false;
            let bytes = serde_json::to_vec(&item)?;
            out.write_all(&bytes).await?;

            if self.flush > 0 {
                countdown -= 1;
                if countdown == 0 {
                    out.flush().await?;
                    countdown = self.flush;
                }
            }
        }

        out.write_all(b"\n]\n").await?;
        Ok(())
    }
}
