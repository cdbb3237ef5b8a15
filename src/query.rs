//! Cursor-backed query streams.
//!
//! A [`Query`] streams SQL result rows through the [`Stream`](crate::Stream)
//! contract without materializing the full result set: it lazily opens a
//! read-only transaction, declares a server-side cursor named uniquely per
//! instance, and advances it with batch `FETCH` statements. The fetch batch
//! size is the single backpressure lever: a batch of 1 minimizes memory and
//! latency to first row at one round trip per row; larger batches amortize
//! round trips against client-side buffering.
//!
//! The database itself is an external collaborator reached through the
//! [`Database`] and [`Transaction`] capabilities.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ConfigError, StreamError, StreamResult};
use crate::stream::core::Stream;

/// Transactional execution handle supplied by the caller.
#[async_trait]
pub trait Database: Send + Sync {
    /// Row value handed to the scanner, one per result row.
    type Row: Send;
    type Tx: Transaction<Row = Self::Row>;

    async fn begin_read_only(&self) -> StreamResult<Self::Tx>;
}

/// A single open transaction on a [`Database`].
#[async_trait]
pub trait Transaction: Send {
    type Row: Send;

    /// Execute a statement that returns no rows.
    async fn execute(&mut self, statement: &str) -> StreamResult<()>;

    /// Execute a statement and return its rows.
    async fn query(&mut self, statement: &str) -> StreamResult<Vec<Self::Row>>;

    /// Abandon the transaction. Always safe here: queries only ever open
    /// read-only transactions.
    async fn rollback(self) -> StreamResult<()>;
}

/// Per-row decode function, `row -> typed item`.
pub type Scanner<R, T> = Box<dyn Fn(R) -> StreamResult<T> + Send + Sync>;

/// Builder for [`Query`]. `db`, `text` and `scanner` are mandatory; `fetch`
/// defaults to 1 and must be positive. Validation happens in
/// [`build`](QueryBuilder::build), before any database I/O.
pub struct QueryBuilder<D: Database, T> {
    db: Option<Arc<D>>,
    text: Option<String>,
    fetch: usize,
    scanner: Option<Scanner<D::Row, T>>,
}

impl<D: Database, T: Send> QueryBuilder<D, T> {
    pub fn new() -> Self {
        QueryBuilder {
            db: None,
            text: None,
            fetch: 1,
            scanner: None,
        }
    }

    /// Execution handle to run the query against.
    pub fn db(mut self, db: Arc<D>) -> Self {
        self.db = Some(db);
        self
    }

    /// SQL text the cursor is declared over.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Rows fetched per round trip. Must be at least 1.
    pub fn fetch(mut self, fetch: usize) -> Self {
        self.fetch = fetch;
        self
    }

    /// Decode function applied to every fetched row.
    pub fn scanner<F>(mut self, scanner: F) -> Self
    where
        F: Fn(D::Row) -> StreamResult<T> + Send + Sync + 'static,
    {
        self.scanner = Some(Box::new(scanner));
        self
    }

    /// Validate the configuration and produce a [`Query`].
    ///
    /// Fails fast on a missing mandatory option or a non-positive fetch
    /// size; no partially-configured query is ever usable.
    pub fn build(self) -> Result<Query<D, T>, ConfigError> {
        let db = self.db.ok_or(ConfigError::MissingField("db"))?;
        let text = self.text.ok_or(ConfigError::MissingField("text"))?;
        let scanner = self.scanner.ok_or(ConfigError::MissingField("scanner"))?;
        if self.fetch < 1 {
            return Err(ConfigError::InvalidFetchSize(self.fetch));
        }
        Ok(Query {
            db,
            text,
            fetch: self.fetch,
            scanner,
            cursor: format!("rowstream_{}", Uuid::new_v4().simple()),
            tx: None,
            buffer: VecDeque::new(),
            done: false,
        })
    }
}

impl<D: Database, T: Send> Default for QueryBuilder<D, T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream of decoded rows backed by a server-side cursor.
///
/// The transaction and cursor are owned exclusively by this instance and are
/// opened lazily on the first pull. They are torn down (rolled back) exactly
/// once: on normal exhaustion, on the first error, or on cancellation. Once
/// end-of-stream has been observed it is permanent and later pulls perform no
/// I/O and keep returning `None`.
pub struct Query<D: Database, T> {
    db: Arc<D>,
    text: String,
    fetch: usize,
    scanner: Scanner<D::Row, T>,
    cursor: String,
    tx: Option<D::Tx>,
    buffer: VecDeque<T>,
    done: bool,
}

impl<D: Database, T> std::fmt::Debug for Query<D, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("text", &self.text)
            .field("fetch", &self.fetch)
            .field("cursor", &self.cursor)
            .field("buffered", &self.buffer.len())
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl<D: Database, T: Send> Query<D, T> {
    pub fn builder() -> QueryBuilder<D, T> {
        QueryBuilder::new()
    }

    /// The generated cursor identifier, unique per instance.
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    /// Roll back the open transaction, if any, discarding buffered rows.
    /// Idempotent; a failed rollback is logged, not propagated.
    async fn abort(&mut self) {
        self.buffer.clear();
        if let Some(tx) = self.tx.take() {
            log::debug!("closing cursor {}", self.cursor);
            if let Err(e) = tx.rollback().await {
                log::warn!("rollback failed for cursor {}: {}", self.cursor, e);
            }
        }
    }
}

/// Race a database round trip against the cancellation context.
async fn race<T, F>(ctx: &CancellationToken, fut: F) -> StreamResult<T>
where
    F: Future<Output = StreamResult<T>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(StreamError::Cancelled),
        res = fut => res,
    }
}

#[async_trait]
impl<D: Database, T: Send> Stream for Query<D, T> {
    type Item = T;

    async fn next(&mut self, ctx: &CancellationToken) -> Option<StreamResult<T>> {
        if self.done {
            return None;
        }
        if ctx.is_cancelled() {
            self.abort().await;
            return Some(Err(StreamError::Cancelled));
        }
        if let Some(item) = self.buffer.pop_front() {
            return Some(Ok(item));
        }

        if self.tx.is_none() {
            let mut tx = match race(ctx, self.db.begin_read_only()).await {
                Ok(tx) => tx,
                Err(e) => return Some(Err(e)),
            };
            log::debug!("opening cursor {} (fetch batch {})", self.cursor, self.fetch);
            let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {}", self.cursor, self.text);
            if let Err(e) = race(ctx, tx.execute(&declare)).await {
                if let Err(rb) = tx.rollback().await {
                    log::warn!("rollback failed for cursor {}: {}", self.cursor, rb);
                }
                return Some(Err(e));
            }
            self.tx = Some(tx);
        }

        let statement = format!("FETCH {} FROM {}", self.fetch, self.cursor);
        let mut tx = match self.tx.take() {
            Some(tx) => tx,
            // Unreachable: the transaction was just opened above.
            None => return Some(Err(StreamError::Custom("transaction vanished".into()))),
        };
        let rows = match race(ctx, tx.query(&statement)).await {
            Ok(rows) => rows,
            Err(e) => {
                self.buffer.clear();
                log::debug!("closing cursor {}", self.cursor);
                if let Err(rb) = tx.rollback().await {
                    log::warn!("rollback failed for cursor {}: {}", self.cursor, rb);
                }
                return Some(Err(e));
            }
        };
        self.tx = Some(tx);

        // Decode into a fresh buffer; it replaces the previous one wholesale.
        let mut fresh = VecDeque::with_capacity(rows.len());
        for row in rows {
            match (self.scanner)(row) {
                Ok(item) => fresh.push_back(item),
                Err(e) => {
                    self.abort().await;
                    return Some(Err(e));
                }
            }
        }
        self.buffer = fresh;

        match self.buffer.pop_front() {
            Some(item) => Some(Ok(item)),
            None => {
                // An empty fetch is the end of the result set.
                self.done = true;
                self.abort().await;
                None
            }
        }
    }
}
