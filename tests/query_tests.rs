use async_trait::async_trait;
use rowstream::error::{ConfigError, StreamError, StreamResult};
use rowstream::{drain, drain_all, Database, Query, QueryBuilder, Stream, Transaction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

/// Recording mock driver: serves a fixed result set and logs every statement.
struct MockDb {
    rows: Vec<i64>,
    log: Arc<Mutex<Vec<String>>>,
    rollbacks: Arc<AtomicUsize>,
    /// Fail the nth FETCH (1-based) with a database error.
    fail_fetch: Option<usize>,
}

impl MockDb {
    fn new(rows: Vec<i64>) -> Self {
        MockDb {
            rows,
            log: Arc::new(Mutex::new(Vec::new())),
            rollbacks: Arc::new(AtomicUsize::new(0)),
            fail_fetch: None,
        }
    }

    fn failing_fetch(rows: Vec<i64>, nth: usize) -> Self {
        MockDb {
            fail_fetch: Some(nth),
            ..MockDb::new(rows)
        }
    }

    fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn fetch_count(&self) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.starts_with("FETCH"))
            .count()
    }

    fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

struct MockTx {
    rows: Vec<i64>,
    pos: usize,
    fetches: usize,
    log: Arc<Mutex<Vec<String>>>,
    rollbacks: Arc<AtomicUsize>,
    fail_fetch: Option<usize>,
}

#[async_trait]
impl Database for MockDb {
    type Row = i64;
    type Tx = MockTx;

    async fn begin_read_only(&self) -> StreamResult<MockTx> {
        self.log.lock().unwrap().push("BEGIN READ ONLY".to_string());
        Ok(MockTx {
            rows: self.rows.clone(),
            pos: 0,
            fetches: 0,
            log: Arc::clone(&self.log),
            rollbacks: Arc::clone(&self.rollbacks),
            fail_fetch: self.fail_fetch,
        })
    }
}

#[async_trait]
impl Transaction for MockTx {
    type Row = i64;

    async fn execute(&mut self, statement: &str) -> StreamResult<()> {
        self.log.lock().unwrap().push(statement.to_string());
        Ok(())
    }

    async fn query(&mut self, statement: &str) -> StreamResult<Vec<i64>> {
        self.log.lock().unwrap().push(statement.to_string());
        self.fetches += 1;
        if self.fail_fetch == Some(self.fetches) {
            return Err(StreamError::Database("connection reset".to_string()));
        }
        // Statement shape: FETCH <n> FROM <cursor>
        let batch: usize = statement
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.parse().ok())
            .expect("malformed FETCH statement");
        let take = batch.min(self.rows.len() - self.pos);
        let rows = self.rows[self.pos..self.pos + take].to_vec();
        self.pos += take;
        Ok(rows)
    }

    async fn rollback(self) -> StreamResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn build_query(db: &Arc<MockDb>, fetch: usize) -> Query<MockDb, i64> {
    Query::builder()
        .db(Arc::clone(db))
        .text("SELECT id FROM widgets ORDER BY id")
        .fetch(fetch)
        .scanner(|row| Ok(row))
        .build()
        .unwrap()
}

#[test]
fn test_fetch_one_issues_one_round_trip_per_item() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::new(vec![10, 20, 30]));
        let mut query = build_query(&db, 1);

        let items = tokio_test::assert_ok!(drain_all(&mut query, &ctx).await);
        assert_eq!(items, vec![10, 20, 30]);
        // One FETCH per item plus the final empty FETCH that ends the stream.
        assert_eq!(db.fetch_count(), 4);
        assert_eq!(db.rollbacks(), 1);
    });
}

#[test]
fn test_fetch_batches_amortize_round_trips() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::new(vec![1, 2, 3, 4, 5]));
        let mut query = build_query(&db, 2);

        let items = drain_all(&mut query, &ctx).await.unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
        // Batches of 2, 2, 1 and the final empty FETCH.
        assert_eq!(db.fetch_count(), 4);
    });
}

#[test]
fn test_exact_multiple_ends_on_empty_fetch() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::new(vec![1, 2, 3, 4]));
        let mut query = build_query(&db, 2);

        let items = drain_all(&mut query, &ctx).await.unwrap();
        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(db.fetch_count(), 3);
    });
}

#[test]
fn test_declare_binds_cursor_name_to_query_text() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::new(vec![1]));
        let mut query = build_query(&db, 1);
        let cursor = query.cursor().to_string();

        query.next(&ctx).await;

        let statements = db.statements();
        assert_eq!(statements[0], "BEGIN READ ONLY");
        assert_eq!(
            statements[1],
            format!(
                "DECLARE {} NO SCROLL CURSOR FOR SELECT id FROM widgets ORDER BY id",
                cursor
            )
        );
        assert_eq!(statements[2], format!("FETCH 1 FROM {}", cursor));
    });
}

#[test]
fn test_eos_is_sticky_and_issues_no_statements() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::new(vec![1, 2]));
        let mut query = build_query(&db, 1);

        drain_all(&mut query, &ctx).await.unwrap();
        let statements_at_eos = db.statements().len();
        assert_eq!(db.rollbacks(), 1);

        for _ in 0..3 {
            assert_eq!(query.next(&ctx).await, None);
        }
        assert_eq!(db.statements().len(), statements_at_eos);
        assert_eq!(db.rollbacks(), 1);
    });
}

#[test]
fn test_cancel_before_first_pull_issues_no_statements() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        ctx.cancel();
        let db = Arc::new(MockDb::new(vec![1, 2, 3]));
        let mut query = build_query(&db, 1);

        assert_eq!(query.next(&ctx).await, Some(Err(StreamError::Cancelled)));
        assert!(db.statements().is_empty());
        assert_eq!(db.rollbacks(), 0);
    });
}

#[test]
fn test_cancel_mid_iteration_rolls_back() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::new(vec![1, 2, 3, 4]));
        let mut query = build_query(&db, 2);

        assert_eq!(query.next(&ctx).await, Some(Ok(1)));
        ctx.cancel();
        assert_eq!(query.next(&ctx).await, Some(Err(StreamError::Cancelled)));
        // A cancelled stream never leaves a transaction open.
        assert_eq!(db.rollbacks(), 1);
    });
}

#[test]
fn test_fetch_error_rolls_back_and_surfaces() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::failing_fetch(vec![1, 2, 3, 4], 2));
        let mut query = build_query(&db, 2);

        let (items, err) = drain(&mut query, &ctx).await;
        assert_eq!(items, vec![1, 2]);
        assert_eq!(err, Some(StreamError::Database("connection reset".to_string())));
        assert_eq!(db.rollbacks(), 1);
    });
}

#[test]
fn test_decode_error_rolls_back_and_surfaces() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::new(vec![1, -7, 3]));
        let mut query = Query::builder()
            .db(Arc::clone(&db))
            .text("SELECT id FROM widgets")
            .fetch(1)
            .scanner(|row: i64| {
                if row < 0 {
                    Err(StreamError::Decode(format!("negative id {}", row)))
                } else {
                    Ok(row as u64)
                }
            })
            .build()
            .unwrap();

        let (items, err) = drain(&mut query, &ctx).await;
        assert_eq!(items, vec![1]);
        assert_eq!(err, Some(StreamError::Decode("negative id -7".to_string())));
        assert_eq!(db.rollbacks(), 1);
    });
}

#[test]
fn test_cursor_identifiers_never_collide() {
    let db = Arc::new(MockDb::new(vec![1]));
    let a = build_query(&db, 1);
    let b = build_query(&db, 1);

    assert!(a.cursor().starts_with("rowstream_"));
    assert!(b.cursor().starts_with("rowstream_"));
    assert_ne!(a.cursor(), b.cursor());
}

#[test]
fn test_builder_rejects_missing_mandatory_options() {
    let db = Arc::new(MockDb::new(vec![1]));

    let err = QueryBuilder::<MockDb, i64>::new().build().unwrap_err();
    assert_eq!(err, ConfigError::MissingField("db"));

    let err = QueryBuilder::<MockDb, i64>::new()
        .db(Arc::clone(&db))
        .build()
        .unwrap_err();
    assert_eq!(err, ConfigError::MissingField("text"));

    let err = QueryBuilder::<MockDb, i64>::new()
        .db(Arc::clone(&db))
        .text("SELECT 1")
        .build()
        .unwrap_err();
    assert_eq!(err, ConfigError::MissingField("scanner"));

    // Validation performs no I/O.
    assert!(db.statements().is_empty());
}

#[test]
fn test_builder_rejects_zero_fetch_size() {
    let db = Arc::new(MockDb::new(vec![1]));
    let err = QueryBuilder::<MockDb, i64>::new()
        .db(Arc::clone(&db))
        .text("SELECT 1")
        .fetch(0)
        .scanner(|row| Ok(row))
        .build()
        .unwrap_err();
    assert_eq!(err, ConfigError::InvalidFetchSize(0));
    assert!(db.statements().is_empty());
}

#[test]
fn test_error_does_not_mark_eos() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let ctx = CancellationToken::new();
        let db = Arc::new(MockDb::failing_fetch(vec![1, 2], 1));
        let mut query = build_query(&db, 1);

        assert_eq!(
            query.next(&ctx).await,
            Some(Err(StreamError::Database("connection reset".to_string())))
        );
        // Not a designed resume path, but a fresh pull reopens rather than
        // reporting end-of-stream.
        assert_ne!(query.next(&ctx).await, None);
    });
}
