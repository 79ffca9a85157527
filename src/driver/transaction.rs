//! Transaction API
//!
//! 명시적 트랜잭션. BEGIN 이후 같은 연결에서 여러 쿼리를 실행하고
//! COMMIT 또는 ROLLBACK으로 끝냅니다. 트랜잭션 안의 결과는 연결을 빌려
//! 쓰며, 끝까지 읽지 않은 결과는 다음 요청 전에 서버에서 버려집니다.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, warn};

use super::bolt::ConnectionState;
use super::error::{DriverError, DriverResult};
use super::pool::PooledConnection;
use super::provider::ConnectionProvider;
use super::result::{discard_leftover, ConnectionRef, Leftover, RecordStream, StreamContext};
use super::session::Query;
use super::types::Value;
use crate::bolt::{Outgoing, TransactionExtra};

// ============================================================================
// TransactionConfig - 트랜잭션 설정
// ============================================================================

/// 트랜잭션 설정
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// 서버 측 타임아웃
    pub timeout: Option<Duration>,
    /// 서버 로그에 남길 메타데이터
    pub metadata: HashMap<String, Value>,
}

impl TransactionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 타임아웃 설정
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// TransactionState - 트랜잭션 상태
// ============================================================================

/// 트랜잭션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// 활성
    Active,
    /// 커밋됨
    Committed,
    /// 롤백됨
    RolledBack,
    /// 실패
    Failed,
}

impl TransactionState {
    /// 종료 상태인지
    pub fn is_terminated(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

// ============================================================================
// Transaction - 트랜잭션
// ============================================================================

/// 명시적 트랜잭션
///
/// [`commit`](Self::commit)이나 [`rollback`](Self::rollback) 없이 버려지면
/// 연결은 풀로 돌아가지 않고 닫히며, 서버가 트랜잭션을 정리합니다.
pub struct Transaction {
    conn: Option<PooledConnection>,
    leftover: Option<Leftover>,
    context: StreamContext,
    fetch_size: i64,
    state: TransactionState,
}

impl Transaction {
    /// BEGIN을 보내고 응답을 기다립니다.
    pub(crate) async fn begin(
        mut conn: PooledConnection,
        extra: TransactionExtra,
        context: StreamContext,
        fetch_size: i64,
    ) -> DriverResult<Self> {
        let outcome = match conn.protocol().begin(extra) {
            Ok(batch) => Self::request(&mut conn, batch).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = outcome {
            return Err(abandon(conn, e, context.provider.as_ref(), context.database.as_deref()).await);
        }

        debug!(id = conn.id(), database = ?context.database, "transaction started");
        Ok(Self {
            conn: Some(conn),
            leftover: None,
            context,
            fetch_size,
            state: TransactionState::Active,
        })
    }

    async fn request(conn: &mut PooledConnection, batch: Vec<Outgoing>) -> DriverResult<crate::bolt::SuccessMessage> {
        let mut handles = conn.send(batch).await?;
        match handles.pop() {
            Some(mut handle) => conn.summary(&mut handle).await,
            None => Err(DriverError::protocol("no response expected for request")),
        }
    }

    /// 트랜잭션 안에서 쿼리 실행
    ///
    /// 이전 결과를 다 읽지 않았다면 먼저 버립니다. 서버가 쿼리를 거부하면
    /// 트랜잭션은 더 쓸 수 없고 롤백만 가능합니다.
    pub async fn run(
        &mut self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<RecordStream<'_>> {
        self.ensure_active()?;

        let mut query = query.into();
        if let Some(p) = params {
            query = query.with_params(p);
        }

        let sent = match self.conn.as_mut() {
            Some(conn) => {
                let prepared = match discard_leftover(conn, &mut self.leftover).await {
                    Ok(()) => conn
                        .hydration()
                        .pack_map(&query.parameters)
                        .map(|parameters| conn.protocol().run_in_transaction(&query.text, parameters, self.fetch_size)),
                    Err(e) => Err(e),
                };
                match prepared {
                    Ok(batch) => conn.send(batch).await,
                    Err(e) => Err(e),
                }
            }
            None => Err(DriverError::transaction("transaction has no connection")),
        };
        let mut handles = match sent {
            Ok(handles) => handles,
            Err(e) => return Err(self.fail(e).await),
        };
        let (Some(pull), Some(run)) = (handles.pop(), handles.pop()) else {
            return Err(self.fail(DriverError::protocol("RUN and PULL were not both queued")).await);
        };

        let context = StreamContext {
            bookmarks: None,
            ..self.context.clone()
        };
        let Some(conn) = self.conn.as_mut() else {
            return Err(DriverError::transaction("transaction has no connection"));
        };
        let conn_ref = ConnectionRef::Borrowed {
            conn,
            leftover: &mut self.leftover,
        };
        RecordStream::start(conn_ref, context, query, run, pull, self.fetch_size).await
    }

    /// 커밋하고 서버가 돌려준 북마크를 반환합니다.
    pub async fn commit(mut self) -> DriverResult<Option<String>> {
        self.ensure_active()?;
        if self.is_connection_failed() {
            let err = DriverError::transaction("cannot commit a transaction that has failed");
            return Err(self.close_with(err).await);
        }
        let Some(mut conn) = self.conn.take() else {
            return Err(DriverError::transaction("transaction has no connection"));
        };

        let outcome = match discard_leftover(&mut conn, &mut self.leftover).await {
            Ok(()) => {
                let batch = conn.protocol().commit();
                Self::request(&mut conn, batch).await
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(success) => {
                self.state = TransactionState::Committed;
                let bookmark = success.bookmark().map(str::to_string);
                if let (Some(set), Some(bm)) = (&self.context.bookmarks, &bookmark) {
                    set.lock().fold(bm);
                }
                debug!(id = conn.id(), bookmark = ?bookmark, "transaction committed");
                conn.release().await?;
                Ok(bookmark)
            }
            Err(e) => {
                self.state = TransactionState::Failed;
                Err(abandon(conn, e, self.context.provider.as_ref(), self.context.database.as_deref()).await)
            }
        }
    }

    /// 롤백
    pub async fn rollback(mut self) -> DriverResult<()> {
        if self.state.is_terminated() && self.state != TransactionState::Failed {
            return Err(DriverError::transaction(format!("transaction already {:?}", self.state)));
        }
        let (rolled_back, released) = self.roll_back_and_release().await;
        released?;
        rolled_back
    }

    /// 작업 오류로 트랜잭션을 끝냅니다.
    ///
    /// 롤백 실패는 로그로만 남깁니다. 연결 반환이 실패하면 그 오류를,
    /// 아니면 작업 오류를 돌려줍니다.
    pub(crate) async fn close_with(mut self, error: DriverError) -> DriverError {
        let (rolled_back, released) = self.roll_back_and_release().await;
        if let Err(e) = rolled_back {
            warn!(error = %e, "rollback after failed work did not succeed");
        }
        match released {
            Err(release_error) => release_error,
            Ok(()) => error,
        }
    }

    async fn roll_back_and_release(&mut self) -> (DriverResult<()>, DriverResult<()>) {
        let Some(mut conn) = self.conn.take() else {
            return (Ok(()), Ok(()));
        };
        self.state = TransactionState::RolledBack;

        if conn.is_broken() {
            conn.discard().await;
            return (Ok(()), Ok(()));
        }
        // 실패한 연결은 반환 시 닫히고, 결과가 남은 트랜잭션은 RESET이 끝냄
        if conn.state() == ConnectionState::Failed || self.leftover.take().is_some() {
            return (Ok(()), conn.release().await);
        }

        let batch = conn.protocol().rollback();
        let rolled_back = Self::request(&mut conn, batch).await.map(|_| ());
        if let Err(e) = &rolled_back {
            self.context
                .provider
                .on_error(conn.address(), self.context.database.as_deref(), e)
                .await;
            if e.is_connection_fatal() {
                conn.discard().await;
                return (rolled_back, Ok(()));
            }
        }
        (rolled_back, conn.release().await)
    }

    async fn fail(&mut self, error: DriverError) -> DriverError {
        if let Some(conn) = &self.conn {
            self.context
                .provider
                .on_error(conn.address(), self.context.database.as_deref(), &error)
                .await;
        }
        if error.is_connection_fatal() {
            self.state = TransactionState::Failed;
        }
        error
    }

    fn is_connection_failed(&self) -> bool {
        self.conn
            .as_ref()
            .map_or(true, |c| c.is_broken() || c.state() == ConnectionState::Failed)
    }

    fn ensure_active(&self) -> DriverResult<()> {
        match self.state {
            TransactionState::Active if self.is_connection_failed() => {
                Err(DriverError::transaction("transaction has failed and can only be rolled back"))
            }
            TransactionState::Active => Ok(()),
            TransactionState::Committed => Err(DriverError::transaction("transaction already committed")),
            TransactionState::RolledBack => Err(DriverError::transaction("transaction already rolled back")),
            TransactionState::Failed => Err(DriverError::transaction("transaction in failed state")),
        }
    }

    /// 현재 상태
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 데이터베이스 이름
    pub fn database(&self) -> Option<&str> {
        self.context.database.as_deref()
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .field("database", &self.context.database)
            .field("has_leftover", &self.leftover.is_some())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && self.conn.is_some() {
            debug!("transaction dropped while active, closing its connection");
        }
    }
}

/// 실패한 요청의 연결을 정리하고 호출자에게 돌려줄 오류를 고릅니다.
///
/// 연결이 망가졌으면 닫고, 아니면 풀에 반환합니다. 서버가 요청을 거부한
/// 연결은 반환 시 닫힙니다. 반환 중 RESET이 실패하면 그 오류가 원래
/// 오류보다 우선합니다.
pub(crate) async fn abandon(
    conn: PooledConnection,
    error: DriverError,
    provider: &dyn ConnectionProvider,
    database: Option<&str>,
) -> DriverError {
    provider.on_error(conn.address(), database, &error).await;
    if error.is_connection_fatal() || conn.is_broken() {
        conn.discard().await;
        return error;
    }
    match conn.release().await {
        Ok(()) => error,
        Err(release_error) => release_error,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::bolt::message::tag;
    use crate::bolt::{BoltVersion, PackStreamValue};
    use crate::driver::clock::SystemClock;
    use crate::driver::driver::ServerAddress;
    use crate::driver::pool::{ConnectionPool, PoolConfig};
    use crate::driver::provider::{AcquireRequest, DirectConnectionProvider};
    use crate::driver::session::BookmarkSet;
    use crate::driver::testkit::{failure, init_tracing, record, success, TestConnector};

    struct Fixture {
        connector: TestConnector,
        pool: Arc<ConnectionPool>,
        provider: Arc<DirectConnectionProvider>,
        bookmarks: Arc<Mutex<BookmarkSet>>,
    }

    fn fixture(connector: TestConnector) -> Fixture {
        init_tracing();
        let pool = Arc::new(ConnectionPool::new(
            PoolConfig::default(),
            TestConnector::settings(),
            Arc::new(connector.clone()),
            Arc::new(SystemClock),
        ));
        let provider = Arc::new(DirectConnectionProvider::new(ServerAddress::new("db", 7687), pool.clone()));
        Fixture {
            connector,
            pool,
            provider,
            bookmarks: Arc::new(Mutex::new(BookmarkSet::default())),
        }
    }

    impl Fixture {
        async fn begin(&self) -> DriverResult<Transaction> {
            let conn = self.provider.acquire(&AcquireRequest::default()).await?;
            let context = StreamContext {
                provider: self.provider.clone(),
                database: None,
                bookmarks: Some(self.bookmarks.clone()),
            };
            Transaction::begin(conn, TransactionExtra::default(), context, 2).await
        }
    }

    #[test]
    fn test_transaction_config() {
        let config = TransactionConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_metadata("app", "test");

        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.metadata.get("app"), Some(&Value::String("test".into())));
    }

    #[test]
    fn test_transaction_state() {
        assert!(!TransactionState::Active.is_terminated());
        assert!(TransactionState::Committed.is_terminated());
        assert!(TransactionState::RolledBack.is_terminated());
        assert!(TransactionState::Failed.is_terminated());
    }

    #[tokio::test]
    async fn test_commit_returns_bookmark() {
        let fx = fixture(TestConnector::new(BoltVersion::V5_4));

        let tx = fx.begin().await.unwrap();
        let bookmark = tx.commit().await.unwrap();

        assert_eq!(bookmark.as_deref(), Some("bm:commit"));
        assert!(fx.bookmarks.lock().contains("bm:commit"));
        assert_eq!(fx.pool.idle_count(fx.provider.address()), 1);
    }

    #[tokio::test]
    async fn test_unconsumed_result_discarded_before_commit() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => Some(vec![success(vec![("fields", vec![PackStreamValue::from("n")].into())])]),
            tag::PULL => Some(vec![
                record(vec![1i64.into()]),
                record(vec![2i64.into()]),
                success(vec![("has_more", true.into())]),
            ]),
            _ => None,
        });
        let fx = fixture(connector);

        let mut tx = fx.begin().await.unwrap();
        {
            let mut stream = tx.run("UNWIND range(1, 10) AS n RETURN n", None).await.unwrap();
            assert!(stream.next().await.unwrap().is_some());
        }
        tx.commit().await.unwrap();

        assert_eq!(
            fx.connector.tags(),
            vec![tag::HELLO, tag::LOGON, tag::BEGIN, tag::RUN, tag::PULL, tag::DISCARD, tag::COMMIT]
        );
    }

    #[tokio::test]
    async fn test_failed_query_blocks_further_runs() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => Some(vec![failure("Neo.ClientError.Statement.SyntaxError", "bad")]),
            _ => None,
        });
        let fx = fixture(connector);

        let mut tx = fx.begin().await.unwrap();
        let err = tx.run("RETRUN 1", None).await.unwrap_err();
        assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");

        let again = tx.run("RETURN 1", None).await.unwrap_err();
        assert_eq!(again.code(), "TransactionError");

        tx.rollback().await.unwrap();
        // 실패한 연결은 ROLLBACK 없이 닫힘
        let tags = fx.connector.tags();
        assert!(!tags.contains(&tag::ROLLBACK));
        assert!(!tags.contains(&tag::RESET));
        assert_eq!(fx.pool.idle_count(fx.provider.address()), 0);
        assert_eq!(fx.pool.in_use_count(fx.provider.address()), 0);
    }

    #[tokio::test]
    async fn test_begin_failure_destroys_connection() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::BEGIN => Some(vec![failure("Neo.ClientError.Database.DatabaseNotFound", "no db")]),
            _ => None,
        });
        let fx = fixture(connector);

        let err = fx.begin().await.unwrap_err();
        assert_eq!(err.code(), "Neo.ClientError.Database.DatabaseNotFound");
        assert_eq!(fx.pool.idle_count(fx.provider.address()), 0);
        assert_eq!(fx.pool.in_use_count(fx.provider.address()), 0);
        assert_eq!(fx.pool.metrics().total_closed, 1);
    }

    #[tokio::test]
    async fn test_close_with_prefers_release_error() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => Some(vec![success(vec![("fields", vec![PackStreamValue::from("n")].into())])]),
            tag::PULL => Some(vec![record(vec![1i64.into()]), success(vec![("has_more", true.into())])]),
            tag::RESET => Some(vec![failure("Neo.DatabaseError.General.UnknownError", "reset failed")]),
            _ => None,
        });
        let fx = fixture(connector);

        let mut tx = fx.begin().await.unwrap();
        {
            let mut stream = tx.run("UNWIND range(1, 10) AS n RETURN n", None).await.unwrap();
            assert!(stream.next().await.unwrap().is_some());
        }
        let work = DriverError::server("Neo.ClientError.Statement.SyntaxError", "work");
        let err = tx.close_with(work).await;

        // 남은 결과가 있으면 ROLLBACK 대신 반환 시 RESET
        assert_eq!(err.code(), "Neo.DatabaseError.General.UnknownError");
        assert!(fx.connector.requests(tag::ROLLBACK).is_empty());
        assert_eq!(fx.pool.idle_count(fx.provider.address()), 0);
    }

    #[tokio::test]
    async fn test_failed_rollback_destroys_connection() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::ROLLBACK => Some(vec![failure("Neo.ClientError.Transaction.TransactionNotFound", "gone")]),
            _ => None,
        });
        let fx = fixture(connector);

        let tx = fx.begin().await.unwrap();
        let work = DriverError::server("Neo.ClientError.Statement.SyntaxError", "work");
        let err = tx.close_with(work).await;

        assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");
        assert!(fx.connector.requests(tag::RESET).is_empty());
        assert_eq!(fx.pool.idle_count(fx.provider.address()), 0);
    }

    #[tokio::test]
    async fn test_close_with_keeps_work_error() {
        let fx = fixture(TestConnector::new(BoltVersion::V5_4));

        let tx = fx.begin().await.unwrap();
        let work = DriverError::server("Neo.ClientError.Statement.SyntaxError", "work");
        let err = tx.close_with(work).await;

        assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");
        assert_eq!(fx.connector.requests(tag::ROLLBACK).len(), 1);
        assert_eq!(fx.pool.idle_count(fx.provider.address()), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_closes_connection() {
        let fx = fixture(TestConnector::new(BoltVersion::V5_4));

        let tx = fx.begin().await.unwrap();
        assert_eq!(tx.state(), TransactionState::Active);
        drop(tx);

        assert_eq!(fx.pool.idle_count(fx.provider.address()), 0);
        assert_eq!(fx.pool.in_use_count(fx.provider.address()), 0);
    }
}
