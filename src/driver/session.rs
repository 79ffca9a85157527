//! Session Management
//!
//! 세션은 북마크를 모아 가며 트랜잭션을 차례로 실행하는 논리적 작업
//! 단위입니다. 연결은 필요할 때마다 공급자에서 빌리고 결과나 트랜잭션이
//! 끝나면 돌려줍니다.
//!
//! # 트랜잭션 함수
//!
//! [`Session::execute`]는 연결 획득, BEGIN, 작업, COMMIT을 한 번의 시도로
//! 보고, 재시도 가능한 오류면 [`RetryPolicy`]에 따라 처음부터 다시
//! 시도합니다. 작업 함수는 여러 번 호출될 수 있습니다.
//!
//! # 종료 시 오류 우선순위
//!
//! 작업이 실패하면 롤백을 시도한 뒤 연결을 반환합니다. 롤백 실패는 로그로만
//! 남기고, 연결 반환(RESET)이 실패하면 작업 오류 대신 그 오류를 돌려줍니다.
//! 반환이 성공하면 작업 오류를 그대로 돌려줍니다.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::debug;

use super::bolt::Connection;
use super::clock::Clock;
use super::error::{DriverError, DriverResult};
use super::pool::PooledConnection;
use super::provider::{AcquireRequest, ConnectionProvider};
use super::result::{ConnectionRef, RecordStream, StreamContext};
use super::retry::RetryPolicy;
use super::transaction::{abandon, Transaction, TransactionConfig};
use super::types::Value;
use crate::bolt::{AccessMode, NotificationFilter, Outgoing, TransactionExtra};

// ============================================================================
// BookmarkSet - 북마크 집합
// ============================================================================

/// 인과적 일관성 북마크 집합
///
/// 서버가 돌려준 북마크는 집합에 합쳐지고, 다음 트랜잭션의 BEGIN(또는
/// 자동 커밋 RUN)에 모두 실려 갑니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkSet {
    values: BTreeSet<String>,
}

impl BookmarkSet {
    /// 새 집합 생성
    pub fn new<I, S>(bookmarks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: bookmarks
                .into_iter()
                .map(Into::into)
                .filter(|b: &String| !b.is_empty())
                .collect(),
        }
    }

    /// 서버가 돌려준 북마크 합치기
    pub fn fold(&mut self, bookmark: &str) {
        if !bookmark.is_empty() {
            self.values.insert(bookmark.to_string());
        }
    }

    /// 다른 집합과 합치기
    pub fn union(&mut self, other: &BookmarkSet) {
        self.values.extend(other.values.iter().cloned());
    }

    /// 포함 여부
    pub fn contains(&self, bookmark: &str) -> bool {
        self.values.contains(bookmark)
    }

    /// 비었는지
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 개수
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// 정렬된 목록
    pub fn to_vec(&self) -> Vec<String> {
        self.values.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for BookmarkSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// ============================================================================
// SessionConfig - 세션 설정
// ============================================================================

/// 세션 설정
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 데이터베이스 이름 (`None`이면 홈 데이터베이스)
    pub database: Option<String>,
    /// 레코드를 한 번에 가져올 개수. `None`이면 드라이버 기본값, -1이면 전부
    pub fetch_size: Option<i64>,
    /// 기본 접근 모드
    pub default_access_mode: AccessMode,
    /// 시작 북마크
    pub bookmarks: BookmarkSet,
    /// 가장 사용자 (4.4+)
    pub impersonated_user: Option<String>,
    /// 세션 알림 필터 (5.2+). `None`이면 연결 설정을 따름
    pub notification_filter: Option<NotificationFilter>,
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.fetch_size = Some(size);
        self
    }

    /// 접근 모드 설정
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.default_access_mode = mode;
        self
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: BookmarkSet) -> Self {
        self.bookmarks = bookmarks;
        self
    }
}

// ============================================================================
// SessionConfigBuilder - 세션 설정 빌더
// ============================================================================

/// 세션 설정 빌더
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 새 빌더 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.config.database = Some(database.into());
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = Some(size);
        self
    }

    /// 읽기 모드로 설정
    pub fn with_read_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Read;
        self
    }

    /// 쓰기 모드로 설정
    pub fn with_write_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Write;
        self
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: BookmarkSet) -> Self {
        self.config.bookmarks = bookmarks;
        self
    }

    /// 북마크 추가
    pub fn with_bookmark(mut self, bookmark: impl Into<String>) -> Self {
        self.config.bookmarks.fold(&bookmark.into());
        self
    }

    /// 임퍼손트 사용자 설정
    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.config.impersonated_user = Some(user.into());
        self
    }

    /// 알림 필터 설정
    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.config.notification_filter = Some(filter);
        self
    }

    /// 빌드
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// Query - 쿼리
// ============================================================================

/// 쿼리
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// 쿼리 텍스트
    pub text: String,
    /// 파라미터
    pub parameters: HashMap<String, Value>,
}

impl Query {
    /// 새 쿼리 생성
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    /// 파라미터 추가
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 파라미터들 추가
    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// Session - 세션
// ============================================================================

/// 데이터베이스 세션
pub struct Session {
    provider: Arc<dyn ConnectionProvider>,
    config: SessionConfig,
    fetch_size: i64,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    bookmarks: Arc<Mutex<BookmarkSet>>,
    /// 첫 요청에서 확정된 데이터베이스
    pinned_database: Mutex<Option<String>>,
    open: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        provider: Arc<dyn ConnectionProvider>,
        config: SessionConfig,
        default_fetch_size: i64,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bookmarks = Arc::new(Mutex::new(config.bookmarks.clone()));
        Self {
            provider,
            fetch_size: config.fetch_size.unwrap_or(default_fetch_size),
            config,
            retry,
            clock,
            bookmarks,
            pinned_database: Mutex::new(None),
            open: AtomicBool::new(true),
        }
    }

    /// 쿼리 실행 (auto-commit)
    ///
    /// 반환된 스트림이 연결을 소유하며, 결과를 다 읽거나 버리면 연결을
    /// 풀로 돌려주고 북마크를 세션에 반영합니다.
    pub async fn run(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
    ) -> DriverResult<RecordStream<'static>> {
        self.run_with_config(query, params, TransactionConfig::default()).await
    }

    /// 트랜잭션 설정과 함께 쿼리 실행 (auto-commit)
    pub async fn run_with_config(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
        config: TransactionConfig,
    ) -> DriverResult<RecordStream<'static>> {
        self.ensure_open()?;

        let mut query = query.into();
        if let Some(p) = params {
            query = query.with_params(p);
        }

        let mode = self.config.default_access_mode;
        let (mut conn, database) = self.acquire(mode).await?;
        let batch = match self.prepare_run(&conn, &query, mode, database.clone(), &config) {
            Ok(batch) => batch,
            Err(e) => return Err(abandon(conn, e, self.provider.as_ref(), database.as_deref()).await),
        };
        let mut handles = match conn.send(batch).await {
            Ok(handles) => handles,
            Err(e) => return Err(abandon(conn, e, self.provider.as_ref(), database.as_deref()).await),
        };
        let (Some(pull), Some(run)) = (handles.pop(), handles.pop()) else {
            let e = DriverError::protocol("RUN and PULL were not both queued");
            return Err(abandon(conn, e, self.provider.as_ref(), database.as_deref()).await);
        };

        let context = StreamContext {
            provider: self.provider.clone(),
            database,
            bookmarks: Some(self.bookmarks.clone()),
        };
        RecordStream::start(ConnectionRef::Owned(Some(conn)), context, query, run, pull, self.fetch_size).await
    }

    fn prepare_run(
        &self,
        conn: &Connection,
        query: &Query,
        mode: AccessMode,
        database: Option<String>,
        config: &TransactionConfig,
    ) -> DriverResult<Vec<Outgoing>> {
        let parameters = conn.hydration().pack_map(&query.parameters)?;
        let extra = self.transaction_extra(conn, mode, database, config)?;
        Ok(conn
            .protocol()
            .run_auto_commit(&query.text, parameters, extra, self.fetch_size)?)
    }

    /// 명시적 트랜잭션 시작 (기본 접근 모드)
    pub async fn begin_transaction(&self, config: Option<TransactionConfig>) -> DriverResult<Transaction> {
        self.ensure_open()?;
        self.begin(self.config.default_access_mode, config.unwrap_or_default()).await
    }

    async fn begin(&self, mode: AccessMode, config: TransactionConfig) -> DriverResult<Transaction> {
        let (conn, database) = self.acquire(mode).await?;
        let extra = match self.transaction_extra(&conn, mode, database.clone(), &config) {
            Ok(extra) => extra,
            Err(e) => return Err(abandon(conn, e, self.provider.as_ref(), database.as_deref()).await),
        };
        let context = StreamContext {
            provider: self.provider.clone(),
            database,
            bookmarks: Some(self.bookmarks.clone()),
        };
        Transaction::begin(conn, extra, context, self.fetch_size).await
    }

    /// 읽기 트랜잭션 함수
    pub async fn execute_read<T, F>(&self, work: F) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        self.execute(AccessMode::Read, TransactionConfig::default(), work).await
    }

    /// 쓰기 트랜잭션 함수
    pub async fn execute_write<T, F>(&self, work: F) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        self.execute(AccessMode::Write, TransactionConfig::default(), work).await
    }

    /// 트랜잭션 함수 실행 (재시도 포함)
    ///
    /// 성공하면 커밋하고 북마크를 세션에 반영합니다. 재시도 가능한 오류는
    /// 지수 백오프로 다시 시도하고, 그 외 오류는 곧바로 돌려줍니다.
    pub async fn execute<T, F>(&self, mode: AccessMode, config: TransactionConfig, mut work: F) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        self.ensure_open()?;

        let mut state = self.retry.start(self.clock.now());
        loop {
            let error = match self.attempt(mode, &config, &mut work).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let delay = self.retry.on_error(&mut state, error, self.clock.now())?;
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt<T, F>(&self, mode: AccessMode, config: &TransactionConfig, work: &mut F) -> DriverResult<T>
    where
        F: for<'t> FnMut(&'t mut Transaction) -> BoxFuture<'t, DriverResult<T>>,
    {
        let mut tx = self.begin(mode, config.clone()).await?;
        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => Err(tx.close_with(error).await),
        }
    }

    async fn acquire(&self, mode: AccessMode) -> DriverResult<(PooledConnection, Option<String>)> {
        let database = self.database(mode).await?;
        let request = AcquireRequest {
            mode,
            database: database.clone(),
            impersonated_user: self.config.impersonated_user.clone(),
            bookmarks: self.bookmarks.lock().to_vec(),
        };
        let conn = self.provider.acquire(&request).await?;
        Ok((conn, database))
    }

    /// 설정된 데이터베이스, 없으면 공급자가 알려준 홈 데이터베이스로 고정
    async fn database(&self, mode: AccessMode) -> DriverResult<Option<String>> {
        if let Some(db) = &self.config.database {
            return Ok(Some(db.clone()));
        }
        if let Some(db) = self.pinned_database.lock().clone() {
            return Ok(Some(db));
        }

        let request = AcquireRequest {
            mode,
            database: None,
            impersonated_user: self.config.impersonated_user.clone(),
            bookmarks: self.bookmarks.lock().to_vec(),
        };
        let resolved = self.provider.resolve_database(&request).await?;
        if let Some(db) = &resolved {
            debug!(database = %db, "session pinned to home database");
            *self.pinned_database.lock() = Some(db.clone());
        }
        Ok(resolved)
    }

    fn transaction_extra(
        &self,
        conn: &Connection,
        mode: AccessMode,
        database: Option<String>,
        config: &TransactionConfig,
    ) -> DriverResult<TransactionExtra> {
        Ok(TransactionExtra {
            bookmarks: self.bookmarks.lock().to_vec(),
            tx_timeout: config.timeout,
            tx_metadata: conn.hydration().pack_map(&config.metadata)?,
            mode,
            database,
            imp_user: self.config.impersonated_user.clone(),
            notification_filter: self.config.notification_filter.clone().unwrap_or_default(),
        })
    }

    /// 지금까지 모인 북마크
    pub fn last_bookmarks(&self) -> BookmarkSet {
        self.bookmarks.lock().clone()
    }

    /// 세션 닫기. 이후 호출은 오류가 됩니다.
    ///
    /// 세션은 호출 사이에 연결을 쥐고 있지 않습니다. 이미 돌려준 결과와
    /// 트랜잭션은 각자 연결을 가지고 있다가 끝날 때 반환합니다.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DriverError::transaction("session is closed"))
        }
    }

    /// 세션 설정
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.config.database)
            .field("pinned_database", &*self.pinned_database.lock())
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use futures::FutureExt;

    use crate::bolt::message::tag;
    use crate::bolt::{BoltVersion, PackStreamValue};
    use crate::driver::clock::SystemClock;
    use crate::driver::driver::ServerAddress;
    use crate::driver::pool::{ConnectionPool, PoolConfig};
    use crate::driver::provider::DirectConnectionProvider;
    use crate::driver::testkit::{failure, init_tracing, record, success, TestConnector};

    fn session_with(connector: &TestConnector, config: SessionConfig, retry: RetryPolicy) -> Session {
        init_tracing();
        let pool = ConnectionPool::new(
            PoolConfig::default(),
            TestConnector::settings(),
            Arc::new(connector.clone()),
            Arc::new(SystemClock),
        );
        let provider = DirectConnectionProvider::new(ServerAddress::new("db", 7687), Arc::new(pool));
        Session::new(Arc::new(provider), config, 1000, retry, Arc::new(SystemClock))
    }

    fn extra_of(request: &crate::bolt::PackStreamStructure, index: usize) -> crate::bolt::PackStreamMap {
        request.fields[index].as_map().cloned().unwrap_or_default()
    }

    #[test]
    fn test_bookmark_set() {
        let mut set: BookmarkSet = ["b2", "b1", ""].into_iter().collect();
        assert_eq!(set.to_vec(), vec!["b1", "b2"]);

        set.fold("b3");
        set.fold("b1");
        assert_eq!(set.len(), 3);
        assert!(set.contains("b3"));

        let mut other = BookmarkSet::new(["x"]);
        other.union(&set);
        assert_eq!(other.len(), 4);
        assert!(BookmarkSet::default().is_empty());
    }

    #[test]
    fn test_session_config_builder() {
        let config = SessionConfig::builder()
            .with_database("mydb")
            .with_fetch_size(500)
            .with_read_access()
            .with_bookmark("b1")
            .with_impersonated_user("alice")
            .build();

        assert_eq!(config.database, Some("mydb".to_string()));
        assert_eq!(config.fetch_size, Some(500));
        assert_eq!(config.default_access_mode, AccessMode::Read);
        assert_eq!(config.bookmarks.len(), 1);
        assert_eq!(config.impersonated_user.as_deref(), Some("alice"));

        let plain = SessionConfig::new().with_access_mode(AccessMode::Read).with_fetch_size(-1);
        assert_eq!(plain.fetch_size, Some(-1));
        assert_eq!(SessionConfig::default().default_access_mode, AccessMode::Write);
    }

    #[test]
    fn test_query() {
        let query = Query::new("MATCH (n) RETURN n")
            .with_param("name", "Alice")
            .with_param("age", 30i64);

        assert_eq!(query.text, "MATCH (n) RETURN n");
        assert_eq!(query.parameters.get("name"), Some(&Value::String("Alice".into())));
        assert_eq!(query.parameters.get("age"), Some(&Value::Integer(30)));

        let q: Query = "RETURN 1".into();
        assert_eq!(q.text, "RETURN 1");
    }

    #[tokio::test]
    async fn test_begin_carries_bookmarks_and_timeout() {
        let connector = TestConnector::new(BoltVersion::V4_4);
        let config = SessionConfig::builder().with_bookmark("tx1").with_bookmark("tx2").build();
        let session = session_with(&connector, config, RetryPolicy::default());

        let tx = session
            .begin_transaction(Some(TransactionConfig::new().with_timeout(Duration::from_millis(5000))))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let begins = connector.requests(tag::BEGIN);
        assert_eq!(begins.len(), 1);
        let extra = extra_of(&begins[0], 0);
        assert_eq!(
            extra.get("bookmarks"),
            Some(&PackStreamValue::List(vec!["tx1".into(), "tx2".into()]))
        );
        assert_eq!(extra.get("tx_timeout"), Some(&PackStreamValue::Integer(5000)));
    }

    #[tokio::test]
    async fn test_execute_commits_and_folds_bookmark() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => Some(vec![success(vec![("fields", vec![PackStreamValue::from("n")].into())])]),
            tag::PULL => Some(vec![record(vec![1i64.into()]), success(vec![])]),
            _ => None,
        });
        let session = session_with(&connector, SessionConfig::default(), RetryPolicy::default());

        let n = session
            .execute_write(|tx| {
                async move {
                    let record = tx.run("RETURN 1 AS n", None).await?.single().await?;
                    record.get_int("n")
                }
                .boxed()
            })
            .await
            .unwrap();

        assert_eq!(n, 1);
        assert!(session.last_bookmarks().contains("bm:commit"));
        assert_eq!(
            connector.tags(),
            vec![tag::HELLO, tag::LOGON, tag::BEGIN, tag::RUN, tag::PULL, tag::COMMIT]
        );
    }

    #[tokio::test]
    async fn test_auto_commit_run_uses_read_mode() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let config = SessionConfig::builder().with_read_access().with_database("movies").build();
        let session = session_with(&connector, config, RetryPolicy::default());

        let summary = session.run("RETURN 1", None).await.unwrap().consume().await.unwrap();
        assert_eq!(summary.query.text, "RETURN 1");

        let run = &connector.requests(tag::RUN)[0];
        let extra = extra_of(run, 2);
        assert_eq!(extra.get("mode"), Some(&PackStreamValue::from("r")));
        assert_eq!(extra.get("db"), Some(&PackStreamValue::from("movies")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_retried_until_deadline() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let retry = RetryPolicy::default().with_max_retry_time(Duration::from_secs(5));
        let session = session_with(&connector, SessionConfig::default(), retry);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let err = session
            .execute_write(move |_tx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(DriverError::server(
                        "Neo.TransientError.Transaction.DeadlockDetected",
                        "deadlock",
                    ))
                }
                .boxed()
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "RetryTimeoutError");
        assert!(calls.load(Ordering::SeqCst) >= 3);
        // 시도마다 롤백
        assert_eq!(connector.requests(tag::ROLLBACK).len(), calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_runs_once() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let session = session_with(&connector, SessionConfig::default(), RetryPolicy::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let err = session
            .execute_read(move |_tx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(DriverError::server("Neo.ClientError.Statement.SyntaxError", "bad"))
                }
                .boxed()
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_failure_wins_over_work_error() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => Some(vec![success(vec![("fields", vec![PackStreamValue::from("n")].into())])]),
            tag::PULL => Some(vec![record(vec![1i64.into()]), success(vec![("has_more", true.into())])]),
            tag::RESET => Some(vec![failure("Neo.DatabaseError.General.UnknownError", "reset failed")]),
            _ => None,
        });
        let session = session_with(&connector, SessionConfig::default(), RetryPolicy::default());

        let err = session
            .execute_write(|tx| {
                async move {
                    let mut stream = tx.run("UNWIND range(1, 10) AS n RETURN n", None).await?;
                    stream.next().await?;
                    Err::<(), _>(DriverError::server("Neo.ClientError.Statement.SyntaxError", "work"))
                }
                .boxed()
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "Neo.DatabaseError.General.UnknownError");
    }

    #[tokio::test]
    async fn test_work_error_kept_when_rollback_fails() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::ROLLBACK => Some(vec![failure("Neo.ClientError.Transaction.TransactionNotFound", "gone")]),
            _ => None,
        });
        let session = session_with(&connector, SessionConfig::default(), RetryPolicy::default());

        let err = session
            .execute_write(|_tx| {
                async { Err::<(), _>(DriverError::server("Neo.ClientError.Statement.SyntaxError", "work")) }.boxed()
            })
            .await
            .unwrap_err();

        // 롤백 실패는 로그로만, 실패한 연결은 닫힘
        assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");
        assert!(!connector.tags().contains(&tag::RESET));
    }

    #[tokio::test]
    async fn test_closed_session_rejects_work() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let session = session_with(&connector, SessionConfig::default(), RetryPolicy::default());

        session.close();
        let err = session.run("RETURN 1", None).await.unwrap_err();
        assert_eq!(err.code(), "TransactionError");
        assert_eq!(connector.connects(), 0);
    }
}
