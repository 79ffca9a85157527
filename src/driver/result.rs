//! Query results
//!
//! RUN과 첫 PULL은 한 번에 보내고, 레코드는 `fetch_size` 단위로 끌어옵니다.
//! 서버가 `has_more`를 돌려주면 다음 PULL을, 결과를 버릴 때는 DISCARD를
//! 보냅니다.
//!
//! 자동 커밋 결과는 연결을 직접 소유하다가 요약을 받는 순간 풀로
//! 돌려주고 북마크를 세션에 반영합니다. 트랜잭션 결과는 트랜잭션의 연결을
//! 빌려 쓰며, 다 읽지 않고 버려진 결과는 트랜잭션이 다음 요청 전에
//! 마저 처리합니다.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use parking_lot::Mutex;
use tracing::debug;

use super::bolt::{ResponseEvent, ResponseHandle};
use super::driver::{ServerAddress, ServerInfo};
use super::error::{DriverError, DriverResult};
use super::pool::PooledConnection;
use super::provider::ConnectionProvider;
use super::record::{Keys, Record};
use super::session::{BookmarkSet, Query};
use crate::bolt::{QueryPlan, QueryStats, SuccessMessage};

// ============================================================================
// ResultSummary - 결과 요약
// ============================================================================

/// 결과 요약
#[derive(Debug, Clone, Default)]
pub struct ResultSummary {
    /// 쿼리
    pub query: Query,
    /// 쿼리 타입
    pub query_type: QueryType,
    /// 카운터
    pub counters: Counters,
    /// 첫 레코드까지 걸린 서버 시간
    pub result_available_after: Option<Duration>,
    /// 결과를 모두 소비하는 데 걸린 서버 시간
    pub result_consumed_after: Option<Duration>,
    /// 쿼리가 실행된 데이터베이스
    pub database: Option<String>,
    /// 응답한 서버
    pub server: ServerInfo,
    /// 알림
    pub notifications: Vec<Notification>,
    /// EXPLAIN 계획
    pub plan: Option<QueryPlan>,
    /// PROFILE 계획
    pub profile: Option<QueryPlan>,
    /// 자동 커밋 결과의 북마크
    pub bookmark: Option<String>,
}

impl ResultSummary {
    fn from_metadata(
        query: Query,
        server: ServerInfo,
        available_after: Option<i64>,
        last: &SuccessMessage,
    ) -> Self {
        let millis = |ms: i64| Duration::from_millis(ms.max(0) as u64);
        Self {
            query,
            query_type: last
                .query_type()
                .and_then(QueryType::from_code)
                .unwrap_or_default(),
            counters: last.stats().map(Counters::from).unwrap_or_default(),
            result_available_after: available_after.map(millis),
            result_consumed_after: last.result_consumed_after().map(millis),
            database: last.db().map(str::to_string),
            server,
            notifications: last.notifications().into_iter().map(Notification::from).collect(),
            plan: last.plan(),
            profile: last.profile(),
            bookmark: last.bookmark().map(str::to_string),
        }
    }
}

/// 쿼리 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    /// 읽기 전용
    #[default]
    ReadOnly,
    /// 읽기/쓰기
    ReadWrite,
    /// 쓰기 전용
    WriteOnly,
    /// 스키마 변경
    SchemaWrite,
}

impl QueryType {
    /// 서버의 `type` 코드 ("r", "rw", "w", "s")
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "r" => Some(Self::ReadOnly),
            "rw" => Some(Self::ReadWrite),
            "w" => Some(Self::WriteOnly),
            "s" => Some(Self::SchemaWrite),
            _ => None,
        }
    }
}

/// 카운터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    /// 생성된 노드 수
    pub nodes_created: i64,
    /// 삭제된 노드 수
    pub nodes_deleted: i64,
    /// 생성된 관계 수
    pub relationships_created: i64,
    /// 삭제된 관계 수
    pub relationships_deleted: i64,
    /// 설정된 속성 수
    pub properties_set: i64,
    /// 추가된 레이블 수
    pub labels_added: i64,
    /// 제거된 레이블 수
    pub labels_removed: i64,
    /// 생성된 인덱스 수
    pub indexes_added: i64,
    /// 제거된 인덱스 수
    pub indexes_removed: i64,
    /// 추가된 제약조건 수
    pub constraints_added: i64,
    /// 제거된 제약조건 수
    pub constraints_removed: i64,
    /// 시스템 데이터베이스 변경 수
    pub system_updates: i64,
    updates_flag: bool,
    system_updates_flag: bool,
}

impl Counters {
    /// 변경 사항 존재 여부
    pub fn contains_updates(&self) -> bool {
        self.updates_flag
            || self.nodes_created > 0
            || self.nodes_deleted > 0
            || self.relationships_created > 0
            || self.relationships_deleted > 0
            || self.properties_set > 0
            || self.labels_added > 0
            || self.labels_removed > 0
            || self.indexes_added > 0
            || self.indexes_removed > 0
            || self.constraints_added > 0
            || self.constraints_removed > 0
    }

    /// 시스템 변경 존재 여부
    pub fn contains_system_updates(&self) -> bool {
        self.system_updates_flag || self.system_updates > 0
    }
}

impl From<QueryStats> for Counters {
    fn from(stats: QueryStats) -> Self {
        Self {
            nodes_created: stats.nodes_created,
            nodes_deleted: stats.nodes_deleted,
            relationships_created: stats.relationships_created,
            relationships_deleted: stats.relationships_deleted,
            properties_set: stats.properties_set,
            labels_added: stats.labels_added,
            labels_removed: stats.labels_removed,
            indexes_added: stats.indexes_added,
            indexes_removed: stats.indexes_removed,
            constraints_added: stats.constraints_added,
            constraints_removed: stats.constraints_removed,
            system_updates: stats.system_updates,
            updates_flag: stats.contains_updates,
            system_updates_flag: stats.contains_system_updates,
        }
    }
}

/// 알림
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// 코드
    pub code: String,
    /// 제목
    pub title: String,
    /// 설명
    pub description: String,
    /// 심각도
    pub severity: String,
    /// 분류 (5.2+)
    pub category: Option<String>,
    /// 위치
    pub position: Option<InputPosition>,
}

/// 입력 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPosition {
    /// 오프셋
    pub offset: i64,
    /// 라인
    pub line: i64,
    /// 컬럼
    pub column: i64,
}

impl From<crate::bolt::Notification> for Notification {
    fn from(n: crate::bolt::Notification) -> Self {
        Self {
            code: n.code,
            title: n.title,
            description: n.description,
            severity: n.severity,
            category: n.category,
            position: n.position.map(|p| InputPosition {
                offset: p.offset,
                line: p.line,
                column: p.column,
            }),
        }
    }
}

// ============================================================================
// RecordStream - 스트리밍 결과
// ============================================================================

/// 트랜잭션에 남겨진, 다 읽지 않은 결과
#[derive(Debug)]
pub(crate) struct Leftover {
    pull: ResponseHandle,
    qid: Option<i64>,
}

/// 결과가 쓰는 연결
pub(crate) enum ConnectionRef<'a> {
    /// 자동 커밋: 결과가 연결을 소유
    Owned(Option<PooledConnection>),
    /// 트랜잭션: 연결을 빌리고, 버려지면 남은 스트림을 `leftover`에 둠
    Borrowed {
        conn: &'a mut PooledConnection,
        leftover: &'a mut Option<Leftover>,
    },
}

impl ConnectionRef<'_> {
    fn get(&mut self) -> DriverResult<&mut PooledConnection> {
        match self {
            ConnectionRef::Owned(Some(conn)) => Ok(conn),
            ConnectionRef::Owned(None) => {
                Err(DriverError::transaction("result has already released its connection"))
            }
            ConnectionRef::Borrowed { conn, .. } => Ok(conn),
        }
    }

    fn address(&self) -> Option<ServerAddress> {
        match self {
            ConnectionRef::Owned(conn) => conn.as_ref().map(|c| c.address().clone()),
            ConnectionRef::Borrowed { conn, .. } => Some(conn.address().clone()),
        }
    }
}

/// 결과가 끝날 때 오류와 북마크를 알릴 곳
#[derive(Clone)]
pub(crate) struct StreamContext {
    pub(crate) provider: Arc<dyn ConnectionProvider>,
    pub(crate) database: Option<String>,
    /// 자동 커밋 결과만 `Some`
    pub(crate) bookmarks: Option<Arc<Mutex<BookmarkSet>>>,
}

/// 스트리밍 레코드 결과
///
/// [`next`](Self::next)로 하나씩 읽거나 [`collect`](Self::collect)로 모두
/// 읽습니다. [`consume`](Self::consume)은 남은 레코드를 서버에서 버리고
/// 요약만 받습니다.
pub struct RecordStream<'a> {
    conn: ConnectionRef<'a>,
    context: StreamContext,
    query: Query,
    keys: Arc<Keys>,
    qid: Option<i64>,
    fetch_size: i64,
    pull: Option<ResponseHandle>,
    available_after: Option<i64>,
    summary: Option<ResultSummary>,
    failed: bool,
}

impl<'a> RecordStream<'a> {
    /// RUN 응답을 기다려 키를 얻은 뒤 스트림을 만듭니다.
    pub(crate) async fn start(
        conn: ConnectionRef<'a>,
        context: StreamContext,
        query: Query,
        mut run: ResponseHandle,
        pull: ResponseHandle,
        fetch_size: i64,
    ) -> DriverResult<RecordStream<'a>> {
        let mut stream = Self {
            conn,
            context,
            query,
            keys: Keys::new(Vec::new()),
            qid: None,
            fetch_size,
            pull: Some(pull),
            available_after: None,
            summary: None,
            failed: false,
        };

        let outcome = match stream.conn.get() {
            Ok(conn) => conn.summary(&mut run).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(success) => {
                stream.keys = Keys::new(success.fields().unwrap_or_default());
                stream.qid = success.qid();
                stream.available_after = success.result_available_after();
                Ok(stream)
            }
            Err(e) => {
                // 함께 보낸 PULL은 IGNORED로 끝남
                if !e.is_connection_fatal() {
                    if let (Some(mut pull), Ok(conn)) = (stream.pull.take(), stream.conn.get()) {
                        let _ = conn.summary(&mut pull).await;
                    }
                }
                Err(stream.fail(e).await)
            }
        }
    }

    /// 결과 컬럼 이름
    pub fn keys(&self) -> &[String] {
        self.keys.names()
    }

    /// 요약을 이미 받았는지
    pub fn is_finished(&self) -> bool {
        self.summary.is_some()
    }

    /// 다음 레코드. 끝나면 `None`.
    pub async fn next(&mut self) -> DriverResult<Option<Record>> {
        loop {
            if self.failed {
                return Err(DriverError::transaction("result has already failed"));
            }
            let Some(mut handle) = self.pull.take() else {
                return Ok(None);
            };
            let conn = self.conn.get()?;
            let event = match conn.next_event(&mut handle).await {
                Ok(event) => event,
                Err(e) => return Err(self.fail(e).await),
            };

            match event {
                ResponseEvent::Record(fields) => {
                    let hydration = conn.hydration();
                    let values = fields
                        .into_iter()
                        .map(|raw| hydration.hydrate(raw))
                        .collect::<DriverResult<Vec<_>>>();
                    self.pull = Some(handle);
                    return values.map(|v| Some(Record::new(self.keys.clone(), v)));
                }
                ResponseEvent::Success(success) if success.has_more() => {
                    let next = conn.protocol().pull(self.fetch_size, self.qid);
                    match conn.send(vec![next]).await {
                        Ok(mut handles) => self.pull = handles.pop(),
                        Err(e) => return Err(self.fail(e).await),
                    }
                }
                ResponseEvent::Success(success) => {
                    self.finish(success).await?;
                    return Ok(None);
                }
                ResponseEvent::Failure(failure) => return Err(self.fail(failure.into()).await),
                ResponseEvent::Ignored => {
                    return Err(self.fail(DriverError::transaction("PULL was ignored")).await)
                }
            }
        }
    }

    /// 남은 레코드를 버리고 요약 반환
    pub async fn consume(&mut self) -> DriverResult<ResultSummary> {
        loop {
            if let Some(summary) = &self.summary {
                return Ok(summary.clone());
            }
            if self.failed {
                return Err(DriverError::transaction("result has already failed"));
            }
            let Some(mut handle) = self.pull.take() else {
                return Err(DriverError::transaction("result has no summary"));
            };
            let conn = self.conn.get()?;
            let outcome = match conn.summary(&mut handle).await {
                Ok(success) if success.has_more() => {
                    let discard = conn.protocol().discard(self.qid);
                    conn.send(vec![discard]).await.map(|mut handles| {
                        self.pull = handles.pop();
                    })
                }
                Ok(success) => {
                    self.finish(success).await?;
                    continue;
                }
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                return Err(self.fail(e).await);
            }
        }
    }

    /// 모든 레코드 수집
    pub async fn collect(mut self) -> DriverResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// 정확히 한 레코드
    pub async fn single(mut self) -> DriverResult<Record> {
        let first = self.next().await?;
        let extra = self.next().await?;
        match (first, extra) {
            (Some(record), None) => Ok(record),
            (None, _) => Err(DriverError::transaction("expected exactly one record, got none")),
            (Some(_), Some(_)) => {
                self.consume().await?;
                Err(DriverError::transaction("expected exactly one record, got more"))
            }
        }
    }

    /// 레코드와 요약을 함께 수집
    pub async fn into_result(mut self) -> DriverResult<QueryResult> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        let summary = self.consume().await?;
        Ok(QueryResult {
            keys: self.keys.names().to_vec(),
            records,
            summary,
        })
    }

    /// `futures::Stream`으로 변환. 오류 뒤에는 스트림이 끝납니다.
    pub fn into_stream(self) -> impl Stream<Item = DriverResult<Record>> + 'a {
        stream::unfold((self, false), |(mut records, failed)| async move {
            if failed {
                return None;
            }
            match records.next().await {
                Ok(Some(record)) => Some((Ok(record), (records, false))),
                Ok(None) => None,
                Err(e) => Some((Err(e), (records, true))),
            }
        })
    }

    async fn finish(&mut self, last: SuccessMessage) -> DriverResult<()> {
        let conn = self.conn.get()?;
        let server = ServerInfo::of(conn);
        let summary = ResultSummary::from_metadata(self.query.clone(), server, self.available_after, &last);

        if let ConnectionRef::Owned(slot) = &mut self.conn {
            if let (Some(bookmark), Some(bookmarks)) = (&summary.bookmark, &self.context.bookmarks) {
                bookmarks.lock().fold(bookmark);
            }
            self.summary = Some(summary);
            if let Some(conn) = slot.take() {
                conn.release().await?;
            }
            return Ok(());
        }
        self.summary = Some(summary);
        Ok(())
    }

    async fn fail(&mut self, error: DriverError) -> DriverError {
        self.failed = true;
        self.pull = None;

        if let Some(address) = self.conn.address() {
            self.context
                .provider
                .on_error(&address, self.context.database.as_deref(), &error)
                .await;
        }
        if let ConnectionRef::Owned(slot) = &mut self.conn {
            if let Some(conn) = slot.take() {
                if error.is_connection_fatal() {
                    conn.discard().await;
                } else if let Err(release_error) = conn.release().await {
                    debug!(error = %error, "connection release failed after query error");
                    return release_error;
                }
            }
        }
        error
    }
}

impl Drop for RecordStream<'_> {
    fn drop(&mut self) {
        if let ConnectionRef::Borrowed { leftover, .. } = &mut self.conn {
            if let Some(pull) = self.pull.take() {
                **leftover = Some(Leftover { pull, qid: self.qid });
            }
        }
    }
}

impl std::fmt::Debug for RecordStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("keys", &self.keys.names())
            .field("qid", &self.qid)
            .field("finished", &self.summary.is_some())
            .field("failed", &self.failed)
            .finish()
    }
}

/// 트랜잭션에 남은 결과를 끝까지 버립니다.
pub(crate) async fn discard_leftover(
    conn: &mut PooledConnection,
    leftover: &mut Option<Leftover>,
) -> DriverResult<()> {
    let Some(Leftover { mut pull, qid }) = leftover.take() else {
        return Ok(());
    };
    loop {
        let success = conn.summary(&mut pull).await?;
        if !success.has_more() {
            return Ok(());
        }
        let discard = conn.protocol().discard(qid);
        let mut handles = conn.send(vec![discard]).await?;
        match handles.pop() {
            Some(handle) => pull = handle,
            None => return Ok(()),
        }
    }
}

// ============================================================================
// QueryResult - 모두 읽은 결과
// ============================================================================

/// 모두 읽은 쿼리 결과
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// 컬럼 키
    pub keys: Vec<String>,
    /// 레코드
    pub records: Vec<Record>,
    /// 결과 요약
    pub summary: ResultSummary,
}

impl QueryResult {
    /// 단일 레코드 가져오기
    pub fn single(mut self) -> DriverResult<Record> {
        match self.records.len() {
            1 => Ok(self.records.remove(0)),
            n => Err(DriverError::transaction(format!("expected exactly one record, got {}", n))),
        }
    }

    /// 첫 번째 레코드
    pub fn first(self) -> Option<Record> {
        self.records.into_iter().next()
    }
}

impl IntoIterator for QueryResult {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::tag;
    use crate::bolt::{BoltVersion, PackStreamValue};
    use crate::driver::clock::SystemClock;
    use crate::driver::pool::{ConnectionPool, PoolConfig};
    use crate::driver::provider::DirectConnectionProvider;
    use crate::driver::testkit::{failure, record, success, TestConnector};
    use crate::driver::types::Value;
    use tokio_stream::StreamExt;

    fn fixture(connector: &TestConnector) -> (Arc<ConnectionPool>, StreamContext) {
        let pool = Arc::new(ConnectionPool::new(
            PoolConfig::default(),
            TestConnector::settings(),
            Arc::new(connector.clone()),
            Arc::new(SystemClock),
        ));
        let provider = DirectConnectionProvider::new(ServerAddress::new("db", 7687), pool.clone());
        let context = StreamContext {
            provider: Arc::new(provider),
            database: None,
            bookmarks: Some(Arc::new(Mutex::new(BookmarkSet::default()))),
        };
        (pool, context)
    }

    async fn auto_commit(
        pool: &ConnectionPool,
        context: StreamContext,
        text: &str,
        fetch_size: i64,
    ) -> DriverResult<RecordStream<'static>> {
        let mut conn = pool.acquire(&ServerAddress::new("db", 7687)).await?;
        let batch = conn.protocol().run_auto_commit(
            text,
            Default::default(),
            Default::default(),
            fetch_size,
        )?;
        let mut handles = conn.send(batch).await?;
        let pull = handles.pop().unwrap();
        let run = handles.pop().unwrap();
        RecordStream::start(ConnectionRef::Owned(Some(conn)), context, Query::new(text), run, pull, fetch_size)
            .await
    }

    /// PULL마다 레코드 2개씩, 총 5개
    fn paging_server() -> TestConnector {
        let served = Arc::new(std::sync::atomic::AtomicI64::new(0));
        TestConnector::with_handler(BoltVersion::V5_4, move |_, req| match req.tag {
            tag::RUN => Some(vec![success(vec![
                ("fields", vec![PackStreamValue::from("n")].into()),
                ("t_first", 3i64.into()),
            ])]),
            tag::PULL => {
                let start = served.fetch_add(2, std::sync::atomic::Ordering::SeqCst);
                let mut out: Vec<_> = (start..(start + 2).min(5)).map(|n| record(vec![n.into()])).collect();
                if start + 2 < 5 {
                    out.push(success(vec![("has_more", true.into())]));
                } else {
                    out.push(success(vec![
                        ("bookmark", "bm:5".into()),
                        ("type", "r".into()),
                        ("t_last", 7i64.into()),
                        ("db", "neo4j".into()),
                    ]));
                }
                Some(out)
            }
            tag::DISCARD => Some(vec![success(vec![("bookmark", "bm:discarded".into()), ("type", "r".into())])]),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_pulls_in_batches() {
        let connector = paging_server();
        let (pool, context) = fixture(&connector);
        let bookmarks = context.bookmarks.clone().unwrap();

        let stream = auto_commit(&pool, context, "UNWIND range(0, 4) AS n RETURN n", 2).await.unwrap();
        assert_eq!(stream.keys(), &["n"]);
        let records = stream.collect().await.unwrap();

        let values: Vec<i64> = records.iter().map(|r| r.get_int("n").unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
        assert_eq!(connector.requests(tag::PULL).len(), 3);
        assert_eq!(bookmarks.lock().to_vec(), vec!["bm:5".to_string()]);
        // 연결은 풀로 돌아감
        assert_eq!(pool.idle_count(&ServerAddress::new("db", 7687)), 1);
    }

    #[tokio::test]
    async fn test_consume_discards_rest() {
        let connector = paging_server();
        let (pool, context) = fixture(&connector);

        let mut stream = auto_commit(&pool, context, "UNWIND range(0, 4) AS n RETURN n", 2).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.get("n"), Some(&Value::Integer(0)));

        let summary = stream.consume().await.unwrap();
        assert_eq!(summary.bookmark.as_deref(), Some("bm:discarded"));
        assert_eq!(summary.query_type, QueryType::ReadOnly);
        assert_eq!(summary.result_available_after, Some(Duration::from_millis(3)));
        assert_eq!(connector.requests(tag::DISCARD).len(), 1);
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_summary_metadata() {
        let connector = paging_server();
        let (pool, context) = fixture(&connector);

        let mut stream = auto_commit(&pool, context, "RETURN 1", 100).await.unwrap();
        while stream.next().await.unwrap().is_some() {}
        let summary = stream.consume().await.unwrap();

        assert_eq!(summary.database.as_deref(), Some("neo4j"));
        assert_eq!(summary.result_consumed_after, Some(Duration::from_millis(7)));
        assert_eq!(summary.server.address, ServerAddress::new("db", 7687));
        assert_eq!(summary.server.agent.as_deref(), Some("Neo4j/5.13.0"));
        assert_eq!(summary.query.text, "RETURN 1");
    }

    #[tokio::test]
    async fn test_run_failure_destroys_connection() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => Some(vec![failure("Neo.ClientError.Statement.SyntaxError", "bad")]),
            _ => None,
        });
        let (pool, context) = fixture(&connector);

        let err = auto_commit(&pool, context, "RETRUN 1", 100).await.unwrap_err();
        assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");
        // 실패한 연결은 RESET 없이 닫힘
        assert_eq!(
            connector.tags()[..4],
            [tag::HELLO, tag::LOGON, tag::RUN, tag::PULL]
        );
        assert!(connector.requests(tag::RESET).is_empty());
        assert_eq!(pool.idle_count(&ServerAddress::new("db", 7687)), 0);
        assert_eq!(pool.in_use_count(&ServerAddress::new("db", 7687)), 0);
    }

    #[tokio::test]
    async fn test_into_stream_and_single() {
        let connector = paging_server();
        let (pool, context) = fixture(&connector);

        let stream = auto_commit(&pool, context.clone(), "RETURN n", 100).await.unwrap();
        let values: Vec<_> = stream.into_stream().collect().await;
        assert_eq!(values.len(), 5);
        assert!(values.iter().all(|r| r.is_ok()));

        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => Some(vec![success(vec![("fields", vec![PackStreamValue::from("x")].into())])]),
            tag::PULL => Some(vec![record(vec![42i64.into()]), success(vec![])]),
            _ => None,
        });
        let (pool, context) = fixture(&connector);
        let one = auto_commit(&pool, context, "RETURN 42 AS x", 100).await.unwrap();
        assert_eq!(one.single().await.unwrap().get_int("x").unwrap(), 42);
    }

    #[test]
    fn test_counters() {
        let stats = QueryStats {
            nodes_created: 1,
            ..Default::default()
        };
        let counters = Counters::from(stats);
        assert!(counters.contains_updates());
        assert!(!counters.contains_system_updates());

        let system = Counters::from(QueryStats {
            system_updates: 2,
            ..Default::default()
        });
        assert!(system.contains_system_updates());
        assert!(!system.contains_updates());
    }

    #[test]
    fn test_query_type_codes() {
        assert_eq!(QueryType::from_code("rw"), Some(QueryType::ReadWrite));
        assert_eq!(QueryType::from_code("s"), Some(QueryType::SchemaWrite));
        assert_eq!(QueryType::from_code("x"), None);
    }
}
