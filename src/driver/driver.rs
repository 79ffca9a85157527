//! Driver
//!
//! 드라이버 인스턴스 및 설정. `bolt://` URI는 단일 서버에 직접 연결하고,
//! `neo4j://` URI는 라우팅 테이블로 클러스터 멤버를 고릅니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::bolt::{Connection, ConnectionSettings, Connector, DnsResolver, Resolver, TcpConnector};
use super::clock::{Clock, SystemClock};
use super::error::{DriverError, DriverResult};
use super::hydration::IntegerMode;
use super::pool::{ConnectionPool, PoolConfig, PoolMetrics};
use super::provider::{AcquireRequest, ConnectionProvider, DirectConnectionProvider};
use super::result::QueryResult;
use super::retry::RetryPolicy;
use super::routing::{HomeDatabaseCache, RoutingConnectionProvider, RoutingPolicy};
use super::session::{BookmarkSet, Query, Session, SessionConfig};
use super::transaction::TransactionConfig;
use super::types::Value;
use crate::bolt::{AccessMode, AuthToken, BoltVersion, NotificationFilter, PackStreamMap};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` 파싱. IPv6 호스트는 `[::1]:7687` 형식
    pub fn parse(s: &str) -> DriverResult<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| DriverError::configuration(format!("address '{}' has no port", s)))?;
        let port = port
            .parse()
            .map_err(|_| DriverError::configuration(format!("invalid port in address '{}'", s)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(DriverError::configuration(format!("address '{}' has no host", s)));
        }
        Ok(Self::new(host, port))
    }

    /// 포트가 없으면 기본 포트로 파싱
    fn parse_with_default_port(s: &str) -> DriverResult<Self> {
        let has_port = match s.rfind(']') {
            Some(end) => s[end..].contains(':'),
            None => s.contains(':'),
        };
        if has_port {
            Self::parse(s)
        } else {
            let host = s.trim_start_matches('[').trim_end_matches(']');
            if host.is_empty() {
                return Err(DriverError::configuration("URI has no host"));
            }
            Ok(Self::new(host, DEFAULT_PORT))
        }
    }

    /// 소켓 주소 문자열
    pub fn to_socket_addr(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// DriverUri - 접속 URI
// ============================================================================

/// 파싱된 접속 URI
#[derive(Debug, Clone, PartialEq)]
pub struct DriverUri {
    /// 시드 주소
    pub address: ServerAddress,
    /// 라우팅 여부 (`neo4j://`)
    pub routing: bool,
    /// 쿼리 파라미터에서 온 라우팅 컨텍스트
    pub routing_context: HashMap<String, String>,
}

impl DriverUri {
    /// `bolt://host:port` 또는 `neo4j://host:port?region=eu` 파싱
    pub fn parse(uri: &str) -> DriverResult<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| DriverError::configuration(format!("URI '{}' has no scheme", uri)))?;
        let routing = match scheme {
            "bolt" => false,
            "neo4j" => true,
            "bolt+s" | "bolt+ssc" | "neo4j+s" | "neo4j+ssc" => {
                return Err(DriverError::configuration(format!(
                    "scheme '{}' needs a TLS connector; use bolt:// or neo4j:// with a custom Connector",
                    scheme
                )))
            }
            other => return Err(DriverError::configuration(format!("unsupported URI scheme '{}'", other))),
        };

        let (authority, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };
        let address = ServerAddress::parse_with_default_port(authority.trim_end_matches('/'))?;

        let mut routing_context = HashMap::new();
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            if !routing {
                return Err(DriverError::configuration("routing context is only allowed for neo4j:// URIs"));
            }
            for pair in query.split('&') {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| DriverError::configuration(format!("invalid routing context '{}'", pair)))?;
                if key == "address" {
                    return Err(DriverError::configuration("routing context cannot override 'address'"));
                }
                if routing_context.insert(key.to_string(), value.to_string()).is_some() {
                    return Err(DriverError::configuration(format!("duplicate routing context key '{}'", key)));
                }
            }
        }

        Ok(Self {
            address,
            routing,
            routing_context,
        })
    }
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
#[derive(Clone)]
pub struct DriverConfig {
    /// 접속 URI
    pub uri: DriverUri,
    /// 인증 토큰
    pub auth: AuthToken,
    /// User Agent
    pub user_agent: String,
    /// 주소별 연결 풀 최대 크기
    pub max_connection_pool_size: usize,
    /// 연결 획득 타임아웃
    pub connection_acquisition_timeout: Duration,
    /// 연결(핸드셰이크 + HELLO) 타임아웃
    pub connection_timeout: Duration,
    /// 연결 최대 수명
    pub max_connection_lifetime: Duration,
    /// 유휴 연결 타임아웃
    pub idle_timeout: Duration,
    /// 읽기 타임아웃
    pub read_timeout: Option<Duration>,
    /// 트랜잭션 함수 재시도 정책
    pub retry: RetryPolicy,
    /// 기본 Fetch Size
    pub fetch_size: i64,
    /// 정수 표현
    pub integer_mode: IntegerMode,
    /// 홈 데이터베이스 캐시 수명
    pub max_home_database_delay: Duration,
    /// 연결 단위 알림 필터
    pub notification_filter: NotificationFilter,
    /// 라우팅 서버 선택 정책
    pub routing_policy: RoutingPolicy,
    /// 전송 계층
    pub connector: Arc<dyn Connector>,
    /// 시드 주소 해석기
    pub resolver: Arc<dyn Resolver>,
    /// 시계
    pub clock: Arc<dyn Clock>,
}

impl DriverConfig {
    /// 새 설정 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        Ok(Self {
            uri: DriverUri::parse(uri)?,
            auth,
            user_agent: format!("bolt-driver/{}", env!("CARGO_PKG_VERSION")),
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            max_connection_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(300),
            read_timeout: None,
            retry: RetryPolicy::default(),
            fetch_size: 1000,
            integer_mode: IntegerMode::default(),
            max_home_database_delay: Duration::from_secs(5),
            notification_filter: NotificationFilter::default(),
            routing_policy: RoutingPolicy::default(),
            connector: Arc::new(TcpConnector),
            resolver: Arc::new(DnsResolver),
            clock: Arc::new(SystemClock),
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.uri.address
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig::builder()
            .max_size(self.max_connection_pool_size)
            .max_idle_time(self.idle_timeout)
            .max_lifetime(self.max_connection_lifetime)
            .acquisition_timeout(self.connection_acquisition_timeout)
            .build()
    }

    fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            user_agent: self.user_agent.clone(),
            auth: self.auth.clone(),
            routing_context: self.uri.routing.then(|| self.routing_context()),
            notification_filter: self.notification_filter.clone(),
            integer_mode: self.integer_mode,
            connect_timeout: self.connection_timeout,
            read_timeout: self.read_timeout,
            ..ConnectionSettings::default()
        }
    }

    fn routing_context(&self) -> PackStreamMap {
        let mut context: PackStreamMap = self
            .uri
            .routing_context
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().into()))
            .collect();
        context.insert("address".to_string(), self.uri.address.to_string().into());
        context
    }
}

impl fmt::Debug for DriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverConfig")
            .field("uri", &self.uri)
            .field("auth", &self.auth)
            .field("user_agent", &self.user_agent)
            .field("max_connection_pool_size", &self.max_connection_pool_size)
            .field("connection_acquisition_timeout", &self.connection_acquisition_timeout)
            .field("connection_timeout", &self.connection_timeout)
            .field("retry", &self.retry)
            .field("fetch_size", &self.fetch_size)
            .field("integer_mode", &self.integer_mode)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
#[derive(Debug)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// 연결 풀 크기 설정
    pub fn with_max_connection_pool_size(mut self, size: usize) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 연결 최대 수명 설정
    pub fn with_max_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_connection_lifetime = lifetime;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// 읽기 타임아웃 설정
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// 최대 트랜잭션 재시도 시간 설정
    pub fn with_max_transaction_retry_time(mut self, time: Duration) -> Self {
        self.config.retry.max_retry_time = time;
        self
    }

    /// 재시도 정책 설정
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Fetch Size 설정 (-1이면 전부)
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = size;
        self
    }

    /// 정수 표현 설정
    pub fn with_integer_mode(mut self, mode: IntegerMode) -> Self {
        self.config.integer_mode = mode;
        self
    }

    /// 홈 데이터베이스 캐시 수명 설정
    pub fn with_max_home_database_delay(mut self, delay: Duration) -> Self {
        self.config.max_home_database_delay = delay;
        self
    }

    /// 알림 필터 설정
    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.config.notification_filter = filter;
        self
    }

    /// 라우팅 정책 설정
    pub fn with_routing_policy(mut self, policy: RoutingPolicy) -> Self {
        self.config.routing_policy = policy;
        self
    }

    /// 전송 계층 교체
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.config.connector = connector;
        self
    }

    /// 주소 해석기 교체
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.config.resolver = resolver;
        self
    }

    /// 시계 교체
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = clock;
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// QueryConfig - execute_query 설정
// ============================================================================

/// 쿼리를 보낼 서버 역할
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingControl {
    /// 리더
    Readers,
    /// 라이터
    #[default]
    Writers,
}

impl RoutingControl {
    fn access_mode(self) -> AccessMode {
        match self {
            Self::Readers => AccessMode::Read,
            Self::Writers => AccessMode::Write,
        }
    }
}

/// [`Driver::execute_query`] 설정
#[derive(Debug, Clone, Default)]
pub struct QueryConfig {
    /// 서버 역할
    pub routing: RoutingControl,
    /// 데이터베이스
    pub database: Option<String>,
    /// 가장 사용자
    pub impersonated_user: Option<String>,
    /// 시작 북마크
    pub bookmarks: Option<BookmarkSet>,
}

impl QueryConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 리더로 보내기
    pub fn with_readers(mut self) -> Self {
        self.routing = RoutingControl::Readers;
        self
    }

    /// 데이터베이스 설정
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// 가장 사용자 설정
    pub fn with_impersonated_user(mut self, user: impl Into<String>) -> Self {
        self.impersonated_user = Some(user.into());
        self
    }

    /// 북마크 설정
    pub fn with_bookmarks(mut self, bookmarks: BookmarkSet) -> Self {
        self.bookmarks = Some(bookmarks);
        self
    }
}

// ============================================================================
// Driver - 드라이버
// ============================================================================

/// 그래프 데이터베이스 드라이버
///
/// 연결 풀과 (라우팅이면) 라우팅 테이블을 소유하며 여러 태스크가 공유해도
/// 됩니다. 세션은 가볍게 만들고 버리는 단위입니다.
pub struct Driver {
    config: DriverConfig,
    pool: Arc<ConnectionPool>,
    provider: Arc<dyn ConnectionProvider>,
    open: RwLock<bool>,
}

impl Driver {
    /// 새 드라이버 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let config = DriverConfig::new(uri, auth)?;
        Self::with_config(config)
    }

    /// 설정으로 드라이버 생성
    pub fn with_config(config: DriverConfig) -> DriverResult<Self> {
        if config.max_connection_pool_size == 0 {
            return Err(DriverError::configuration("max_connection_pool_size must be positive"));
        }
        if config.fetch_size == 0 || config.fetch_size < -1 {
            return Err(DriverError::configuration("fetch_size must be positive or -1"));
        }

        let pool = Arc::new(ConnectionPool::new(
            config.pool_config(),
            config.connection_settings(),
            config.connector.clone(),
            config.clock.clone(),
        ));

        let provider: Arc<dyn ConnectionProvider> = if config.uri.routing {
            let home_db = HomeDatabaseCache::new(config.max_home_database_delay, config.clock.clone());
            Arc::new(RoutingConnectionProvider::new(
                config.uri.address.clone(),
                config.routing_context(),
                pool.clone(),
                config.resolver.clone(),
                config.clock.clone(),
                home_db,
                config.routing_policy,
            ))
        } else {
            Arc::new(DirectConnectionProvider::new(config.uri.address.clone(), pool.clone()))
        };

        info!(
            address = %config.uri.address,
            routing = config.uri.routing,
            "driver created"
        );
        Ok(Self {
            config,
            pool,
            provider,
            open: RwLock::new(true),
        })
    }

    /// 세션 생성
    pub fn session(&self, config: SessionConfig) -> DriverResult<Session> {
        self.ensure_open()?;
        Ok(Session::new(
            self.provider.clone(),
            config,
            self.config.fetch_size,
            self.config.retry.clone(),
            self.config.clock.clone(),
        ))
    }

    /// 기본 설정으로 세션 생성
    pub fn default_session(&self) -> DriverResult<Session> {
        self.session(SessionConfig::default())
    }

    /// 관리 트랜잭션 하나로 쿼리를 실행하고 결과를 모두 읽습니다.
    ///
    /// 재시도 규칙은 [`Session::execute`]와 같습니다. 세션 닫기가 실패하면
    /// 그 오류가 쿼리 결과보다 우선합니다.
    pub async fn execute_query(
        &self,
        query: impl Into<Query>,
        params: Option<HashMap<String, Value>>,
        config: QueryConfig,
    ) -> DriverResult<QueryResult> {
        let mut query = query.into();
        if let Some(p) = params {
            query = query.with_params(p);
        }

        let session_config = SessionConfig {
            database: config.database,
            default_access_mode: config.routing.access_mode(),
            bookmarks: config.bookmarks.unwrap_or_default(),
            impersonated_user: config.impersonated_user,
            ..SessionConfig::default()
        };
        let session = self.session(session_config)?;

        let outcome = session
            .execute(config.routing.access_mode(), TransactionConfig::default(), |tx| {
                let query = query.clone();
                async move { tx.run(query, None).await?.into_result().await }.boxed()
            })
            .await;
        session.close();
        outcome
    }

    /// 서버 연결 확인
    pub async fn verify_connectivity(&self) -> DriverResult<()> {
        self.ensure_open()?;
        self.provider.verify_connectivity().await
    }

    /// 서버 정보 조회 (연결 하나를 빌려 확인)
    pub async fn server_info(&self) -> DriverResult<ServerInfo> {
        self.ensure_open()?;
        let request = AcquireRequest {
            mode: AccessMode::Read,
            ..AcquireRequest::default()
        };
        let conn = self.provider.acquire(&request).await?;
        let info = ServerInfo::of(&conn);
        conn.release().await?;
        Ok(info)
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 라우팅 드라이버인지
    pub fn is_routing(&self) -> bool {
        self.provider.is_routing()
    }

    /// 드라이버 종료. 모든 풀의 연결을 닫습니다.
    pub async fn close(&self) -> DriverResult<()> {
        {
            let mut open = self.open.write();
            if !*open {
                return Ok(());
            }
            *open = false;
        }
        debug!(address = %self.config.uri.address, "closing driver");
        self.provider.close().await;
        Ok(())
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(DriverError::service_unavailable("driver is closed"))
        }
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> DriverMetrics {
        DriverMetrics::from(self.pool.metrics())
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("address", &self.config.uri.address)
            .field("routing", &self.config.uri.routing)
            .field("open", &*self.open.read())
            .finish()
    }
}

// ============================================================================
// ServerInfo - 서버 정보
// ============================================================================

/// 서버 정보
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    /// 서버 주소
    pub address: ServerAddress,
    /// 서버 에이전트 (HELLO 응답의 `server`)
    pub agent: Option<String>,
    /// 협상된 프로토콜 버전
    pub protocol_version: Option<BoltVersion>,
}

impl ServerInfo {
    pub(crate) fn of(conn: &Connection) -> Self {
        Self {
            address: conn.address().clone(),
            agent: conn.server_agent().map(str::to_string),
            protocol_version: Some(conn.version()),
        }
    }
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Server @ {}", self.address)?;
        if let Some(agent) = &self.agent {
            write!(f, " (Agent: {})", agent)?;
        }
        if let Some(version) = &self.protocol_version {
            write!(f, " (Protocol: {})", version)?;
        }
        Ok(())
    }
}

// ============================================================================
// DriverMetrics - 드라이버 메트릭
// ============================================================================

/// 드라이버 메트릭
#[derive(Debug, Clone, Default)]
pub struct DriverMetrics {
    /// 풀이 있는 주소 수
    pub pool_count: usize,
    /// 유휴 연결 수
    pub idle_connections: usize,
    /// 사용 중인 연결 수
    pub in_use_connections: usize,
    /// 총 연결 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성된 연결 수
    pub total_connections_created: u64,
    /// 총 닫힌 연결 수
    pub total_connections_closed: u64,
}

impl From<PoolMetrics> for DriverMetrics {
    fn from(m: PoolMetrics) -> Self {
        Self {
            pool_count: m.addresses,
            idle_connections: m.idle,
            in_use_connections: m.in_use,
            total_acquisitions: m.total_acquisitions,
            total_connections_created: m.total_created,
            total_connections_closed: m.total_closed,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::tag;
    use crate::bolt::PackStreamValue;
    use crate::driver::testkit::{init_tracing, record, success, StaticResolver, TestConnector};
    use crate::params;

    fn test_driver(uri: &str, connector: &TestConnector) -> Driver {
        init_tracing();
        let config = DriverConfig::builder(uri, AuthToken::basic("neo4j", "password"))
            .unwrap()
            .with_connector(Arc::new(connector.clone()))
            .with_resolver(Arc::new(StaticResolver::default()))
            .build();
        Driver::with_config(config).unwrap()
    }

    #[test]
    fn test_server_address() {
        let addr = ServerAddress::new("localhost", 7687);
        assert_eq!(addr.to_string(), "localhost:7687");
        assert_eq!(ServerAddress::parse("db.example.com:7688").unwrap(), ServerAddress::new("db.example.com", 7688));
        assert_eq!(ServerAddress::parse("[::1]:7687").unwrap().host, "::1");
        assert_eq!(ServerAddress::new("::1", 7687).to_string(), "[::1]:7687");
        assert!(ServerAddress::parse("nohost").is_err());
        assert!(ServerAddress::parse("host:notaport").is_err());
    }

    #[test]
    fn test_uri_parsing() {
        let uri = DriverUri::parse("bolt://localhost").unwrap();
        assert!(!uri.routing);
        assert_eq!(uri.address, ServerAddress::new("localhost", DEFAULT_PORT));

        let uri = DriverUri::parse("neo4j://cluster.example.com:7688?region=eu&policy=fast").unwrap();
        assert!(uri.routing);
        assert_eq!(uri.address.port, 7688);
        assert_eq!(uri.routing_context.get("region").map(String::as_str), Some("eu"));
        assert_eq!(uri.routing_context.len(), 2);

        assert!(DriverUri::parse("bolt://localhost?region=eu").is_err());
        assert!(DriverUri::parse("neo4j://localhost?address=x").is_err());
        assert!(DriverUri::parse("http://localhost").is_err());
        assert!(DriverUri::parse("localhost:7687").is_err());
        assert!(DriverUri::parse("bolt+s://localhost").is_err());
    }

    #[test]
    fn test_driver_config_builder() {
        let config = DriverConfig::builder("neo4j://localhost:7687?region=eu", AuthToken::none())
            .unwrap()
            .with_max_connection_pool_size(50)
            .with_connection_timeout(Duration::from_secs(10))
            .with_max_transaction_retry_time(Duration::from_secs(5))
            .with_fetch_size(500)
            .with_integer_mode(IntegerMode::BigInt)
            .build();

        assert_eq!(config.max_connection_pool_size, 50);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
        assert_eq!(config.retry.max_retry_time, Duration::from_secs(5));
        assert_eq!(config.fetch_size, 500);

        let settings = config.connection_settings();
        let context = settings.routing_context.unwrap();
        assert_eq!(context.get("region"), Some(&PackStreamValue::from("eu")));
        assert_eq!(context.get("address"), Some(&PackStreamValue::from("localhost:7687")));
        assert_eq!(config.pool_config().max_size, 50);
    }

    #[test]
    fn test_config_debug_hides_credentials() {
        let config = DriverConfig::new("bolt://localhost", AuthToken::basic("neo4j", "s3cr3t")).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DriverConfig::builder("bolt://localhost", AuthToken::none())
            .unwrap()
            .with_fetch_size(0)
            .build();
        assert_eq!(Driver::with_config(config).unwrap_err().code(), "ConfigurationError");
    }

    #[tokio::test]
    async fn test_execute_query_collects_records() {
        let connector = TestConnector::with_handler(BoltVersion::V5_4, |_, req| match req.tag {
            tag::RUN => Some(vec![success(vec![("fields", vec![PackStreamValue::from("name")].into())])]),
            tag::PULL => Some(vec![
                record(vec!["Alice".into()]),
                record(vec!["Bob".into()]),
                success(vec![("bookmark", "bm:read".into())]),
            ]),
            _ => None,
        });
        let driver = test_driver("bolt://db:7687", &connector);

        let result = driver
            .execute_query(
                "MATCH (p:Person) WHERE p.age > $age RETURN p.name AS name",
                Some(params! { "age" => 30i64 }),
                QueryConfig::new().with_readers().with_database("people"),
            )
            .await
            .unwrap();

        assert_eq!(result.keys, vec!["name"]);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.summary.database.as_deref(), None);
        assert_eq!(
            connector.tags(),
            vec![tag::HELLO, tag::LOGON, tag::BEGIN, tag::RUN, tag::PULL, tag::COMMIT]
        );
        let begin = &connector.requests(tag::BEGIN)[0];
        let extra = begin.fields[0].as_map().cloned().unwrap_or_default();
        assert_eq!(extra.get("mode"), Some(&PackStreamValue::from("r")));
        assert_eq!(extra.get("db"), Some(&PackStreamValue::from("people")));

        assert_eq!(driver.metrics().idle_connections, 1);
        driver.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_routing_driver_uses_route_message() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let driver = test_driver("neo4j://seed:7687", &connector);
        assert!(driver.is_routing());

        driver.verify_connectivity().await.unwrap();
        assert!(connector.requests(tag::ROUTE).len() >= 1);

        let hello = &connector.requests(tag::HELLO)[0];
        let extra = hello.fields[0].as_map().cloned().unwrap_or_default();
        let routing = extra.get("routing").and_then(|v| v.as_map()).cloned().unwrap_or_default();
        assert_eq!(routing.get("address"), Some(&PackStreamValue::from("seed:7687")));
    }

    #[tokio::test]
    async fn test_server_info() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let driver = test_driver("bolt://db:7687", &connector);

        let info = driver.server_info().await.unwrap();
        assert_eq!(info.agent.as_deref(), Some("Neo4j/5.13.0"));
        assert_eq!(info.protocol_version, Some(BoltVersion::V5_4));
        assert_eq!(info.address, ServerAddress::new("db", 7687));
    }

    #[tokio::test]
    async fn test_closed_driver_rejects_sessions() {
        let connector = TestConnector::new(BoltVersion::V5_4);
        let driver = test_driver("bolt://db:7687", &connector);

        driver.close().await.unwrap();
        driver.close().await.unwrap();
        assert_eq!(driver.session(SessionConfig::default()).unwrap_err().code(), "ServiceUnavailable");
        assert_eq!(driver.verify_connectivity().await.unwrap_err().code(), "ServiceUnavailable");
    }
}
