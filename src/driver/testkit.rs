//! 테스트용 인메모리 Bolt 서버
//!
//! `tokio::io::duplex` 위에서 핸드셰이크와 청크 프레이밍을 그대로 수행하고,
//! 요청마다 핸들러가 돌려준 응답(없으면 기본 응답)을 보냅니다.
//! FAILURE 이후에는 RESET 전까지 IGNORED로 응답합니다.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Decoder, Encoder};

use super::bolt::{BoxedTransport, Connection, ConnectionSettings, Connector, Resolver};
use super::driver::ServerAddress;
use super::error::DriverResult;
use crate::bolt::message::tag;
use crate::bolt::{
    AuthToken, BoltCodec, BoltResponse, BoltVersion, FailureMessage, PackStreamMap,
    PackStreamStructure, PackStreamValue, RecordMessage, SuccessMessage,
};

/// 요청 핸들러. `None`이면 기본 응답을 사용합니다.
pub(crate) type Handler =
    Arc<dyn Fn(&ServerAddress, &PackStreamStructure) -> Option<Vec<BoltResponse>> + Send + Sync>;

/// `RUST_LOG`로 테스트 로그 켜기
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// 응답 헬퍼
// ============================================================================

pub(crate) fn success(entries: Vec<(&str, PackStreamValue)>) -> BoltResponse {
    let metadata: PackStreamMap = entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    BoltResponse::Success(SuccessMessage::with_metadata(metadata))
}

pub(crate) fn record(fields: Vec<PackStreamValue>) -> BoltResponse {
    BoltResponse::Record(RecordMessage::new(fields))
}

pub(crate) fn failure(code: &str, message: &str) -> BoltResponse {
    BoltResponse::Failure(FailureMessage::new(code, message))
}

fn server_entry(addresses: &[&str], role: &str) -> PackStreamValue {
    let mut entry = PackStreamMap::new();
    let list: Vec<PackStreamValue> = addresses.iter().map(|a| PackStreamValue::from(*a)).collect();
    entry.insert("addresses".into(), list.into());
    entry.insert("role".into(), role.into());
    entry.into()
}

/// ROUTE 응답의 `rt` 맵
pub(crate) fn routing_table_map(
    ttl: i64,
    db: &str,
    writers: &[&str],
    readers: &[&str],
    routers: &[&str],
) -> PackStreamMap {
    let servers = vec![
        server_entry(writers, "WRITE"),
        server_entry(readers, "READ"),
        server_entry(routers, "ROUTE"),
    ];
    let mut rt = PackStreamMap::new();
    rt.insert("ttl".into(), ttl.into());
    rt.insert("db".into(), db.into());
    rt.insert("servers".into(), servers.into());
    rt
}

/// ROUTE 성공 응답
pub(crate) fn routing_table(
    ttl: i64,
    db: &str,
    writers: &[&str],
    readers: &[&str],
    routers: &[&str],
) -> Vec<BoltResponse> {
    vec![success(vec![(
        "rt",
        routing_table_map(ttl, db, writers, readers, routers).into(),
    )])]
}

/// 핸들러가 응답을 주지 않을 때의 기본 응답
pub(crate) fn default_responses(address: &ServerAddress, request: &PackStreamStructure) -> Vec<BoltResponse> {
    match request.tag {
        tag::HELLO => vec![success(vec![
            ("server", "Neo4j/5.13.0".into()),
            ("connection_id", "bolt-1".into()),
        ])],
        tag::RUN => vec![success(vec![
            ("fields", Vec::<PackStreamValue>::new().into()),
            ("t_first", 1i64.into()),
        ])],
        tag::PULL => vec![success(vec![("has_more", false.into())])],
        tag::COMMIT => vec![success(vec![("bookmark", "bm:commit".into())])],
        tag::BEGIN => vec![success(vec![])],
        tag::ROUTE => {
            let me = address.to_string();
            routing_table(300, "neo4j", &[&me], &[&me], &[&me])
        }
        _ => vec![success(vec![])],
    }
}

// ============================================================================
// TestConnector
// ============================================================================

/// 연결마다 인메모리 서버 태스크를 띄우는 커넥터
#[derive(Clone)]
pub(crate) struct TestConnector {
    version: BoltVersion,
    handler: Handler,
    log: Arc<Mutex<Vec<(ServerAddress, PackStreamStructure)>>>,
    unreachable: Arc<Mutex<HashSet<ServerAddress>>>,
    connects: Arc<AtomicUsize>,
}

impl TestConnector {
    /// 기본 응답만 하는 서버
    pub(crate) fn new(version: BoltVersion) -> Self {
        Self::with_handler(version, |_, _| None)
    }

    /// 핸들러를 가진 서버
    pub(crate) fn with_handler<F>(version: BoltVersion, handler: F) -> Self
    where
        F: Fn(&ServerAddress, &PackStreamStructure) -> Option<Vec<BoltResponse>> + Send + Sync + 'static,
    {
        Self {
            version,
            handler: Arc::new(handler),
            log: Arc::new(Mutex::new(Vec::new())),
            unreachable: Arc::new(Mutex::new(HashSet::new())),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 테스트 기본 연결 설정
    pub(crate) fn settings() -> ConnectionSettings {
        ConnectionSettings {
            auth: AuthToken::basic("neo4j", "password"),
            ..ConnectionSettings::default()
        }
    }

    /// 기본 설정으로 연결 열기
    pub(crate) async fn open(&self, address: &ServerAddress) -> DriverResult<Connection> {
        self.open_with(address, &Self::settings()).await
    }

    /// 주어진 설정으로 연결 열기
    pub(crate) async fn open_with(
        &self,
        address: &ServerAddress,
        settings: &ConnectionSettings,
    ) -> DriverResult<Connection> {
        let transport = self.connect(address).await?;
        Connection::open(transport, address.clone(), settings, tokio::time::Instant::now()).await
    }

    /// 주소를 연결 불가로 표시
    pub(crate) fn set_unreachable(&self, address: &ServerAddress, unreachable: bool) {
        let mut set = self.unreachable.lock();
        if unreachable {
            set.insert(address.clone());
        } else {
            set.remove(address);
        }
    }

    /// 연결 시도 횟수
    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// 받은 요청 태그 (순서대로)
    pub(crate) fn tags(&self) -> Vec<u8> {
        self.log.lock().iter().map(|(_, s)| s.tag).collect()
    }

    /// 특정 태그의 요청
    pub(crate) fn requests(&self, request_tag: u8) -> Vec<PackStreamStructure> {
        self.log
            .lock()
            .iter()
            .filter(|(_, s)| s.tag == request_tag)
            .map(|(_, s)| s.clone())
            .collect()
    }

    /// 특정 주소가 받은 특정 태그의 요청 수
    pub(crate) fn count_to(&self, address: &ServerAddress, request_tag: u8) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|(a, s)| a == address && s.tag == request_tag)
            .count()
    }
}

impl fmt::Debug for TestConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestConnector")
            .field("version", &self.version)
            .field("connects", &self.connects())
            .finish()
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self, address: &ServerAddress) -> io::Result<BoxedTransport> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.lock().contains(address) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused connection", address),
            ));
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(serve(
            server,
            self.version,
            address.clone(),
            self.handler.clone(),
            self.log.clone(),
        ));
        Ok(Box::new(client))
    }
}

async fn serve(
    mut stream: DuplexStream,
    version: BoltVersion,
    address: ServerAddress,
    handler: Handler,
    log: Arc<Mutex<Vec<(ServerAddress, PackStreamStructure)>>>,
) {
    let mut handshake = [0u8; 20];
    if stream.read_exact(&mut handshake).await.is_err() {
        return;
    }
    if stream.write_all(&version.to_bytes()).await.is_err() {
        return;
    }

    let mut codec = BoltCodec::new();
    let mut buf = BytesMut::new();
    let mut failed = false;
    loop {
        let value = loop {
            match codec.decode(&mut buf) {
                Ok(Some(v)) => break v,
                Ok(None) => {}
                Err(_) => return,
            }
            match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        };
        let Some(request) = value.into_structure() else {
            return;
        };
        log.lock().push((address.clone(), request.clone()));
        if request.tag == tag::GOODBYE {
            return;
        }

        let responses = if failed && request.tag != tag::RESET {
            vec![BoltResponse::Ignored]
        } else {
            if request.tag == tag::RESET {
                failed = false;
            }
            handler(&address, &request).unwrap_or_else(|| default_responses(&address, &request))
        };

        let mut out = BytesMut::new();
        for response in &responses {
            if matches!(response, BoltResponse::Failure(_)) {
                failed = true;
            }
            let value: PackStreamValue = response.to_structure().into();
            if codec.encode(&value, &mut out).is_err() {
                return;
            }
        }
        if stream.write_all(&out).await.is_err() {
            return;
        }
    }
}

// ============================================================================
// StaticResolver
// ============================================================================

/// 정해진 주소 목록으로 해석하는 리졸버
#[derive(Debug, Clone, Default)]
pub(crate) struct StaticResolver {
    pub(crate) addresses: Vec<ServerAddress>,
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(&self, address: &ServerAddress) -> io::Result<Vec<ServerAddress>> {
        if self.addresses.is_empty() {
            Ok(vec![address.clone()])
        } else {
            Ok(self.addresses.clone())
        }
    }
}
