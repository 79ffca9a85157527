//! Connection Pool
//!
//! 서버 주소별 연결 풀. 주소마다 유휴 목록과 세마포어를 두고,
//! 세마포어 허가 하나가 살아 있는 연결 하나(유휴 또는 사용 중)에 대응합니다.
//! 연결은 한 번에 한 소유자에게만 빌려주며, 유휴 목록 변경만 잠금을 잡습니다.

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use super::bolt::{Connection, ConnectionSettings, ConnectionState, Connector};
use super::clock::Clock;
use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// # 필드
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 주소별 최대 연결 수 |
/// | `max_idle_time` | 5분 | 유휴 상태로 둘 수 있는 최대 시간 |
/// | `max_lifetime` | 1시간 | 연결 최대 수명 |
/// | `acquisition_timeout` | 60초 | 빈 슬롯을 기다리는 최대 시간 |
///
/// # 예시
///
/// ```rust
/// use bolt_driver::driver::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::builder()
///     .max_size(50)
///     .max_idle_time(Duration::from_secs(60))
///     .build();
/// assert_eq!(config.max_size, 50);
/// ```
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 주소별 최대 연결 수
    pub max_size: usize,
    /// 유휴 타임아웃
    pub max_idle_time: Duration,
    /// 연결 최대 수명
    pub max_lifetime: Duration,
    /// 획득 타임아웃
    pub acquisition_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_idle_time: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
            acquisition_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최대 연결 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn max_idle_time(mut self, duration: Duration) -> Self {
        self.config.max_idle_time = duration;
        self
    }

    /// 연결 최대 수명 설정
    pub fn max_lifetime(mut self, duration: Duration) -> Self {
        self.config.max_lifetime = duration;
        self
    }

    /// 획득 타임아웃 설정
    pub fn acquisition_timeout(mut self, duration: Duration) -> Self {
        self.config.acquisition_timeout = duration;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// AddressPool - 주소별 유휴 목록
// ============================================================================

struct IdleConnection {
    conn: Connection,
    permit: OwnedSemaphorePermit,
}

struct AddressPool {
    address: ServerAddress,
    idle: Mutex<VecDeque<IdleConnection>>,
    semaphore: Arc<Semaphore>,
    returned: Notify,
    retired: AtomicBool,
}

impl AddressPool {
    fn new(address: ServerAddress, max_size: usize) -> Self {
        Self {
            address,
            idle: Mutex::new(VecDeque::new()),
            semaphore: Arc::new(Semaphore::new(max_size)),
            returned: Notify::new(),
            retired: AtomicBool::new(false),
        }
    }

    fn drain(&self) -> Vec<IdleConnection> {
        self.idle.lock().drain(..).collect()
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    /// 풀이 있는 주소 수
    pub addresses: usize,
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 주소별 연결 풀 레지스트리
pub struct ConnectionPool {
    config: PoolConfig,
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    clock: Arc<dyn Clock>,
    pools: Mutex<HashMap<ServerAddress, Arc<AddressPool>>>,
    open: AtomicBool,
    total_acquisitions: AtomicU64,
    total_created: AtomicU64,
    total_closed: Arc<AtomicU64>,
}

impl ConnectionPool {
    /// 새 연결 풀 생성
    pub fn new(
        config: PoolConfig,
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            settings,
            connector,
            clock,
            pools: Mutex::new(HashMap::new()),
            open: AtomicBool::new(true),
            total_acquisitions: AtomicU64::new(0),
            total_created: AtomicU64::new(0),
            total_closed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 풀 설정
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// 연결 설정
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    fn pool_for(&self, address: &ServerAddress) -> Arc<AddressPool> {
        self.pools
            .lock()
            .entry(address.clone())
            .or_insert_with(|| Arc::new(AddressPool::new(address.clone(), self.config.max_size)))
            .clone()
    }

    /// 연결 획득
    ///
    /// 유휴 연결을 재사용하고, 없으면 빈 슬롯을 기다려 새로 엽니다.
    /// 슬롯 대기는 `acquisition_timeout`으로 제한됩니다.
    pub async fn acquire(&self, address: &ServerAddress) -> DriverResult<PooledConnection> {
        self.ensure_open()?;

        let (pool, slot) = tokio::time::timeout(self.config.acquisition_timeout, self.slot_for(address))
            .await
            .map_err(|_| {
                DriverError::timeout(format!(
                    "could not acquire a connection to {} within {:?}",
                    address, self.config.acquisition_timeout
                ))
            })??;

        let (conn, permit) = match slot {
            Slot::Idle(idle) => (idle.conn, idle.permit),
            Slot::Free(permit) => (self.create(address).await?, permit),
        };
        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);

        Ok(PooledConnection {
            conn: Some(conn),
            permit: Some(permit),
            pool,
            clock: self.clock.clone(),
            total_closed: self.total_closed.clone(),
        })
    }

    async fn slot_for(&self, address: &ServerAddress) -> DriverResult<(Arc<AddressPool>, Slot)> {
        loop {
            let pool = self.pool_for(address);
            if let Some(slot) = self.wait_for_slot(&pool).await? {
                return Ok((pool, slot));
            }
            // 대기 중 purge됨: 새 풀에서 다시
        }
    }

    async fn wait_for_slot(&self, pool: &Arc<AddressPool>) -> DriverResult<Option<Slot>> {
        loop {
            let returned = pool.returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            if let Some(idle) = self.take_idle(pool).await {
                return Ok(Some(Slot::Idle(idle)));
            }
            self.ensure_open()?;
            if pool.retired.load(Ordering::Acquire) {
                return Ok(None);
            }

            tokio::select! {
                permit = pool.semaphore.clone().acquire_owned() => {
                    return match permit {
                        Ok(permit) => Ok(Some(Slot::Free(permit))),
                        Err(_) if pool.retired.load(Ordering::Acquire) && self.is_open() => Ok(None),
                        Err(_) => Err(DriverError::service_unavailable(format!(
                            "pool for {} is closed",
                            pool.address
                        ))),
                    };
                }
                _ = &mut returned => continue,
            }
        }
    }

    /// 유효한 유휴 연결 꺼내기. 수명 또는 유휴 시간이 지난 연결은 닫습니다.
    async fn take_idle(&self, pool: &AddressPool) -> Option<IdleConnection> {
        loop {
            let mut idle = pool.idle.lock().pop_front()?;
            let now = self.clock.now();
            let expired = now.saturating_duration_since(idle.conn.created_at()) > self.config.max_lifetime
                || now.saturating_duration_since(idle.conn.last_used()) > self.config.max_idle_time;
            if !expired && !idle.conn.is_broken() {
                return Some(idle);
            }
            debug!(id = idle.conn.id(), address = %pool.address, "evicting stale connection");
            idle.conn.close().await;
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn create(&self, address: &ServerAddress) -> DriverResult<Connection> {
        let transport = tokio::time::timeout(self.settings.connect_timeout, self.connector.connect(address))
            .await
            .map_err(|_| DriverError::connection_failed(format!("connecting to {} timed out", address)))?
            .map_err(|e| DriverError::connection_failed(format!("failed to connect to {}: {}", address, e)))?;
        let conn = Connection::open(transport, address.clone(), &self.settings, self.clock.now()).await?;
        self.total_created.fetch_add(1, Ordering::Relaxed);
        Ok(conn)
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DriverError::service_unavailable("connection pool is closed"))
        }
    }

    /// 주소의 모든 연결 제거
    ///
    /// 유휴 연결은 즉시 닫고, 빌려준 연결은 반환될 때 닫습니다.
    pub async fn purge(&self, address: &ServerAddress) {
        let removed = self.pools.lock().remove(address);
        if let Some(pool) = removed {
            pool.retired.store(true, Ordering::Release);
            pool.semaphore.close();
            let idle = pool.drain();
            info!(address = %address, idle = idle.len(), "purging connection pool");
            for mut entry in idle {
                entry.conn.close().await;
                self.total_closed.fetch_add(1, Ordering::Relaxed);
            }
            pool.returned.notify_waiters();
        }
    }

    /// 풀 닫기
    pub async fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let pools: Vec<Arc<AddressPool>> = self.pools.lock().drain().map(|(_, p)| p).collect();
        for pool in pools {
            pool.retired.store(true, Ordering::Release);
            pool.semaphore.close();
            for mut entry in pool.drain() {
                entry.conn.close().await;
                self.total_closed.fetch_add(1, Ordering::Relaxed);
            }
            pool.returned.notify_waiters();
        }
        debug!("connection pool closed");
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// 주소의 유휴 연결 수
    pub fn idle_count(&self, address: &ServerAddress) -> usize {
        self.pools
            .lock()
            .get(address)
            .map(|p| p.idle.lock().len())
            .unwrap_or(0)
    }

    /// 주소의 사용 중인 연결 수
    pub fn in_use_count(&self, address: &ServerAddress) -> usize {
        self.pools
            .lock()
            .get(address)
            .map(|p| Self::in_use_of(p, self.config.max_size))
            .unwrap_or(0)
    }

    fn in_use_of(pool: &AddressPool, max_size: usize) -> usize {
        let idle = pool.idle.lock().len();
        max_size
            .saturating_sub(pool.semaphore.available_permits())
            .saturating_sub(idle)
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        let pools = self.pools.lock();
        PoolMetrics {
            addresses: pools.len(),
            idle: pools.values().map(|p| p.idle.lock().len()).sum(),
            in_use: pools.values().map(|p| Self::in_use_of(p, self.config.max_size)).sum(),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}

enum Slot {
    Idle(IdleConnection),
    Free(OwnedSemaphorePermit),
}

// ============================================================================
// PooledConnection - 빌려준 연결
// ============================================================================

/// 풀에서 빌린 연결
///
/// [`release`](Self::release)로 반환하면 필요 시 RESET을 보내고 결과를
/// 돌려줍니다. 그냥 drop하면 깨끗한 연결만 풀로 돌아가고 나머지는
/// 닫힙니다.
pub struct PooledConnection {
    conn: Option<Connection>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<AddressPool>,
    clock: Arc<dyn Clock>,
    total_closed: Arc<AtomicU64>,
}

impl PooledConnection {
    /// 풀로 반환
    ///
    /// `Failed` 상태의 연결은 풀에 넣지 않고 닫습니다. 스트리밍 중이거나
    /// 트랜잭션이 열린 연결은 RESET을 먼저 보내며, RESET이 실패하면 연결을
    /// 닫고 그 오류를 반환합니다.
    pub async fn release(mut self) -> DriverResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        if conn.state() == ConnectionState::Failed {
            debug!(id = conn.id(), address = %self.pool.address, "destroying failed connection on release");
            conn.close().await;
            self.total_closed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        if !conn.is_broken() && !conn.is_clean() {
            if let Err(e) = conn.reset().await {
                debug!(id = conn.id(), error = %e, "RESET on release failed");
                conn.close().await;
                self.total_closed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }
        self.give_back(conn);
        Ok(())
    }

    /// 연결을 풀로 돌리지 않고 닫기
    pub async fn discard(mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn give_back(&mut self, mut conn: Connection) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        if conn.is_clean() && !self.pool.retired.load(Ordering::Acquire) {
            conn.set_last_used(self.clock.now());
            self.pool.idle.lock().push_back(IdleConnection { conn, permit });
            self.pool.returned.notify_one();
            return;
        }

        debug!(id = conn.id(), address = %self.pool.address, "destroying connection on release");
        self.total_closed.fetch_add(1, Ordering::Relaxed);
        drop(permit);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { conn.close().await });
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // conn은 release/discard/drop에서만 비워지며 그 뒤에는 접근할 수 없음
        self.conn.as_ref().unwrap_or_else(|| unreachable!("connection already released"))
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("connection already released"))
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", &self.pool.address)
            .field("connection", &self.conn)
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.give_back(conn);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
