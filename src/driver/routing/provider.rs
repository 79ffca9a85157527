//! 라우팅 연결 공급자
//!
//! 데이터베이스별 라우팅 테이블을 캐시하고, 만료되었거나 필요한 역할이
//! 비어 있으면 라우터(없으면 시드 주소)에 다시 물어봅니다.
//!
//! - 같은 데이터베이스에 대한 동시 갱신은 하나로 합쳐집니다.
//!   데이터베이스마다 비동기 뮤텍스를 두고, 잠금을 얻은 뒤 테이블 세대가
//!   바뀌었으면 그 결과를 그대로 씁니다.
//! - 테이블은 `Arc`로 통째로 교체됩니다. 읽는 쪽은 잠금을 짧게만 잡습니다.
//! - 연결 불가 주소는 테이블 세대별로 기록되며 갱신 시 초기화됩니다.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::super::bolt::{Resolver, ResponseEvent};
use super::super::clock::Clock;
use super::super::driver::ServerAddress;
use super::super::error::{DriverError, DriverResult};
use super::super::pool::{ConnectionPool, PooledConnection};
use super::super::provider::{AcquireRequest, ConnectionProvider};
use super::home_db::HomeDatabaseCache;
use super::policy::{RoutingPolicy, ServerSelector};
use super::table::RoutingTable;
use crate::bolt::{AccessMode, PackStreamMap, RouteStyle};

#[derive(Debug)]
struct TableEntry {
    table: RoutingTable,
    unreachable: HashSet<ServerAddress>,
    generation: u64,
}

/// 라우팅 연결 공급자
pub struct RoutingConnectionProvider {
    seed: ServerAddress,
    context: PackStreamMap,
    pool: Arc<ConnectionPool>,
    resolver: Arc<dyn Resolver>,
    clock: Arc<dyn Clock>,
    selector: ServerSelector,
    tables: RwLock<HashMap<String, Arc<TableEntry>>>,
    refresh_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    home_db: HomeDatabaseCache,
    generation: AtomicU64,
    refreshes: AtomicU64,
}

impl RoutingConnectionProvider {
    /// 새 공급자 생성
    ///
    /// `routing_context`는 URI 쿼리 파라미터이며, 시드 주소가 `address`
    /// 항목으로 추가됩니다.
    pub fn new(
        seed: ServerAddress,
        routing_context: PackStreamMap,
        pool: Arc<ConnectionPool>,
        resolver: Arc<dyn Resolver>,
        clock: Arc<dyn Clock>,
        home_db: HomeDatabaseCache,
        policy: RoutingPolicy,
    ) -> Self {
        let mut context = routing_context;
        context.insert("address".to_string(), seed.to_string().into());
        Self {
            seed,
            context,
            pool,
            resolver,
            clock,
            selector: ServerSelector::new(policy),
            tables: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
            home_db,
            generation: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
        }
    }

    /// 지금까지 수행한 라우팅 테이블 갱신 횟수
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// 캐시된 라우팅 테이블
    pub fn routing_table(&self, database: &str) -> Option<RoutingTable> {
        self.tables.read().get(database).map(|e| e.table.clone())
    }

    fn table_key(database: Option<&str>, impersonated_user: Option<&str>) -> String {
        match database {
            Some(db) => db.to_string(),
            None => format!("\u{0}home/{}", impersonated_user.unwrap_or("")),
        }
    }

    fn refresh_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.refresh_locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    // ========================================================================
    // 테이블 조회/갱신
    // ========================================================================

    /// 라우팅 테이블 조회. 반환값의 `bool`은 이번 호출에서 갱신했는지 여부
    async fn table(
        &self,
        database: Option<&str>,
        mode: AccessMode,
        bookmarks: &[String],
        impersonated_user: Option<&str>,
        force: bool,
    ) -> DriverResult<(Arc<TableEntry>, bool)> {
        let key = Self::table_key(database, impersonated_user);
        let observed = self.tables.read().get(&key).cloned();
        if let Some(entry) = &observed {
            if !force && !entry.table.is_stale_for(mode, self.clock.now()) {
                return Ok((entry.clone(), false));
            }
        }

        let lock = self.refresh_lock(&key);
        let _guard = lock.lock().await;

        let current = self.tables.read().get(&key).cloned();
        if let Some(entry) = &current {
            let refreshed_meanwhile = observed
                .as_ref()
                .map_or(true, |o| o.generation != entry.generation);
            if refreshed_meanwhile && (force || !entry.table.is_stale_for(mode, self.clock.now())) {
                return Ok((entry.clone(), false));
            }
        }

        let table = self
            .refresh(database, current.as_deref(), bookmarks, impersonated_user)
            .await?;
        let entry = Arc::new(TableEntry {
            table,
            unreachable: HashSet::new(),
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
        });

        let mut tables = self.tables.write();
        if database.is_none() {
            if let Some(db) = &entry.table.database {
                tables.insert(db.clone(), entry.clone());
            }
        }
        tables.insert(key, entry.clone());
        Ok((entry, true))
    }

    async fn refresh(
        &self,
        database: Option<&str>,
        current: Option<&TableEntry>,
        bookmarks: &[String],
        impersonated_user: Option<&str>,
    ) -> DriverResult<RoutingTable> {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        let name = database.unwrap_or("<home>");

        let mut tried: HashSet<ServerAddress> = HashSet::new();
        let mut last_error: Option<DriverError> = None;

        let routers: Vec<ServerAddress> = current
            .map(|e| {
                e.table
                    .routers
                    .iter()
                    .filter(|r| !e.unreachable.contains(*r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for router in routers {
            tried.insert(router.clone());
            match self.fetch_from(&router, database, bookmarks, impersonated_user).await {
                Ok(table) => return Ok(self.accept(table, name)),
                Err(e) if Self::is_fatal_for_refresh(&e) => return Err(e),
                Err(e) => {
                    warn!(router = %router, database = name, error = %e, "routing table fetch failed");
                    if e.is_unreachable() {
                        self.forget(&router).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        let seeds = match self.resolver.resolve(&self.seed).await {
            Ok(seeds) if !seeds.is_empty() => seeds,
            Ok(_) => vec![self.seed.clone()],
            Err(e) => {
                warn!(seed = %self.seed, error = %e, "resolving seed address failed");
                vec![self.seed.clone()]
            }
        };
        for seed in seeds {
            if !tried.insert(seed.clone()) {
                continue;
            }
            match self.fetch_from(&seed, database, bookmarks, impersonated_user).await {
                Ok(table) => return Ok(self.accept(table, name)),
                Err(e) if Self::is_fatal_for_refresh(&e) => return Err(e),
                Err(e) => {
                    warn!(router = %seed, database = name, error = %e, "routing table fetch failed");
                    last_error = Some(e);
                }
            }
        }

        Err(DriverError::service_unavailable(format!(
            "could not obtain a routing table for database '{}'{}",
            name,
            last_error.map(|e| format!(": {}", e)).unwrap_or_default()
        )))
    }

    fn accept(&self, table: RoutingTable, name: &str) -> RoutingTable {
        info!(
            database = table.database.as_deref().unwrap_or(name),
            ttl = table.ttl.as_secs(),
            routers = table.routers.len(),
            readers = table.readers.len(),
            writers = table.writers.len(),
            "routing table refreshed"
        );
        table
    }

    /// 다른 라우터로 넘어가도 소용없는 오류
    fn is_fatal_for_refresh(error: &DriverError) -> bool {
        match error {
            DriverError::Authentication(_) | DriverError::FeatureNotSupported { .. } => true,
            DriverError::Server(e) => !e.is_transient(),
            _ => false,
        }
    }

    async fn fetch_from(
        &self,
        router: &ServerAddress,
        database: Option<&str>,
        bookmarks: &[String],
        impersonated_user: Option<&str>,
    ) -> DriverResult<RoutingTable> {
        let mut conn = self.pool.acquire(router).await?;
        let fetched = self
            .fetch_on(&mut conn, database, bookmarks, impersonated_user)
            .await;
        if let Err(e) = conn.release().await {
            debug!(router = %router, error = %e, "release after routing fetch failed");
        }
        let table = fetched?;
        if table.routers.is_empty() {
            return Err(DriverError::protocol(format!(
                "routing table from {} has no routers",
                router
            )));
        }
        Ok(table)
    }

    async fn fetch_on(
        &self,
        conn: &mut PooledConnection,
        database: Option<&str>,
        bookmarks: &[String],
        impersonated_user: Option<&str>,
    ) -> DriverResult<RoutingTable> {
        let batch = conn.protocol().route(
            self.context.clone(),
            bookmarks.to_vec(),
            database,
            impersonated_user,
        )?;
        let style = conn.protocol().route_style();
        let mut handles = conn.send(batch).await?.into_iter();
        let mut first = handles
            .next()
            .ok_or_else(|| DriverError::protocol("routing request produced no response"))?;
        let summary = conn.summary(&mut first).await?;

        match style {
            RouteStyle::Message => {
                let raw = summary
                    .routing_table()
                    .ok_or_else(|| DriverError::protocol("ROUTE response has no routing table"))?
                    .map_err(DriverError::protocol)?;
                RoutingTable::from_raw(&raw, self.clock.now())
            }
            RouteStyle::Procedure => {
                let keys = summary.fields().unwrap_or_default();
                let mut pull = handles
                    .next()
                    .ok_or_else(|| DriverError::protocol("routing procedure was not pulled"))?;
                let mut first_record = None;
                loop {
                    match conn.next_event(&mut pull).await? {
                        ResponseEvent::Record(values) => {
                            if first_record.is_none() {
                                first_record = Some(values);
                            }
                        }
                        ResponseEvent::Success(_) => break,
                        ResponseEvent::Failure(f) => return Err(f.into()),
                        ResponseEvent::Ignored => {
                            return Err(DriverError::protocol("routing procedure result was ignored"))
                        }
                    }
                }
                let record = first_record
                    .ok_or_else(|| DriverError::protocol("routing procedure returned no records"))?;
                RoutingTable::from_procedure(&keys, record, self.clock.now())
            }
        }
    }

    // ========================================================================
    // 서버 상태 반영
    // ========================================================================

    /// 주소를 모든 테이블에서 연결 불가로 표시하고 풀을 비웁니다.
    async fn forget(&self, address: &ServerAddress) {
        {
            let mut tables = self.tables.write();
            for entry in tables.values_mut() {
                if entry.unreachable.contains(address) || !entry.table.all_servers().any(|a| a == address) {
                    continue;
                }
                let mut unreachable = entry.unreachable.clone();
                unreachable.insert(address.clone());
                *entry = Arc::new(TableEntry {
                    table: entry.table.clone(),
                    unreachable,
                    generation: entry.generation,
                });
            }
        }
        info!(address = %address, "marking server unreachable");
        self.pool.purge(address).await;
    }

    fn forget_writer(&self, address: &ServerAddress, database: Option<&str>) {
        let mut tables = self.tables.write();
        let keys: Vec<String> = match database {
            Some(db) => vec![db.to_string()],
            None => tables.keys().cloned().collect(),
        };
        for key in keys {
            if let Some(entry) = tables.get_mut(&key) {
                if !entry.table.writers.contains(address) {
                    continue;
                }
                *entry = Arc::new(TableEntry {
                    table: entry.table.without_writer(address),
                    unreachable: entry.unreachable.clone(),
                    generation: entry.generation,
                });
                debug!(address = %address, database = %key, "forgetting writer");
            }
        }
    }
}

fn no_servers(mode: AccessMode, database: Option<&str>) -> DriverError {
    let name = database.unwrap_or("<home>");
    match mode {
        AccessMode::Write => DriverError::NoWritersAvailable(format!(
            "no writers available for database '{}'",
            name
        )),
        AccessMode::Read => DriverError::NoReadersAvailable(format!(
            "no readers available for database '{}'",
            name
        )),
    }
}

#[async_trait]
impl ConnectionProvider for RoutingConnectionProvider {
    async fn acquire(&self, request: &AcquireRequest) -> DriverResult<PooledConnection> {
        let database = request.database.as_deref();
        let imp_user = request.impersonated_user.as_deref();
        let mut force = false;

        loop {
            let (entry, refreshed) = self
                .table(database, request.mode, &request.bookmarks, imp_user, force)
                .await?;
            let servers = entry.table.servers(request.mode);
            let mut skip = entry.unreachable.clone();

            while let Some(address) =
                self.selector
                    .select(request.mode, servers, &skip, |a| self.pool.in_use_count(a))
            {
                match self.pool.acquire(&address).await {
                    Ok(conn) => return Ok(conn),
                    Err(e) if e.is_unreachable() => {
                        warn!(address = %address, error = %e, "server unreachable");
                        self.forget(&address).await;
                        skip.insert(address);
                    }
                    Err(e) => return Err(e),
                }
            }

            if refreshed || force {
                return Err(no_servers(request.mode, database));
            }
            debug!(database = database.unwrap_or("<home>"), "no usable server, forcing refresh");
            force = true;
        }
    }

    async fn resolve_database(&self, request: &AcquireRequest) -> DriverResult<Option<String>> {
        if let Some(db) = &request.database {
            return Ok(Some(db.clone()));
        }
        let imp_user = request.impersonated_user.as_deref();
        if let Some(db) = self.home_db.get(imp_user) {
            return Ok(Some(db));
        }
        let (entry, _) = self
            .table(None, request.mode, &request.bookmarks, imp_user, false)
            .await?;
        if let Some(db) = &entry.table.database {
            self.home_db.insert(imp_user, db);
        }
        Ok(entry.table.database.clone())
    }

    async fn on_error(&self, address: &ServerAddress, database: Option<&str>, error: &DriverError) {
        if error.is_writer_lost() {
            self.forget_writer(address, database);
        } else if error.is_unreachable() {
            self.forget(address).await;
        }
    }

    async fn verify_connectivity(&self) -> DriverResult<()> {
        let (entry, _) = self.table(None, AccessMode::Read, &[], None, true).await?;
        let request = AcquireRequest {
            mode: AccessMode::Read,
            database: entry.table.database.clone(),
            ..Default::default()
        };
        self.acquire(&request).await?.release().await
    }

    fn is_routing(&self) -> bool {
        true
    }

    async fn close(&self) {
        self.tables.write().clear();
        self.home_db.clear();
        self.pool.close().await;
    }
}

impl fmt::Debug for RoutingConnectionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingConnectionProvider")
            .field("seed", &self.seed)
            .field("databases", &self.tables.read().len())
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
