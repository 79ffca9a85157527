//! Connection providers
//!
//! 세션은 역할(읽기/쓰기)과 데이터베이스만 알고 연결을 요청합니다.
//! 어느 서버에 붙을지는 공급자가 결정합니다.
//!
//! - [`DirectConnectionProvider`]: `bolt://` 단일 서버
//! - [`RoutingConnectionProvider`](super::routing::RoutingConnectionProvider): `neo4j://` 클러스터

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};
use super::pool::{ConnectionPool, PooledConnection};
use crate::bolt::AccessMode;

/// 연결 요청
#[derive(Debug, Clone, Default)]
pub struct AcquireRequest {
    /// 접근 모드
    pub mode: AccessMode,
    /// 대상 데이터베이스 (`None`이면 홈 데이터베이스)
    pub database: Option<String>,
    /// 가장 사용자
    pub impersonated_user: Option<String>,
    /// 라우팅 테이블 조회에 함께 보낼 북마크
    pub bookmarks: Vec<String>,
}

/// 연결 공급자
#[async_trait]
pub trait ConnectionProvider: Send + Sync + fmt::Debug {
    /// 요청에 맞는 서버의 연결 획득
    async fn acquire(&self, request: &AcquireRequest) -> DriverResult<PooledConnection>;

    /// 요청이 실제로 향할 데이터베이스 이름.
    /// `None`이면 서버가 홈 데이터베이스를 고릅니다.
    async fn resolve_database(&self, request: &AcquireRequest) -> DriverResult<Option<String>>;

    /// 작업 중 발생한 오류를 공급자의 서버 상태에 반영
    async fn on_error(&self, address: &ServerAddress, database: Option<&str>, error: &DriverError);

    /// 서버 연결 확인
    async fn verify_connectivity(&self) -> DriverResult<()>;

    /// 라우팅 여부
    fn is_routing(&self) -> bool;

    /// 공급자와 풀 닫기
    async fn close(&self);
}

// ============================================================================
// DirectConnectionProvider
// ============================================================================

/// 단일 서버 공급자
#[derive(Debug)]
pub struct DirectConnectionProvider {
    address: ServerAddress,
    pool: Arc<ConnectionPool>,
}

impl DirectConnectionProvider {
    /// 새 공급자 생성
    pub fn new(address: ServerAddress, pool: Arc<ConnectionPool>) -> Self {
        Self { address, pool }
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }
}

#[async_trait]
impl ConnectionProvider for DirectConnectionProvider {
    async fn acquire(&self, _request: &AcquireRequest) -> DriverResult<PooledConnection> {
        self.pool.acquire(&self.address).await
    }

    async fn resolve_database(&self, request: &AcquireRequest) -> DriverResult<Option<String>> {
        Ok(request.database.clone())
    }

    async fn on_error(&self, address: &ServerAddress, _database: Option<&str>, error: &DriverError) {
        if error.is_unreachable() {
            debug!(address = %address, error = %error, "server unreachable");
            self.pool.purge(address).await;
        }
    }

    async fn verify_connectivity(&self) -> DriverResult<()> {
        let mut conn = self.pool.acquire(&self.address).await?;
        if let Err(e) = conn.reset().await {
            conn.discard().await;
            return Err(e);
        }
        conn.release().await
    }

    fn is_routing(&self) -> bool {
        false
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
