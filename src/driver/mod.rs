//! Driver Module
//!
//! Bolt 와이어 계층 위의 클라이언트 API: 연결, 연결 풀, 라우팅, 세션,
//! 트랜잭션, 재시도.
//!
//! # 구성
//!
//! - [`Driver`], [`DriverConfig`]: URI 파싱, 풀과 연결 공급자 소유
//! - [`ConnectionPool`]: 주소별 연결 풀
//! - [`routing`]: 라우팅 테이블과 라우팅 공급자 (`neo4j://`)
//! - [`Session`], [`Transaction`]: 북마크, 명시적/관리 트랜잭션
//! - [`RetryPolicy`]: 트랜잭션 함수 재시도
//!
//! # Example
//!
//! ```ignore
//! use bolt_driver::driver::{AuthToken, Driver, SessionConfig};
//! use bolt_driver::params;
//! use futures::FutureExt;
//!
//! let driver = Driver::new("neo4j://localhost:7687", AuthToken::basic("neo4j", "password"))?;
//! let session = driver.session(SessionConfig::default())?;
//!
//! // 자동 커밋 쿼리
//! let mut result = session.run("MATCH (n) RETURN n LIMIT 10", None).await?;
//! while let Some(record) = result.next().await? {
//!     println!("{:?}", record);
//! }
//!
//! // 트랜잭션 함수 (일시적 오류면 재시도)
//! let count = session
//!     .execute_write(|tx| {
//!         async move {
//!             tx.run("CREATE (n:Person {name: $name})", Some(params! {"name" => "Alice"}))
//!                 .await?
//!                 .consume()
//!                 .await?;
//!             tx.run("MATCH (n:Person) RETURN count(n) AS c", None).await?.single().await?.get_int("c")
//!         }
//!         .boxed()
//!     })
//!     .await?;
//!
//! session.close();
//! driver.close().await?;
//! ```

pub mod bolt;
pub mod routing;
mod clock;
mod driver;
mod error;
mod hydration;
mod pool;
mod provider;
mod record;
mod result;
mod retry;
mod session;
mod transaction;
mod types;

#[cfg(test)]
pub(crate) mod testkit;

// Re-exports
pub use crate::bolt::{AccessMode, AuthToken, NotificationFilter};
pub use clock::{Clock, SystemClock};
pub use driver::{
    Driver, DriverConfig, DriverConfigBuilder, DriverMetrics, DriverUri, QueryConfig, RoutingControl,
    ServerAddress, ServerInfo, DEFAULT_PORT,
};
pub use error::{DriverError, DriverResult, ServerError};
pub use hydration::{HydrationOptions, IntegerMode};
pub use pool::{ConnectionPool, PoolConfig, PoolConfigBuilder, PoolMetrics, PooledConnection};
pub use provider::{AcquireRequest, ConnectionProvider, DirectConnectionProvider};
pub use record::{Keys, Record};
pub use result::{
    Counters, InputPosition, Notification, QueryResult, QueryType, RecordStream, ResultSummary,
};
pub use retry::{RetryPolicy, RetryState};
pub use session::{BookmarkSet, Query, Session, SessionConfig, SessionConfigBuilder};
pub use transaction::{Transaction, TransactionConfig, TransactionState};
pub use types::{
    DateTimeZoneId, Duration, Node, Path, Point, Relationship, Time, UnboundRelationship, Value,
};

/// 파라미터 맵 생성 매크로
#[macro_export]
macro_rules! params {
    () => {
        std::collections::HashMap::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = std::collections::HashMap::new();
        $(
            map.insert($key.into(), $crate::driver::Value::from($value));
        )+
        map
    }};
}
