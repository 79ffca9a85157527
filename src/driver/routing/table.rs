//! 라우팅 테이블
//!
//! 데이터베이스 하나에 대한 역할별 서버 목록과 만료 시각.
//! 테이블은 통째로 교체될 뿐 부분 갱신되지 않습니다. 주소를 잊는 연산도
//! 수정된 사본을 돌려줍니다.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use super::super::driver::ServerAddress;
use super::super::error::{DriverError, DriverResult};
use crate::bolt::message::{RoutingTable as RawRoutingTable, ServerRole};
use crate::bolt::{AccessMode, PackStreamValue};

/// `Instant`로 표현할 수 없을 만큼 큰 TTL의 대체값
const FAR_FUTURE: Duration = Duration::from_secs(u32::MAX as u64);

/// 라우팅 테이블
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingTable {
    /// 서버가 알려준 데이터베이스 이름
    pub database: Option<String>,
    /// 라우터 목록 (라우팅 테이블 조회용)
    pub routers: Vec<ServerAddress>,
    /// 리더 목록 (읽기 트랜잭션용)
    pub readers: Vec<ServerAddress>,
    /// 라이터 목록 (쓰기 트랜잭션용)
    pub writers: Vec<ServerAddress>,
    /// TTL
    pub ttl: Duration,
    /// 만료 시각
    pub expires_at: Instant,
}

impl RoutingTable {
    /// ROUTE 응답 또는 프로시저 레코드에서 생성
    pub fn from_raw(raw: &RawRoutingTable, now: Instant) -> DriverResult<Self> {
        let ttl = Duration::from_secs(raw.ttl.max(0) as u64);
        let parse = |role| -> DriverResult<Vec<ServerAddress>> {
            let mut out: Vec<ServerAddress> = Vec::new();
            for s in raw.addresses(role) {
                let address = ServerAddress::parse(s).map_err(|e| {
                    DriverError::protocol(format!("invalid address in routing table: {}", e))
                })?;
                if !out.contains(&address) {
                    out.push(address);
                }
            }
            Ok(out)
        };

        Ok(Self {
            database: raw.db.clone(),
            routers: parse(ServerRole::Route)?,
            readers: parse(ServerRole::Read)?,
            writers: parse(ServerRole::Write)?,
            ttl,
            expires_at: now.checked_add(ttl).unwrap_or(now + FAR_FUTURE),
        })
    }

    /// 라우팅 프로시저 결과(`keys`와 첫 레코드)에서 생성
    pub fn from_procedure(
        keys: &[String],
        record: Vec<PackStreamValue>,
        now: Instant,
    ) -> DriverResult<Self> {
        if keys.len() != record.len() {
            return Err(DriverError::protocol(format!(
                "routing procedure returned {} keys but {} values",
                keys.len(),
                record.len()
            )));
        }
        let map: HashMap<String, PackStreamValue> = keys.iter().cloned().zip(record).collect();
        let raw = RawRoutingTable::from_map(&map).map_err(DriverError::protocol)?;
        Self::from_raw(&raw, now)
    }

    /// 접근 모드에 해당하는 서버 목록
    pub fn servers(&self, mode: AccessMode) -> &[ServerAddress] {
        match mode {
            AccessMode::Read => &self.readers,
            AccessMode::Write => &self.writers,
        }
    }

    /// 만료되었거나 필요한 역할의 목록이 비었으면 stale
    pub fn is_stale_for(&self, mode: AccessMode, now: Instant) -> bool {
        now >= self.expires_at || self.routers.is_empty() || self.servers(mode).is_empty()
    }

    /// 주소를 모든 역할에서 뺀 사본
    pub fn without(&self, address: &ServerAddress) -> Self {
        let keep = |list: &[ServerAddress]| -> Vec<ServerAddress> {
            list.iter().filter(|a| *a != address).cloned().collect()
        };
        Self {
            routers: keep(&self.routers),
            readers: keep(&self.readers),
            writers: keep(&self.writers),
            ..self.clone()
        }
    }

    /// 주소를 라이터에서만 뺀 사본
    pub fn without_writer(&self, address: &ServerAddress) -> Self {
        Self {
            writers: self.writers.iter().filter(|a| *a != address).cloned().collect(),
            ..self.clone()
        }
    }

    /// 테이블이 언급하는 모든 주소
    pub fn all_servers(&self) -> impl Iterator<Item = &ServerAddress> {
        self.routers.iter().chain(&self.readers).chain(&self.writers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testkit::routing_table_map;

    fn sample(now: Instant) -> RoutingTable {
        let map = routing_table_map(300, "neo4j", &["w:7687"], &["r1:7687", "r2:7687"], &["a:7687", "b:7687"]);
        RoutingTable::from_raw(&RawRoutingTable::from_map(&map).unwrap(), now).unwrap()
    }

    #[test]
    fn test_from_raw() {
        let now = Instant::now();
        let table = sample(now);

        assert_eq!(table.database.as_deref(), Some("neo4j"));
        assert_eq!(table.writers, vec![ServerAddress::new("w", 7687)]);
        assert_eq!(table.readers.len(), 2);
        assert_eq!(table.routers.len(), 2);
        assert_eq!(table.expires_at, now + Duration::from_secs(300));
        assert_eq!(table.all_servers().count(), 5);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let now = Instant::now();
        let map = routing_table_map(i64::MAX, "neo4j", &["w:7687"], &["r:7687"], &["a:7687"]);
        let table = RoutingTable::from_raw(&RawRoutingTable::from_map(&map).unwrap(), now).unwrap();

        assert_eq!(table.ttl, Duration::from_secs(i64::MAX as u64));
        assert_eq!(table.expires_at, now + FAR_FUTURE);
        assert!(!table.is_stale_for(AccessMode::Read, now + Duration::from_secs(365 * 24 * 3600)));
    }

    #[test]
    fn test_staleness() {
        let now = Instant::now();
        let table = sample(now);

        assert!(!table.is_stale_for(AccessMode::Write, now));
        assert!(table.is_stale_for(AccessMode::Read, now + Duration::from_secs(300)));

        let no_writer = table.without_writer(&ServerAddress::new("w", 7687));
        assert!(no_writer.is_stale_for(AccessMode::Write, now));
        assert!(!no_writer.is_stale_for(AccessMode::Read, now));
        // 원본은 그대로
        assert_eq!(table.writers.len(), 1);
    }

    #[test]
    fn test_without_removes_everywhere() {
        let now = Instant::now();
        let map = routing_table_map(60, "neo4j", &["x:1"], &["x:1", "y:1"], &["x:1"]);
        let table = RoutingTable::from_raw(&RawRoutingTable::from_map(&map).unwrap(), now).unwrap();

        let pruned = table.without(&ServerAddress::new("x", 1));
        assert!(pruned.writers.is_empty());
        assert!(pruned.routers.is_empty());
        assert_eq!(pruned.readers, vec![ServerAddress::new("y", 1)]);
    }

    #[test]
    fn test_from_procedure_record() {
        let now = Instant::now();
        let map = routing_table_map(120, "neo4j", &["w:7687"], &["r:7687"], &["a:7687"]);
        let keys = vec!["ttl".to_string(), "servers".to_string()];
        let record = vec![map["ttl"].clone(), map["servers"].clone()];

        let table = RoutingTable::from_procedure(&keys, record, now).unwrap();
        assert_eq!(table.ttl, Duration::from_secs(120));
        assert_eq!(table.database, None);
        assert_eq!(table.readers, vec![ServerAddress::new("r", 7687)]);

        let err = RoutingTable::from_procedure(&keys, vec![], now).unwrap_err();
        assert_eq!(err.code(), "ProtocolError");
    }

    #[test]
    fn test_invalid_address_rejected() {
        let map = routing_table_map(60, "neo4j", &["no-port"], &[], &[]);
        let raw = RawRoutingTable::from_map(&map).unwrap();
        assert!(RoutingTable::from_raw(&raw, Instant::now()).is_err());
    }
}
