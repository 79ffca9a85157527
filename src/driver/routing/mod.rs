//! 라우팅 모듈
//!
//! `neo4j://` 드라이버는 데이터베이스별 라우팅 테이블을 유지하며, 쓰기는
//! 라이터로, 읽기는 리더로 보냅니다. 테이블은 TTL이 지나거나 필요한 역할의
//! 서버가 없을 때 라우터에게 다시 물어 교체됩니다.
//!
//! # 구성
//!
//! - [`RoutingTable`]: 한 데이터베이스의 역할별 서버 목록과 만료 시각
//! - [`RoutingConnectionProvider`]: 테이블 캐시, 갱신, 서버 선택, 오류 반영
//! - [`ServerSelector`]: [`RoutingPolicy`]에 따른 서버 선택
//! - [`HomeDatabaseCache`]: 사용자별 홈 데이터베이스 캐시

mod home_db;
mod policy;
mod provider;
mod table;

pub use home_db::HomeDatabaseCache;
pub use policy::{RoutingPolicy, ServerSelector};
pub use provider::RoutingConnectionProvider;
pub use table::RoutingTable;
