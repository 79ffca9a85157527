//! 라우팅 정책
//!
//! 역할별 주소 목록에서 서버 하나를 고릅니다. 연결 불가로 표시된 주소는
//! 건너뜁니다.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::super::driver::ServerAddress;
use crate::bolt::AccessMode;

/// 라우팅 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// 라운드 로빈 (기본값)
    #[default]
    RoundRobin,
    /// 사용 중인 연결이 가장 적은 서버. 동률이면 라운드 로빈 순서
    LeastConnected,
}

/// 서버 선택기
#[derive(Debug, Default)]
pub struct ServerSelector {
    policy: RoutingPolicy,
    read_index: AtomicUsize,
    write_index: AtomicUsize,
}

impl ServerSelector {
    /// 새 선택기 생성
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            read_index: AtomicUsize::new(0),
            write_index: AtomicUsize::new(0),
        }
    }

    /// 현재 정책
    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    /// `servers`에서 `skip`에 없는 서버 하나 선택
    ///
    /// `load`는 주소별 사용 중인 연결 수이며 `LeastConnected`에서만 쓰입니다.
    pub fn select<F>(
        &self,
        mode: AccessMode,
        servers: &[ServerAddress],
        skip: &HashSet<ServerAddress>,
        load: F,
    ) -> Option<ServerAddress>
    where
        F: Fn(&ServerAddress) -> usize,
    {
        if servers.is_empty() {
            return None;
        }
        let index = match mode {
            AccessMode::Read => &self.read_index,
            AccessMode::Write => &self.write_index,
        };
        let start = index.fetch_add(1, Ordering::Relaxed) % servers.len();
        let candidates = servers
            .iter()
            .cycle()
            .skip(start)
            .take(servers.len())
            .filter(|a| !skip.contains(*a));

        match self.policy {
            RoutingPolicy::RoundRobin => candidates.cloned().next(),
            RoutingPolicy::LeastConnected => {
                let mut best: Option<(&ServerAddress, usize)> = None;
                for address in candidates {
                    let n = load(address);
                    if best.map_or(true, |(_, m)| n < m) {
                        best = Some((address, n));
                    }
                }
                best.map(|(a, _)| a.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers() -> Vec<ServerAddress> {
        vec![
            ServerAddress::new("a", 7687),
            ServerAddress::new("b", 7687),
            ServerAddress::new("c", 7687),
        ]
    }

    #[test]
    fn test_round_robin() {
        let selector = ServerSelector::default();
        let servers = servers();
        let none = HashSet::new();

        let picks: Vec<String> = (0..4)
            .map(|_| selector.select(AccessMode::Read, &servers, &none, |_| 0).unwrap().host)
            .collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);

        // 쓰기 인덱스는 따로 돈다
        let w = selector.select(AccessMode::Write, &servers, &none, |_| 0).unwrap();
        assert_eq!(w.host, "a");
    }

    #[test]
    fn test_skips_unreachable() {
        let selector = ServerSelector::default();
        let servers = servers();
        let skip: HashSet<_> = [ServerAddress::new("a", 7687), ServerAddress::new("b", 7687)].into();

        for _ in 0..3 {
            let pick = selector.select(AccessMode::Read, &servers, &skip, |_| 0).unwrap();
            assert_eq!(pick.host, "c");
        }

        let all: HashSet<_> = servers.iter().cloned().collect();
        assert!(selector.select(AccessMode::Read, &servers, &all, |_| 0).is_none());
        assert!(selector.select(AccessMode::Read, &[], &HashSet::new(), |_| 0).is_none());
    }

    #[test]
    fn test_least_connected() {
        let selector = ServerSelector::new(RoutingPolicy::LeastConnected);
        let servers = servers();
        let none = HashSet::new();

        let pick = selector
            .select(AccessMode::Read, &servers, &none, |a| if a.host == "b" { 0 } else { 5 })
            .unwrap();
        assert_eq!(pick.host, "b");
        assert_eq!(selector.policy(), RoutingPolicy::LeastConnected);
    }
}
