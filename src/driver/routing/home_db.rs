//! 홈 데이터베이스 캐시
//!
//! 데이터베이스를 지정하지 않은 세션은 서버가 알려준 홈 데이터베이스로
//! 고정됩니다. 같은 사용자(가장 사용자 포함)의 다음 세션이 라우팅 왕복을
//! 건너뛸 수 있도록 결과를 잠시 보관합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::super::clock::Clock;

const DEFAULT_KEY: &str = "\u{0}default";

/// 사용자별 홈 데이터베이스 캐시
#[derive(Debug)]
pub struct HomeDatabaseCache {
    max_age: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (String, tokio::time::Instant)>>,
}

impl HomeDatabaseCache {
    /// `max_age`가 0이면 캐시를 쓰지 않습니다.
    pub fn new(max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_age,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn key(impersonated_user: Option<&str>) -> &str {
        impersonated_user.unwrap_or(DEFAULT_KEY)
    }

    /// 캐시 사용 여부
    pub fn is_enabled(&self) -> bool {
        !self.max_age.is_zero()
    }

    /// 유효한 항목 조회
    pub fn get(&self, impersonated_user: Option<&str>) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let key = Self::key(impersonated_user);
        match entries.get(key) {
            Some((db, at)) if now.saturating_duration_since(*at) < self.max_age => Some(db.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// 항목 저장
    pub fn insert(&self, impersonated_user: Option<&str>, database: &str) {
        if !self.is_enabled() {
            return;
        }
        let now = self.clock.now();
        self.entries
            .lock()
            .insert(Self::key(impersonated_user).to_string(), (database.to_string(), now));
    }

    /// 전체 비우기
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::clock::SystemClock;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = HomeDatabaseCache::new(Duration::from_secs(5), Arc::new(SystemClock));
        cache.insert(None, "neo4j");
        cache.insert(Some("alice"), "alicedb");

        assert_eq!(cache.get(None).as_deref(), Some("neo4j"));
        assert_eq!(cache.get(Some("alice")).as_deref(), Some("alicedb"));
        assert_eq!(cache.get(Some("bob")), None);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.get(None), None);
    }

    #[test]
    fn test_zero_age_disables() {
        let cache = HomeDatabaseCache::new(Duration::ZERO, Arc::new(SystemClock));
        assert!(!cache.is_enabled());
        cache.insert(None, "neo4j");
        assert_eq!(cache.get(None), None);
    }
}
