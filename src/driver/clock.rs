//! Clock
//!
//! 라우팅 TTL, 유휴 만료, 재시도 경과 시간을 재는 단조 시계.
//! 기본 구현은 tokio 시계를 사용하므로 `start_paused` 테스트에서 시간이
//! 함께 멈춥니다.

use std::fmt;

use tokio::time::Instant;

/// 단조 시계
pub trait Clock: Send + Sync + fmt::Debug {
    /// 현재 시각
    fn now(&self) -> Instant;
}

/// tokio 런타임 시계
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
