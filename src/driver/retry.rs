//! Retry policy
//!
//! 트랜잭션 함수 재시도 정책. 재시도 가능한 오류에만 지수 백오프와
//! 지터를 적용하며, 최대 경과 시간을 넘기면 마지막 원인을 감싼
//! `RetryTimeout`으로 끝냅니다. 시도 횟수 제한에 걸리면 마지막 오류를
//! 그대로 돌려줍니다.

use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::{DriverError, DriverResult};

/// 재시도 정책
///
/// | 필드 | 기본값 |
/// |------|--------|
/// | `max_retry_time` | 30초 |
/// | `initial_delay` | 1초 |
/// | `multiplier` | 2.0 |
/// | `jitter` | 0.2 |
/// | `max_attempts` | 없음 |
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 첫 시도부터 잰 최대 경과 시간
    pub max_retry_time: Duration,
    /// 첫 재시도 전 대기 시간
    pub initial_delay: Duration,
    /// 대기 시간 배수
    pub multiplier: f64,
    /// 대기 시간에 곱할 무작위 비율 (±)
    pub jitter: f64,
    /// 최대 시도 횟수
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_time: Duration::from_secs(30),
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: 0.2,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// 최대 경과 시간 지정
    pub fn with_max_retry_time(mut self, time: Duration) -> Self {
        self.max_retry_time = time;
        self
    }

    /// 첫 대기 시간 지정
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// 배수 지정
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// 지터 비율 지정 (0.0..=1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// 최대 시도 횟수 지정
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// 재시도 없음
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// `attempt`번째 실패 후 대기 시간 (지터 적용 전)
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30) as i32;
        self.initial_delay.mul_f64(self.multiplier.max(1.0).powi(exp))
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
        base.mul_f64(factor)
    }

    /// 첫 시도 시각으로 재시도 상태 시작
    pub fn start(&self, now: Instant) -> RetryState {
        RetryState {
            started: now,
            attempts: 0,
        }
    }

    /// 실패 한 번을 기록하고, 다시 시도할 거면 대기 시간을, 아니면
    /// 호출자에게 돌려줄 오류를 반환합니다.
    pub fn on_error(&self, state: &mut RetryState, error: DriverError, now: Instant) -> DriverResult<Duration> {
        state.attempts += 1;

        if !error.is_retryable() {
            debug!(attempt = state.attempts, code = error.code(), "error is not retryable");
            return Err(error);
        }
        if self.max_attempts.is_some_and(|max| state.attempts >= max) {
            return Err(error);
        }
        let elapsed = now.saturating_duration_since(state.started);
        if elapsed >= self.max_retry_time {
            warn!(
                attempts = state.attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                code = error.code(),
                "retry time exhausted"
            );
            return Err(DriverError::RetryTimeout {
                attempts: state.attempts,
                elapsed,
                last: Box::new(error),
            });
        }

        let delay = self.jittered(self.base_delay(state.attempts));
        warn!(
            attempt = state.attempts,
            delay_ms = delay.as_millis() as u64,
            code = error.code(),
            error = %error,
            "transaction failed, retrying"
        );
        Ok(delay)
    }
}

/// 한 번의 재시도 루프 상태
#[derive(Debug, Clone, Copy)]
pub struct RetryState {
    started: Instant,
    attempts: u32,
}

impl RetryState {
    /// 지금까지 실패한 시도 수
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
