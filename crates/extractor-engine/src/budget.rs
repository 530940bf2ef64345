//! 실행 시간 예산.

use std::time::Duration;
use tokio::time::Instant;

/// 호출 하나의 벽시계 시간 예산.
///
/// `Copy`이므로 모든 스트림이 동기화 없이 같은 마감 시간을 읽습니다.
/// tokio의 단조 시계를 사용하므로 시간을 멈춘 테스트에서도 결정적으로 동작합니다.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started_at: Instant,
    max_execution: Duration,
    safety_margin: Duration,
    timeout_fraction: f64,
}

impl TimeBudget {
    /// 지금부터 시작하는 예산.
    pub fn start(max_execution: Duration, safety_margin: Duration, timeout_fraction: f64) -> Self {
        Self {
            started_at: Instant::now(),
            max_execution,
            safety_margin,
            timeout_fraction,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// 남은 시간 (음수가 되지 않음).
    pub fn remaining(&self) -> Duration {
        self.max_execution.saturating_sub(self.elapsed())
    }

    /// 새 작업(요청, 재시도, 웨이브)을 시작해도 되는지 여부.
    pub fn may_start(&self) -> bool {
        self.remaining() > self.safety_margin
    }

    /// 다음 요청에 쓸 타임아웃: `min(configured, remaining * fraction)`.
    pub fn next_timeout(&self, configured: Duration) -> Duration {
        configured.min(self.remaining().mul_f64(self.timeout_fraction))
    }
}
