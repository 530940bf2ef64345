//! 추출 성능 카운터.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::fetch_loop::StreamOutcome;

/// 심볼 단위 성능 카운터.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceCounters {
    /// circuit breaker 덕분에 보내지 않은 요청 수
    pub circuit_breaker_saves: usize,
    /// 예측기가 중단시킨 스트림 수
    pub smart_pagination_stops: usize,
    /// 실제로 바뀐 페이지 크기 조절 횟수
    pub adaptive_size_adjustments: usize,
    /// 실행된 스트림 수
    pub streams_run_in_parallel: usize,
    /// 재시도를 포함한 총 조회 호출 수
    pub fetch_calls: usize,
    /// 성공한 총 페이지 수
    pub pages_fetched: usize,
}

impl PerformanceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// 스트림 결과 하나를 합산합니다.
    pub fn absorb(&mut self, outcome: &StreamOutcome) {
        self.circuit_breaker_saves += outcome.circuit_breaker_saves;
        self.smart_pagination_stops += outcome.predictor_stops;
        self.adaptive_size_adjustments += outcome.size_adjustments;
        self.fetch_calls += outcome.fetch_calls;
        self.pages_fetched += outcome.pages_fetched;
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, symbol: &str, total_orders: usize, elapsed: Duration) {
        tracing::info!(
            symbol = symbol,
            total_orders,
            streams = self.streams_run_in_parallel,
            pages = self.pages_fetched,
            fetch_calls = self.fetch_calls,
            circuit_breaker_saves = self.circuit_breaker_saves,
            smart_pagination_stops = self.smart_pagination_stops,
            adaptive_size_adjustments = self.adaptive_size_adjustments,
            elapsed = format!("{:.1}s", elapsed.as_secs_f64()),
            "추출 완료"
        );
    }
}
