//! 추출 요청과 시간 범위.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 초 단위 타임스탬프로 간주하는 상한 (약 2286-11-20).
const SECONDS_TIMESTAMP_LIMIT: i64 = 10_000_000_000;

/// 밀리초 단위 타임스탬프로 변환.
///
/// 초 단위로 보이는 값은 1000을 곱합니다.
pub fn coerce_ms(value: i64) -> i64 {
    if value.abs() < SECONDS_TIMESTAMP_LIMIT {
        value * 1000
    } else {
        value
    }
}

/// 포함 범위 `[start_ms, end_ms]` (밀리초 epoch).
///
/// 설정되지 않은 경계는 제한 없음으로 취급합니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

impl TimeWindow {
    pub fn new(start_ms: Option<i64>, end_ms: Option<i64>) -> Self {
        Self {
            start_ms: start_ms.map(coerce_ms),
            end_ms: end_ms.map(coerce_ms),
        }
    }

    /// 제한 없는 범위.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// `now_ms` 기준 최근 `days`일 범위.
    pub fn last_days(now_ms: i64, days: i64) -> Self {
        Self {
            start_ms: Some(now_ms - days * 24 * 60 * 60 * 1000),
            end_ms: Some(now_ms),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start_ms.is_none() && self.end_ms.is_none()
    }

    /// 타임스탬프가 범위 안에 있는지 확인.
    pub fn contains(&self, ts_ms: i64) -> bool {
        self.start_ms.map_or(true, |start| ts_ms >= start)
            && self.end_ms.map_or(true, |end| ts_ms <= end)
    }
}

/// 심볼 하나에 대한 추출 요청.
///
/// 호출당 한 번 생성되며 이후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    /// 기본 심볼 (예: "BTCUSDT")
    pub symbol: String,
    /// 조회 범위
    #[serde(default)]
    pub window: TimeWindow,
    /// 최대 실행 시간 (미지정 시 설정값 사용)
    #[serde(default)]
    pub max_execution_time: Option<Duration>,
    /// Spot 스트림 포함 여부
    #[serde(default = "default_true")]
    pub include_spot: bool,
    /// Futures 스트림 포함 여부
    #[serde(default = "default_true")]
    pub include_futures: bool,
}

fn default_true() -> bool {
    true
}

impl ExtractionRequest {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            window: TimeWindow::unbounded(),
            max_execution_time: None,
            include_spot: true,
            include_futures: true,
        }
    }

    pub fn with_window(mut self, start_ms: Option<i64>, end_ms: Option<i64>) -> Self {
        self.window = TimeWindow::new(start_ms, end_ms);
        self
    }

    pub fn with_max_execution_time(mut self, max: Duration) -> Self {
        self.max_execution_time = Some(max);
        self
    }

    pub fn with_spot(mut self, include: bool) -> Self {
        self.include_spot = include;
        self
    }

    pub fn with_futures(mut self, include: bool) -> Self {
        self.include_futures = include;
        self
    }
}
