//! 지연 시간 기반 적응형 페이지 크기.

use std::collections::HashMap;
use std::time::Duration;

use extractor_core::StreamKey;

/// 이보다 빠르면 페이지 크기를 키움.
const FAST_LATENCY_SECS: f64 = 1.0;
/// 이보다 느리면 페이지 크기를 줄임.
const SLOW_LATENCY_SECS: f64 = 3.0;

#[derive(Debug, Clone, Copy)]
struct SizingState {
    current: usize,
    last_latency: Option<Duration>,
}

/// 스트림 키별 페이지 크기 조절기.
///
/// 크기는 항상 `[min, max]` 범위 안에 있습니다.
#[derive(Debug)]
pub struct AdaptiveSizer {
    min: usize,
    max: usize,
    step: usize,
    initial: usize,
    states: HashMap<StreamKey, SizingState>,
    adjustments: usize,
}

impl AdaptiveSizer {
    /// `min > max`이면 두 값을 바꿔서 범위로 사용합니다.
    pub fn new(min: usize, max: usize, step: usize, initial: usize) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            step,
            initial: initial.clamp(min, max),
            states: HashMap::new(),
            adjustments: 0,
        }
    }

    /// 키의 현재 페이지 크기.
    pub fn current_size(&self, key: &StreamKey) -> usize {
        self.states
            .get(key)
            .map(|s| s.current)
            .unwrap_or(self.initial)
    }

    /// 관측한 지연 시간으로 다음 페이지 크기를 정합니다.
    pub fn next_size(&mut self, key: &StreamKey, latency: Duration) -> usize {
        let (min, max, step) = (self.min, self.max, self.step);
        let state = self.states.entry(key.clone()).or_insert(SizingState {
            current: self.initial,
            last_latency: None,
        });
        state.last_latency = Some(latency);

        let secs = latency.as_secs_f64();
        let next = if secs < FAST_LATENCY_SECS {
            (state.current + step).min(max)
        } else if secs > SLOW_LATENCY_SECS {
            state.current.saturating_sub(step).max(min)
        } else {
            state.current
        };

        if next != state.current {
            tracing::debug!(
                stream = %key,
                from = state.current,
                to = next,
                latency_ms = latency.as_millis() as u64,
                "Page size adjusted"
            );
            state.current = next;
            self.adjustments += 1;
        }
        next
    }

    pub fn last_latency(&self, key: &StreamKey) -> Option<Duration> {
        self.states.get(key).and_then(|s| s.last_latency)
    }

    /// 실제로 크기가 바뀐 횟수.
    pub fn adjustments(&self) -> usize {
        self.adjustments
    }
}
