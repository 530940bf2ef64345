//! 스트림별 Circuit Breaker.
//!
//! 느리거나 불안정한 업스트림 스트림에 요청을 계속 보내지 않도록 막습니다.
//!
//! # 상태 전이
//!
//! ```text
//! Closed ──[연속 실패 임계치 도달]──> Open
//!    ↑                                 │
//!    │                        [복구 대기 시간 경과]
//!    │                                 ↓
//!    └──[시험 요청 성공]── HalfOpen ──[시험 요청 실패]──> Open
//! ```
//!
//! 상태는 [`StreamKey`]별로 따로 관리되며, 한 스트림의 실패가 다른 스트림을 막지 않습니다.
//! 각 추출 루프가 자신의 breaker를 소유하므로 잠금 없이 `&mut self`로 갱신합니다.

use std::collections::HashMap;
use std::time::Duration;

use extractor_core::StreamKey;
use extractor_exchange::ErrorCategory;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Circuit Breaker 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// 정상 상태 - 모든 요청 허용
    Closed,
    /// 장애 상태 - 모든 요청 즉시 거부
    Open,
    /// 복구 테스트 상태 - 단일 요청만 허용
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit Breaker 설정.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// 연속 실패 임계치
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Open 상태 유지 시간 (밀리초, 이후 HalfOpen으로 전이)
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    3
}
fn default_recovery_timeout_ms() -> u64 {
    30_000
} // 30초

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout_ms: recovery_timeout.as_millis() as u64,
        }
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

/// 키 하나의 내부 상태.
#[derive(Debug)]
struct KeyState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    opened_at: Option<Instant>,
    /// HalfOpen 시험 요청 진행 여부
    probe_in_flight: bool,
    tripped_by: Option<ErrorCategory>,
    total_failures: u64,
    total_successes: u64,
    open_count: u64,
}

impl KeyState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            opened_at: None,
            probe_in_flight: false,
            tripped_by: None,
            total_failures: 0,
            total_successes: 0,
            open_count: 0,
        }
    }

    /// 복구 대기 시간을 반영한 현재 상태.
    fn effective_state(&self, recovery_timeout: Duration) -> CircuitState {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened_at)) if opened_at.elapsed() >= recovery_timeout => {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }
}

/// 스트림 키별 Circuit Breaker.
///
/// ```ignore
/// if breaker.can_execute(&key) {
///     breaker.begin_attempt(&key);
///     match fetch().await {
///         Ok(page) => breaker.record_success(&key),
///         Err(e) => breaker.record_failure(&key, e.category()),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: HashMap<StreamKey, KeyState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    /// 현재 상태 (복구 대기 시간이 지난 Open은 HalfOpen으로 보고).
    pub fn state(&self, key: &StreamKey) -> CircuitState {
        self.states
            .get(key)
            .map(|s| s.effective_state(self.config.recovery_timeout()))
            .unwrap_or(CircuitState::Closed)
    }

    /// 요청을 보내도 되는지 확인합니다. 상태를 바꾸지 않습니다.
    ///
    /// HalfOpen에서는 진행 중인 시험 요청이 없을 때만 허용됩니다.
    pub fn can_execute(&self, key: &StreamKey) -> bool {
        let Some(state) = self.states.get(key) else {
            return true;
        };
        match state.effective_state(self.config.recovery_timeout()) {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => !state.probe_in_flight,
        }
    }

    /// 요청 시작을 기록합니다.
    ///
    /// 복구 대기 시간이 지난 Open은 HalfOpen으로 전이하고, HalfOpen이면
    /// 시험 요청이 진행 중임을 표시합니다.
    pub fn begin_attempt(&mut self, key: &StreamKey) {
        let state = self.state_mut(key);
        if state.state == CircuitState::HalfOpen {
            state.probe_in_flight = true;
        }
    }

    /// 성공 기록. 항상 Closed로 만들고 실패 카운터를 리셋합니다.
    pub fn record_success(&mut self, key: &StreamKey) {
        let state = self.state_mut(key);
        state.total_successes += 1;

        match state.state {
            CircuitState::HalfOpen => {
                transition_to(state, CircuitState::Closed);
                tracing::info!(
                    circuit_breaker = %key,
                    "Circuit breaker recovered: HalfOpen -> Closed"
                );
            }
            CircuitState::Closed => {
                state.consecutive_failures = 0;
                state.tripped_by = None;
            }
            CircuitState::Open => {
                transition_to(state, CircuitState::Closed);
                tracing::info!(circuit_breaker = %key, "Circuit breaker closed: Open -> Closed");
            }
        }
    }

    /// 실패 기록.
    ///
    /// breaker에 포함되지 않는 카테고리(인증)는 무시합니다.
    pub fn record_failure(&mut self, key: &StreamKey, category: ErrorCategory) {
        if !category.counts_toward_breaker() {
            return;
        }

        let threshold = self.config.failure_threshold;
        let state = self.state_mut(key);
        state.total_failures += 1;
        state.last_failure_at = Some(Instant::now());

        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= threshold {
                    state.tripped_by = Some(category);
                    transition_to(state, CircuitState::Open);
                    tracing::warn!(
                        circuit_breaker = %key,
                        failure_count = state.consecutive_failures,
                        category = %category,
                        "Circuit breaker tripped: Closed -> Open"
                    );
                }
            }
            CircuitState::HalfOpen => {
                state.tripped_by = Some(category);
                transition_to(state, CircuitState::Open);
                tracing::warn!(
                    circuit_breaker = %key,
                    category = %category,
                    "Circuit breaker recovery failed: HalfOpen -> Open"
                );
            }
            CircuitState::Open => {}
        }
    }

    /// 키별 메트릭.
    pub fn metrics(&self, key: &StreamKey) -> CircuitBreakerMetrics {
        let recovery_timeout = self.config.recovery_timeout();
        match self.states.get(key) {
            Some(state) => CircuitBreakerMetrics {
                key: key.clone(),
                state: state.effective_state(recovery_timeout),
                consecutive_failures: state.consecutive_failures,
                total_failures: state.total_failures,
                total_successes: state.total_successes,
                open_count: state.open_count,
                tripped_by: state.tripped_by,
                since_last_failure: state.last_failure_at.map(|t| t.elapsed()),
            },
            None => CircuitBreakerMetrics {
                key: key.clone(),
                state: CircuitState::Closed,
                consecutive_failures: 0,
                total_failures: 0,
                total_successes: 0,
                open_count: 0,
                tripped_by: None,
                since_last_failure: None,
            },
        }
    }

    /// 키 상태를 가져오면서 Open → HalfOpen 전이를 반영.
    fn state_mut(&mut self, key: &StreamKey) -> &mut KeyState {
        let recovery_timeout = self.config.recovery_timeout();
        let state = self
            .states
            .entry(key.clone())
            .or_insert_with(KeyState::new);

        if state.state == CircuitState::Open
            && state.effective_state(recovery_timeout) == CircuitState::HalfOpen
        {
            transition_to(state, CircuitState::HalfOpen);
            tracing::info!(
                circuit_breaker = %key,
                "Circuit breaker timeout: Open -> HalfOpen"
            );
        }
        state
    }
}

/// 상태 전이.
fn transition_to(state: &mut KeyState, new_state: CircuitState) {
    state.state = new_state;
    state.probe_in_flight = false;

    match new_state {
        CircuitState::Closed => {
            state.consecutive_failures = 0;
            state.opened_at = None;
            state.tripped_by = None;
        }
        CircuitState::Open => {
            state.opened_at = Some(Instant::now());
            state.open_count += 1;
        }
        CircuitState::HalfOpen => {}
    }
}

/// Circuit Breaker 메트릭.
#[derive(Debug, Clone)]
pub struct CircuitBreakerMetrics {
    pub key: StreamKey,
    /// 현재 상태
    pub state: CircuitState,
    /// 연속 실패 횟수
    pub consecutive_failures: u32,
    /// 총 실패 횟수
    pub total_failures: u64,
    /// 총 성공 횟수
    pub total_successes: u64,
    /// Open 전이 횟수
    pub open_count: u64,
    /// 마지막으로 Circuit을 연 에러 카테고리
    pub tripped_by: Option<ErrorCategory>,
    /// 마지막 실패 이후 경과 시간
    pub since_last_failure: Option<Duration>,
}
