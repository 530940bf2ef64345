//! # Extractor Engine
//!
//! 시간 예산 안에서 심볼 하나의 주문 이력을 추출하는 엔진입니다.
//!
//! 구성 요소:
//! - [`TimeBudget`]: 남은 실행 시간과 요청별 타임아웃
//! - [`CircuitBreaker`]: 스트림별 장애 격리
//! - [`PaginationPredictor`]: 희소한 페이지가 이어지면 페이지네이션 중단
//! - [`AdaptiveSizer`]: 지연 시간에 따른 페이지 크기 조절
//! - [`FetchLoop`]: 위 정책들로 스트림 하나를 끝까지 조회
//! - [`extract`]: spot/futures 스트림을 제한된 동시성으로 실행하고 결과를 합침

pub mod budget;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod fetch_loop;
pub mod predictor;
pub mod scheduler;
pub mod sizer;
pub mod stats;

pub use budget::TimeBudget;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
};
pub use config::ExtractorConfig;
pub use error::{ExtractError, Result};
pub use fetch_loop::{FetchLoop, StreamOutcome, StreamStatus};
pub use predictor::PaginationPredictor;
pub use scheduler::{extract, plan_streams, StreamPlan, StreamReport, SymbolExtractionResult};
pub use sizer::AdaptiveSizer;
pub use stats::PerformanceCounters;
