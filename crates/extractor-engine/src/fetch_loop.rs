//! 스트림 하나를 끝까지 페이지네이션하는 추출 루프.
//!
//! 페이지마다 시간 예산, circuit breaker, 페이지 크기 조절기, 페이지네이션 예측기를
//! 차례로 확인하고 갱신합니다.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use extractor_core::{stream_span, OrderRecord, StreamKey, TimeWindow};
use extractor_exchange::{ErrorCategory, FetchError, PageFetcher, PageQuery, PageResult};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

use crate::budget::TimeBudget;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::ExtractorConfig;
use crate::error::{ExtractError, Result};
use crate::predictor::PaginationPredictor;
use crate::sizer::AdaptiveSizer;

/// 스트림 종료 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// 데이터 끝까지 조회
    Completed,
    /// 최대 페이지 수 도달
    ExhaustedMaxPages,
    /// 예측기가 중단 판단
    StoppedByPredictor,
    /// circuit breaker가 요청을 막음
    BlockedByBreaker,
    /// 시간 예산 소진 (모은 주문은 유지)
    TimedOut,
    /// 업스트림 실패
    Failed(ErrorCategory),
    /// 예산 소진으로 시작하지 않은 스트림
    NotAttempted,
    /// 다른 스트림의 인증 실패로 중단
    Aborted,
}

impl StreamStatus {
    pub fn error_category(&self) -> Option<ErrorCategory> {
        match self {
            StreamStatus::Failed(category) => Some(*category),
            _ => None,
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamStatus::Completed => write!(f, "completed"),
            StreamStatus::ExhaustedMaxPages => write!(f, "exhausted_max_pages"),
            StreamStatus::StoppedByPredictor => write!(f, "stopped_by_predictor"),
            StreamStatus::BlockedByBreaker => write!(f, "blocked_by_breaker"),
            StreamStatus::TimedOut => write!(f, "timed_out"),
            StreamStatus::Failed(category) => write!(f, "failed({})", category),
            StreamStatus::NotAttempted => write!(f, "not_attempted"),
            StreamStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// 스트림 하나의 추출 결과.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub key: StreamKey,
    /// 요청 범위 안의 주문 (조회 순서 그대로)
    pub orders: Vec<OrderRecord>,
    pub status: StreamStatus,
    /// 성공한 페이지 수
    pub pages_fetched: usize,
    /// 재시도를 포함한 조회 호출 수
    pub fetch_calls: usize,
    pub circuit_breaker_saves: usize,
    pub predictor_stops: usize,
    pub size_adjustments: usize,
}

impl StreamOutcome {
    fn new(key: StreamKey) -> Self {
        Self {
            key,
            orders: Vec::new(),
            status: StreamStatus::Completed,
            pages_fetched: 0,
            fetch_calls: 0,
            circuit_breaker_saves: 0,
            predictor_stops: 0,
            size_adjustments: 0,
        }
    }

    /// 시작하지 않은 스트림의 결과.
    pub fn not_attempted(key: StreamKey) -> Self {
        Self {
            status: StreamStatus::NotAttempted,
            ..Self::new(key)
        }
    }
}

/// 페이지 조회 시도 결과.
enum PageAttempt {
    Fetched(PageResult),
    Stopped(StreamStatus),
}

/// 스트림 키 하나의 추출 루프.
///
/// breaker, 예측기, 크기 조절기 상태를 소유하며 호출이 끝나면 함께 버려집니다.
pub struct FetchLoop<'a> {
    key: StreamKey,
    config: &'a ExtractorConfig,
    budget: TimeBudget,
    window: TimeWindow,
    fetcher: &'a dyn PageFetcher,
    breaker: CircuitBreaker,
    predictor: PaginationPredictor,
    sizer: AdaptiveSizer,
    max_pages: usize,
    /// 호출 전체 중단 플래그 (인증 실패 시 설정)
    abort: Option<&'a AtomicBool>,
}

impl<'a> FetchLoop<'a> {
    pub fn new(
        key: StreamKey,
        config: &'a ExtractorConfig,
        budget: TimeBudget,
        window: TimeWindow,
        fetcher: &'a dyn PageFetcher,
    ) -> Self {
        let max_pages = config.max_pages_for(&key.category);
        Self {
            key,
            config,
            budget,
            window,
            fetcher,
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            predictor: PaginationPredictor::new(),
            sizer: AdaptiveSizer::new(
                config.min_page_size,
                config.max_page_size,
                config.page_size_step,
                config.initial_page_size(),
            ),
            max_pages,
            abort: None,
        }
    }

    /// 형제 스트림과 공유하는 중단 플래그를 연결합니다.
    ///
    /// 플래그가 설정되면 다음 페이지나 재시도를 시작하지 않고, 이 스트림이
    /// 인증 실패를 만나면 플래그를 설정합니다.
    pub fn with_abort_flag(mut self, abort: &'a AtomicBool) -> Self {
        self.abort = Some(abort);
        self
    }

    fn is_aborted(&self) -> bool {
        self.abort.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// 이미 상태가 있는 breaker로 교체합니다.
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    /// 스트림을 끝까지 실행합니다.
    ///
    /// # Errors
    /// 인증 실패는 스트림 상태가 아니라 `ExtractError::Auth`로 반환됩니다.
    pub async fn run(self) -> Result<StreamOutcome> {
        let span = stream_span!(self.key);
        self.run_inner().instrument(span).await
    }

    async fn run_inner(mut self) -> Result<StreamOutcome> {
        let mut outcome = StreamOutcome::new(self.key.clone());
        let mut cursor: Option<String> = None;
        let started = Instant::now();

        let status = loop {
            if self.is_aborted() {
                debug!("Extraction aborted, stopping stream");
                break StreamStatus::Aborted;
            }

            if !self.budget.may_start() {
                info!(
                    remaining_ms = self.budget.remaining().as_millis() as u64,
                    "Time budget exhausted"
                );
                break StreamStatus::TimedOut;
            }

            if self.config.enable_circuit_breaker && !self.breaker.can_execute(&self.key) {
                outcome.circuit_breaker_saves += 1;
                info!("Circuit open, skipping stream");
                break StreamStatus::BlockedByBreaker;
            }

            let page_size = if self.config.adaptive_page_sizing {
                self.sizer.current_size(&self.key)
            } else {
                self.config.page_limit
            };

            let page = match self
                .fetch_with_retry(cursor.as_deref(), page_size, &mut outcome)
                .await?
            {
                PageAttempt::Fetched(page) => page,
                PageAttempt::Stopped(status) => break status,
            };

            let page_index = outcome.pages_fetched;
            let count = page.count();
            outcome.pages_fetched += 1;

            if self.config.adaptive_page_sizing {
                self.sizer.next_size(&self.key, page.latency);
            }
            let predictor_continue = !self.config.enable_smart_pagination
                || self
                    .predictor
                    .should_continue(&self.key, page_index, count, page_size);

            let PageResult {
                orders,
                next_cursor,
                latency,
            } = page;
            let window = self.window;
            outcome.orders.extend(
                orders
                    .into_iter()
                    .filter(|o| o.created_at.map_or(true, |ts| window.contains(ts))),
            );
            debug!(
                page = page_index,
                page_size,
                count,
                latency_ms = latency.as_millis() as u64,
                "Page fetched"
            );

            if outcome.pages_fetched >= self.max_pages {
                break StreamStatus::ExhaustedMaxPages;
            }

            if !predictor_continue {
                outcome.predictor_stops += 1;
                break StreamStatus::StoppedByPredictor;
            }

            let short_page = self.key.category.short_page_ends_stream() && count < page_size;
            if count == 0 || next_cursor.is_none() || short_page {
                break StreamStatus::Completed;
            }

            cursor = next_cursor;
        };

        outcome.status = status;
        outcome.size_adjustments = self.sizer.adjustments();

        info!(
            status = %outcome.status,
            pages = outcome.pages_fetched,
            orders = outcome.orders.len(),
            fetch_calls = outcome.fetch_calls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Stream finished"
        );
        Ok(outcome)
    }

    /// 한 페이지를 재시도 포함해서 조회합니다.
    async fn fetch_with_retry(
        &mut self,
        cursor: Option<&str>,
        page_size: usize,
        outcome: &mut StreamOutcome,
    ) -> Result<PageAttempt> {
        let breaker_enabled = self.config.enable_circuit_breaker;
        let mut attempt: u32 = 0;

        loop {
            let timeout = self.budget.next_timeout(self.config.request_timeout());
            let query = PageQuery {
                key: self.key.clone(),
                cursor: cursor.map(str::to_string),
                page_size,
                timeout,
                window: self.window,
            };

            if breaker_enabled {
                self.breaker.begin_attempt(&self.key);
            }
            outcome.fetch_calls += 1;

            let started = Instant::now();
            let result = match tokio::time::timeout(timeout, self.fetcher.fetch_page(&query)).await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout(format!(
                    "no response within {}ms",
                    timeout.as_millis()
                ))),
            };

            let err = match result {
                Ok(mut page) => {
                    page.latency = started.elapsed();
                    if breaker_enabled {
                        self.breaker.record_success(&self.key);
                    }
                    return Ok(PageAttempt::Fetched(page));
                }
                Err(err) => err,
            };

            if err.is_auth_error() {
                if let Some(flag) = self.abort {
                    flag.store(true, Ordering::SeqCst);
                }
                error!(error = %err, "Authentication failed, aborting extraction");
                return Err(ExtractError::Auth {
                    stream: self.key.to_string(),
                    message: err.to_string(),
                });
            }

            let category = err.category();
            if breaker_enabled && err.trips_breaker_immediately() {
                self.breaker.record_failure(&self.key, category);
            }

            if !err.is_retryable() || attempt >= self.config.max_retries {
                if breaker_enabled && !err.trips_breaker_immediately() {
                    self.breaker.record_failure(&self.key, category);
                }
                warn!(error = %err, attempts = attempt + 1, "Page fetch failed");
                return Ok(PageAttempt::Stopped(StreamStatus::Failed(category)));
            }

            if !self.budget.may_start() {
                warn!(error = %err, "Page fetch failed, no time left to retry");
                return Ok(PageAttempt::Stopped(StreamStatus::TimedOut));
            }
            // 재시도 중에 열린 breaker는 실패로 보고
            if breaker_enabled && !self.breaker.can_execute(&self.key) {
                warn!(error = %err, attempts = attempt + 1, "Circuit opened, retries stopped");
                return Ok(PageAttempt::Stopped(StreamStatus::Failed(category)));
            }
            if self.is_aborted() {
                return Ok(PageAttempt::Stopped(StreamStatus::Aborted));
            }

            let delay = self.config.backoff_delay(attempt);
            debug!(
                error = %err,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying page fetch"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;

            if self.is_aborted() {
                return Ok(PageAttempt::Stopped(StreamStatus::Aborted));
            }
            if !self.budget.may_start() {
                return Ok(PageAttempt::Stopped(StreamStatus::TimedOut));
            }
        }
    }
}
