//! 심볼 단위 추출 스케줄러.
//!
//! spot 스트림과 futures 스트림을 각각 동시 실행 수가 제한된 풀에서 실행합니다.
//! 두 그룹은 동시에 진행되며, 그룹 안에서는 최대 `cap`개씩 웨이브 단위로 실행되고
//! 각 웨이브는 모든 스트림이 끝날 때까지 기다립니다.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use extractor_core::{ExtractionRequest, OrderRecord, StreamKey, TimeWindow};
use extractor_exchange::{ErrorCategory, PageFetcher};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::budget::TimeBudget;
use crate::config::ExtractorConfig;
use crate::error::{ExtractError, Result};
use crate::fetch_loop::{FetchLoop, StreamOutcome, StreamStatus};
use crate::stats::PerformanceCounters;

/// 스트림별 보고.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReport {
    pub key: StreamKey,
    pub status: StreamStatus,
    pub order_count: usize,
    pub pages: usize,
}

impl From<&StreamOutcome> for StreamReport {
    fn from(outcome: &StreamOutcome) -> Self {
        Self {
            key: outcome.key.clone(),
            status: outcome.status,
            order_count: outcome.orders.len(),
            pages: outcome.pages_fetched,
        }
    }
}

/// 심볼 하나의 추출 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolExtractionResult {
    pub symbol: String,
    /// 모든 스트림의 주문 (계획 순서대로 이어 붙임)
    pub orders: Vec<OrderRecord>,
    pub streams: Vec<StreamReport>,
    /// 실패한 스트림 수 (카테고리별)
    pub error_summary: BTreeMap<ErrorCategory, usize>,
    pub performance: PerformanceCounters,
    pub elapsed_ms: u64,
}

impl SymbolExtractionResult {
    pub fn total_orders(&self) -> usize {
        self.orders.len()
    }

    pub fn stream(&self, key: &StreamKey) -> Option<&StreamReport> {
        self.streams.iter().find(|report| &report.key == key)
    }
}

/// 실행할 스트림 목록.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamPlan {
    pub spot: Vec<StreamKey>,
    pub futures: Vec<StreamKey>,
}

impl StreamPlan {
    pub fn len(&self) -> usize {
        self.spot.len() + self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 요청에 맞는 스트림을 계획합니다.
///
/// 밑줄이 들어간 심볼은 이미 futures 형식이므로 spot 스트림을 만들지 않습니다.
pub fn plan_streams(request: &ExtractionRequest, config: &ExtractorConfig) -> StreamPlan {
    let symbol = request.symbol.trim();
    let mut plan = StreamPlan::default();

    if request.include_spot {
        if symbol.contains('_') {
            debug!(symbol, "Underscored symbol, skipping spot streams");
        } else {
            plan.spot.push(StreamKey::spot_normal(symbol));
            plan.spot.push(StreamKey::spot_tpsl(symbol));
        }
    }

    if request.include_futures {
        plan.futures.extend(
            config
                .futures_suffixes
                .iter()
                .map(|suffix| StreamKey::futures(symbol, suffix.as_str())),
        );
    }

    plan
}

/// 모든 스트림이 공유하는 실행 컨텍스트.
struct RunContext<'a> {
    config: &'a ExtractorConfig,
    budget: TimeBudget,
    window: TimeWindow,
    fetcher: &'a dyn PageFetcher,
    /// 인증 실패 발생 여부 (진행 중인 스트림과 이후 웨이브를 멈춤)
    aborted: AtomicBool,
}

/// 심볼 하나의 주문 이력을 추출합니다.
///
/// 업스트림 실패는 스트림 상태와 `error_summary`로 보고되고 호출을 실패시키지 않습니다.
///
/// # Errors
/// - 스트림 시작 전에 발견된 설정 에러: `ExtractError::Config`
/// - 인증 실패: 실행 중인 스트림이 다음 요청 전에 멈춘 뒤 `ExtractError::Auth`
pub async fn extract(
    request: &ExtractionRequest,
    config: &ExtractorConfig,
    fetcher: &dyn PageFetcher,
) -> Result<SymbolExtractionResult> {
    config.validate()?;

    let symbol = request.symbol.trim();
    if symbol.is_empty() {
        return Err(ExtractError::Config("symbol must not be empty".to_string()));
    }

    let max_execution = request
        .max_execution_time
        .unwrap_or_else(|| config.max_execution_time());
    if max_execution <= config.safety_margin() {
        return Err(ExtractError::Config(format!(
            "max execution time {:?} must exceed safety margin {:?}",
            max_execution,
            config.safety_margin()
        )));
    }

    let budget = TimeBudget::start(
        max_execution,
        config.safety_margin(),
        config.timeout_fraction,
    );
    let plan = plan_streams(request, config);
    info!(
        symbol,
        spot_streams = plan.spot.len(),
        futures_streams = plan.futures.len(),
        budget_secs = max_execution.as_secs_f64(),
        "Extraction started"
    );

    let ctx = RunContext {
        config,
        budget,
        window: request.window,
        fetcher,
        aborted: AtomicBool::new(false),
    };

    let (spot, futures) = tokio::join!(
        run_group("spot", &plan.spot, config.max_concurrent_spot, &ctx),
        run_group("futures", &plan.futures, config.max_concurrent_futures, &ctx),
    );
    let outcomes: Vec<StreamOutcome> = spot?.into_iter().chain(futures?).collect();

    Ok(assemble(symbol, outcomes, budget))
}

/// 그룹 하나를 웨이브 단위로 실행합니다.
async fn run_group(
    group: &'static str,
    keys: &[StreamKey],
    cap: usize,
    ctx: &RunContext<'_>,
) -> Result<Vec<StreamOutcome>> {
    let waves: Vec<&[StreamKey]> = keys.chunks(cap.max(1)).collect();
    let mut outcomes = Vec::with_capacity(keys.len());
    let mut fatal: Option<ExtractError> = None;

    for (index, wave) in waves.iter().enumerate() {
        if ctx.aborted.load(Ordering::SeqCst) {
            break;
        }

        if !ctx.budget.may_start() {
            let skipped: Vec<&StreamKey> =
                waves[index..].iter().flat_map(|w| w.iter()).collect();
            warn!(
                group,
                wave = index,
                skipped = skipped.len(),
                "Time budget exhausted, skipping remaining waves"
            );
            outcomes.extend(
                skipped
                    .into_iter()
                    .map(|key| StreamOutcome::not_attempted(key.clone())),
            );
            break;
        }

        debug!(group, wave = index, streams = wave.len(), "Wave started");
        let results: Vec<Result<StreamOutcome>> = stream::iter(wave.iter().cloned())
            .map(|key| {
                FetchLoop::new(key, ctx.config, ctx.budget, ctx.window, ctx.fetcher)
                    .with_abort_flag(&ctx.aborted)
                    .run()
            })
            .buffered(cap)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    ctx.aborted.store(true, Ordering::SeqCst);
                    fatal.get_or_insert(err);
                }
            }
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(outcomes),
    }
}

/// 스트림 결과를 심볼 결과로 합칩니다.
fn assemble(
    symbol: &str,
    outcomes: Vec<StreamOutcome>,
    budget: TimeBudget,
) -> SymbolExtractionResult {
    let mut performance = PerformanceCounters::new();
    let mut error_summary: BTreeMap<ErrorCategory, usize> = BTreeMap::new();
    let mut streams = Vec::with_capacity(outcomes.len());
    let mut orders = Vec::new();

    for outcome in outcomes {
        performance.absorb(&outcome);
        if outcome.status != StreamStatus::NotAttempted {
            performance.streams_run_in_parallel += 1;
        }
        if let Some(category) = outcome.status.error_category() {
            *error_summary.entry(category).or_insert(0) += 1;
            warn!(stream = %outcome.key, category = %category, "Stream failed");
        }
        streams.push(StreamReport::from(&outcome));
        orders.extend(outcome.orders);
    }

    let elapsed = budget.elapsed();
    performance.log_summary(symbol, orders.len(), elapsed);

    SymbolExtractionResult {
        symbol: symbol.to_string(),
        orders,
        streams,
        error_summary,
        performance,
        elapsed_ms: elapsed.as_millis() as u64,
    }
}
