//! 마켓별 클라이언트 측 요청 제한.
//!
//! 최근 1초 동안 보낸 요청 시각을 마켓별로 보관하고, 한도에 도달하면
//! 가장 오래된 요청이 창을 벗어날 때까지 (최대 `max_wait`) 기다립니다.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use extractor_core::OrderCategory;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// 요청 한도 집계 창.
const WINDOW: Duration = Duration::from_secs(1);

/// 한도가 분리된 API 그룹.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Spot,
    Futures,
}

impl From<&OrderCategory> for Market {
    fn from(category: &OrderCategory) -> Self {
        if category.is_spot() {
            Market::Spot
        } else {
            Market::Futures
        }
    }
}

/// 슬라이딩 윈도우 요청 제한기.
#[derive(Debug)]
pub struct RequestLimiter {
    spot_per_sec: usize,
    futures_per_sec: usize,
    max_wait: Duration,
    sent: Mutex<HashMap<Market, VecDeque<Instant>>>,
}

impl RequestLimiter {
    pub fn new(spot_per_sec: usize, futures_per_sec: usize, max_wait: Duration) -> Self {
        Self {
            spot_per_sec: spot_per_sec.max(1),
            futures_per_sec: futures_per_sec.max(1),
            max_wait,
            sent: Mutex::new(HashMap::new()),
        }
    }

    fn limit(&self, market: Market) -> usize {
        match market {
            Market::Spot => self.spot_per_sec,
            Market::Futures => self.futures_per_sec,
        }
    }

    /// 요청 하나를 보낼 자리를 확보합니다. 실제로 기다린 시간을 반환합니다.
    ///
    /// 대기 시간은 `max_wait`로 잘리므로 한도를 잠시 넘길 수 있습니다.
    pub async fn acquire(&self, market: Market) -> Duration {
        let limit = self.limit(market);
        let mut sent = self.sent.lock().await;
        let window = sent.entry(market).or_default();

        let mut now = Instant::now();
        prune(window, now);

        let mut waited = Duration::ZERO;
        if window.len() >= limit {
            if let Some(&oldest) = window.front() {
                let wait = WINDOW.saturating_sub(now.duration_since(oldest)).min(self.max_wait);
                if !wait.is_zero() {
                    tracing::debug!(
                        market = ?market,
                        wait_ms = wait.as_millis() as u64,
                        "Request limit reached, waiting"
                    );
                    tokio::time::sleep(wait).await;
                    waited = wait;
                    now = Instant::now();
                    prune(window, now);
                }
            }
        }

        window.push_back(now);
        waited
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(&oldest) = window.front() {
        if now.duration_since(oldest) >= WINDOW {
            window.pop_front();
        } else {
            break;
        }
    }
}
