//! 페이지 조회 계약.

use async_trait::async_trait;
use extractor_core::{OrderRecord, StreamKey, TimeWindow};
use std::time::Duration;

use crate::FetchResult;

/// 한 페이지 조회 요청.
#[derive(Debug, Clone)]
pub struct PageQuery {
    /// 대상 스트림
    pub key: StreamKey,
    /// 이전 페이지가 돌려준 커서 (첫 페이지는 `None`)
    pub cursor: Option<String>,
    /// 요청 페이지 크기
    pub page_size: usize,
    /// 이번 요청에 허용된 최대 시간
    pub timeout: Duration,
    /// 조회 시간 범위
    pub window: TimeWindow,
}

/// 한 페이지 조회 결과.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    /// 거래소가 돌려준 순서 그대로의 주문
    pub orders: Vec<OrderRecord>,
    /// 다음 페이지 커서. 업스트림이 더 이상 데이터가 없다고 알리면 `None`.
    pub next_cursor: Option<String>,
    /// 조회에 걸린 시간 (추출 루프가 측정해서 채움)
    pub latency: Duration,
}

impl PageResult {
    pub fn new(orders: Vec<OrderRecord>, next_cursor: Option<String>) -> Self {
        Self {
            orders,
            next_cursor,
            latency: Duration::ZERO,
        }
    }

    /// 반환된 레코드 수.
    pub fn count(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// 페이지에서 가장 오래된(가장 작은) 숫자형 주문 ID.
    ///
    /// 시간 역순 페이지네이션에서 다음 페이지의 상한으로 사용됩니다.
    pub fn oldest_order_id(&self) -> Option<String> {
        self.orders
            .iter()
            .filter_map(OrderRecord::numeric_id)
            .min()
            .map(|id| id.to_string())
    }
}

/// 원시 페이지 조회자.
///
/// 인증된 HTTP 전송과 서명은 구현체의 몫이며 추출 엔진에 주입됩니다.
/// 구현체는 [`crate::FetchError`]의 다섯 가지 실패 중 하나로만 실패해야 합니다.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// 스트림의 한 페이지를 조회합니다.
    async fn fetch_page(&self, query: &PageQuery) -> FetchResult<PageResult>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use extractor_core::OrderCategory;

    fn order(id: &str) -> OrderRecord {
        OrderRecord::new(id, "BTCUSDT", OrderCategory::SpotNormal)
    }

    #[test]
    fn test_oldest_order_id() {
        let page = PageResult::new(vec![order("300"), order("100"), order("200")], None);
        assert_eq!(page.count(), 3);
        assert_eq!(page.oldest_order_id(), Some("100".to_string()));
    }

    #[test]
    fn test_oldest_order_id_skips_non_numeric() {
        let page = PageResult::new(vec![order("x-1"), order("42")], None);
        assert_eq!(page.oldest_order_id(), Some("42".to_string()));
        assert_eq!(PageResult::default().oldest_order_id(), None);
    }
}
