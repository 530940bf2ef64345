//! 주문 카테고리와 스트림 키.
//!
//! 하나의 심볼은 여러 개의 독립적인 페이지네이션 스트림으로 나뉩니다:
//! spot 일반 주문, spot TP/SL 주문, 그리고 futures 마켓 변형(정산 자산별) 하나씩.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 주문 카테고리.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderCategory {
    /// Spot 일반 주문
    SpotNormal,
    /// Spot take-profit / stop-loss 주문
    SpotTpsl,
    /// Futures 마켓 변형 (예: "UMCBL")
    Futures(String),
}

impl OrderCategory {
    /// Spot 카테고리인지 확인.
    pub fn is_spot(&self) -> bool {
        matches!(self, OrderCategory::SpotNormal | OrderCategory::SpotTpsl)
    }

    /// Spot API의 `tpslType` 파라미터 값.
    pub fn tpsl_type(&self) -> Option<&'static str> {
        match self {
            OrderCategory::SpotNormal => Some("normal"),
            OrderCategory::SpotTpsl => Some("tpsl"),
            OrderCategory::Futures(_) => None,
        }
    }

    /// Futures 마켓 변형 접미사.
    pub fn futures_suffix(&self) -> Option<&str> {
        match self {
            OrderCategory::Futures(suffix) => Some(suffix),
            _ => None,
        }
    }

    /// 요청한 개수보다 적은 페이지가 데이터의 끝을 의미하는지 여부.
    ///
    /// Spot 이력 API는 짧은 페이지로 끝을 알리고, futures API는
    /// 별도의 `nextFlag`로 다음 페이지 존재 여부를 알립니다.
    pub fn short_page_ends_stream(&self) -> bool {
        self.is_spot()
    }
}

impl fmt::Display for OrderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderCategory::SpotNormal => write!(f, "spot_normal"),
            OrderCategory::SpotTpsl => write!(f, "spot_tpsl"),
            OrderCategory::Futures(suffix) => write!(f, "futures_{}", suffix),
        }
    }
}

/// 하나의 논리적 페이지네이션 스트림 식별자.
///
/// 스트림별 상태(circuit breaker, 페이지 윈도우, 페이지 크기)의 조회 키로 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    /// 기본 심볼 (예: "BTCUSDT")
    pub symbol: String,
    /// 주문 카테고리
    pub category: OrderCategory,
}

impl StreamKey {
    pub fn new(symbol: impl Into<String>, category: OrderCategory) -> Self {
        Self {
            symbol: symbol.into(),
            category,
        }
    }

    pub fn spot_normal(symbol: impl Into<String>) -> Self {
        Self::new(symbol, OrderCategory::SpotNormal)
    }

    pub fn spot_tpsl(symbol: impl Into<String>) -> Self {
        Self::new(symbol, OrderCategory::SpotTpsl)
    }

    pub fn futures(symbol: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::new(symbol, OrderCategory::Futures(suffix.into()))
    }

    /// 거래소에 전달할 심볼.
    ///
    /// Futures는 `BTCUSDT_UMCBL`처럼 대문자 심볼에 마켓 접미사를 붙입니다.
    pub fn upstream_symbol(&self) -> String {
        match &self.category {
            OrderCategory::Futures(suffix) => {
                format!("{}_{}", self.symbol.to_uppercase(), suffix.to_uppercase())
            }
            _ => self.symbol.clone(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.category)
    }
}
