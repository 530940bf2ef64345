//! 주문 레코드.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::OrderCategory;

/// 거래소에서 가져온 주문 이력 한 건.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// 주문 ID
    pub order_id: String,
    /// 거래소 심볼 (futures는 접미사 포함)
    pub symbol: String,
    /// 주문 카테고리
    pub category: OrderCategory,
    /// 매수/매도
    pub side: String,
    /// 주문 상태
    pub status: String,
    /// 주문 유형 (limit, market 등)
    pub order_type: Option<String>,
    /// 주문 가격
    pub price: Option<Decimal>,
    /// 주문 수량
    pub size: Option<Decimal>,
    /// 체결 수량
    pub filled_size: Option<Decimal>,
    /// 생성 시각 (ms)
    pub created_at: Option<i64>,
    /// 갱신 시각 (ms)
    pub updated_at: Option<i64>,
    /// 레버리지 (futures)
    pub leverage: Option<Decimal>,
    /// 마진 모드 (futures)
    pub margin_mode: Option<String>,
    /// 마진 코인 (futures)
    pub margin_coin: Option<String>,
    /// 포지션 방향 (futures)
    pub position_side: Option<String>,
}

impl OrderRecord {
    pub fn new(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        category: OrderCategory,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            symbol: symbol.into(),
            category,
            side: String::new(),
            status: String::new(),
            order_type: None,
            price: None,
            size: None,
            filled_size: None,
            created_at: None,
            updated_at: None,
            leverage: None,
            margin_mode: None,
            margin_coin: None,
            position_side: None,
        }
    }

    /// 숫자형 주문 ID (커서 계산용).
    pub fn numeric_id(&self) -> Option<u64> {
        self.order_id.parse().ok()
    }
}

/// 문자열 숫자 필드를 관대하게 파싱.
///
/// 거래소는 빈 문자열이나 누락으로 값 없음을 표현하므로 실패는 `None`입니다.
pub fn parse_decimal(value: Option<&str>) -> Option<Decimal> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| Decimal::from_str(s).ok())
}

/// 문자열 타임스탬프 필드 파싱.
pub fn parse_timestamp(value: Option<&str>) -> Option<i64> {
    value.and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(Some("27123.5")), Some(dec!(27123.5)));
        assert_eq!(parse_decimal(Some(" 0.01 ")), Some(dec!(0.01)));
        assert_eq!(parse_decimal(Some("")), None);
        assert_eq!(parse_decimal(Some("n/a")), None);
        assert_eq!(parse_decimal(None), None);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp(Some("1700000000000")), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp(Some("abc")), None);
    }

    #[test]
    fn test_numeric_id() {
        let order = OrderRecord::new("1098394044393", "BTCUSDT", OrderCategory::SpotNormal);
        assert_eq!(order.numeric_id(), Some(1_098_394_044_393));

        let custom = OrderRecord::new("abc", "BTCUSDT", OrderCategory::SpotTpsl);
        assert_eq!(custom.numeric_id(), None);
    }
}
