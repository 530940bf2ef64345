//! Bitget API 응답 타입.

use extractor_core::{parse_decimal, parse_timestamp, OrderCategory, OrderRecord};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 문자열 또는 숫자로 오는 필드를 문자열로 받습니다.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// 공통 응답 봉투.
#[derive(Debug, Deserialize)]
pub(crate) struct BitgetEnvelope<T> {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

impl<T> BitgetEnvelope<T> {
    /// 성공 코드 여부 ("00000" 또는 "0").
    pub fn is_success(&self) -> bool {
        matches!(self.code.as_deref(), Some("00000") | Some("0"))
    }
}

/// 에러 응답 본문.
#[derive(Debug, Deserialize)]
pub(crate) struct BitgetErrorBody {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

/// `/api/v2/spot/trade/history-orders` 주문 항목.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SpotOrderRaw {
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub base_volume: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub c_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub u_time: Option<String>,
}

impl SpotOrderRaw {
    /// 주문 ID가 없는 항목은 버립니다.
    pub fn into_record(self, category: &OrderCategory) -> Option<OrderRecord> {
        let order_id = self.order_id?;
        let mut record = OrderRecord::new(
            order_id,
            self.symbol.unwrap_or_default(),
            category.clone(),
        );
        record.side = self.side.unwrap_or_default();
        record.status = self.status.unwrap_or_default();
        record.order_type = self.order_type;
        record.price = parse_decimal(self.price.as_deref());
        record.size = parse_decimal(self.size.as_deref());
        record.filled_size = parse_decimal(self.base_volume.as_deref());
        record.created_at = parse_timestamp(self.c_time.as_deref());
        record.updated_at = parse_timestamp(self.u_time.as_deref());
        Some(record)
    }
}

/// `/api/mix/v1/order/history` 응답의 `data`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FuturesHistoryData {
    #[serde(default)]
    pub next_flag: bool,
    #[serde(default, deserialize_with = "lenient_string")]
    pub end_id: Option<String>,
    #[serde(default)]
    pub order_list: Option<Vec<FuturesOrderRaw>>,
}

/// Futures 주문 항목.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FuturesOrderRaw {
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub side: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub order_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub size: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub filled_qty: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub leverage: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub margin_mode: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub margin_coin: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub pos_side: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub c_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub u_time: Option<String>,
}

impl FuturesOrderRaw {
    pub fn into_record(self, category: &OrderCategory) -> Option<OrderRecord> {
        let order_id = self.order_id?;
        let mut record = OrderRecord::new(
            order_id,
            self.symbol.unwrap_or_default(),
            category.clone(),
        );
        record.side = self.side.unwrap_or_default();
        record.status = self.state.unwrap_or_default();
        record.order_type = self.order_type;
        record.price = parse_decimal(self.price.as_deref());
        record.size = parse_decimal(self.size.as_deref());
        record.filled_size = parse_decimal(self.filled_qty.as_deref());
        record.leverage = parse_decimal(self.leverage.as_deref());
        record.margin_mode = self.margin_mode;
        record.margin_coin = self.margin_coin;
        record.position_side = self.pos_side;
        record.created_at = parse_timestamp(self.c_time.as_deref());
        record.updated_at = parse_timestamp(self.u_time.as_deref());
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_envelope_code_accepts_string_and_number() {
        let env: BitgetEnvelope<Value> =
            serde_json::from_str(r#"{"code":"00000","msg":"success","data":[]}"#).unwrap();
        assert!(env.is_success());

        let env: BitgetEnvelope<Value> =
            serde_json::from_str(r#"{"code":0,"msg":"success","data":null}"#).unwrap();
        assert!(env.is_success());
        assert!(env.data.is_none());

        let env: BitgetEnvelope<Value> =
            serde_json::from_str(r#"{"code":"40034","msg":"Parameter does not exist"}"#).unwrap();
        assert!(!env.is_success());
    }

    #[test]
    fn test_futures_order_numeric_fields() {
        let raw: FuturesOrderRaw = serde_json::from_str(
            r#"{"orderId":"802382049422487552","symbol":"BTCUSDT_UMCBL","size":0.5,
                "price":"27000","leverage":20,"marginMode":"crossed","state":"filled",
                "side":"open_long","cTime":"1700000000000"}"#,
        )
        .unwrap();
        let record = raw
            .into_record(&OrderCategory::Futures("UMCBL".into()))
            .unwrap();

        assert_eq!(record.size, Some(dec!(0.5)));
        assert_eq!(record.leverage, Some(dec!(20)));
        assert_eq!(record.margin_mode.as_deref(), Some("crossed"));
        assert_eq!(record.status, "filled");
        assert_eq!(record.created_at, Some(1_700_000_000_000));
    }

    #[test]
    fn test_spot_order_without_id_is_dropped() {
        let raw: SpotOrderRaw = serde_json::from_str(r#"{"symbol":"BTCUSDT"}"#).unwrap();
        assert!(raw.into_record(&OrderCategory::SpotNormal).is_none());
    }
}
