//! Bitget 거래소 커넥터.
//!
//! 주문 이력 조회에 필요한 서명된 REST GET만 구현합니다.
//! - Spot: `/api/v2/spot/trade/history-orders` (`idLessThan` 커서)
//! - Futures: `/api/mix/v1/order/history` (`lastEndId` 커서, `nextFlag`)
//!
//! 요청은 마켓별 제한기(spot 15/s, futures 8/s)를 거쳐 전송되고,
//! spot 조회 범위는 30일 이하 구간으로 나뉘어 최근 구간부터 조회됩니다.

mod limiter;
mod types;

pub use limiter::{Market, RequestLimiter};

use crate::traits::{PageFetcher, PageQuery, PageResult};
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use extractor_core::{OrderCategory, OrderRecord, TimeWindow};
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use types::{BitgetEnvelope, BitgetErrorBody, FuturesHistoryData, SpotOrderRaw};

type HmacSha256 = Hmac<Sha256>;

/// 기본 REST 엔드포인트.
pub const DEFAULT_BASE_URL: &str = "https://api.bitget.com";

const SPOT_HISTORY_PATH: &str = "/api/v2/spot/trade/history-orders";
const FUTURES_HISTORY_PATH: &str = "/api/mix/v1/order/history";

/// spot 요청 한 번에 허용되는 최대 조회 기간 (일). 범위 없는 요청의 기본 기간이기도 합니다.
pub const SPOT_MAX_WINDOW_DAYS: i64 = 30;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// 초당 spot 요청 한도 기본값.
pub const DEFAULT_SPOT_REQUESTS_PER_SEC: usize = 15;

/// 초당 futures 요청 한도 기본값.
pub const DEFAULT_FUTURES_REQUESTS_PER_SEC: usize = 8;

/// 요청 제한 대기 상한.
const MAX_LIMITER_WAIT: Duration = Duration::from_millis(500);

/// 인증 실패로 취급하는 업무 코드 (키, 서명, 패스프레이즈, 권한).
const AUTH_ERROR_CODES: &[&str] = &["40006", "40009", "40012", "40037"];

/// 존재하지 않는 심볼 코드.
const SYMBOL_NOT_FOUND_CODES: &[&str] = &["40034", "40309"];

// ============================================================================
// 설정
// ============================================================================

/// Bitget 클라이언트 설정.
///
/// `Debug` 구현은 API 키를 마스킹하고 시크릿은 출력하지 않습니다.
pub struct BitgetConfig {
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: SecretString,
    /// API 패스프레이즈
    pub passphrase: SecretString,
    /// REST 기본 URL
    pub base_url: String,
    /// HTTP 클라이언트 기본 타임아웃 (초). 요청별 타임아웃이 우선합니다.
    pub timeout_secs: u64,
    /// 초당 spot 요청 한도
    pub spot_requests_per_sec: usize,
    /// 초당 futures 요청 한도
    pub futures_requests_per_sec: usize,
}

impl fmt::Debug for BitgetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars: Vec<char> = self.api_key.chars().collect();
        let masked_key = if chars.len() > 8 {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{}...{}", head, tail)
        } else {
            "***REDACTED***".to_string()
        };

        f.debug_struct("BitgetConfig")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .field("passphrase", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("spot_requests_per_sec", &self.spot_requests_per_sec)
            .field("futures_requests_per_sec", &self.futures_requests_per_sec)
            .finish()
    }
}

impl BitgetConfig {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
            passphrase: SecretString::from(passphrase.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            spot_requests_per_sec: DEFAULT_SPOT_REQUESTS_PER_SEC,
            futures_requests_per_sec: DEFAULT_FUTURES_REQUESTS_PER_SEC,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_rate_limits(mut self, spot_per_sec: usize, futures_per_sec: usize) -> Self {
        self.spot_requests_per_sec = spot_per_sec;
        self.futures_requests_per_sec = futures_per_sec;
        self
    }

    /// 환경 변수에서 생성.
    ///
    /// `BITGET_API_KEY`, `BITGET_API_SECRET`, `BITGET_API_PASSPHRASE` 중
    /// 하나라도 없으면 `None`을 반환합니다. `BITGET_BASE`로 기본 URL을,
    /// `BITGET_SPOT_RATE_LIMIT` / `BITGET_FUTURES_RATE_LIMIT`로 초당 요청 한도를 바꿀 수 있습니다.
    pub fn from_env() -> Option<Self> {
        let api_key = non_empty_env("BITGET_API_KEY")?;
        let api_secret = non_empty_env("BITGET_API_SECRET")?;
        let passphrase = non_empty_env("BITGET_API_PASSPHRASE")?;

        let mut config = Self::new(api_key, api_secret, passphrase);
        if let Some(base_url) = non_empty_env("BITGET_BASE") {
            config.base_url = base_url;
        }
        if let Some(limit) = non_empty_env("BITGET_SPOT_RATE_LIMIT").and_then(|v| v.parse().ok()) {
            config.spot_requests_per_sec = limit;
        }
        if let Some(limit) =
            non_empty_env("BITGET_FUTURES_RATE_LIMIT").and_then(|v| v.parse().ok())
        {
            config.futures_requests_per_sec = limit;
        }
        Some(config)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// spot 조회 범위를 `SPOT_MAX_WINDOW_DAYS` 이하 구간으로 나눕니다 (최근 구간부터).
///
/// 종료 시각이 없으면 `now_ms`, 시작 시각이 없으면 종료 시각 30일 전을 사용합니다.
/// 구간은 서로 겹치지 않습니다.
pub fn spot_chunks(window: &TimeWindow, now_ms: i64) -> Vec<TimeWindow> {
    let span = SPOT_MAX_WINDOW_DAYS * DAY_MS;
    let end = window.end_ms.unwrap_or(now_ms);
    let start = window.start_ms.unwrap_or(end - span);
    if start >= end {
        return vec![TimeWindow {
            start_ms: Some(start),
            end_ms: Some(end),
        }];
    }

    let mut chunks = Vec::new();
    let mut chunk_end = end;
    while chunk_end >= start {
        let chunk_start = start.max(chunk_end - span);
        chunks.push(TimeWindow {
            start_ms: Some(chunk_start),
            end_ms: Some(chunk_end),
        });
        chunk_end = chunk_start - 1;
    }
    chunks
}

/// spot 커서: 구간 번호와 그 구간 안의 `idLessThan`.
///
/// 구간이 하나뿐이면 주문 ID만, 여러 개면 `"{구간}:{ID}"` 형식으로 인코딩합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SpotCursor {
    chunk: usize,
    id_less_than: Option<String>,
}

impl SpotCursor {
    fn parse(cursor: Option<&str>) -> Self {
        let Some(cursor) = cursor else {
            return Self::default();
        };
        match cursor.split_once(':') {
            Some((chunk, id)) => Self {
                chunk: chunk.parse().unwrap_or(0),
                id_less_than: Some(id.to_string()).filter(|id| !id.is_empty()),
            },
            None => Self {
                chunk: 0,
                id_less_than: Some(cursor.to_string()),
            },
        }
    }

    fn encode(&self, chunked: bool) -> String {
        let id = self.id_less_than.as_deref().unwrap_or_default();
        if chunked {
            format!("{}:{}", self.chunk, id)
        } else {
            id.to_string()
        }
    }
}

/// `prehash`에 대한 base64(HMAC-SHA256) 서명.
pub fn sign_prehash(secret: &str, prehash: &str) -> FetchResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| FetchError::Unauthorized(format!("invalid API secret: {}", e)))?;
    mac.update(prehash.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

// ============================================================================
// 클라이언트
// ============================================================================

/// Bitget 주문 이력 클라이언트.
pub struct BitgetClient {
    config: BitgetConfig,
    client: Client,
    limiter: RequestLimiter,
}

impl fmt::Debug for BitgetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitgetClient")
            .field("config", &self.config)
            .finish()
    }
}

impl BitgetClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `FetchError::NetworkError`를 반환합니다.
    pub fn new(config: BitgetConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        let limiter = RequestLimiter::new(
            config.spot_requests_per_sec,
            config.futures_requests_per_sec,
            MAX_LIMITER_WAIT,
        );

        Ok(Self {
            config,
            client,
            limiter,
        })
    }

    pub fn config(&self) -> &BitgetConfig {
        &self.config
    }

    fn build_url(&self, path: &str, params: &BTreeMap<&str, String>) -> FetchResult<Url> {
        let base = self.config.base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}", base, path))
            .map_err(|e| FetchError::NetworkError(format!("invalid URL {}{}: {}", base, path, e)))?;

        // BTreeMap 순회 순서가 곧 서명에 쓰이는 정렬된 쿼리 순서
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// 서명된 GET 요청.
    ///
    /// 성공 응답의 `data`가 `null`이면 `Ok(None)`을 반환합니다.
    async fn signed_get<T: DeserializeOwned>(
        &self,
        market: Market,
        path: &str,
        params: &BTreeMap<&str, String>,
        timeout: Duration,
    ) -> FetchResult<Option<T>> {
        self.limiter.acquire(market).await;

        let url = self.build_url(path, params)?;
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let prehash = match url.query() {
            Some(query) => format!("{}GET{}?{}", timestamp, url.path(), query),
            None => format!("{}GET{}", timestamp, url.path()),
        };
        let signature = sign_prehash(self.config.api_secret.expose_secret(), &prehash)?;

        debug!(path = %path, query = ?url.query(), "GET (signed)");

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header("ACCESS-KEY", &self.config.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-PASSPHRASE", self.config.passphrase.expose_secret())
            .header("ACCESS-TIMESTAMP", &timestamp)
            .header("locale", "en-US")
            .header("Content-Type", "application/json")
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> FetchResult<Option<T>> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let envelope: BitgetEnvelope<T> = serde_json::from_str(&body).map_err(|e| {
                warn!(error = %e, "Failed to parse Bitget response");
                FetchError::from(e)
            })?;
            if envelope.is_success() {
                return Ok(envelope.data);
            }
            return Err(map_error(
                status,
                envelope.code.as_deref(),
                envelope.msg.as_deref().unwrap_or_default(),
            ));
        }

        match serde_json::from_str::<BitgetErrorBody>(&body) {
            Ok(error) => Err(map_error(
                status,
                error.code.as_deref(),
                error.msg.as_deref().unwrap_or(&body),
            )),
            Err(_) => Err(map_error(status, None, &body)),
        }
    }

    /// spot 한 페이지 조회.
    ///
    /// 현재 구간에서 페이지를 다 채우지 못하면 다음(더 오래된) 구간에서 나머지를 채웁니다.
    /// 마지막 구간까지 소진되면 커서는 `None`입니다.
    async fn fetch_spot_page(&self, query: &PageQuery) -> FetchResult<PageResult> {
        let chunks = spot_chunks(&query.window, chrono::Utc::now().timestamp_millis());
        let chunked = chunks.len() > 1;
        let mut cursor = SpotCursor::parse(query.cursor.as_deref());
        let mut page = PageResult::default();

        while let Some(chunk) = chunks.get(cursor.chunk) {
            let wanted = query.page_size.saturating_sub(page.count());
            let records = self
                .fetch_spot_chunk(query, chunk, cursor.id_less_than.as_deref(), wanted)
                .await?;
            let filled = records.len() >= wanted;
            let oldest = records
                .iter()
                .filter_map(OrderRecord::numeric_id)
                .min()
                .map(|id| id.to_string());
            page.orders.extend(records);

            if filled {
                if let Some(id) = oldest {
                    cursor.id_less_than = Some(id);
                    page.next_cursor = Some(cursor.encode(chunked));
                }
                return Ok(page);
            }

            cursor = SpotCursor {
                chunk: cursor.chunk + 1,
                id_less_than: None,
            };
            if cursor.chunk < chunks.len() {
                debug!(stream = %query.key, chunk = cursor.chunk, "Spot window chunk exhausted");
            }
        }

        Ok(page)
    }

    async fn fetch_spot_chunk(
        &self,
        query: &PageQuery,
        chunk: &TimeWindow,
        id_less_than: Option<&str>,
        limit: usize,
    ) -> FetchResult<Vec<OrderRecord>> {
        let mut params = BTreeMap::new();
        params.insert("symbol", query.key.upstream_symbol());
        params.insert("limit", limit.to_string());
        if let Some(tpsl_type) = query.key.category.tpsl_type() {
            params.insert("tpslType", tpsl_type.to_string());
        }
        if let Some(id) = id_less_than {
            params.insert("idLessThan", id.to_string());
        }
        if let Some(start) = chunk.start_ms {
            params.insert("startTime", start.to_string());
        }
        if let Some(end) = chunk.end_ms {
            params.insert("endTime", end.to_string());
        }

        let raw: Vec<SpotOrderRaw> = self
            .signed_get(Market::Spot, SPOT_HISTORY_PATH, &params, query.timeout)
            .await?
            .unwrap_or_default();

        Ok(self.to_records(
            raw.into_iter()
                .filter_map(|o| o.into_record(&query.key.category)),
            query,
        ))
    }

    async fn fetch_futures_page(&self, query: &PageQuery) -> FetchResult<PageResult> {
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut params = BTreeMap::new();
        params.insert("symbol", query.key.upstream_symbol());
        params.insert("pageSize", query.page_size.to_string());
        params.insert("startTime", query.window.start_ms.unwrap_or(0).to_string());
        params.insert("endTime", query.window.end_ms.unwrap_or(now_ms).to_string());
        if let Some(cursor) = &query.cursor {
            params.insert("lastEndId", cursor.clone());
        }

        let data: FuturesHistoryData = self
            .signed_get(Market::Futures, FUTURES_HISTORY_PATH, &params, query.timeout)
            .await?
            .unwrap_or_default();

        let next_cursor = if data.next_flag {
            data.end_id.filter(|id| !id.is_empty())
        } else {
            None
        };
        let orders = self.to_records(
            data.order_list
                .unwrap_or_default()
                .into_iter()
                .filter_map(|o| o.into_record(&query.key.category)),
            query,
        );
        Ok(PageResult::new(orders, next_cursor))
    }

    fn to_records(
        &self,
        records: impl Iterator<Item = OrderRecord>,
        query: &PageQuery,
    ) -> Vec<OrderRecord> {
        records
            .map(|mut record| {
                if record.symbol.is_empty() {
                    record.symbol = query.key.upstream_symbol();
                }
                record
            })
            .collect()
    }
}

/// HTTP 상태와 Bitget 업무 코드를 `FetchError`로 매핑.
fn map_error(status: StatusCode, code: Option<&str>, msg: &str) -> FetchError {
    let detail = match code {
        Some(code) => format!("HTTP {} code {}: {}", status.as_u16(), code, msg),
        None => format!("HTTP {}: {}", status.as_u16(), msg),
    };

    if let Some(code) = code {
        if AUTH_ERROR_CODES.contains(&code) {
            return FetchError::Unauthorized(detail);
        }
        if SYMBOL_NOT_FOUND_CODES.contains(&code) {
            return FetchError::SymbolNotFound(detail);
        }
        if code == "429" {
            return FetchError::RateLimited(detail);
        }
    }

    let lower = msg.to_lowercase();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        FetchError::Unauthorized(detail)
    } else if status == StatusCode::TOO_MANY_REQUESTS || lower.contains("too many requests") {
        FetchError::RateLimited(detail)
    } else if lower.contains("does not exist") {
        FetchError::SymbolNotFound(detail)
    } else {
        FetchError::NetworkError(detail)
    }
}

#[async_trait]
impl PageFetcher for BitgetClient {
    async fn fetch_page(&self, query: &PageQuery) -> FetchResult<PageResult> {
        let page = match query.key.category {
            OrderCategory::Futures(_) => self.fetch_futures_page(query).await?,
            OrderCategory::SpotNormal | OrderCategory::SpotTpsl => {
                self.fetch_spot_page(query).await?
            }
        };

        debug!(
            stream = %query.key,
            count = page.count(),
            next_cursor = ?page.next_cursor,
            "Fetched page"
        );
        Ok(page)
    }
}
