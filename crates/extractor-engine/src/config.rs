//! 추출 엔진 설정.
//!
//! 엔진 자체는 환경 변수를 읽지 않습니다. CLI가 [`ExtractorConfig::from_env`]로
//! 설정을 만들어 [`crate::extract`]에 넘깁니다.

use extractor_core::OrderCategory;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::{ExtractError, Result};

/// 추출 엔진 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// 호출당 최대 실행 시간 (초, 기본값: 50)
    #[serde(default = "default_max_execution_time_secs")]
    pub max_execution_time_secs: u64,

    /// 안전 여유 시간 (초, 기본값: 5)
    /// 남은 시간이 이 값 이하이면 새 요청/재시도/웨이브를 시작하지 않습니다
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,

    /// 요청 타임아웃으로 쓸 남은 시간의 비율 (기본값: 0.5)
    #[serde(default = "default_timeout_fraction")]
    pub timeout_fraction: f64,

    /// 요청당 타임아웃 상한 (초, 기본값: 15)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// 동시에 실행할 futures 스트림 수 (기본값: 3)
    #[serde(default = "default_max_concurrent_futures")]
    pub max_concurrent_futures: usize,

    /// 동시에 실행할 spot 스트림 수 (기본값: 2)
    #[serde(default = "default_max_concurrent_spot")]
    pub max_concurrent_spot: usize,

    #[serde(default = "default_true")]
    pub enable_circuit_breaker: bool,

    #[serde(default = "default_true")]
    pub enable_smart_pagination: bool,

    #[serde(default = "default_true")]
    pub adaptive_page_sizing: bool,

    /// spot 일반 주문 최대 페이지 수 (기본값: 25)
    #[serde(default = "default_spot_max_pages")]
    pub spot_max_pages: usize,

    /// spot TP/SL 주문 최대 페이지 수 상한 (기본값: 10)
    #[serde(default = "default_tpsl_max_pages")]
    pub tpsl_max_pages: usize,

    /// futures 스트림 최대 페이지 수 (기본값: 25)
    #[serde(default = "default_futures_max_pages")]
    pub futures_max_pages: usize,

    /// 페이지당 재시도 횟수 (기본값: 2)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_min_page_size")]
    pub min_page_size: usize,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// 고정 페이지 크기이자 페이지네이션 예측의 기준 (기본값: 100)
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    /// 적응형 크기 조절 단위 (기본값: 20)
    #[serde(default = "default_page_size_step")]
    pub page_size_step: usize,

    /// 적응형 크기 조절 시작값 (미지정 시 [min, max]의 중간값)
    #[serde(default)]
    pub initial_page_size: Option<usize>,

    /// 재시도 백오프 기준 (밀리초, 기본값: 300)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// 재시도 백오프 상한 (밀리초, 기본값: 5000)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// futures 마켓 변형 접미사 (기본값: UMCBL, DMCBL, CMCBL)
    #[serde(default = "default_futures_suffixes")]
    pub futures_suffixes: Vec<String>,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

fn default_max_execution_time_secs() -> u64 {
    50
}
fn default_safety_margin_secs() -> u64 {
    5
}
fn default_timeout_fraction() -> f64 {
    0.5
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_max_concurrent_futures() -> usize {
    3
}
fn default_max_concurrent_spot() -> usize {
    2
}
fn default_true() -> bool {
    true
}
fn default_spot_max_pages() -> usize {
    25
}
fn default_tpsl_max_pages() -> usize {
    10
}
fn default_futures_max_pages() -> usize {
    25
}
fn default_max_retries() -> u32 {
    2
}
fn default_min_page_size() -> usize {
    50
}
fn default_max_page_size() -> usize {
    100
}
fn default_page_limit() -> usize {
    100
}
fn default_page_size_step() -> usize {
    20
}
fn default_backoff_base_ms() -> u64 {
    300
}
fn default_backoff_max_ms() -> u64 {
    5_000
}
fn default_futures_suffixes() -> Vec<String> {
    vec!["UMCBL".to_string(), "DMCBL".to_string(), "CMCBL".to_string()]
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_execution_time_secs: default_max_execution_time_secs(),
            safety_margin_secs: default_safety_margin_secs(),
            timeout_fraction: default_timeout_fraction(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_futures: default_max_concurrent_futures(),
            max_concurrent_spot: default_max_concurrent_spot(),
            enable_circuit_breaker: true,
            enable_smart_pagination: true,
            adaptive_page_sizing: true,
            spot_max_pages: default_spot_max_pages(),
            tpsl_max_pages: default_tpsl_max_pages(),
            futures_max_pages: default_futures_max_pages(),
            max_retries: default_max_retries(),
            min_page_size: default_min_page_size(),
            max_page_size: default_max_page_size(),
            page_limit: default_page_limit(),
            page_size_step: default_page_size_step(),
            initial_page_size: None,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            futures_suffixes: default_futures_suffixes(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ExtractorConfig {
    /// 환경 변수에서 설정 로드.
    ///
    /// `.env` 파일이 있으면 먼저 읽습니다. 파싱할 수 없는 값은 기본값으로 대체됩니다.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let futures_suffixes = std::env::var("FUTURES_SUFFIXES")
            .ok()
            .map(|v| parse_suffixes(&v))
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.futures_suffixes);

        let config = Self {
            max_execution_time_secs: env_var_parse(
                "MAX_EXECUTION_TIME",
                defaults.max_execution_time_secs,
            ),
            safety_margin_secs: env_var_parse("SAFETY_MARGIN", defaults.safety_margin_secs),
            timeout_fraction: env_var_parse("TIMEOUT_FRACTION", defaults.timeout_fraction),
            request_timeout_secs: env_var_parse("BITGET_TIMEOUT", defaults.request_timeout_secs),
            max_concurrent_futures: env_var_parse(
                "MAX_CONCURRENT_FUTURES",
                defaults.max_concurrent_futures,
            ),
            max_concurrent_spot: env_var_parse("MAX_CONCURRENT_SPOT", defaults.max_concurrent_spot),
            enable_circuit_breaker: env_var_bool("ENABLE_CIRCUIT_BREAKER", true),
            enable_smart_pagination: env_var_bool("ENABLE_SMART_PAGINATION", true),
            adaptive_page_sizing: env_var_bool("ADAPTIVE_PAGE_SIZING", true),
            spot_max_pages: env_var_parse("SPOT_MAX_PAGES", defaults.spot_max_pages),
            tpsl_max_pages: env_var_parse("TPSL_MAX_PAGES", defaults.tpsl_max_pages),
            futures_max_pages: env_var_parse("FUTURES_MAX_PAGES", defaults.futures_max_pages),
            max_retries: env_var_parse("BITGET_RETRIES", defaults.max_retries),
            min_page_size: env_var_parse("MIN_PAGE_SIZE", defaults.min_page_size),
            max_page_size: env_var_parse("MAX_PAGE_SIZE", defaults.max_page_size),
            page_limit: env_var_parse("BITGET_PAGE_LIMIT", defaults.page_limit),
            page_size_step: env_var_parse("PAGE_SIZE_STEP", defaults.page_size_step),
            initial_page_size: std::env::var("INITIAL_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok()),
            backoff_base_ms: env_var_parse("BACKOFF_BASE_MS", defaults.backoff_base_ms),
            backoff_max_ms: env_var_parse("BACKOFF_MAX_MS", defaults.backoff_max_ms),
            futures_suffixes,
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_var_parse(
                    "CIRCUIT_BREAKER_THRESHOLD",
                    defaults.circuit_breaker.failure_threshold,
                ),
                recovery_timeout_ms: env_var_parse(
                    "CIRCUIT_BREAKER_RECOVERY_MS",
                    defaults.circuit_breaker.recovery_timeout_ms,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// 설정 값을 검증합니다.
    pub fn validate(&self) -> Result<()> {
        if self.max_execution_time_secs == 0 {
            return Err(invalid("max_execution_time_secs must be greater than 0"));
        }
        if self.safety_margin_secs >= self.max_execution_time_secs {
            return Err(invalid(
                "safety_margin_secs must be less than max_execution_time_secs",
            ));
        }
        if !(self.timeout_fraction > 0.0 && self.timeout_fraction <= 1.0) {
            return Err(invalid("timeout_fraction must be in (0, 1]"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs must be greater than 0"));
        }
        if self.max_concurrent_futures == 0 || self.max_concurrent_spot == 0 {
            return Err(invalid("concurrency limits must be greater than 0"));
        }
        if self.min_page_size == 0 || self.min_page_size > self.max_page_size {
            return Err(invalid(
                "min_page_size must be greater than 0 and not exceed max_page_size",
            ));
        }
        if self.page_limit == 0 {
            return Err(invalid("page_limit must be greater than 0"));
        }
        if let Some(initial) = self.initial_page_size {
            if initial < self.min_page_size || initial > self.max_page_size {
                return Err(invalid(
                    "initial_page_size must lie within [min_page_size, max_page_size]",
                ));
            }
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(invalid("circuit_breaker.failure_threshold must be greater than 0"));
        }
        if self.futures_suffixes.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid("futures_suffixes must not contain empty entries"));
        }
        Ok(())
    }

    pub fn max_execution_time(&self) -> Duration {
        Duration::from_secs(self.max_execution_time_secs)
    }

    pub fn safety_margin(&self) -> Duration {
        Duration::from_secs(self.safety_margin_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 적응형 크기 조절 시작값.
    pub fn initial_page_size(&self) -> usize {
        self.initial_page_size
            .unwrap_or((self.min_page_size + self.max_page_size) / 2)
    }

    /// 카테고리별 최대 페이지 수.
    ///
    /// TP/SL 주문은 spot 상한의 절반과 `tpsl_max_pages` 중 작은 값을 씁니다.
    pub fn max_pages_for(&self, category: &OrderCategory) -> usize {
        match category {
            OrderCategory::SpotNormal => self.spot_max_pages,
            OrderCategory::SpotTpsl => (self.spot_max_pages / 2).min(self.tpsl_max_pages),
            OrderCategory::Futures(_) => self.futures_max_pages,
        }
    }

    /// 재시도 `attempt`(0부터)의 백오프 지연: `base * 2^attempt`, 상한 적용.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let delay_ms = self
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.backoff_max_ms);
        Duration::from_millis(delay_ms)
    }
}

fn invalid(message: &str) -> ExtractError {
    ExtractError::Config(message.to_string())
}

fn parse_suffixes(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();

        assert_eq!(config.max_execution_time(), Duration::from_secs(50));
        assert_eq!(config.safety_margin(), Duration::from_secs(5));
        assert_eq!(config.max_concurrent_futures, 3);
        assert_eq!(config.max_concurrent_spot, 2);
        assert_eq!(config.initial_page_size(), 75);
        assert_eq!(config.futures_suffixes, vec!["UMCBL", "DMCBL", "CMCBL"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_max_pages_per_category() {
        let config = ExtractorConfig::default();

        assert_eq!(config.max_pages_for(&OrderCategory::SpotNormal), 25);
        assert_eq!(config.max_pages_for(&OrderCategory::SpotTpsl), 10);
        assert_eq!(
            config.max_pages_for(&OrderCategory::Futures("UMCBL".into())),
            25
        );

        let small = ExtractorConfig {
            spot_max_pages: 6,
            ..Default::default()
        };
        assert_eq!(small.max_pages_for(&OrderCategory::SpotTpsl), 3);
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let config = ExtractorConfig::default();

        assert_eq!(config.backoff_delay(0), Duration::from_millis(300));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(600));
        assert_eq!(config.backoff_delay(4), Duration::from_millis(4_800));
        assert_eq!(config.backoff_delay(5), Duration::from_millis(5_000));
        assert_eq!(config.backoff_delay(64), Duration::from_millis(5_000));
    }

    #[test]
    fn test_validate_rejects_inconsistent_values() {
        let cases = [
            ExtractorConfig {
                min_page_size: 120,
                ..Default::default()
            },
            ExtractorConfig {
                max_concurrent_futures: 0,
                ..Default::default()
            },
            ExtractorConfig {
                safety_margin_secs: 50,
                ..Default::default()
            },
            ExtractorConfig {
                timeout_fraction: 0.0,
                ..Default::default()
            },
            ExtractorConfig {
                timeout_fraction: 1.5,
                ..Default::default()
            },
            ExtractorConfig {
                initial_page_size: Some(30),
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(ExtractError::Config(_))),
                "{:?} should be rejected",
                config
            );
        }
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: ExtractorConfig = serde_json::from_str(
            r#"{"max_execution_time_secs": 30, "futures_suffixes": ["UMCBL"],
                "circuit_breaker": {"failure_threshold": 5}}"#,
        )
        .unwrap();

        assert_eq!(config.max_execution_time_secs, 30);
        assert_eq!(config.safety_margin_secs, 5);
        assert_eq!(config.futures_suffixes, vec!["UMCBL"]);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.recovery_timeout_ms, 30_000);
    }

    #[test]
    fn test_parse_suffixes() {
        assert_eq!(parse_suffixes(" umcbl, DMCBL ,,"), vec!["UMCBL", "DMCBL"]);
        assert!(parse_suffixes("").is_empty());
    }
}
