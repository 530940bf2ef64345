//! 페이지 조회 에러 타입.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 업스트림 페이지 조회 실패.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// 네트워크/연결 에러, 서버 에러, 해석할 수 없는 응답
    #[error("Network error: {0}")]
    NetworkError(String),

    /// 요청 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 요청 한도 초과
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// 거래소에 존재하지 않는 심볼
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// 인증/권한 에러
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

/// 페이지 조회 결과 타입.
pub type FetchResult<T> = Result<T, FetchError>;

impl FetchError {
    /// 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::NetworkError(_) | FetchError::Timeout(_) | FetchError::RateLimited(_)
        )
    }

    /// 재시도 예산 소진을 기다리지 않고 즉시 circuit breaker에 기록되는지 여부.
    pub fn trips_breaker_immediately(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited(_) | FetchError::SymbolNotFound(_)
        )
    }

    /// 인증 에러인지 확인 (호출 전체를 중단).
    pub fn is_auth_error(&self) -> bool {
        matches!(self, FetchError::Unauthorized(_))
    }

    /// 에러 카테고리.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchError::NetworkError(_) | FetchError::Timeout(_) => ErrorCategory::Network,
            FetchError::RateLimited(_) => ErrorCategory::RateLimit,
            FetchError::SymbolNotFound(_) => ErrorCategory::SymbolNotFound,
            FetchError::Unauthorized(_) => ErrorCategory::Auth,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err.to_string())
        } else {
            FetchError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::NetworkError(format!("unparseable response: {}", err))
    }
}

/// 에러 카테고리.
///
/// 스트림 실패 상태와 심볼 단위 `error_summary`의 집계 키로 사용됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 네트워크 오류 및 타임아웃
    Network,
    /// 요청 한도 초과
    RateLimit,
    /// 존재하지 않는 심볼
    SymbolNotFound,
    /// 인증 실패
    Auth,
}

impl ErrorCategory {
    /// circuit breaker 실패 카운트에 포함되는 카테고리인지 여부.
    ///
    /// 인증 실패는 특정 스트림이 아닌 호출 전체의 문제이므로 제외합니다.
    pub fn counts_toward_breaker(&self) -> bool {
        !matches!(self, ErrorCategory::Auth)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::RateLimit => write!(f, "rate_limit"),
            ErrorCategory::SymbolNotFound => write!(f, "symbol_not_found"),
            ErrorCategory::Auth => write!(f, "auth"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(FetchError::NetworkError("reset".into()).is_retryable());
        assert!(FetchError::Timeout("15s".into()).is_retryable());
        assert!(FetchError::RateLimited("429".into()).is_retryable());
        assert!(!FetchError::SymbolNotFound("FOO".into()).is_retryable());
        assert!(!FetchError::Unauthorized("bad key".into()).is_retryable());
    }

    #[test]
    fn test_breaker_policy() {
        assert!(!FetchError::NetworkError("reset".into()).trips_breaker_immediately());
        assert!(!FetchError::Timeout("15s".into()).trips_breaker_immediately());
        assert!(FetchError::RateLimited("429".into()).trips_breaker_immediately());
        assert!(FetchError::SymbolNotFound("FOO".into()).trips_breaker_immediately());
        assert!(!ErrorCategory::Auth.counts_toward_breaker());
        assert!(ErrorCategory::Network.counts_toward_breaker());
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            FetchError::Timeout("x".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            FetchError::RateLimited("x".into()).category(),
            ErrorCategory::RateLimit
        );
        assert_eq!(
            FetchError::SymbolNotFound("x".into()).category(),
            ErrorCategory::SymbolNotFound
        );
        assert!(FetchError::Unauthorized("x".into()).is_auth_error());
        assert_eq!(ErrorCategory::SymbolNotFound.to_string(), "symbol_not_found");
    }
}
