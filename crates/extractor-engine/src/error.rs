//! 추출 엔진 에러 타입.

use thiserror::Error;

/// `extract` 호출 전체를 실패시키는 에러.
///
/// 스트림 단위 업스트림 실패는 여기에 포함되지 않고
/// 결과의 스트림 상태와 `error_summary`로 보고됩니다.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// 스트림 시작 전에 발견된 설정 에러
    #[error("Configuration error: {0}")]
    Config(String),

    /// 인증 실패 (자격 증명 문제이므로 호출 전체 중단)
    #[error("Authentication failed for {stream}: {message}")]
    Auth { stream: String, message: String },
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, ExtractError>;
