//! # Extractor Core
//!
//! 주문 이력 추출기의 핵심 도메인 타입을 제공합니다.
//!
//! 이 크레이트는 워크스페이스 전반에서 사용되는 기본 타입을 제공합니다:
//! - 주문 레코드 및 주문 카테고리 (spot normal / spot tpsl / futures)
//! - 스트림 키 (심볼 + 카테고리)
//! - 추출 요청 및 시간 범위
//! - 로깅 인프라

pub mod logging;
pub mod types;

pub use logging::*;
pub use types::*;
