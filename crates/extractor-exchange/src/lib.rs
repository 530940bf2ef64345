//! 거래소 페이지 조회 계약과 커넥터.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - PageFetcher trait: 추출 엔진이 소비하는 페이지 단위 조회 인터페이스
//! - FetchError / ErrorCategory: 업스트림 실패 분류
//! - Bitget 커넥터 (서명된 REST 요청, spot/futures 주문 이력)

pub mod bitget;
pub mod error;
pub mod traits;

pub use bitget::{BitgetClient, BitgetConfig};
pub use error::*;
pub use traits::*;
