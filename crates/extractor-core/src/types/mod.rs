//! 도메인 타입.

pub mod order;
pub mod request;
pub mod stream;

pub use order::*;
pub use request::*;
pub use stream::*;
