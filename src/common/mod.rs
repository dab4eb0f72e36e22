//! 공통 유틸리티 모듈
//!
//! 엔진 전체에서 공통으로 사용되는 수학 헬퍼를 포함합니다.

pub mod math;

pub use math::*;
