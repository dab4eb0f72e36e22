use thiserror::Error;

/// 엔진 오류 분류.
///
/// 검증 위반과 위험 한도 위반은 오류 값이 아니다: 검증 위반은 클램프 후
/// `ValidatedParameters.warnings`로, 위험 한도 위반은
/// `TradeRiskAssessment.rejection_reasons`와 브레이커 상태로 값으로
/// 전달된다. 최적화 루프 자체를 종료시키는 것은 시작 시점의 설정
/// 오류뿐이다.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// 외부 신호 수급 실패 — 폴백 값으로 복구됨
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// 번들 제출/시뮬레이션 실패 — 폴백 전략 테이블로 복구됨
    #[error("bundle failure: {0}")]
    BundleFailure(String),

    /// 설정 오류 — 프로세스 초기화에 치명적
    #[error("configuration error: {0}")]
    Config(String),
}
