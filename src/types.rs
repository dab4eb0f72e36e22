use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ethers::types::U256;
use chrono::{DateTime, Timelike, Utc};

/// 체인 식별자 (EVM chain id)
pub type ChainId = u64;

/// 거래 긴급도
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

impl UrgencyLevel {
    /// 가스 팁에 적용되는 긴급도 배수 (low 0.8x / medium 1.0x / high 2.0x)
    pub fn tip_multiplier(&self) -> f64 {
        match self {
            UrgencyLevel::Low => 0.8,
            UrgencyLevel::Medium => 1.0,
            UrgencyLevel::High => 2.0,
        }
    }

    /// 가스 한도에 적용되는 배수
    pub fn gas_limit_multiplier(&self) -> f64 {
        match self {
            UrgencyLevel::Low => 1.0,
            UrgencyLevel::Medium => 1.1,
            UrgencyLevel::High => 1.3,
        }
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrgencyLevel::Low => write!(f, "low"),
            UrgencyLevel::Medium => write!(f, "medium"),
            UrgencyLevel::High => write!(f, "high"),
        }
    }
}

/// 위험 등급
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// 우선순위 (번들 후보 랭킹용)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn to_u8(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Urgent => 4,
        }
    }

    /// 복합 점수 계산에 쓰이는 가중치
    pub fn weight(&self) -> f64 {
        self.to_u8() as f64 / 4.0
    }
}

/// 시장 체제 분류
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MarketRegime {
    Calm,
    Normal,
    Volatile,
    Congested,
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketRegime::Calm => write!(f, "calm"),
            MarketRegime::Normal => write!(f, "normal"),
            MarketRegime::Volatile => write!(f, "volatile"),
            MarketRegime::Congested => write!(f, "congested"),
        }
    }
}

/// 추세 방향
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

/// 시간대 버킷 (거래 활동 패턴 구분용)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeOfDayBucket {
    Asia,
    Europe,
    UsOverlap,
    OffHours,
}

impl TimeOfDayBucket {
    pub fn from_utc(ts: DateTime<Utc>) -> Self {
        match ts.hour() {
            0..=7 => TimeOfDayBucket::Asia,
            8..=12 => TimeOfDayBucket::Europe,
            13..=20 => TimeOfDayBucket::UsOverlap,
            _ => TimeOfDayBucket::OffHours,
        }
    }
}

/// 완료된 거래 기록 (기록 이후 불변)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub chain_id: ChainId,
    pub pair: String,
    pub success: bool,
    /// 실현 수익 (토큰 단위, 부호 있는 고정소수점 정수)
    pub profit: i128,
    /// 거래 규모 (토큰 단위)
    pub trade_size: u128,
    pub gas_used: u64,
    pub gas_price: U256,
    pub execution_latency_ms: u64,
    /// 거래 시점에 사용된 파라미터 스냅샷
    pub parameters: OptimizedParameters,
    /// 거래 시점의 시장 상황 스냅샷
    pub market_snapshot: Option<MarketConditions>,
}

impl TradeRecord {
    /// 가스 비용 (wei)
    pub fn gas_cost(&self) -> U256 {
        self.gas_price * U256::from(self.gas_used)
    }
}

/// 최적화 사이클 결과 (생성 이후 불변)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub timestamp: DateTime<Utc>,
    pub chain_id: ChainId,
    pub previous: OptimizedParameters,
    pub updated: OptimizedParameters,
    /// 이전 파라미터 대비 기대 개선치 (%)
    pub expected_improvement_pct: f64,
    pub changed_fields: Vec<String>,
}

/// 체인별 시장 상황 스냅샷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConditions {
    pub chain_id: ChainId,
    /// 1시간 호라이즌으로 정규화된 가격 변동성
    pub volatility: f64,
    /// 유동성 추정치 (토큰 단위)
    pub liquidity: f64,
    /// 가스 혼잡도 (0.0 ~ 1.0)
    pub congestion: f64,
    /// 경쟁자 밀도 추정치
    pub competitor_density: f64,
    pub time_bucket: TimeOfDayBucket,
    pub trend: TrendDirection,
    pub fetched_at: DateTime<Utc>,
}

impl MarketConditions {
    pub fn age_seconds(&self, now: DateTime<Utc>) -> u64 {
        (now - self.fetched_at).num_seconds().max(0) as u64
    }
}

/// 위험 메트릭 (RiskManager가 전체 재계산으로만 갱신)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RiskMetrics {
    /// 현재 낙폭 (peak 대비 비율, 0.0 ~ 1.0)
    pub current_drawdown: f64,
    pub daily_pnl: i128,
    pub weekly_pnl: i128,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// 가스 비용 대비 자본 비율
    pub gas_to_capital_ratio: f64,
    pub success_rate_1h: f64,
    pub success_rate_24h: f64,
    /// 평균 수익 마진 (거래 규모 대비)
    pub avg_profit_margin: f64,
    pub token_exposure: HashMap<String, u128>,
    pub chain_exposure: HashMap<ChainId, u128>,
    pub peak_balance: i128,
    pub current_balance: i128,
    pub total_trades: u64,
    pub profitable_trades: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// 서킷 브레이커 상태 (RiskManager 상태 기계를 통해서만 전이)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CircuitBreakerStatus {
    pub active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    /// 발동 사유 전체 (첫 번째만이 아니라 전부 기록)
    pub reasons: Vec<String>,
    pub estimated_recovery: Option<DateTime<Utc>>,
    pub override_eligible: bool,
    pub override_conditions: Vec<String>,
}

/// 최적화된 실행 파라미터 — 외부에 공개되는 유일한 산출물.
/// 공개 전 반드시 ParameterValidator를 통과해야 한다.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizedParameters {
    /// 최소 기대 수익 임계값 (토큰 단위)
    pub profit_threshold: u128,
    /// 슬리피지 허용치 (basis points)
    pub slippage_bps: u32,
    /// 단일 거래 최대 규모 (토큰 단위)
    pub max_trade_size: u128,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    /// 거래 간 쿨다운 (초)
    pub cooldown_secs: u64,
    pub risk_level: RiskLevel,
}

impl Default for OptimizedParameters {
    fn default() -> Self {
        Self {
            profit_threshold: 10,
            slippage_bps: 50,
            max_trade_size: 1_000,
            max_fee_per_gas: U256::from(30_000_000_000u64),
            max_priority_fee_per_gas: U256::from(2_000_000_000u64),
            cooldown_secs: 30,
            risk_level: RiskLevel::Medium,
        }
    }
}

impl OptimizedParameters {
    /// 두 파라미터 셋 간 변경된 필드 이름 목록
    pub fn diff_fields(&self, other: &Self) -> Vec<String> {
        let mut changed = Vec::new();
        if self.profit_threshold != other.profit_threshold {
            changed.push("profit_threshold".to_string());
        }
        if self.slippage_bps != other.slippage_bps {
            changed.push("slippage_bps".to_string());
        }
        if self.max_trade_size != other.max_trade_size {
            changed.push("max_trade_size".to_string());
        }
        if self.max_fee_per_gas != other.max_fee_per_gas {
            changed.push("max_fee_per_gas".to_string());
        }
        if self.max_priority_fee_per_gas != other.max_priority_fee_per_gas {
            changed.push("max_priority_fee_per_gas".to_string());
        }
        if self.cooldown_secs != other.cooldown_secs {
            changed.push("cooldown_secs".to_string());
        }
        if self.risk_level != other.risk_level {
            changed.push("risk_level".to_string());
        }
        changed
    }
}

/// 사전 위험 평가에 넘기는 거래 제안
#[derive(Debug, Clone)]
pub struct TradeProposal {
    pub pair: String,
    pub chain_id: ChainId,
    /// 기회를 만든 전략 태그 (로깅용)
    pub strategy: String,
    pub trade_size: u128,
    /// 예상 수익 (토큰 단위)
    pub expected_profit: i128,
    /// 예상 가스 비용 (wei)
    pub expected_gas_cost: U256,
    /// 기회 신뢰도 (0 ~ 1)
    pub confidence: f64,
}

impl TradeProposal {
    /// 노출 추적에 쓰는 기준 토큰 (페어의 앞쪽 토큰)
    pub fn base_token(&self) -> &str {
        self.pair.split('/').next().unwrap_or(&self.pair)
    }
}

/// 거래 사전 위험 평가 결과 — 차단하거나 거부 사유를 제시할 뿐,
/// 거래 규모를 임의로 축소하지 않는다 (호출자가 재조정 후 재평가).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRiskAssessment {
    pub approved: bool,
    pub risk_level: RiskLevel,
    /// 노출 한도 여유분으로 계산한 최대 허용 포지션
    pub max_position_size: u128,
    pub rejection_reasons: Vec<String>,
    pub assessed_at: DateTime<Utc>,
}

/// 슬리피지 계산 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageRecommendation {
    pub tolerance_bps: u32,
    /// 시장 데이터 신선도 기반 신뢰도 (0.0 ~ 1.0)
    pub confidence: f64,
    /// 각 조정 단계의 근거 설명
    pub reasoning: Vec<String>,
}

/// 위험 성향별 슬리피지 변형
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageProfiles {
    pub conservative_bps: u32,
    pub balanced_bps: u32,
    pub aggressive_bps: u32,
}

/// 가스 가격 계산 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasRecommendation {
    pub gas_limit: u64,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub base_fee: U256,
    pub congestion: f64,
    /// 폴백 테이블이 사용된 경우 true
    pub used_fallback: bool,
}

/// 번들 후보 (랭킹된 기회)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleCandidate {
    pub id: String,
    pub chain_id: ChainId,
    /// 이 기회가 건드리는 토큰들 (충돌 회피용)
    pub tokens: Vec<String>,
    /// 기대 수익 (wei)
    pub expected_profit: U256,
    pub gas_estimate: u64,
    pub confidence: f64,
    pub priority: Priority,
    /// 기회 클래스 시그니처 (반복 실패 스킵 판정용)
    pub signature: String,
}

impl BundleCandidate {
    pub fn profit_per_gas(&self) -> f64 {
        if self.gas_estimate == 0 {
            return 0.0;
        }
        self.expected_profit.as_u128() as f64 / self.gas_estimate as f64
    }

    /// 복합 점수 = 우선순위 x 신뢰도 x 정규화 수익
    pub fn composite_score(&self, max_profit: U256) -> f64 {
        let normalized_profit = if max_profit.is_zero() {
            0.0
        } else {
            self.expected_profit.as_u128() as f64 / max_profit.as_u128() as f64
        };
        self.priority.weight() * self.confidence * normalized_profit
    }
}

/// 번들에 포함될 트랜잭션 의도 (실제 서명/호출 데이터는 실행 레이어 소관)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub candidate_id: String,
    pub chain_id: ChainId,
    pub gas_limit: u64,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub target_block: u64,
}

/// 원자적 제출 번들
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    pub chain_id: ChainId,
    pub target_block: u64,
    pub transactions: Vec<TransactionIntent>,
    pub candidates: Vec<BundleCandidate>,
    pub metrics: BundleMetrics,
    pub created_at: DateTime<Utc>,
}

/// 번들 집계 메트릭 (사이클마다 새로 계산, 사이클 간 보존 안 함)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetrics {
    pub expected_profit: U256,
    pub total_gas_cost: U256,
    /// 가스 차감 후 수익 (wei, 음수 가능)
    pub profit_after_gas: i128,
    /// 0 ~ 100 점수
    pub score: f64,
    /// 포함 확률 추정 (30 ~ 95로 클램프)
    pub inclusion_probability: f64,
    pub recommendations: Vec<String>,
}

/// 번들 실패 사유 분류
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BundleFailureReason {
    PriceCompetition,
    Congestion,
    Timeout,
    Revert,
    Unknown,
}

impl std::fmt::Display for BundleFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleFailureReason::PriceCompetition => write!(f, "price_competition"),
            BundleFailureReason::Congestion => write!(f, "congestion"),
            BundleFailureReason::Timeout => write!(f, "timeout"),
            BundleFailureReason::Revert => write!(f, "revert"),
            BundleFailureReason::Unknown => write!(f, "unknown"),
        }
    }
}

/// 실패 대응 액션
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FallbackAction {
    /// 가스를 고정 비율로 올려 재시도
    RetryHigherGas { gas_bump_pct: u32 },
    /// 비원자적 공개 경로로 전환 (수수료 부스트)
    PublicSubmission { fee_boost_pct: u32 },
    /// 해당 기회 클래스를 일정 시간 스킵
    SkipOpportunity { signature: String, until: DateTime<Utc> },
    /// 소폭 가스 인상 후 일반 재시도
    Retry { gas_bump_pct: u32 },
}

/// 실패 대응 계획 (관측성을 위한 사람이 읽을 수 있는 근거 포함)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPlan {
    pub bundle_id: String,
    pub action: FallbackAction,
    pub justification: String,
}

/// 릴레이 시뮬레이션 결과 분류
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub success: bool,
    pub gas_used: u64,
    /// 시뮬레이션에서 실현된 수익 (wei)
    pub realized_profit: U256,
    pub revert_reason: Option<String>,
    pub competitor_density: f64,
    pub similar_bundle_count: u32,
    /// 유사 번들 수가 임계값을 넘으면 경합으로 플래그
    pub contention: bool,
}

/// 체인 수수료 데이터 (ChainClient가 제공)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeData {
    pub base_fee: U256,
    pub suggested_tip: U256,
    pub gas_price: U256,
}

/// 최신 블록 정보 (ChainClient가 제공)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee: U256,
    pub timestamp: DateTime<Utc>,
}

impl BlockInfo {
    /// 블록 충만도 (혼잡도 추정의 원천)
    pub fn fullness(&self) -> f64 {
        if self.gas_limit == 0 {
            return 0.0;
        }
        self.gas_used as f64 / self.gas_limit as f64
    }
}
