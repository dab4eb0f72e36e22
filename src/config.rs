use serde::{Deserialize, Serialize};
use anyhow::Result;

use crate::errors::OptimizerError;

use crate::constants::{ARBITRUM, BSC, ETHEREUM, OPTIMISM, POLYGON};

/// 엔진 루프 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 최적화 주기 (초)
    pub optimization_interval_secs: u64,
    /// 주 대상 체인
    pub primary_chain_id: u64,
    /// 상태 리포트 주기 (초)
    pub report_interval_secs: u64,
}

/// 체인별 설정 (가스 시장 특성 포함)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub block_time_secs: u64,
    /// 긴급도 배수 적용 전의 기본 가스 한도
    pub base_gas_limit: u64,
    /// 팁 하한 (gwei)
    pub tip_floor_gwei: f64,
    /// 팁 상한 (gwei)
    pub tip_ceiling_gwei: f64,
    /// 체인 수수료 시장 특성 보정 배수
    pub tip_multiplier: f64,
    /// 혼잡도가 이 값을 넘으면 부스트 배수 추가 적용
    pub congestion_boost_threshold: Option<f64>,
    pub congestion_boost_multiplier: f64,
    /// 수수료 데이터 수급 실패 시 폴백 (혼잡도와 무관)
    pub fallback_base_fee_gwei: f64,
    pub fallback_tip_gwei: f64,
    /// 최적화 사이클이 슬리피지 계산에 쓰는 대표 페어
    pub reference_pair: String,
}

/// 위험 한도 — 운영자만 갱신 가능, 엔진은 절대 수정하지 않는다
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimitsConfig {
    /// 초기 자본 (토큰 단위) — 낙폭/노출 비율 계산의 기준
    pub initial_capital: u128,
    pub max_drawdown_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_weekly_loss_pct: f64,
    pub max_consecutive_failures: u32,
    /// 가스 비용 / 자본 비율 상한
    pub max_gas_ratio: f64,
    pub min_success_rate_1h: f64,
    pub min_success_rate_24h: f64,
    pub min_profit_margin: f64,
    /// 단일 거래가 자본에서 차지할 수 있는 최대 비율
    pub max_single_trade_pct: f64,
    pub max_token_exposure_pct: f64,
    pub max_chain_exposure_pct: f64,
    /// 브레이커 발동 후 재개 검사까지의 쿨다운 (분)
    pub cooldown_minutes: i64,
    /// 1h/24h 성공률 하한 검사를 시작하는 최소 표본 수
    pub min_trades_for_rate_check: u64,
}

/// 슬리피지 계산 설정 (폴백 상수 포함)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageConfig {
    pub base_bps: u32,
    pub min_bps: u32,
    pub max_bps: u32,
    /// 변동성 1.0당 추가되는 bps
    pub volatility_multiplier_bps: f64,
    /// 유동성 조정 발동 임계값 (거래규모/유동성 비율)
    pub liquidity_impact_threshold: f64,
    /// 임계 비율 1.0당 추가되는 bps
    pub liquidity_multiplier_bps: f64,
    pub liquidity_adjustment_cap_bps: f64,
    /// 혼잡도 조정 발동 임계값
    pub congestion_threshold: f64,
    /// 임계 초과분 1.0당 추가되는 bps
    pub congestion_multiplier_bps: f64,
    /// 신뢰도가 0에 수렴하는 데이터 나이 (초)
    pub confidence_horizon_secs: u64,
    pub min_confidence: f64,
}

/// 가스 가격 계산 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// base fee 대비 기본 팁 비율 (0.1 = 10%)
    pub base_fee_tip_pct: f64,
    /// 모든 입력과 무관한 절대 팁 상한 (gwei)
    pub absolute_max_tip_gwei: u64,
    /// max fee = base fee x 이 배수 + 팁
    pub max_fee_base_multiplier: f64,
}

/// 번들 구성 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// 랭킹 후 유지할 후보 수
    pub max_candidates: usize,
    /// 번들당 최대 레그 수
    pub max_bundle_size: usize,
    /// 총 가스 지출 상한 (기대 수익 대비 비율, 0.3 = 30%)
    pub gas_budget_pct: f64,
    /// MEV 포함 프리미엄 (0.2 = +20%)
    pub mev_premium_pct: f64,
    /// 가격 경쟁 실패 시 가스 인상 비율 (%)
    pub retry_gas_bump_pct: u32,
    /// 일반 재시도 시 가스 인상 비율 (%)
    pub generic_retry_bump_pct: u32,
    /// 공개 경로 전환 시 수수료 부스트 (%)
    pub public_fee_boost_pct: u32,
    /// 같은 기회 시그니처 실패 누적 시 스킵 발동 횟수
    pub skip_after_failures: u32,
    pub skip_duration_minutes: i64,
    /// 유사 번들 수가 이 값을 넘으면 경합으로 플래그
    pub contention_threshold: u32,
}

/// 시장 분석기 설정 (보수적 폴백 상수 포함)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// 체인별 롤링 버퍼 크기 (가격/가스/블록 샘플)
    pub buffer_size: usize,
    /// MarketConditions 캐시 TTL (초)
    pub cache_ttl_secs: u64,
    /// 변동성 정규화 호라이즌 (초)
    pub volatility_horizon_secs: u64,
    /// 체제 분류 임계값
    pub volatile_threshold: f64,
    pub congested_threshold: f64,
    pub calm_threshold: f64,
    /// 추세 판정 임계값 (기간 수익률 절대값)
    pub trend_threshold: f64,
    /// 데이터 수급 실패 시 보수적 기본값
    pub fallback: MarketFallbackConfig,
}

/// 시장 신호 폴백 값 — 흩어진 리터럴 대신 한곳에 모아 테스트가 검증 가능하게 한다
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketFallbackConfig {
    pub volatility: f64,
    pub liquidity: f64,
    pub congestion: f64,
    pub competitor_density: f64,
}

/// 성능 추적기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_trade_history: usize,
    pub max_optimization_history: usize,
    /// 롤링 메트릭 윈도우 (시간)
    pub metrics_window_hours: i64,
    /// 히스토리 보존 기간 (일)
    pub retention_days: i64,
}

/// 파라미터 검증 경계 — 어떤 파라미터도 이 범위를 벗어나 공개될 수 없다
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationBounds {
    pub min_profit_threshold: u128,
    pub max_profit_threshold: u128,
    pub min_slippage_bps: u32,
    pub max_slippage_bps: u32,
    pub min_trade_size: u128,
    pub max_trade_size: u128,
    pub max_fee_cap_gwei: u64,
    pub max_tip_cap_gwei: u64,
    pub min_cooldown_secs: u64,
    pub max_cooldown_secs: u64,
}

/// 시장 체제별 프로필 오버라이드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeProfile {
    pub profit_threshold_multiplier: f64,
    pub trade_size_multiplier: f64,
    pub risk_level: crate::types::RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeProfilesConfig {
    pub calm: RegimeProfile,
    pub normal: RegimeProfile,
    pub volatile: RegimeProfile,
    pub congested: RegimeProfile,
}

/// 운영자 수동 오버라이드 (설정 파일 또는 런타임 주입)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperatorRules {
    /// 슬리피지 허용치 상한 강제
    pub slippage_bps_cap: Option<u32>,
    /// 수익 임계값 하한 강제
    pub profit_threshold_floor: Option<u128>,
    /// 거래 규모 상한 강제
    pub max_trade_size_cap: Option<u128>,
    /// 쿨다운 강제
    pub cooldown_secs_override: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub chains: Vec<ChainConfig>,
    pub risk_limits: RiskLimitsConfig,
    pub slippage: SlippageConfig,
    pub gas: GasConfig,
    pub bundle: BundleConfig,
    pub market: MarketConfig,
    pub performance: PerformanceConfig,
    pub validation: ValidationBounds,
    pub regime_profiles: RegimeProfilesConfig,
    #[serde(default)]
    pub operator_rules: OperatorRules,
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }

    /// 시작 시점 설정 검증 — 여기서의 실패만이 치명적이다
    pub fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(Self::config_error("At least one chain must be configured"));
        }
        if self.chain(self.engine.primary_chain_id).is_none() {
            return Err(Self::config_error(&format!(
                "Primary chain {} is not in the chains table",
                self.engine.primary_chain_id
            )));
        }
        if self.risk_limits.initial_capital == 0 {
            return Err(Self::config_error("Initial capital must be positive"));
        }
        if self.risk_limits.max_drawdown_pct <= 0.0 || self.risk_limits.max_drawdown_pct > 1.0 {
            return Err(Self::config_error("max_drawdown_pct must be in (0, 1]"));
        }
        if self.slippage.min_bps > self.slippage.max_bps {
            return Err(Self::config_error("Slippage min must not exceed max"));
        }
        if self.validation.min_slippage_bps > self.validation.max_slippage_bps {
            return Err(Self::config_error("Validation slippage bounds inverted"));
        }
        if self.bundle.max_bundle_size == 0 || self.bundle.max_bundle_size > self.bundle.max_candidates {
            return Err(Self::config_error("Bundle size must be in 1..=max_candidates"));
        }
        for chain in &self.chains {
            if chain.tip_floor_gwei > chain.tip_ceiling_gwei {
                return Err(Self::config_error(&format!(
                    "Chain {} tip floor exceeds ceiling",
                    chain.name
                )));
            }
        }
        Ok(())
    }

    fn config_error(message: &str) -> anyhow::Error {
        OptimizerError::Config(message.to_string()).into()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                optimization_interval_secs: 30,
                primary_chain_id: ETHEREUM,
                report_interval_secs: 60,
            },
            chains: vec![
                ChainConfig {
                    chain_id: ETHEREUM,
                    name: "ethereum".to_string(),
                    block_time_secs: 12,
                    base_gas_limit: 500_000,
                    tip_floor_gwei: 1.0,
                    tip_ceiling_gwei: 100.0,
                    tip_multiplier: 1.0,
                    congestion_boost_threshold: None,
                    congestion_boost_multiplier: 1.0,
                    fallback_base_fee_gwei: 25.0,
                    fallback_tip_gwei: 2.0,
                    reference_pair: "WETH/USDC".to_string(),
                },
                ChainConfig {
                    chain_id: ARBITRUM,
                    name: "arbitrum".to_string(),
                    block_time_secs: 1,
                    base_gas_limit: 2_000_000,
                    // Arbitrum 팁 시장은 낮은 플로어로 수렴하는 경향
                    tip_floor_gwei: 0.01,
                    tip_ceiling_gwei: 10.0,
                    tip_multiplier: 0.5,
                    congestion_boost_threshold: None,
                    congestion_boost_multiplier: 1.0,
                    fallback_base_fee_gwei: 0.1,
                    fallback_tip_gwei: 0.01,
                    reference_pair: "WETH/USDC".to_string(),
                },
                ChainConfig {
                    chain_id: OPTIMISM,
                    name: "optimism".to_string(),
                    block_time_secs: 2,
                    base_gas_limit: 1_000_000,
                    tip_floor_gwei: 0.05,
                    tip_ceiling_gwei: 20.0,
                    tip_multiplier: 0.8,
                    // 혼잡도 0.7 초과 시 수수료가 가파르게 상승하는 체인
                    congestion_boost_threshold: Some(0.7),
                    congestion_boost_multiplier: 1.5,
                    fallback_base_fee_gwei: 0.5,
                    fallback_tip_gwei: 0.05,
                    reference_pair: "WETH/USDC".to_string(),
                },
                ChainConfig {
                    chain_id: POLYGON,
                    name: "polygon".to_string(),
                    block_time_secs: 2,
                    base_gas_limit: 800_000,
                    tip_floor_gwei: 30.0,
                    tip_ceiling_gwei: 500.0,
                    tip_multiplier: 1.2,
                    congestion_boost_threshold: Some(0.8),
                    congestion_boost_multiplier: 1.3,
                    fallback_base_fee_gwei: 80.0,
                    fallback_tip_gwei: 30.0,
                    reference_pair: "WMATIC/USDC".to_string(),
                },
                ChainConfig {
                    chain_id: BSC,
                    name: "bsc".to_string(),
                    block_time_secs: 3,
                    base_gas_limit: 600_000,
                    tip_floor_gwei: 1.0,
                    tip_ceiling_gwei: 50.0,
                    tip_multiplier: 0.9,
                    congestion_boost_threshold: None,
                    congestion_boost_multiplier: 1.0,
                    fallback_base_fee_gwei: 3.0,
                    fallback_tip_gwei: 1.0,
                    reference_pair: "WBNB/USDT".to_string(),
                },
            ],
            risk_limits: RiskLimitsConfig {
                initial_capital: 100_000,
                max_drawdown_pct: 0.20,
                max_daily_loss_pct: 0.05,
                max_weekly_loss_pct: 0.10,
                max_consecutive_failures: 5,
                max_gas_ratio: 0.10,
                min_success_rate_1h: 0.30,
                min_success_rate_24h: 0.50,
                min_profit_margin: 0.001,
                max_single_trade_pct: 0.10,
                max_token_exposure_pct: 0.25,
                max_chain_exposure_pct: 0.50,
                cooldown_minutes: 30,
                min_trades_for_rate_check: 10,
            },
            slippage: SlippageConfig {
                base_bps: 50,
                min_bps: 10,
                max_bps: 500,
                volatility_multiplier_bps: 2_000.0,
                liquidity_impact_threshold: 0.05,
                liquidity_multiplier_bps: 1_000.0,
                liquidity_adjustment_cap_bps: 200.0,
                congestion_threshold: 0.7,
                congestion_multiplier_bps: 300.0,
                confidence_horizon_secs: 300,
                min_confidence: 0.05,
            },
            gas: GasConfig {
                base_fee_tip_pct: 0.10,
                absolute_max_tip_gwei: 100,
                max_fee_base_multiplier: 2.0,
            },
            bundle: BundleConfig {
                max_candidates: 5,
                max_bundle_size: 3,
                gas_budget_pct: 0.30,
                mev_premium_pct: 0.20,
                retry_gas_bump_pct: 25,
                generic_retry_bump_pct: 10,
                public_fee_boost_pct: 50,
                skip_after_failures: 3,
                skip_duration_minutes: 30,
                contention_threshold: 5,
            },
            market: MarketConfig {
                buffer_size: 120,
                cache_ttl_secs: 30,
                volatility_horizon_secs: 3_600,
                volatile_threshold: 0.05,
                congested_threshold: 0.7,
                calm_threshold: 0.01,
                trend_threshold: 0.005,
                fallback: MarketFallbackConfig {
                    // 데이터가 없을 때는 비싼 쪽으로 틀리는 편이 안전하다
                    volatility: 0.05,
                    liquidity: 10_000.0,
                    congestion: 0.5,
                    competitor_density: 3.0,
                },
            },
            performance: PerformanceConfig {
                max_trade_history: 10_000,
                max_optimization_history: 1_000,
                metrics_window_hours: 24,
                retention_days: 7,
            },
            validation: ValidationBounds {
                min_profit_threshold: 1,
                max_profit_threshold: 100_000,
                min_slippage_bps: 10,
                max_slippage_bps: 500,
                min_trade_size: 1,
                max_trade_size: 50_000,
                max_fee_cap_gwei: 500,
                max_tip_cap_gwei: 100,
                min_cooldown_secs: 5,
                max_cooldown_secs: 3_600,
            },
            regime_profiles: RegimeProfilesConfig {
                calm: RegimeProfile {
                    profit_threshold_multiplier: 0.8,
                    trade_size_multiplier: 1.2,
                    risk_level: crate::types::RiskLevel::Low,
                },
                normal: RegimeProfile {
                    profit_threshold_multiplier: 1.0,
                    trade_size_multiplier: 1.0,
                    risk_level: crate::types::RiskLevel::Medium,
                },
                volatile: RegimeProfile {
                    profit_threshold_multiplier: 1.5,
                    trade_size_multiplier: 0.6,
                    risk_level: crate::types::RiskLevel::High,
                },
                congested: RegimeProfile {
                    profit_threshold_multiplier: 1.3,
                    trade_size_multiplier: 0.8,
                    risk_level: crate::types::RiskLevel::High,
                },
            },
            operator_rules: OperatorRules::default(),
        }
    }
}
