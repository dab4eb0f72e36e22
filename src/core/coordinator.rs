use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::{Config, RegimeProfile};
use crate::constants::chain_name;
use crate::core::gas_pricer::GasPricer;
use crate::core::market_analyzer::MarketAnalyzer;
use crate::core::performance_tracker::PerformanceTracker;
use crate::core::risk_manager::RiskManager;
use crate::core::slippage::SlippageCalculator;
use crate::core::validator::ParameterValidator;
use crate::types::{
    ChainId, MarketRegime, OptimizationResult, OptimizedParameters, RiskLevel, UrgencyLevel,
};

/// 최적화 코디네이터.
///
/// 사이클마다 시장 분석 -> 슬리피지/가스 계산 -> 체제 프로필
/// 적용 -> 운영자 규칙 적용 -> 검증 -> 공개의 파이프라인을
/// 수행한다. 체제 배수는 드리프트를 막기 위해 직전 파라미터가
/// 아니라 고정 기준값에 적용하고, 운영자 규칙은 체제 스케일링
/// 이후에 적용해 어떤 배수로도 깨지지 않게 한다. 시각은 항상
/// 인자로 주입받아 사이클이 결정적으로 재현 가능하다.
pub struct OptimizationCoordinator {
    config: Arc<Config>,
    analyzer: Arc<MarketAnalyzer>,
    slippage: Arc<SlippageCalculator>,
    gas_pricer: Arc<GasPricer>,
    risk_manager: Arc<RiskManager>,
    tracker: Arc<PerformanceTracker>,
    validator: ParameterValidator,
    current: DashMap<ChainId, OptimizedParameters>,
    baseline: OptimizedParameters,
}

impl OptimizationCoordinator {
    pub fn new(
        config: Arc<Config>,
        analyzer: Arc<MarketAnalyzer>,
        slippage: Arc<SlippageCalculator>,
        gas_pricer: Arc<GasPricer>,
        risk_manager: Arc<RiskManager>,
        tracker: Arc<PerformanceTracker>,
    ) -> Self {
        let validator = ParameterValidator::new(Arc::clone(&config));
        Self {
            config,
            analyzer,
            slippage,
            gas_pricer,
            risk_manager,
            tracker,
            validator,
            current: DashMap::new(),
            baseline: OptimizedParameters::default(),
        }
    }

    /// 현재 공개된 파라미터 (사이클이 돌기 전에는 기준값)
    pub fn current_parameters(&self, chain_id: ChainId) -> OptimizedParameters {
        self.current
            .get(&chain_id)
            .map(|p| p.clone())
            .unwrap_or_else(|| self.baseline.clone())
    }

    fn regime_profile(&self, regime: MarketRegime) -> &RegimeProfile {
        match regime {
            MarketRegime::Calm => &self.config.regime_profiles.calm,
            MarketRegime::Normal => &self.config.regime_profiles.normal,
            MarketRegime::Volatile => &self.config.regime_profiles.volatile,
            MarketRegime::Congested => &self.config.regime_profiles.congested,
        }
    }

    /// 한 체인에 대한 최적화 사이클 실행
    pub async fn run_cycle(
        &self,
        chain_id: ChainId,
        now: DateTime<Utc>,
    ) -> Result<OptimizationResult> {
        let previous = self.current_parameters(chain_id);

        // 1. 시장 분석 및 체제 분류
        let conditions = self.analyzer.analyze(chain_id).await;
        let regime = self.analyzer.classify_regime(&conditions);
        let profile = self.regime_profile(regime).clone();

        // 2. 위험 메트릭 재계산 + 브레이커 평가
        let _metrics = self.risk_manager.refresh(now).await;
        let breaker_active = !self.risk_manager.is_trading_allowed().await;

        // 3. 체제 배수는 고정 기준값에 적용 (사이클 간 누적 방지)
        let profit_threshold = (self.baseline.profit_threshold as f64
            * profile.profit_threshold_multiplier) as u128;
        let max_trade_size =
            (self.baseline.max_trade_size as f64 * profile.trade_size_multiplier) as u128;

        // 4. 슬리피지 — 체인 대표 페어와 조정된 규모 기준
        let (token_a, token_b) = self.reference_pair(chain_id);
        let slippage_rec = self
            .slippage
            .optimal_slippage(&token_a, &token_b, max_trade_size as f64, chain_id)
            .await;

        // 5. 가스 — 일반 긴급도 기준 권고
        let gas = self.gas_pricer.recommend(chain_id, UrgencyLevel::Medium).await?;

        let mut proposed = OptimizedParameters {
            profit_threshold,
            slippage_bps: slippage_rec.tolerance_bps,
            max_trade_size,
            max_fee_per_gas: gas.max_fee_per_gas,
            max_priority_fee_per_gas: gas.max_priority_fee_per_gas,
            cooldown_secs: self.baseline.cooldown_secs,
            risk_level: if breaker_active {
                RiskLevel::Critical
            } else {
                profile.risk_level
            },
        };

        // 6. 운영자 규칙 — 체제 스케일링 이후 적용되어 항상 이긴다
        self.apply_operator_rules(&mut proposed);

        // 7. 검증 후 공개
        let (validated, warnings) = self.validator.validate(proposed);
        let changed_fields = previous.diff_fields(&validated);
        let expected_improvement_pct = Self::estimate_improvement(&previous, &validated);

        self.current.insert(chain_id, validated.clone());

        let result = OptimizationResult {
            timestamp: now,
            chain_id,
            previous,
            updated: validated,
            expected_improvement_pct,
            changed_fields: changed_fields.clone(),
        };
        self.tracker.record_optimization(result.clone()).await;

        if changed_fields.is_empty() {
            info!("📊 {} 최적화 사이클: 변경 없음 ({})", chain_name(chain_id), regime);
        } else {
            info!(
                "📊 {} 최적화 사이클 ({}): {:?} 갱신, 기대 개선 {:.1}%{}",
                chain_name(chain_id),
                regime,
                changed_fields,
                expected_improvement_pct,
                if warnings.is_empty() {
                    String::new()
                } else {
                    format!(", 클램프 {}건", warnings.len())
                }
            );
        }

        Ok(result)
    }

    /// 수동 트리거 — 타이머와 동일한 파이프라인을 즉시 수행
    pub async fn force_optimization(&self, chain_id: ChainId) -> Result<OptimizationResult> {
        info!("🔄 {} 강제 최적화 트리거", chain_name(chain_id));
        self.run_cycle(chain_id, Utc::now()).await
    }

    fn apply_operator_rules(&self, params: &mut OptimizedParameters) {
        let rules = &self.config.operator_rules;
        if let Some(cap) = rules.slippage_bps_cap {
            if params.slippage_bps > cap {
                warn!("⚠️ 운영자 규칙: 슬리피지 {} -> {} bps", params.slippage_bps, cap);
                params.slippage_bps = cap;
            }
        }
        if let Some(floor) = rules.profit_threshold_floor {
            if params.profit_threshold < floor {
                params.profit_threshold = floor;
            }
        }
        if let Some(cap) = rules.max_trade_size_cap {
            if params.max_trade_size > cap {
                params.max_trade_size = cap;
            }
        }
        if let Some(cooldown) = rules.cooldown_secs_override {
            params.cooldown_secs = cooldown;
        }
    }

    /// 기대 개선치 추정 (%). 변경된 필드 수에 비례하는 보수적
    /// 휴리스틱으로, 파라미터가 그대로면 0이다.
    fn estimate_improvement(previous: &OptimizedParameters, updated: &OptimizedParameters) -> f64 {
        let changed = previous.diff_fields(updated).len() as f64;
        (changed * 2.0).min(15.0)
    }

    fn reference_pair(&self, chain_id: ChainId) -> (String, String) {
        let pair = self
            .config
            .chain(chain_id)
            .map(|c| c.reference_pair.clone())
            .unwrap_or_else(|| "WETH/USDC".to_string());
        match pair.split_once('/') {
            Some((a, b)) => (a.to_string(), b.to_string()),
            None => ("WETH".to_string(), "USDC".to_string()),
        }
    }
}

impl std::fmt::Debug for OptimizationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizationCoordinator")
            .field("config", &"Arc<Config>")
            .finish()
    }
}
