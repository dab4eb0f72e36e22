use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{Config, RiskLimitsConfig};
use crate::core::performance_tracker::PerformanceTracker;
use crate::types::{
    ChainId, CircuitBreakerStatus, RiskLevel, RiskMetrics, TradeProposal, TradeRecord,
    TradeRiskAssessment,
};

/// 위험 리포트 (읽기 전용 진단용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    pub generated_at: DateTime<Utc>,
    pub metrics: RiskMetrics,
    pub circuit_breaker: CircuitBreakerStatus,
    pub risk_level: RiskLevel,
}

/// 위험 관리자.
///
/// 메트릭은 증분 갱신 없이 항상 거래 히스토리 전체에서 재계산한다.
/// 서킷 브레이커는 Normal <-> Tripped 두 상태의 기계이며,
/// 발동 시 모든 사유를 기록하고, 쿨다운 경과 + 전체 트리거 해소가
/// 확인되어야만 자동 복귀한다. 노출 한도는 열린 포지션 기준으로
/// 추적한다.
pub struct RiskManager {
    config: Arc<Config>,
    tracker: Arc<PerformanceTracker>,
    metrics: Arc<RwLock<RiskMetrics>>,
    breaker: Arc<RwLock<CircuitBreakerStatus>>,
    token_exposure: Arc<RwLock<HashMap<String, u128>>>,
    chain_exposure: Arc<RwLock<HashMap<ChainId, u128>>>,
}

impl RiskManager {
    pub fn new(config: Arc<Config>, tracker: Arc<PerformanceTracker>) -> Self {
        Self {
            config,
            tracker,
            metrics: Arc::new(RwLock::new(RiskMetrics::default())),
            breaker: Arc::new(RwLock::new(CircuitBreakerStatus::default())),
            token_exposure: Arc::new(RwLock::new(HashMap::new())),
            chain_exposure: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 메트릭 전체 재계산 후 브레이커 상태 기계 평가
    pub async fn refresh(&self, now: DateTime<Utc>) -> RiskMetrics {
        let metrics = self.recompute_metrics(now).await;
        *self.metrics.write().await = metrics.clone();
        self.evaluate_breaker(&metrics, now).await;
        metrics
    }

    /// 거래 히스토리 전체에서 위험 메트릭 재계산
    async fn recompute_metrics(&self, now: DateTime<Utc>) -> RiskMetrics {
        let history = self.tracker.history_snapshot().await;
        let limits = &self.config.risk_limits;
        let capital = limits.initial_capital as i128;

        // 잔고 궤적: 초기 자본 + 누적 실현 수익
        let mut balance = capital;
        let mut peak = capital;
        for trade in &history {
            balance += trade.profit;
            peak = peak.max(balance);
        }
        let current_drawdown = if peak > 0 {
            ((peak - balance) as f64 / peak as f64).max(0.0)
        } else {
            1.0
        };

        let day_cutoff = now - Duration::days(1);
        let week_cutoff = now - Duration::weeks(1);
        let hour_cutoff = now - Duration::hours(1);

        let daily_pnl: i128 = history
            .iter()
            .filter(|t| t.timestamp >= day_cutoff)
            .map(|t| t.profit)
            .sum();
        let weekly_pnl: i128 = history
            .iter()
            .filter(|t| t.timestamp >= week_cutoff)
            .map(|t| t.profit)
            .sum();

        let (success_rate_1h, _) = Self::window_success_rate(&history, hour_cutoff);
        let (success_rate_24h, _) = Self::window_success_rate(&history, day_cutoff);

        // 24h 가스 지출을 네이티브 토큰 단위로 환산해 자본과 비교
        let daily_gas_wei: U256 = history
            .iter()
            .filter(|t| t.timestamp >= day_cutoff)
            .fold(U256::zero(), |acc, t| acc + t.gas_cost());
        let gas_to_capital_ratio = if capital > 0 {
            (daily_gas_wei.as_u128() as f64 / 1e18) / capital as f64
        } else {
            0.0
        };

        let margins: Vec<f64> = history
            .iter()
            .filter(|t| t.trade_size > 0)
            .map(|t| t.profit as f64 / t.trade_size as f64)
            .collect();
        let avg_profit_margin = if margins.is_empty() {
            0.0
        } else {
            margins.iter().sum::<f64>() / margins.len() as f64
        };

        let mut consecutive_failures = 0u32;
        let mut consecutive_successes = 0u32;
        for trade in history.iter().rev() {
            if trade.success && consecutive_failures == 0 {
                consecutive_successes += 1;
            } else if !trade.success && consecutive_successes == 0 {
                consecutive_failures += 1;
            } else {
                break;
            }
        }

        RiskMetrics {
            current_drawdown,
            daily_pnl,
            weekly_pnl,
            consecutive_failures,
            consecutive_successes,
            gas_to_capital_ratio,
            success_rate_1h,
            success_rate_24h,
            avg_profit_margin,
            token_exposure: self.token_exposure.read().await.clone(),
            chain_exposure: self.chain_exposure.read().await.clone(),
            peak_balance: peak,
            current_balance: balance,
            total_trades: history.len() as u64,
            profitable_trades: history.iter().filter(|t| t.profit > 0).count() as u64,
            updated_at: Some(now),
        }
    }

    /// 윈도우 성공률과 표본 수. 빈 윈도우는 (1.0, 0) — 거래가 없는
    /// 구간이 성공률 하한 트리거를 발동시키지 않는다는 관례.
    fn window_success_rate(history: &[TradeRecord], cutoff: DateTime<Utc>) -> (f64, u64) {
        let windowed: Vec<&TradeRecord> =
            history.iter().filter(|t| t.timestamp >= cutoff).collect();
        if windowed.is_empty() {
            return (1.0, 0);
        }
        let successes = windowed.iter().filter(|t| t.success).count();
        (
            successes as f64 / windowed.len() as f64,
            windowed.len() as u64,
        )
    }

    /// 현재 메트릭에서 발동 중인 트리거 전부 수집
    fn active_triggers(&self, metrics: &RiskMetrics) -> Vec<String> {
        let limits = &self.config.risk_limits;
        let capital = limits.initial_capital as f64;
        let mut triggers = Vec::new();

        if metrics.current_drawdown > limits.max_drawdown_pct {
            triggers.push(format!(
                "낙폭 {:.1}% > 한도 {:.1}%",
                metrics.current_drawdown * 100.0,
                limits.max_drawdown_pct * 100.0
            ));
        }
        if (metrics.daily_pnl as f64) < -(capital * limits.max_daily_loss_pct) {
            triggers.push(format!(
                "일간 손실 {} > 한도 {:.0}",
                -metrics.daily_pnl,
                capital * limits.max_daily_loss_pct
            ));
        }
        if (metrics.weekly_pnl as f64) < -(capital * limits.max_weekly_loss_pct) {
            triggers.push(format!(
                "주간 손실 {} > 한도 {:.0}",
                -metrics.weekly_pnl,
                capital * limits.max_weekly_loss_pct
            ));
        }
        if metrics.consecutive_failures >= limits.max_consecutive_failures {
            triggers.push(format!(
                "연속 실패 {}회 >= 한도 {}회",
                metrics.consecutive_failures, limits.max_consecutive_failures
            ));
        }
        if metrics.gas_to_capital_ratio > limits.max_gas_ratio {
            triggers.push(format!(
                "가스/자본 비율 {:.3} > 한도 {:.3}",
                metrics.gas_to_capital_ratio, limits.max_gas_ratio
            ));
        }

        // 노출 한도 초과 — 사전 게이트를 우회한 포지션도 여기서 걸린다
        let token_cap = (capital * limits.max_token_exposure_pct) as u128;
        for (token, exposure) in &metrics.token_exposure {
            if *exposure > token_cap {
                triggers.push(format!("{} 노출 {} > 토큰 한도 {}", token, exposure, token_cap));
            }
        }
        let chain_cap = (capital * limits.max_chain_exposure_pct) as u128;
        for (chain_id, exposure) in &metrics.chain_exposure {
            if *exposure > chain_cap {
                triggers.push(format!(
                    "체인 {} 노출 {} > 체인 한도 {}",
                    chain_id, exposure, chain_cap
                ));
            }
        }

        // 성공률/마진 하한은 표본이 충분할 때만 검사
        if metrics.total_trades >= limits.min_trades_for_rate_check {
            if metrics.avg_profit_margin < limits.min_profit_margin {
                triggers.push(format!(
                    "평균 수익 마진 {:.4} < 하한 {:.4}",
                    metrics.avg_profit_margin, limits.min_profit_margin
                ));
            }
            if metrics.success_rate_1h < limits.min_success_rate_1h {
                triggers.push(format!(
                    "1시간 성공률 {:.0}% < 하한 {:.0}%",
                    metrics.success_rate_1h * 100.0,
                    limits.min_success_rate_1h * 100.0
                ));
            }
            if metrics.success_rate_24h < limits.min_success_rate_24h {
                triggers.push(format!(
                    "24시간 성공률 {:.0}% < 하한 {:.0}%",
                    metrics.success_rate_24h * 100.0,
                    limits.min_success_rate_24h * 100.0
                ));
            }
        }

        triggers
    }

    /// 상태 기계 전이: Normal -> Tripped는 즉시, Tripped -> Normal은
    /// 쿨다운 경과 + 전체 트리거 해소가 모두 필요하다.
    async fn evaluate_breaker(&self, metrics: &RiskMetrics, now: DateTime<Utc>) {
        let triggers = self.active_triggers(metrics);
        let mut breaker = self.breaker.write().await;
        let cooldown = Duration::minutes(self.config.risk_limits.cooldown_minutes);

        if !breaker.active {
            if !triggers.is_empty() {
                breaker.active = true;
                breaker.activated_at = Some(now);
                breaker.reasons = triggers.clone();
                breaker.estimated_recovery = Some(now + cooldown);
                breaker.override_eligible = false;
                breaker.override_conditions = vec![format!(
                    "운영자 수동 해제 또는 {}분 쿨다운 후 트리거 해소",
                    self.config.risk_limits.cooldown_minutes
                )];
                warn!("🚨 서킷 브레이커 발동: {:?}", breaker.reasons);
            }
            return;
        }

        let cooldown_elapsed = breaker
            .activated_at
            .map(|at| now - at >= cooldown)
            .unwrap_or(true);

        if cooldown_elapsed && triggers.is_empty() {
            info!("✅ 서킷 브레이커 해제: 쿨다운 경과 및 모든 트리거 해소");
            *breaker = CircuitBreakerStatus::default();
        } else {
            // 계속 발동 상태 — 현재 트리거로 사유 갱신, 수동 해제 가능 여부 갱신
            if !triggers.is_empty() {
                breaker.reasons = triggers;
            }
            breaker.override_eligible = cooldown_elapsed;
        }
    }

    /// 운영자 수동 해제. 남은 트리거가 있어도 강제 복귀하되 경고를 남긴다.
    pub async fn manual_override(&self, operator_note: &str) {
        let mut breaker = self.breaker.write().await;
        if !breaker.active {
            return;
        }
        warn!(
            "⚠️ 서킷 브레이커 수동 해제 (사유: {}). 남은 트리거: {:?}",
            operator_note, breaker.reasons
        );
        *breaker = CircuitBreakerStatus::default();
    }

    /// 거래 사전 위험 평가. 차단 사유를 전부 수집해 제시할 뿐
    /// 거래 규모를 임의로 축소하지 않는다 (호출자가 재조정 후 재평가).
    pub async fn assess_trade_risk(
        &self,
        proposal: &TradeProposal,
        now: DateTime<Utc>,
    ) -> TradeRiskAssessment {
        let limits = &self.config.risk_limits;
        let capital = limits.initial_capital;
        let metrics = self.metrics.read().await.clone();
        let breaker = self.breaker.read().await.clone();
        let token = proposal.base_token();
        let trade_size = proposal.trade_size;
        let mut reasons = Vec::new();

        debug!(
            "🎯 {} 사전 평가: {} 전략, 규모 {}",
            proposal.pair, proposal.strategy, trade_size
        );

        if breaker.active {
            reasons.push("서킷 브레이커 발동 중".to_string());
        }

        let max_single = (capital as f64 * limits.max_single_trade_pct) as u128;
        if trade_size > max_single {
            reasons.push(format!(
                "거래 규모 {} > 단일 거래 한도 {}",
                trade_size, max_single
            ));
        }

        let token_cap = (capital as f64 * limits.max_token_exposure_pct) as u128;
        let token_current = self
            .token_exposure
            .read()
            .await
            .get(token)
            .copied()
            .unwrap_or(0);
        if token_current + trade_size > token_cap {
            reasons.push(format!(
                "{} 노출 {} + {} > 토큰 한도 {}",
                token, token_current, trade_size, token_cap
            ));
        }

        let chain_cap = (capital as f64 * limits.max_chain_exposure_pct) as u128;
        let chain_current = self
            .chain_exposure
            .read()
            .await
            .get(&proposal.chain_id)
            .copied()
            .unwrap_or(0);
        if chain_current + trade_size > chain_cap {
            reasons.push(format!(
                "체인 {} 노출 {} + {} > 체인 한도 {}",
                proposal.chain_id, chain_current, trade_size, chain_cap
            ));
        }

        // 이 거래의 예상 가스가 24h 가스/자본 예산의 남은 여유를 넘는지
        let gas_budget = capital as f64 * limits.max_gas_ratio;
        let gas_spent = metrics.gas_to_capital_ratio * capital as f64;
        let est_gas = proposal.expected_gas_cost.as_u128() as f64 / 1e18;
        if gas_spent + est_gas > gas_budget {
            reasons.push(format!(
                "예상 가스 {:.4} + 24h 지출 {:.4} > 가스 예산 {:.4}",
                est_gas, gas_spent, gas_budget
            ));
        }

        // 가스를 빼면 수익이 남지 않는 제안은 거부
        if (proposal.expected_profit as f64) <= est_gas {
            reasons.push(format!(
                "예상 수익 {} <= 예상 가스 비용 {:.4}",
                proposal.expected_profit, est_gas
            ));
        }

        // 허용 가능한 최대 포지션 = 각 한도 여유분의 최소값
        let token_headroom = token_cap.saturating_sub(token_current);
        let chain_headroom = chain_cap.saturating_sub(chain_current);
        let max_position_size = if breaker.active {
            0
        } else {
            max_single.min(token_headroom).min(chain_headroom)
        };
        let headroom_ratio = if max_single == 0 {
            0.0
        } else {
            max_position_size as f64 / max_single as f64
        };

        TradeRiskAssessment {
            approved: reasons.is_empty(),
            risk_level: Self::derive_risk_level(
                &metrics,
                &breaker,
                limits,
                headroom_ratio,
                proposal.confidence,
            ),
            max_position_size,
            rejection_reasons: reasons,
            assessed_at: now,
        }
    }

    /// 위험 등급 판정. 브레이커가 켜져 있으면 무조건 Critical, 그 외에는
    /// 낙폭/연속 실패에 가스 예산 소진도, 노출 여유, 기회 신뢰도를 더해 본다.
    fn derive_risk_level(
        metrics: &RiskMetrics,
        breaker: &CircuitBreakerStatus,
        limits: &RiskLimitsConfig,
        headroom_ratio: f64,
        confidence: f64,
    ) -> RiskLevel {
        if breaker.active {
            return RiskLevel::Critical;
        }
        let gas_usage = if limits.max_gas_ratio > 0.0 {
            metrics.gas_to_capital_ratio / limits.max_gas_ratio
        } else {
            0.0
        };
        let max_drawdown = limits.max_drawdown_pct;

        if metrics.current_drawdown > max_drawdown * 0.5
            || metrics.consecutive_failures >= 3
            || gas_usage > 0.8
            || confidence < 0.3
            || headroom_ratio < 0.1
        {
            RiskLevel::High
        } else if metrics.current_drawdown > max_drawdown * 0.25
            || gas_usage > 0.5
            || confidence < 0.6
            || headroom_ratio < 0.5
        {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// 포지션 개시 — 노출 한도 추적에 반영
    pub async fn open_position(&self, token: &str, chain_id: ChainId, size: u128) {
        *self
            .token_exposure
            .write()
            .await
            .entry(token.to_string())
            .or_insert(0) += size;
        *self.chain_exposure.write().await.entry(chain_id).or_insert(0) += size;
    }

    /// 포지션 종료 — 노출 해제 (0 아래로 내려가지 않음)
    pub async fn close_position(&self, token: &str, chain_id: ChainId, size: u128) {
        if let Some(exposure) = self.token_exposure.write().await.get_mut(token) {
            *exposure = exposure.saturating_sub(size);
        }
        if let Some(exposure) = self.chain_exposure.write().await.get_mut(&chain_id) {
            *exposure = exposure.saturating_sub(size);
        }
    }

    pub async fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.breaker.read().await.clone()
    }

    pub async fn current_metrics(&self) -> RiskMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn is_trading_allowed(&self) -> bool {
        !self.breaker.read().await.active
    }

    pub async fn risk_report(&self, now: DateTime<Utc>) -> RiskReport {
        let metrics = self.metrics.read().await.clone();
        let breaker = self.breaker.read().await.clone();
        // 리포트는 특정 제안에 대한 평가가 아니므로 여유/신뢰도는 중립값
        let risk_level =
            Self::derive_risk_level(&metrics, &breaker, &self.config.risk_limits, 1.0, 1.0);
        RiskReport {
            generated_at: now,
            metrics,
            circuit_breaker: breaker,
            risk_level,
        }
    }
}

impl std::fmt::Debug for RiskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskManager")
            .field("config", &"Arc<Config>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OptimizedParameters;
    use ethers::types::U256;

    fn make_trade(success: bool, profit: i128) -> TradeRecord {
        TradeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            chain_id: 1,
            pair: "WETH/USDC".to_string(),
            success,
            profit,
            trade_size: 100,
            gas_used: 100_000,
            gas_price: U256::from(20_000_000_000u64),
            execution_latency_ms: 100,
            parameters: OptimizedParameters::default(),
            market_snapshot: None,
        }
    }

    fn make_manager() -> (Arc<PerformanceTracker>, RiskManager) {
        let config = Arc::new(Config::default());
        let tracker = Arc::new(PerformanceTracker::new(Arc::clone(&config)));
        let manager = RiskManager::new(config, Arc::clone(&tracker));
        (tracker, manager)
    }

    fn make_proposal(pair: &str, chain_id: ChainId, trade_size: u128) -> TradeProposal {
        TradeProposal {
            pair: pair.to_string(),
            chain_id,
            strategy: "dex_arbitrage".to_string(),
            trade_size,
            expected_profit: 50,
            expected_gas_cost: U256::exp10(15),
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn test_healthy_state_allows_trading() {
        let (tracker, manager) = make_manager();
        tracker.record_trade(make_trade(true, 100), Utc::now()).await;
        manager.refresh(Utc::now()).await;

        assert!(manager.is_trading_allowed().await);
        let assessment = manager
            .assess_trade_risk(&make_proposal("WETH/USDC", 1, 1_000), Utc::now())
            .await;
        assert!(assessment.approved);
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }

    #[tokio::test]
    async fn test_drawdown_trips_breaker_with_all_reasons() {
        let (tracker, manager) = make_manager();
        // 자본 100,000에서 25,000 손실 -> 낙폭 25% > 한도 20%
        tracker.record_trade(make_trade(false, -25_000), Utc::now()).await;
        let metrics = manager.refresh(Utc::now()).await;

        assert!((metrics.current_drawdown - 0.25).abs() < 1e-9);
        let breaker = manager.circuit_breaker_status().await;
        assert!(breaker.active);
        // 낙폭 + 일간 손실 + 주간 손실이 모두 기록되어야 한다
        assert!(breaker.reasons.len() >= 3);
        assert!(breaker.reasons.iter().any(|r| r.contains("낙폭")));
        assert!(breaker.estimated_recovery.is_some());
    }

    #[tokio::test]
    async fn test_consecutive_failures_trip_and_block_trades() {
        let (tracker, manager) = make_manager();
        for _ in 0..5 {
            tracker.record_trade(make_trade(false, 0), Utc::now()).await;
        }
        let metrics = manager.refresh(Utc::now()).await;

        assert_eq!(metrics.consecutive_failures, 5);
        assert!(!manager.is_trading_allowed().await);

        let assessment = manager
            .assess_trade_risk(&make_proposal("WETH/USDC", 1, 100), Utc::now())
            .await;
        assert!(!assessment.approved);
        assert_eq!(assessment.max_position_size, 0);
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
    }

    #[tokio::test]
    async fn test_breaker_stays_tripped_during_cooldown() {
        let (tracker, manager) = make_manager();
        for _ in 0..5 {
            tracker.record_trade(make_trade(false, 0), Utc::now()).await;
        }
        let now = Utc::now();
        manager.refresh(now).await;

        // 트리거가 해소되어도 쿨다운 전에는 복귀하지 않는다
        tracker.record_trade(make_trade(true, 10), Utc::now()).await;
        manager.refresh(now + Duration::minutes(5)).await;
        assert!(!manager.is_trading_allowed().await);
    }

    #[tokio::test]
    async fn test_breaker_recovers_after_cooldown_and_cleared_triggers() {
        let (tracker, manager) = make_manager();
        for _ in 0..5 {
            tracker.record_trade(make_trade(false, 0), Utc::now()).await;
        }
        let now = Utc::now();
        manager.refresh(now).await;
        assert!(!manager.is_trading_allowed().await);

        // 성공 거래로 연속 실패 해소 + 쿨다운 경과
        tracker.record_trade(make_trade(true, 10), Utc::now()).await;
        manager.refresh(now + Duration::minutes(31)).await;
        assert!(manager.is_trading_allowed().await);
    }

    #[tokio::test]
    async fn test_breaker_not_recovered_if_triggers_remain() {
        let (tracker, manager) = make_manager();
        tracker.record_trade(make_trade(false, -25_000), Utc::now()).await;
        let now = Utc::now();
        manager.refresh(now).await;

        // 쿨다운은 지났지만 낙폭 트리거가 그대로 -> 발동 유지, 수동 해제 가능
        manager.refresh(now + Duration::minutes(31)).await;
        let breaker = manager.circuit_breaker_status().await;
        assert!(breaker.active);
        assert!(breaker.override_eligible);
    }

    #[tokio::test]
    async fn test_manual_override() {
        let (tracker, manager) = make_manager();
        tracker.record_trade(make_trade(false, -25_000), Utc::now()).await;
        manager.refresh(Utc::now()).await;
        assert!(!manager.is_trading_allowed().await);

        manager.manual_override("운영자 확인 완료").await;
        assert!(manager.is_trading_allowed().await);
    }

    #[tokio::test]
    async fn test_single_trade_size_limit() {
        let (_, manager) = make_manager();
        manager.refresh(Utc::now()).await;

        // 한도: 100,000 x 10% = 10,000
        let assessment = manager
            .assess_trade_risk(&make_proposal("WETH/USDC", 1, 15_000), Utc::now())
            .await;
        assert!(!assessment.approved);
        assert!(assessment
            .rejection_reasons
            .iter()
            .any(|r| r.contains("단일 거래 한도")));
    }

    #[tokio::test]
    async fn test_token_exposure_limit_and_headroom() {
        let (_, manager) = make_manager();
        manager.refresh(Utc::now()).await;

        // 토큰 한도: 100,000 x 25% = 25,000
        manager.open_position("WETH", 1, 20_000).await;
        let assessment = manager
            .assess_trade_risk(&make_proposal("WETH/USDC", 1, 10_000), Utc::now())
            .await;
        assert!(!assessment.approved);
        assert_eq!(assessment.max_position_size, 5_000);

        // 포지션 종료 후에는 여유가 복원된다
        manager.close_position("WETH", 1, 20_000).await;
        let assessment = manager
            .assess_trade_risk(&make_proposal("WETH/USDC", 1, 10_000), Utc::now())
            .await;
        assert!(assessment.approved);
    }

    #[tokio::test]
    async fn test_low_margin_trips_with_enough_samples() {
        let (tracker, manager) = make_manager();
        // 성공하지만 마진이 0인 거래 10건 -> 마진 하한 트리거
        for _ in 0..10 {
            tracker.record_trade(make_trade(true, 0), Utc::now()).await;
        }
        manager.refresh(Utc::now()).await;

        let breaker = manager.circuit_breaker_status().await;
        assert!(breaker.active);
        assert!(breaker.reasons.iter().any(|r| r.contains("마진")));
    }

    #[tokio::test]
    async fn test_exposure_breach_trips_breaker() {
        let (_, manager) = make_manager();
        // 사전 게이트를 거치지 않은 노출: 토큰 한도 25,000 초과
        manager.open_position("WETH", 1, 30_000).await;
        manager.refresh(Utc::now()).await;

        let breaker = manager.circuit_breaker_status().await;
        assert!(breaker.active);
        assert!(breaker.reasons.iter().any(|r| r.contains("토큰 한도")));
    }

    #[tokio::test]
    async fn test_success_rate_check_requires_min_samples() {
        let (tracker, manager) = make_manager();
        // 4건 실패: 성공률 0%지만 표본 부족으로 성공률 트리거는 꺼져 있다
        for _ in 0..4 {
            tracker.record_trade(make_trade(false, 0), Utc::now()).await;
        }
        let metrics = manager.refresh(Utc::now()).await;
        assert_eq!(metrics.success_rate_24h, 0.0);

        let breaker = manager.circuit_breaker_status().await;
        // 연속 실패(4 < 5)도 성공률(표본 < 10)도 발동하지 않는다
        assert!(!breaker.active);
    }

    #[tokio::test]
    async fn test_gas_ratio_trips_breaker() {
        let (tracker, manager) = make_manager();
        // 가스 비용 1e10 x 1,100 gwei = 1.1e22 wei = 11,000 네이티브 단위
        // -> 자본 100,000 x 한도 0.10 = 10,000 초과
        let mut trade = make_trade(true, 10);
        trade.gas_used = 10_000_000_000;
        trade.gas_price = U256::from(1_100_000_000_000u64);
        tracker.record_trade(trade, Utc::now()).await;
        let metrics = manager.refresh(Utc::now()).await;

        assert!((metrics.gas_to_capital_ratio - 0.11).abs() < 1e-9);
        let breaker = manager.circuit_breaker_status().await;
        assert!(breaker.active);
        assert!(breaker.reasons.iter().any(|r| r.contains("가스/자본")));
    }

    #[tokio::test]
    async fn test_low_confidence_raises_risk_level() {
        let (_, manager) = make_manager();
        manager.refresh(Utc::now()).await;

        // 신뢰도는 승인 여부가 아니라 위험 등급에 반영된다
        let mut proposal = make_proposal("WETH/USDC", 1, 1_000);
        proposal.confidence = 0.2;
        let assessment = manager.assess_trade_risk(&proposal, Utc::now()).await;
        assert!(assessment.approved);
        assert_eq!(assessment.risk_level, RiskLevel::High);

        proposal.confidence = 0.5;
        let assessment = manager.assess_trade_risk(&proposal, Utc::now()).await;
        assert_eq!(assessment.risk_level, RiskLevel::Medium);
    }

    #[tokio::test]
    async fn test_estimated_gas_beyond_budget_rejected() {
        let (_, manager) = make_manager();
        manager.refresh(Utc::now()).await;

        // 가스 예산: 100,000 x 0.10 = 10,000 네이티브 단위
        let mut proposal = make_proposal("WETH/USDC", 1, 1_000);
        proposal.expected_gas_cost = U256::from(10_500u64) * U256::exp10(18);
        let assessment = manager.assess_trade_risk(&proposal, Utc::now()).await;
        assert!(!assessment.approved);
        assert!(assessment
            .rejection_reasons
            .iter()
            .any(|r| r.contains("가스 예산")));
    }
}
