use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::common::math::relative_change;
use crate::config::Config;
use crate::types::{OptimizationResult, TradeRecord};

/// 성능 추적기.
///
/// 완료된 거래 기록과 최적화 결과를 유한한 히스토리에 보관하고
/// 롤링 윈도우 기반 메트릭을 계산한다. 히스토리는 최대 개수와
/// 보존 기간 양쪽으로 바운드되며 초과분은 FIFO로 제거된다.
pub struct PerformanceTracker {
    config: Arc<Config>,
    trades: Arc<RwLock<VecDeque<TradeRecord>>>,
    optimizations: Arc<RwLock<VecDeque<OptimizationResult>>>,
}

/// 롤링 윈도우 메트릭 스냅샷. 윈도우가 비어 있으면 0 값으로 채워진다.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformanceSnapshot {
    pub window_hours: i64,
    pub total_trades: u64,
    pub successful_trades: u64,
    pub success_rate: f64,
    /// 윈도우 내 총 실현 수익 (토큰 단위)
    pub total_profit: i128,
    /// 거래당 평균 수익 (정수 나눗셈)
    pub avg_profit_per_trade: i128,
    pub total_gas_used: u64,
    /// 총 가스 비용 (wei)
    pub total_gas_cost: U256,
    /// 가스 단위당 수익 (가스 소비가 없으면 0)
    pub gas_efficiency: f64,
    /// 수익/가스비 비율 (%, 가스비가 0이면 0)
    pub roi_pct: f64,
    /// 기회 포착률. 기록된 거래 중 성공 비율로 근사한다 —
    /// 탐지되지 않은 기회는 볼 수 없으므로 성공률과 동일한 값이다
    /// (문서화된 근사이며 의도적으로 재정의하지 않는다).
    pub opportunity_capture_rate: f64,
    pub avg_latency_ms: f64,
}

/// 윈도우 전/후반 비교 추세. 기준(전반부)이 비어 있으면 0.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PerformanceTrends {
    pub success_rate_change: f64,
    pub avg_profit_change: f64,
    pub gas_efficiency_change: f64,
}

/// 상세 리포트 (읽기 전용 진단용)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,
    pub metrics: PerformanceSnapshot,
    pub trends: PerformanceTrends,
    pub trades_recorded: usize,
    pub optimizations_recorded: usize,
    pub recommendations: Vec<String>,
}

impl PerformanceTracker {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            trades: Arc::new(RwLock::new(VecDeque::new())),
            optimizations: Arc::new(RwLock::new(VecDeque::new())),
        }
    }

    /// 완료된 거래 기록. 바운드 초과분과 보존 기간을 지난 항목은 즉시 제거.
    pub async fn record_trade(&self, record: TradeRecord, now: DateTime<Utc>) {
        let mut trades = self.trades.write().await;
        trades.push_back(record);

        let max = self.config.performance.max_trade_history;
        while trades.len() > max {
            trades.pop_front();
        }

        let cutoff = now - Duration::days(self.config.performance.retention_days);
        while trades.front().map(|t| t.timestamp < cutoff).unwrap_or(false) {
            trades.pop_front();
        }
    }

    /// 최적화 사이클 결과 기록 (불변 append)
    pub async fn record_optimization(&self, result: OptimizationResult) {
        let mut optimizations = self.optimizations.write().await;
        optimizations.push_back(result);

        let max = self.config.performance.max_optimization_history;
        while optimizations.len() > max {
            optimizations.pop_front();
        }
    }

    /// 롤링 윈도우 메트릭 계산. 빈 윈도우는 0 값 스냅샷 (에러 아님).
    pub async fn compute_metrics(&self, now: DateTime<Utc>) -> PerformanceSnapshot {
        let window_hours = self.config.performance.metrics_window_hours;
        let cutoff = now - Duration::hours(window_hours);

        let trades = self.trades.read().await;
        let windowed: Vec<&TradeRecord> =
            trades.iter().filter(|t| t.timestamp >= cutoff).collect();

        Self::snapshot_from(&windowed, window_hours)
    }

    fn snapshot_from(windowed: &[&TradeRecord], window_hours: i64) -> PerformanceSnapshot {
        if windowed.is_empty() {
            return PerformanceSnapshot {
                window_hours,
                ..Default::default()
            };
        }

        let total = windowed.len() as u64;
        let successful = windowed.iter().filter(|t| t.success).count() as u64;
        let success_rate = successful as f64 / total as f64;

        let total_profit: i128 = windowed.iter().map(|t| t.profit).sum();
        let avg_profit_per_trade = total_profit / total as i128;

        let total_gas_used: u64 = windowed.iter().map(|t| t.gas_used).sum();
        let total_gas_cost: U256 = windowed
            .iter()
            .fold(U256::zero(), |acc, t| acc + t.gas_cost());

        let gas_efficiency = if total_gas_used == 0 {
            0.0
        } else {
            total_profit as f64 / total_gas_used as f64
        };

        let roi_pct = if total_gas_cost.is_zero() {
            0.0
        } else {
            total_profit as f64 / total_gas_cost.as_u128() as f64 * 100.0
        };

        let avg_latency_ms = windowed
            .iter()
            .map(|t| t.execution_latency_ms as f64)
            .sum::<f64>()
            / total as f64;

        PerformanceSnapshot {
            window_hours,
            total_trades: total,
            successful_trades: successful,
            success_rate,
            total_profit,
            avg_profit_per_trade,
            total_gas_used,
            total_gas_cost,
            gas_efficiency,
            roi_pct,
            opportunity_capture_rate: success_rate,
            avg_latency_ms,
        }
    }

    /// 윈도우를 전/후반으로 나눠 상대 변화를 계산. 기준 반쪽이 비면 0.
    pub async fn compute_trends(&self, now: DateTime<Utc>) -> PerformanceTrends {
        let window_hours = self.config.performance.metrics_window_hours;
        let window_start = now - Duration::hours(window_hours);
        let midpoint = now - Duration::hours(window_hours / 2);

        let trades = self.trades.read().await;
        let older: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.timestamp >= window_start && t.timestamp < midpoint)
            .collect();
        let recent: Vec<&TradeRecord> =
            trades.iter().filter(|t| t.timestamp >= midpoint).collect();

        if older.is_empty() {
            return PerformanceTrends::default();
        }

        let older_snap = Self::snapshot_from(&older, window_hours / 2);
        let recent_snap = Self::snapshot_from(&recent, window_hours / 2);

        PerformanceTrends {
            success_rate_change: relative_change(older_snap.success_rate, recent_snap.success_rate),
            avg_profit_change: relative_change(
                older_snap.avg_profit_per_trade as f64,
                recent_snap.avg_profit_per_trade as f64,
            ),
            gas_efficiency_change: relative_change(
                older_snap.gas_efficiency,
                recent_snap.gas_efficiency,
            ),
        }
    }

    /// 상세 리포트 생성
    pub async fn detailed_report(&self, now: DateTime<Utc>) -> PerformanceReport {
        let metrics = self.compute_metrics(now).await;
        let trends = self.compute_trends(now).await;
        let trades_recorded = self.trades.read().await.len();
        let optimizations_recorded = self.optimizations.read().await.len();

        let mut recommendations = Vec::new();
        if metrics.total_trades > 0 && metrics.success_rate < 0.5 {
            recommendations
                .push("성공률이 낮습니다. 슬리피지 허용치와 가스 전략을 점검하세요".to_string());
        }
        if metrics.total_trades > 0 && metrics.roi_pct < 0.0 {
            recommendations
                .push("가스 대비 수익이 음수입니다. 수익 임계값을 높이는 것을 고려하세요".to_string());
        }
        if trends.gas_efficiency_change < -0.2 {
            recommendations
                .push("가스 효율이 악화되고 있습니다. 혼잡 시간대 회피를 고려하세요".to_string());
        }

        PerformanceReport {
            generated_at: now,
            metrics,
            trends,
            trades_recorded,
            optimizations_recorded,
            recommendations,
        }
    }

    /// 전체 거래 히스토리 스냅샷 (RiskManager의 전체 재계산용)
    pub async fn history_snapshot(&self) -> Vec<TradeRecord> {
        self.trades.read().await.iter().cloned().collect()
    }

    pub async fn optimization_history(&self) -> Vec<OptimizationResult> {
        self.optimizations.read().await.iter().cloned().collect()
    }

    pub async fn trade_count(&self) -> usize {
        self.trades.read().await.len()
    }

    /// 통계 초기화
    pub async fn reset(&self) {
        self.trades.write().await.clear();
        self.optimizations.write().await.clear();
        info!("📊 성능 히스토리가 초기화되었습니다");
        debug!(
            max_trades = self.config.performance.max_trade_history,
            "히스토리 바운드 유지"
        );
    }
}

impl std::fmt::Debug for PerformanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceTracker")
            .field("config", &"Arc<Config>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OptimizedParameters;

    fn make_trade(success: bool, profit: i128, gas_used: u64) -> TradeRecord {
        TradeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            chain_id: 1,
            pair: "WETH/USDC".to_string(),
            success,
            profit,
            trade_size: 100,
            gas_used,
            gas_price: U256::from(20_000_000_000u64),
            execution_latency_ms: 120,
            parameters: OptimizedParameters::default(),
            market_snapshot: None,
        }
    }

    #[tokio::test]
    async fn test_empty_window_returns_zero_metrics() {
        let tracker = PerformanceTracker::new(Arc::new(Config::default()));
        let metrics = tracker.compute_metrics(Utc::now()).await;

        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.avg_profit_per_trade, 0);
        assert_eq!(metrics.roi_pct, 0.0);
        assert_eq!(metrics.gas_efficiency, 0.0);
    }

    #[tokio::test]
    async fn test_metrics_scenario_ten_trades() {
        let tracker = PerformanceTracker::new(Arc::new(Config::default()));

        // 성공 3건 (수익 10, 20, 5), 실패 7건 (수익 0)
        let now = Utc::now();
        for profit in [10i128, 20, 5] {
            tracker.record_trade(make_trade(true, profit, 100_000), now).await;
        }
        for _ in 0..7 {
            tracker.record_trade(make_trade(false, 0, 100_000), now).await;
        }

        let metrics = tracker.compute_metrics(now).await;
        assert_eq!(metrics.total_trades, 10);
        assert!((metrics.success_rate - 0.3).abs() < 1e-9);
        // 35 / 10 = 3 (정수 절삭)
        assert_eq!(metrics.avg_profit_per_trade, 3);
        assert_eq!(metrics.opportunity_capture_rate, metrics.success_rate);
    }

    #[tokio::test]
    async fn test_gas_efficiency_zero_when_no_gas() {
        let tracker = PerformanceTracker::new(Arc::new(Config::default()));
        tracker.record_trade(make_trade(true, 100, 0), Utc::now()).await;

        let metrics = tracker.compute_metrics(Utc::now()).await;
        assert_eq!(metrics.gas_efficiency, 0.0);
        assert_eq!(metrics.roi_pct, 0.0);
    }

    #[tokio::test]
    async fn test_history_bound_fifo_eviction() {
        let mut config = Config::default();
        config.performance.max_trade_history = 5;
        let tracker = PerformanceTracker::new(Arc::new(config));

        for i in 0..8 {
            tracker.record_trade(make_trade(true, i as i128, 1), Utc::now()).await;
        }

        let history = tracker.history_snapshot().await;
        assert_eq!(history.len(), 5);
        // 가장 오래된 항목부터 제거되었는지 확인
        assert_eq!(history[0].profit, 3);
        assert_eq!(history[4].profit, 7);
    }

    #[tokio::test]
    async fn test_trends_zero_when_baseline_empty() {
        let tracker = PerformanceTracker::new(Arc::new(Config::default()));
        // 최근 반쪽에만 거래가 존재
        tracker.record_trade(make_trade(true, 10, 100), Utc::now()).await;

        let trends = tracker.compute_trends(Utc::now()).await;
        assert_eq!(trends.success_rate_change, 0.0);
        assert_eq!(trends.avg_profit_change, 0.0);
    }

    #[tokio::test]
    async fn test_trends_with_both_halves() {
        let tracker = PerformanceTracker::new(Arc::new(Config::default()));

        // 전반부: 성공률 50% — 타임스탬프를 윈도우 전반부로 되돌린다
        let now = Utc::now();
        let mut old_win = make_trade(true, 10, 100);
        old_win.timestamp = now - Duration::hours(18);
        let mut old_loss = make_trade(false, 0, 100);
        old_loss.timestamp = now - Duration::hours(18);
        tracker.record_trade(old_win, now).await;
        tracker.record_trade(old_loss, now).await;

        // 후반부: 성공률 100%
        let mut recent_win = make_trade(true, 10, 100);
        recent_win.timestamp = now - Duration::hours(1);
        tracker.record_trade(recent_win, now).await;

        let trends = tracker.compute_trends(now).await;
        assert!((trends.success_rate_change - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_detailed_report_recommendations() {
        let tracker = PerformanceTracker::new(Arc::new(Config::default()));
        for _ in 0..8 {
            tracker.record_trade(make_trade(false, -5, 100_000), Utc::now()).await;
        }

        let report = tracker.detailed_report(Utc::now()).await;
        assert!(!report.recommendations.is_empty());
        assert_eq!(report.trades_recorded, 8);
    }
}
