use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::adapters::{BundleRelay, ChainClient, CompetitorFeed};
use crate::config::Config;
use crate::constants::chain_name;
use crate::core::bundle_builder::BundleBuilder;
use crate::core::coordinator::OptimizationCoordinator;
use crate::core::gas_pricer::GasPricer;
use crate::core::market_analyzer::MarketAnalyzer;
use crate::core::performance_tracker::{PerformanceReport, PerformanceTracker};
use crate::core::risk_manager::{RiskManager, RiskReport};
use crate::core::slippage::SlippageCalculator;
use crate::types::{
    ChainId, CircuitBreakerStatus, OptimizationResult, OptimizedParameters, TradeProposal,
    TradeRecord, TradeRiskAssessment,
};

/// 엔진 상태 스냅샷
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub is_running: bool,
    pub primary_chain_id: ChainId,
    pub trades_recorded: usize,
    pub optimizations_recorded: usize,
    pub circuit_breaker: CircuitBreakerStatus,
    pub current_parameters: OptimizedParameters,
}

/// 최적화 엔진 파사드.
///
/// 모든 컴포넌트를 묶고 주기적 최적화 루프와 상태 리포트
/// 태스크를 구동한다. 실행 레이어는 이 파사드를 통해서만
/// 파라미터 조회, 거래 기록, 위험 평가를 수행한다.
pub struct OptimizerEngine {
    config: Arc<Config>,
    chain_client: Arc<dyn ChainClient>,
    is_running: Arc<AtomicBool>,

    pub(crate) tracker: Arc<PerformanceTracker>,
    pub(crate) analyzer: Arc<MarketAnalyzer>,
    pub(crate) risk_manager: Arc<RiskManager>,
    pub(crate) slippage: Arc<SlippageCalculator>,
    pub(crate) gas_pricer: Arc<GasPricer>,
    pub(crate) bundle_builder: Arc<BundleBuilder>,
    pub(crate) coordinator: Arc<OptimizationCoordinator>,
}

impl OptimizerEngine {
    pub fn new(
        config: Arc<Config>,
        chain_client: Arc<dyn ChainClient>,
        relay: Arc<dyn BundleRelay>,
        competitor_feed: Arc<dyn CompetitorFeed>,
    ) -> Self {
        info!("🔧 OptimizerEngine 초기화 중...");

        let tracker = Arc::new(PerformanceTracker::new(Arc::clone(&config)));
        let analyzer = Arc::new(MarketAnalyzer::new(
            Arc::clone(&config),
            Arc::clone(&chain_client),
            Arc::clone(&competitor_feed),
        ));
        let risk_manager = Arc::new(RiskManager::new(Arc::clone(&config), Arc::clone(&tracker)));
        let slippage = Arc::new(SlippageCalculator::new(
            Arc::clone(&config),
            Arc::clone(&analyzer),
        ));
        let gas_pricer = Arc::new(GasPricer::new(
            Arc::clone(&config),
            Arc::clone(&chain_client),
            Arc::clone(&analyzer),
        ));
        let bundle_builder = Arc::new(BundleBuilder::new(
            Arc::clone(&config),
            Arc::clone(&gas_pricer),
            relay,
            competitor_feed,
        ));
        let coordinator = Arc::new(OptimizationCoordinator::new(
            Arc::clone(&config),
            Arc::clone(&analyzer),
            Arc::clone(&slippage),
            Arc::clone(&gas_pricer),
            Arc::clone(&risk_manager),
            Arc::clone(&tracker),
        ));

        info!("✅ OptimizerEngine 초기화 완료");

        Self {
            config,
            chain_client,
            is_running: Arc::new(AtomicBool::new(false)),
            tracker,
            analyzer,
            risk_manager,
            slippage,
            gas_pricer,
            bundle_builder,
            coordinator,
        }
    }

    /// 최적화 루프와 리포트 태스크 시작
    pub async fn start(&self) -> Result<()> {
        if self.is_running.load(Ordering::SeqCst) {
            warn!("⚠️ OptimizerEngine이 이미 실행 중입니다");
            return Ok(());
        }
        self.is_running.store(true, Ordering::SeqCst);

        let chain_ids: Vec<ChainId> = self.config.chains.iter().map(|c| c.chain_id).collect();
        info!(
            "🚀 OptimizerEngine 시작: {}개 체인, 최적화 주기 {}초",
            chain_ids.len(),
            self.config.engine.optimization_interval_secs
        );

        // 최적화 루프 태스크
        let coordinator = Arc::clone(&self.coordinator);
        let is_running = Arc::clone(&self.is_running);
        let interval_secs = self.config.engine.optimization_interval_secs;
        let loop_chains = chain_ids.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                if !is_running.load(Ordering::SeqCst) {
                    info!("🛑 최적화 루프 종료");
                    break;
                }
                let now = Utc::now();
                // 체인별 사이클은 서로 독립적이라 동시에 수행한다
                let cycles = loop_chains.iter().map(|&chain_id| {
                    let coordinator = Arc::clone(&coordinator);
                    async move { (chain_id, coordinator.run_cycle(chain_id, now).await) }
                });
                for (chain_id, result) in futures::future::join_all(cycles).await {
                    if let Err(e) = result {
                        error!("❌ {} 최적화 사이클 실패: {}", chain_name(chain_id), e);
                    }
                }
            }
        });

        // 상태 리포트 태스크
        let tracker = Arc::clone(&self.tracker);
        let risk_manager = Arc::clone(&self.risk_manager);
        let chain_client = Arc::clone(&self.chain_client);
        let is_running = Arc::clone(&self.is_running);
        let report_secs = self.config.engine.report_interval_secs;
        let primary_chain = self.config.engine.primary_chain_id;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(report_secs));
            loop {
                interval.tick().await;
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }
                let metrics = tracker.compute_metrics(Utc::now()).await;
                let breaker = risk_manager.circuit_breaker_status().await;
                info!("📊 상태 리포트:");
                info!(
                    "  거래 {}건, 성공률 {:.1}%, 총 수익 {}",
                    metrics.total_trades,
                    metrics.success_rate * 100.0,
                    metrics.total_profit
                );
                if breaker.active {
                    warn!("  🚨 서킷 브레이커 발동 중: {:?}", breaker.reasons);
                }
                if let Ok(balance) = chain_client.account_balance(primary_chain).await {
                    info!("  주 체인 계정 잔고: {}", balance);
                }
                if let Ok(json) = serde_json::to_string(&metrics) {
                    tracing::debug!("메트릭 스냅샷: {}", json);
                }
            }
        });

        Ok(())
    }

    /// 엔진 중지
    pub async fn stop(&self) {
        if !self.is_running.load(Ordering::SeqCst) {
            warn!("⚠️ OptimizerEngine이 이미 중지됨");
            return;
        }
        self.is_running.store(false, Ordering::SeqCst);
        info!("✅ OptimizerEngine 중지됨");
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// 체인의 현재 공개 파라미터 조회
    pub fn get_current_parameters(&self, chain_id: ChainId) -> OptimizedParameters {
        self.coordinator.current_parameters(chain_id)
    }

    /// 거래 사전 위험 평가
    pub async fn assess_trade_risk(&self, proposal: &TradeProposal) -> TradeRiskAssessment {
        self.risk_manager
            .assess_trade_risk(proposal, Utc::now())
            .await
    }

    /// 완료된 거래 기록 후 위험 상태 즉시 재평가
    pub async fn record_trade(&self, record: TradeRecord) {
        let now = Utc::now();
        self.tracker.record_trade(record, now).await;
        self.risk_manager.refresh(now).await;
    }

    /// 수동 최적화 트리거
    pub async fn force_optimization(&self, chain_id: ChainId) -> Result<OptimizationResult> {
        self.coordinator.force_optimization(chain_id).await
    }

    /// 번들 구성기 핸들 (실행 레이어가 번들 파이프라인에 사용)
    pub fn bundle_builder(&self) -> Arc<BundleBuilder> {
        Arc::clone(&self.bundle_builder)
    }

    pub async fn get_risk_report(&self) -> RiskReport {
        self.risk_manager.risk_report(Utc::now()).await
    }

    pub async fn get_detailed_performance_report(&self) -> PerformanceReport {
        self.tracker.detailed_report(Utc::now()).await
    }

    pub async fn get_status(&self) -> EngineStatus {
        let primary = self.config.engine.primary_chain_id;
        EngineStatus {
            is_running: self.is_running(),
            primary_chain_id: primary,
            trades_recorded: self.tracker.trade_count().await,
            optimizations_recorded: self.tracker.optimization_history().await.len(),
            circuit_breaker: self.risk_manager.circuit_breaker_status().await,
            current_parameters: self.get_current_parameters(primary),
        }
    }
}

impl std::fmt::Debug for OptimizerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerEngine")
            .field("config", &"Arc<Config>")
            .field("is_running", &self.is_running.load(Ordering::SeqCst))
            .finish()
    }
}
