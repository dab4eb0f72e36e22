//! mock 어댑터 위에서 엔진 전체 수명주기를 검증하는 통합 테스트

use std::sync::Arc;

use chrono::Utc;
use ethers::types::U256;

use xpulse_trade_optimizer::adapters::{BundleRelay, ChainClient, CompetitorFeed};
use xpulse_trade_optimizer::constants::{gwei, ETHEREUM};
use xpulse_trade_optimizer::core::OptimizerEngine;
use xpulse_trade_optimizer::mocks::{MockBundleRelay, MockChainClient, MockCompetitorFeed};
use xpulse_trade_optimizer::types::{
    BundleCandidate, BundleFailureReason, OptimizedParameters, Priority, RiskLevel, TradeProposal,
    TradeRecord, UrgencyLevel,
};
use xpulse_trade_optimizer::Config;

struct Harness {
    chain_client: Arc<MockChainClient>,
    relay: Arc<MockBundleRelay>,
    engine: OptimizerEngine,
}

fn make_harness() -> Harness {
    let config = Arc::new(Config::default());
    let chain_client = Arc::new(MockChainClient::new());
    let relay = Arc::new(MockBundleRelay::new());
    let competitor_feed = Arc::new(MockCompetitorFeed::new());
    let engine = OptimizerEngine::new(
        config,
        Arc::clone(&chain_client) as Arc<dyn ChainClient>,
        Arc::clone(&relay) as Arc<dyn BundleRelay>,
        competitor_feed as Arc<dyn CompetitorFeed>,
    );
    Harness {
        chain_client,
        relay,
        engine,
    }
}

fn make_trade(success: bool, profit: i128) -> TradeRecord {
    TradeRecord {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        chain_id: ETHEREUM,
        pair: "WETH/USDC".to_string(),
        success,
        profit,
        trade_size: 500,
        gas_used: 150_000,
        gas_price: gwei(20),
        execution_latency_ms: 80,
        parameters: OptimizedParameters::default(),
        market_snapshot: None,
    }
}

fn make_proposal(trade_size: u128) -> TradeProposal {
    TradeProposal {
        pair: "WETH/USDC".to_string(),
        chain_id: ETHEREUM,
        strategy: "dex_arbitrage".to_string(),
        trade_size,
        expected_profit: 50,
        expected_gas_cost: U256::exp10(15),
        confidence: 0.9,
    }
}

fn make_candidate(id: &str, tokens: &[&str], profit_milli_eth: u64) -> BundleCandidate {
    BundleCandidate {
        id: id.to_string(),
        chain_id: ETHEREUM,
        tokens: tokens.iter().map(|t| t.to_string()).collect(),
        expected_profit: U256::from(profit_milli_eth) * U256::exp10(15),
        gas_estimate: 250_000,
        confidence: 0.85,
        priority: Priority::High,
        signature: format!("arb:{}", tokens.join("/")),
    }
}

#[tokio::test]
async fn optimization_cycle_end_to_end() {
    let harness = make_harness();
    let engine = &harness.engine;

    // 혼잡한 체인 상태 주입
    harness.chain_client.set_base_fee(ETHEREUM, gwei(40)).await;
    harness.chain_client.set_block_fullness(ETHEREUM, 0.9).await;

    let result = engine.force_optimization(ETHEREUM).await.unwrap();
    let params = engine.get_current_parameters(ETHEREUM);

    assert_eq!(params, result.updated);
    // 혼잡 조정이 반영된 슬리피지 (기본 50 bps보다 크다)
    assert!(params.slippage_bps > 50);
    // 경계 안에서만 공개된다
    let config = Config::default();
    assert!(params.slippage_bps <= config.validation.max_slippage_bps);
    assert!(params.max_fee_per_gas <= gwei(config.validation.max_fee_cap_gwei));
}

#[tokio::test]
async fn losses_trip_breaker_and_block_new_trades() {
    let harness = make_harness();
    let engine = &harness.engine;

    // 정상 상태에서는 거래가 허용된다
    let assessment = engine.assess_trade_risk(&make_proposal(1_000)).await;
    assert!(assessment.approved);

    // 큰 손실 기록 -> 낙폭 한도 초과 -> 브레이커 발동
    engine.record_trade(make_trade(false, -25_000)).await;

    let report = engine.get_risk_report().await;
    assert!(report.circuit_breaker.active);
    assert!(report.metrics.current_drawdown > 0.2);

    let assessment = engine.assess_trade_risk(&make_proposal(1_000)).await;
    assert!(!assessment.approved);
    assert_eq!(assessment.risk_level, RiskLevel::Critical);

    // 브레이커 중의 최적화 사이클은 Critical 파라미터를 공개한다
    let result = engine.force_optimization(ETHEREUM).await.unwrap();
    assert_eq!(result.updated.risk_level, RiskLevel::Critical);
}

#[tokio::test]
async fn bundle_pipeline_with_failure_fallback() {
    let harness = make_harness();
    let builder = harness.engine.bundle_builder();
    let now = Utc::now();

    let candidates = vec![
        make_candidate("c1", &["WETH", "USDC"], 200),
        make_candidate("c2", &["WBTC", "DAI"], 150),
        make_candidate("c3", &["WETH", "DAI"], 120),
    ];

    let bundle = builder
        .build_bundle(candidates.clone(), ETHEREUM, UrgencyLevel::High, 19_000_001, now)
        .await
        .unwrap()
        .expect("bundle should be built");

    // 토큰 충돌 없는 최대 2개 레그 (c3는 c1/c2와 토큰을 공유)
    assert!(bundle.candidates.len() <= 2);
    assert!(bundle.metrics.inclusion_probability >= 30.0);
    assert!(bundle.metrics.inclusion_probability <= 95.0);

    // 제출 후 릴레이 이력 확인
    assert!(builder.submit(&bundle).await.unwrap());
    let submissions = harness.relay.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].0, 19_000_001);

    // 반복 실패 -> 스킵 -> 같은 기회는 다음 번들에서 제외
    for _ in 0..3 {
        builder.handle_failure(&bundle, BundleFailureReason::Revert, now);
    }
    let rebuilt = builder
        .build_bundle(
            vec![make_candidate("c1", &["WETH", "USDC"], 200)],
            ETHEREUM,
            UrgencyLevel::High,
            19_000_002,
            now,
        )
        .await
        .unwrap();
    assert!(rebuilt.is_none());
}

#[tokio::test]
async fn performance_report_reflects_recorded_trades() {
    let harness = make_harness();
    let engine = &harness.engine;

    for profit in [10i128, 20, 5] {
        engine.record_trade(make_trade(true, profit)).await;
    }
    for _ in 0..7 {
        engine.record_trade(make_trade(false, 0)).await;
    }

    let report = engine.get_detailed_performance_report().await;
    assert_eq!(report.metrics.total_trades, 10);
    assert!((report.metrics.success_rate - 0.3).abs() < 1e-9);
    assert_eq!(report.metrics.avg_profit_per_trade, 3);
    // 성공률 50% 미만이면 점검 권고가 생성된다
    assert!(!report.recommendations.is_empty());
}
