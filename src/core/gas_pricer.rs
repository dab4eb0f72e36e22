use std::sync::Arc;

use anyhow::Result;
use ethers::types::U256;
use tracing::{debug, warn};

use crate::adapters::ChainClient;
use crate::config::{ChainConfig, Config};
use crate::constants::{chain_name, gwei, gwei_f64, mul_f64, to_gwei, MAX_GAS_LIMIT, MAX_GAS_PRICE_GWEI};
use crate::core::market_analyzer::MarketAnalyzer;
use crate::errors::OptimizerError;
use crate::types::{ChainId, FeeData, GasRecommendation, UrgencyLevel};

/// 동적 가스 가격 계산기 (EIP-1559).
///
/// 팁은 base fee 비율과 제안 팁 중 큰 값에서 출발해
/// 체인 배수 -> 혼잡도 -> 긴급도 순으로 곱한 뒤,
/// 마지막에 체인별 플로어/실링과 절대 상한으로 클램프한다.
/// 수수료 데이터 수급 실패 시에는 혼잡도와 무관한 체인별
/// 정적 폴백 값을 쓴다.
pub struct GasPricer {
    config: Arc<Config>,
    chain_client: Arc<dyn ChainClient>,
    analyzer: Arc<MarketAnalyzer>,
}

impl GasPricer {
    pub fn new(
        config: Arc<Config>,
        chain_client: Arc<dyn ChainClient>,
        analyzer: Arc<MarketAnalyzer>,
    ) -> Self {
        Self {
            config,
            chain_client,
            analyzer,
        }
    }

    /// 체인/긴급도별 가스 권고 계산
    pub async fn recommend(
        &self,
        chain_id: ChainId,
        urgency: UrgencyLevel,
    ) -> Result<GasRecommendation> {
        let chain = self
            .config
            .chain(chain_id)
            .ok_or_else(|| OptimizerError::Config(format!("Chain {} is not configured", chain_id)))?;

        let conditions = self.analyzer.analyze(chain_id).await;

        let (fee, used_fallback) = match self.chain_client.fee_data(chain_id).await {
            Ok(fee) => (fee, false),
            Err(e) => {
                warn!(
                    "⚠️ {} 수수료 데이터 수급 실패, 정적 폴백 사용: {}",
                    chain_name(chain_id),
                    e
                );
                let base_fee = gwei_f64(chain.fallback_base_fee_gwei);
                let suggested_tip = gwei_f64(chain.fallback_tip_gwei);
                (
                    FeeData {
                        base_fee,
                        suggested_tip,
                        gas_price: base_fee + suggested_tip,
                    },
                    true,
                )
            }
        };

        let tip = if used_fallback {
            // 폴백은 혼잡도 조정 없이 긴급도만 반영
            mul_f64(fee.suggested_tip, urgency.tip_multiplier())
        } else {
            self.dynamic_tip(chain, &fee, conditions.congestion, urgency)
        };
        let tip = self.clamp_tip(chain, tip);

        let max_fee = mul_f64(fee.base_fee, self.config.gas.max_fee_base_multiplier) + tip;
        let max_fee = max_fee.min(gwei(MAX_GAS_PRICE_GWEI));

        let gas_limit =
            ((chain.base_gas_limit as f64 * urgency.gas_limit_multiplier()) as u64).min(MAX_GAS_LIMIT);

        debug!(
            "⛽ {} 가스 권고 (긴급도 {}): tip {:.3} gwei, max fee {:.3} gwei{}",
            chain_name(chain_id),
            urgency,
            to_gwei(tip),
            to_gwei(max_fee),
            if used_fallback { " [폴백]" } else { "" }
        );

        Ok(GasRecommendation {
            gas_limit,
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: tip,
            base_fee: fee.base_fee,
            congestion: conditions.congestion,
            used_fallback,
        })
    }

    /// 혼잡도/긴급도 반영 팁 — 클램프 전 원시 값
    fn dynamic_tip(
        &self,
        chain: &ChainConfig,
        fee: &FeeData,
        congestion: f64,
        urgency: UrgencyLevel,
    ) -> U256 {
        let pct_of_base = mul_f64(fee.base_fee, self.config.gas.base_fee_tip_pct);
        let mut tip = fee.suggested_tip.max(pct_of_base);

        tip = mul_f64(tip, chain.tip_multiplier);
        tip = mul_f64(tip, 1.0 + congestion);

        if let Some(threshold) = chain.congestion_boost_threshold {
            if congestion > threshold {
                tip = mul_f64(tip, chain.congestion_boost_multiplier);
            }
        }

        mul_f64(tip, urgency.tip_multiplier())
    }

    /// 체인 플로어/실링 -> 절대 상한 순으로 클램프
    fn clamp_tip(&self, chain: &ChainConfig, tip: U256) -> U256 {
        let floor = gwei_f64(chain.tip_floor_gwei);
        let ceiling = gwei_f64(chain.tip_ceiling_gwei);
        let absolute_max = gwei(self.config.gas.absolute_max_tip_gwei);

        tip.max(floor).min(ceiling).min(absolute_max)
    }
}

impl std::fmt::Debug for GasPricer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GasPricer")
            .field("config", &"Arc<Config>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CompetitorFeed;
    use crate::constants::{ARBITRUM, ETHEREUM, POLYGON};
    use crate::mocks::{MockChainClient, MockCompetitorFeed};

    fn make_pricer() -> (Arc<MockChainClient>, GasPricer) {
        let config = Arc::new(Config::default());
        let chain_client = Arc::new(MockChainClient::new());
        let analyzer = Arc::new(MarketAnalyzer::new(
            Arc::clone(&config),
            Arc::clone(&chain_client) as Arc<dyn ChainClient>,
            Arc::new(MockCompetitorFeed::new()) as Arc<dyn CompetitorFeed>,
        ));
        let pricer = GasPricer::new(
            Arc::clone(&config),
            Arc::clone(&chain_client) as Arc<dyn ChainClient>,
            analyzer,
        );
        (chain_client, pricer)
    }

    #[tokio::test]
    async fn test_congestion_and_urgency_multipliers() {
        let (client, pricer) = make_pricer();
        // base fee 20 gwei -> 기본 팁 = max(1, 20 x 10%) = 2 gwei
        client.set_base_fee(ETHEREUM, gwei(20)).await;
        client.set_suggested_tip(ETHEREUM, gwei(1)).await;
        client.set_block_fullness(ETHEREUM, 0.9).await;

        let rec = pricer.recommend(ETHEREUM, UrgencyLevel::High).await.unwrap();

        // 2 gwei x 1.9 (혼잡도 0.9) x 2.0 (high) = 7.6 gwei
        assert_eq!(rec.max_priority_fee_per_gas, U256::from(7_600_000_000u64));
        assert!(!rec.used_fallback);
        assert!((rec.congestion - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_tip_floor_applied_after_multipliers() {
        let (client, pricer) = make_pricer();
        client.set_base_fee(ARBITRUM, gwei_f64(0.01)).await;
        client.set_suggested_tip(ARBITRUM, U256::zero()).await;
        client.set_block_fullness(ARBITRUM, 0.1).await;

        let rec = pricer.recommend(ARBITRUM, UrgencyLevel::Low).await.unwrap();

        // 모든 배수를 곱해도 플로어 0.01 gwei 아래로 내려가지 않는다
        assert_eq!(rec.max_priority_fee_per_gas, gwei_f64(0.01));
    }

    #[tokio::test]
    async fn test_absolute_tip_cap() {
        let (client, pricer) = make_pricer();
        // polygon 실링은 500 gwei지만 절대 상한 100 gwei가 우선한다
        client.set_base_fee(POLYGON, gwei(2_000)).await;
        client.set_suggested_tip(POLYGON, gwei(1_500)).await;
        client.set_block_fullness(POLYGON, 0.95).await;

        let rec = pricer.recommend(POLYGON, UrgencyLevel::High).await.unwrap();

        assert_eq!(rec.max_priority_fee_per_gas, gwei(100));
    }

    #[tokio::test]
    async fn test_fallback_on_fee_data_failure() {
        let (client, pricer) = make_pricer();
        client.set_fail_fee_data(true).await;

        let rec = pricer
            .recommend(ETHEREUM, UrgencyLevel::Medium)
            .await
            .unwrap();

        assert!(rec.used_fallback);
        assert_eq!(rec.base_fee, gwei_f64(25.0));
        assert_eq!(rec.max_priority_fee_per_gas, gwei_f64(2.0));
    }

    #[tokio::test]
    async fn test_gas_limit_scales_with_urgency() {
        let (_, pricer) = make_pricer();

        let low = pricer.recommend(ETHEREUM, UrgencyLevel::Low).await.unwrap();
        let high = pricer.recommend(ETHEREUM, UrgencyLevel::High).await.unwrap();

        assert_eq!(low.gas_limit, 500_000);
        assert_eq!(high.gas_limit, 650_000);
    }

    #[tokio::test]
    async fn test_unknown_chain_rejected() {
        let (_, pricer) = make_pricer();
        assert!(pricer.recommend(999_999, UrgencyLevel::Low).await.is_err());
    }
}
