use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ethers::types::U256;
use rand::Rng;
use tokio::sync::RwLock;

use crate::adapters::{BundleRelay, CompetitorFeed};
use crate::errors::OptimizerError;
use crate::types::{ChainId, SimulationOutcome, TransactionIntent};

use super::get_mock_config;

/// 테스트/모의 모드용 번들 릴레이.
///
/// 기본 동작은 환경변수의 성공률을 따르고, 테스트는
/// `set_forced_outcome`으로 결정적 결과를 주입한다.
/// `fail_submission`을 켜면 릴레이 제출 실패 경로를 강제할 수 있다.
pub struct MockBundleRelay {
    forced_outcome: Arc<RwLock<Option<SimulationOutcome>>>,
    submitted: Arc<RwLock<Vec<(u64, usize)>>>,
    fail_submission: Arc<RwLock<bool>>,
}

impl MockBundleRelay {
    pub fn new() -> Self {
        Self {
            forced_outcome: Arc::new(RwLock::new(None)),
            submitted: Arc::new(RwLock::new(Vec::new())),
            fail_submission: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn set_forced_outcome(&self, outcome: SimulationOutcome) {
        *self.forced_outcome.write().await = Some(outcome);
    }

    pub async fn set_fail_submission(&self, fail: bool) {
        *self.fail_submission.write().await = fail;
    }

    /// (target_block, 트랜잭션 수) 제출 이력
    pub async fn submissions(&self) -> Vec<(u64, usize)> {
        self.submitted.read().await.clone()
    }
}

impl Default for MockBundleRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BundleRelay for MockBundleRelay {
    async fn simulate(
        &self,
        transactions: &[TransactionIntent],
        _target_block: u64,
    ) -> Result<SimulationOutcome> {
        if let Some(outcome) = self.forced_outcome.read().await.clone() {
            return Ok(outcome);
        }

        let mock = get_mock_config();
        let success = rand::thread_rng().gen_bool(mock.simulation_success_rate.clamp(0.0, 1.0));
        let gas_used: u64 = transactions.iter().map(|tx| tx.gas_limit * 8 / 10).sum();

        Ok(SimulationOutcome {
            success,
            gas_used,
            realized_profit: if success {
                U256::from(50_000_000_000_000_000u128)
            } else {
                U256::zero()
            },
            revert_reason: if success {
                None
            } else {
                Some("mock revert".to_string())
            },
            competitor_density: mock.competitor_density,
            similar_bundle_count: mock.similar_bundle_count,
            contention: false,
        })
    }

    async fn submit(&self, transactions: &[TransactionIntent], target_block: u64) -> Result<bool> {
        if *self.fail_submission.read().await {
            return Err(OptimizerError::BundleFailure(format!(
                "mock relay rejected submission for block {}",
                target_block
            ))
            .into());
        }
        self.submitted
            .write()
            .await
            .push((target_block, transactions.len()));
        Ok(true)
    }
}

/// 로컬 근사 기반 경쟁자 피드 (실제 멤풀 관측 대체).
pub struct MockCompetitorFeed {
    density: Arc<RwLock<f64>>,
    similar_bundles: Arc<RwLock<u32>>,
}

impl MockCompetitorFeed {
    pub fn new() -> Self {
        let mock = get_mock_config();
        Self {
            density: Arc::new(RwLock::new(mock.competitor_density)),
            similar_bundles: Arc::new(RwLock::new(mock.similar_bundle_count)),
        }
    }

    pub async fn set_density(&self, density: f64) {
        *self.density.write().await = density;
    }

    pub async fn set_similar_bundle_count(&self, count: u32) {
        *self.similar_bundles.write().await = count;
    }
}

impl Default for MockCompetitorFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompetitorFeed for MockCompetitorFeed {
    async fn competitor_density(&self, _chain_id: ChainId) -> Result<f64> {
        Ok(*self.density.read().await)
    }

    async fn similar_bundle_count(&self, _chain_id: ChainId, _target_block: u64) -> Result<u32> {
        Ok(*self.similar_bundles.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_forced_outcome() {
        let relay = MockBundleRelay::new();
        relay
            .set_forced_outcome(SimulationOutcome {
                success: false,
                gas_used: 21_000,
                realized_profit: U256::zero(),
                revert_reason: Some("forced".to_string()),
                competitor_density: 8.0,
                similar_bundle_count: 7,
                contention: false,
            })
            .await;

        let outcome = relay.simulate(&[], 100).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.similar_bundle_count, 7);
    }

    #[tokio::test]
    async fn test_submission_history() {
        let relay = MockBundleRelay::new();
        relay.submit(&[], 42).await.unwrap();
        let subs = relay.submissions().await;
        assert_eq!(subs, vec![(42, 0)]);
    }

    #[tokio::test]
    async fn test_submission_failure_mode() {
        let relay = MockBundleRelay::new();
        relay.set_fail_submission(true).await;

        let err = relay.submit(&[], 42).await.unwrap_err();
        assert!(err.to_string().contains("bundle failure"));
        // 실패한 제출은 이력에 남지 않는다
        assert!(relay.submissions().await.is_empty());
    }
}
