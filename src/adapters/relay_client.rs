use anyhow::Result;
use async_trait::async_trait;

use crate::types::{SimulationOutcome, TransactionIntent};

/// 번들 릴레이 계약 (시뮬레이션 + 제출).
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// 대상 블록 기준으로 번들을 시뮬레이션
    async fn simulate(
        &self,
        transactions: &[TransactionIntent],
        target_block: u64,
    ) -> Result<SimulationOutcome>;

    /// 번들 제출. true = 릴레이가 수락함 (포함 보장 아님)
    async fn submit(&self, transactions: &[TransactionIntent], target_block: u64) -> Result<bool>;
}
