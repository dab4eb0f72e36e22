use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::U256;
use tokio::sync::RwLock;

use crate::adapters::ChainClient;
use crate::constants::gwei_f64;
use crate::errors::OptimizerError;
use crate::types::{BlockInfo, ChainId, FeeData};

use super::get_mock_config;

/// 테스트/모의 모드용 체인 클라이언트.
///
/// 환경변수 기본값으로 시작하고, 테스트가 체인별 상태를 직접
/// 주입할 수 있도록 setter를 제공한다. `fail_fee_data`를 켜면
/// 수수료 수급 실패 경로(폴백 테이블)를 강제할 수 있다.
pub struct MockChainClient {
    base_fee: Arc<RwLock<HashMap<ChainId, U256>>>,
    suggested_tip: Arc<RwLock<HashMap<ChainId, U256>>>,
    block_fullness: Arc<RwLock<HashMap<ChainId, f64>>>,
    balance: Arc<RwLock<u128>>,
    block_number: Arc<RwLock<u64>>,
    fail_fee_data: Arc<RwLock<bool>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        let mock = get_mock_config();
        Self {
            base_fee: Arc::new(RwLock::new(HashMap::new())),
            suggested_tip: Arc::new(RwLock::new(HashMap::new())),
            block_fullness: Arc::new(RwLock::new(HashMap::new())),
            balance: Arc::new(RwLock::new(mock.account_balance)),
            block_number: Arc::new(RwLock::new(19_000_000)),
            fail_fee_data: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn set_base_fee(&self, chain_id: ChainId, base_fee: U256) {
        self.base_fee.write().await.insert(chain_id, base_fee);
    }

    pub async fn set_suggested_tip(&self, chain_id: ChainId, tip: U256) {
        self.suggested_tip.write().await.insert(chain_id, tip);
    }

    pub async fn set_block_fullness(&self, chain_id: ChainId, fullness: f64) {
        self.block_fullness.write().await.insert(chain_id, fullness);
    }

    pub async fn set_balance(&self, balance: u128) {
        *self.balance.write().await = balance;
    }

    pub async fn set_fail_fee_data(&self, fail: bool) {
        *self.fail_fee_data.write().await = fail;
    }

    pub async fn advance_block(&self) -> u64 {
        let mut number = self.block_number.write().await;
        *number += 1;
        *number
    }
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn fee_data(&self, chain_id: ChainId) -> Result<FeeData> {
        if *self.fail_fee_data.read().await {
            return Err(OptimizerError::DataUnavailable(format!(
                "mock fee data unavailable for chain {}",
                chain_id
            ))
            .into());
        }

        let mock = get_mock_config();
        let base_fee = self
            .base_fee
            .read()
            .await
            .get(&chain_id)
            .copied()
            .unwrap_or_else(|| gwei_f64(mock.base_fee_gwei));
        let suggested_tip = self
            .suggested_tip
            .read()
            .await
            .get(&chain_id)
            .copied()
            .unwrap_or_else(|| gwei_f64(mock.suggested_tip_gwei));

        Ok(FeeData {
            base_fee,
            suggested_tip,
            gas_price: base_fee + suggested_tip,
        })
    }

    async fn latest_block(&self, chain_id: ChainId) -> Result<BlockInfo> {
        let mock = get_mock_config();
        let fullness = self
            .block_fullness
            .read()
            .await
            .get(&chain_id)
            .copied()
            .unwrap_or(mock.block_fullness);
        let gas_limit = 30_000_000u64;

        Ok(BlockInfo {
            number: *self.block_number.read().await,
            gas_used: (gas_limit as f64 * fullness) as u64,
            gas_limit,
            base_fee: gwei_f64(mock.base_fee_gwei),
            timestamp: Utc::now(),
        })
    }

    async fn account_balance(&self, _chain_id: ChainId) -> Result<u128> {
        Ok(*self.balance.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ETHEREUM;

    #[tokio::test]
    async fn test_fee_data_override() {
        let client = MockChainClient::new();
        client.set_base_fee(ETHEREUM, gwei_f64(40.0)).await;

        let fee = client.fee_data(ETHEREUM).await.unwrap();
        assert_eq!(fee.base_fee, gwei_f64(40.0));
    }

    #[tokio::test]
    async fn test_fee_data_failure_mode() {
        let client = MockChainClient::new();
        client.set_fail_fee_data(true).await;
        assert!(client.fee_data(ETHEREUM).await.is_err());
    }

    #[tokio::test]
    async fn test_block_fullness() {
        let client = MockChainClient::new();
        client.set_block_fullness(ETHEREUM, 0.9).await;

        let block = client.latest_block(ETHEREUM).await.unwrap();
        assert!((block.fullness() - 0.9).abs() < 1e-6);
    }
}
