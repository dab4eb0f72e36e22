use anyhow::Result;
use async_trait::async_trait;

use crate::types::{BlockInfo, ChainId, FeeData};

/// 체인 클라이언트 계약.
///
/// 수수료 데이터와 최신 블록 정보를 체인별로 제공한다. 모든 호출은
/// 공유 상태를 잡지 않은 채 완료되어야 하며, 실패는 호출자가 폴백
/// 값으로 복구한다 (하드 실패로 전파하지 않음).
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// 현재 수수료 데이터 (base fee, 네트워크 제안 팁)
    async fn fee_data(&self, chain_id: ChainId) -> Result<FeeData>;

    /// 최신 블록 (가스 사용량/한도 포함)
    async fn latest_block(&self, chain_id: ChainId) -> Result<BlockInfo>;

    /// 계정 잔고 (토큰 단위)
    async fn account_balance(&self, chain_id: ChainId) -> Result<u128>;
}
