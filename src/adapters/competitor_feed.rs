use anyhow::Result;
use async_trait::async_trait;

use crate::types::ChainId;

/// 경쟁자 신호 피드.
///
/// 실제 멤풀 관측이 아닌 근사치일 수 있으므로 교체 가능한
/// 인터페이스로 둔다. mock 구현이 로컬 근사를 제공한다.
#[async_trait]
pub trait CompetitorFeed: Send + Sync {
    /// 체인별 경쟁 서브미터 밀도 추정치
    async fn competitor_density(&self, chain_id: ChainId) -> Result<f64>;

    /// 같은 블록을 노리는 유사 번들 수 추정치
    async fn similar_bundle_count(&self, chain_id: ChainId, target_block: u64) -> Result<u32>;
}
