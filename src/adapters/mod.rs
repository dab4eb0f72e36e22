//! 외부 협력자 인터페이스
//!
//! 엔진이 소비하는 외부 신호(체인 수수료 데이터, 번들 릴레이,
//! 경쟁자 피드)의 계약만 정의합니다. 실제 RPC/릴레이 연결은
//! 실행 레이어 소관이며, 테스트와 mock 모드에서는 `crate::mocks`의
//! 구현이 주입됩니다.

pub mod chain_client;
pub mod competitor_feed;
pub mod relay_client;

pub use chain_client::ChainClient;
pub use competitor_feed::CompetitorFeed;
pub use relay_client::BundleRelay;
