pub mod chain_mock;
pub mod relay_mock;

pub use chain_mock::MockChainClient;
pub use relay_mock::{MockBundleRelay, MockCompetitorFeed};

use std::env;

/// Check if mock mode is enabled
pub fn is_mock_mode() -> bool {
    env::var("API_MODE").unwrap_or_default() == "mock"
}

/// Get mock configuration values
pub fn get_mock_config() -> MockConfig {
    MockConfig {
        base_fee_gwei: env::var("MOCK_BASE_FEE_GWEI")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .unwrap_or(20.0),
        suggested_tip_gwei: env::var("MOCK_SUGGESTED_TIP_GWEI")
            .unwrap_or_else(|_| "1.5".to_string())
            .parse()
            .unwrap_or(1.5),
        block_fullness: env::var("MOCK_BLOCK_FULLNESS")
            .unwrap_or_else(|_| "0.5".to_string())
            .parse()
            .unwrap_or(0.5),
        account_balance: env::var("MOCK_ACCOUNT_BALANCE")
            .unwrap_or_else(|_| "100000".to_string())
            .parse()
            .unwrap_or(100_000),
        simulation_success_rate: env::var("MOCK_SIMULATION_SUCCESS_RATE")
            .unwrap_or_else(|_| "0.95".to_string())
            .parse()
            .unwrap_or(0.95),
        competitor_density: env::var("MOCK_COMPETITOR_DENSITY")
            .unwrap_or_else(|_| "3.0".to_string())
            .parse()
            .unwrap_or(3.0),
        similar_bundle_count: env::var("MOCK_SIMILAR_BUNDLE_COUNT")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .unwrap_or(2),
    }
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub base_fee_gwei: f64,
    pub suggested_tip_gwei: f64,
    pub block_fullness: f64,
    pub account_balance: u128,
    pub simulation_success_rate: f64,
    pub competitor_density: f64,
    pub similar_bundle_count: u32,
}
