use ethers::types::U256;

// Chain ids
pub const ETHEREUM: u64 = 1;
pub const OPTIMISM: u64 = 10;
pub const BSC: u64 = 56;
pub const POLYGON: u64 = 137;
pub const ARBITRUM: u64 = 42161;

// Gas limits
pub const MAX_GAS_LIMIT: u64 = 30_000_000;

// Gas price limits (in gwei)
pub const MAX_GAS_PRICE_GWEI: u64 = 500;

/// gwei -> wei
pub fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000_000u64)
}

/// 소수 gwei -> wei (체인별 팁 플로어가 1 gwei 미만인 경우용)
pub fn gwei_f64(amount: f64) -> U256 {
    U256::from((amount * 1e9) as u128)
}

/// wei -> gwei (f64, 로깅용)
pub fn to_gwei(wei: U256) -> f64 {
    wei.as_u128() as f64 / 1e9
}

/// U256에 f64 배수 적용 (백분율 정수 연산으로 정밀도 손실 최소화)
pub fn mul_f64(value: U256, factor: f64) -> U256 {
    let scaled = (factor * 10_000.0).round().max(0.0) as u128;
    value * U256::from(scaled) / U256::from(10_000u64)
}

/// 체인 이름 조회 (로깅용)
pub fn chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        ETHEREUM => "ethereum",
        OPTIMISM => "optimism",
        BSC => "bsc",
        POLYGON => "polygon",
        ARBITRUM => "arbitrum",
        _ => "unknown",
    }
}
