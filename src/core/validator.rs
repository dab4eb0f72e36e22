use std::sync::Arc;

use ethers::types::U256;
use tracing::warn;

use crate::config::Config;
use crate::constants::gwei;
use crate::types::OptimizedParameters;

/// 파라미터 검증기.
///
/// 어떤 최적화 결과도 이 검증을 거치지 않고 공개될 수 없다.
/// 범위를 벗어난 값은 거부가 아니라 경계로 클램프하고 경고를
/// 남긴다. 이미 범위 안에 있는 입력은 그대로 통과한다
/// (멱등성).
pub struct ParameterValidator {
    config: Arc<Config>,
}

impl ParameterValidator {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// 경계 클램프. 변경된 필드마다 경고 문자열을 반환한다.
    pub fn validate(&self, mut params: OptimizedParameters) -> (OptimizedParameters, Vec<String>) {
        let bounds = &self.config.validation;
        let mut warnings = Vec::new();

        if params.profit_threshold < bounds.min_profit_threshold {
            warnings.push(format!(
                "profit_threshold {} -> 하한 {}",
                params.profit_threshold, bounds.min_profit_threshold
            ));
            params.profit_threshold = bounds.min_profit_threshold;
        } else if params.profit_threshold > bounds.max_profit_threshold {
            warnings.push(format!(
                "profit_threshold {} -> 상한 {}",
                params.profit_threshold, bounds.max_profit_threshold
            ));
            params.profit_threshold = bounds.max_profit_threshold;
        }

        if params.slippage_bps < bounds.min_slippage_bps {
            warnings.push(format!(
                "slippage_bps {} -> 하한 {}",
                params.slippage_bps, bounds.min_slippage_bps
            ));
            params.slippage_bps = bounds.min_slippage_bps;
        } else if params.slippage_bps > bounds.max_slippage_bps {
            warnings.push(format!(
                "slippage_bps {} -> 상한 {}",
                params.slippage_bps, bounds.max_slippage_bps
            ));
            params.slippage_bps = bounds.max_slippage_bps;
        }

        if params.max_trade_size < bounds.min_trade_size {
            warnings.push(format!(
                "max_trade_size {} -> 하한 {}",
                params.max_trade_size, bounds.min_trade_size
            ));
            params.max_trade_size = bounds.min_trade_size;
        } else if params.max_trade_size > bounds.max_trade_size {
            warnings.push(format!(
                "max_trade_size {} -> 상한 {}",
                params.max_trade_size, bounds.max_trade_size
            ));
            params.max_trade_size = bounds.max_trade_size;
        }

        let fee_cap = gwei(bounds.max_fee_cap_gwei);
        if params.max_fee_per_gas > fee_cap {
            warnings.push(format!(
                "max_fee_per_gas {} -> 상한 {} gwei",
                params.max_fee_per_gas, bounds.max_fee_cap_gwei
            ));
            params.max_fee_per_gas = fee_cap;
        }
        if params.max_fee_per_gas.is_zero() {
            warnings.push("max_fee_per_gas 0 -> 1 gwei".to_string());
            params.max_fee_per_gas = gwei(1);
        }

        let tip_cap = gwei(bounds.max_tip_cap_gwei);
        if params.max_priority_fee_per_gas > tip_cap {
            warnings.push(format!(
                "max_priority_fee_per_gas {} -> 상한 {} gwei",
                params.max_priority_fee_per_gas, bounds.max_tip_cap_gwei
            ));
            params.max_priority_fee_per_gas = tip_cap;
        }
        // 팁은 max fee를 넘을 수 없다
        if params.max_priority_fee_per_gas > params.max_fee_per_gas {
            warnings.push("max_priority_fee_per_gas > max_fee_per_gas -> max fee로 제한".to_string());
            params.max_priority_fee_per_gas = params.max_fee_per_gas;
        }

        if params.cooldown_secs < bounds.min_cooldown_secs {
            warnings.push(format!(
                "cooldown_secs {} -> 하한 {}",
                params.cooldown_secs, bounds.min_cooldown_secs
            ));
            params.cooldown_secs = bounds.min_cooldown_secs;
        } else if params.cooldown_secs > bounds.max_cooldown_secs {
            warnings.push(format!(
                "cooldown_secs {} -> 상한 {}",
                params.cooldown_secs, bounds.max_cooldown_secs
            ));
            params.cooldown_secs = bounds.max_cooldown_secs;
        }

        if !warnings.is_empty() {
            warn!("⚠️ 파라미터 검증에서 {}건 클램프: {:?}", warnings.len(), warnings);
        }

        (params, warnings)
    }
}

impl std::fmt::Debug for ParameterValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterValidator").finish()
    }
}
