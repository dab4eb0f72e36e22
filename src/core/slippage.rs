use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::common::math::clamp_f64;
use crate::config::Config;
use crate::core::market_analyzer::MarketAnalyzer;
use crate::types::{ChainId, SlippageProfiles, SlippageRecommendation, UrgencyLevel};

/// TTL이 있는 토큰별 수치 캐시.
///
/// 체인+토큰 키의 전역 가변 캐시 대신 계산기가 소유하는 명시적
/// 캐시로 모델링한다. 만료된 항목은 조회 시점에 무시된다.
struct TokenCache {
    entries: DashMap<String, (f64, DateTime<Utc>)>,
    ttl: Duration,
}

impl TokenCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    fn insert(&self, token: &str, value: f64) {
        self.entries.insert(token.to_string(), (value, Utc::now()));
    }

    fn get(&self, token: &str, now: DateTime<Utc>) -> Option<f64> {
        let entry = self.entries.get(token)?;
        let (value, stored_at) = *entry;
        if now - stored_at > self.ttl {
            return None;
        }
        Some(value)
    }
}

/// 동적 슬리피지 계산기.
///
/// 기본 허용치에 세 가지 독립적·가산적 조정(변동성, 유동성 영향,
/// 혼잡도)을 더한 뒤 [min, max]로 클램프한다. 각 조정과 클램프는
/// reasoning 트레일에 기록된다.
pub struct SlippageCalculator {
    config: Arc<Config>,
    analyzer: Arc<MarketAnalyzer>,
    token_volatility: TokenCache,
    token_depth: TokenCache,
}

impl SlippageCalculator {
    pub fn new(config: Arc<Config>, analyzer: Arc<MarketAnalyzer>) -> Self {
        let ttl = Duration::seconds(config.slippage.confidence_horizon_secs as i64);
        Self {
            config,
            analyzer,
            token_volatility: TokenCache::new(ttl),
            token_depth: TokenCache::new(ttl),
        }
    }

    /// 토큰별 변동성 관측치 주입 (없으면 체인 변동성으로 대체)
    pub fn record_token_volatility(&self, token: &str, volatility: f64) {
        self.token_volatility.insert(token, volatility);
    }

    /// 토큰별 유동성 깊이 관측치 주입 (없으면 체인 추정치로 대체)
    pub fn record_token_depth(&self, token: &str, depth: f64) {
        self.token_depth.insert(token, depth);
    }

    /// 토큰 페어와 거래 규모에 대한 최적 슬리피지 허용치 계산
    pub async fn optimal_slippage(
        &self,
        token_a: &str,
        token_b: &str,
        trade_size: f64,
        chain_id: ChainId,
    ) -> SlippageRecommendation {
        let conditions = self.analyzer.analyze(chain_id).await;
        let now = Utc::now();
        let slippage = &self.config.slippage;
        let mut reasoning = Vec::new();

        let mut tolerance = slippage.base_bps as f64;
        reasoning.push(format!("기본 허용치 {} bps", slippage.base_bps));

        // 1. 변동성 조정: 양 토큰 변동성 평균 x 배수
        let vol_a = self
            .token_volatility
            .get(token_a, now)
            .unwrap_or(conditions.volatility);
        let vol_b = self
            .token_volatility
            .get(token_b, now)
            .unwrap_or(conditions.volatility);
        let avg_volatility = (vol_a + vol_b) / 2.0;
        let volatility_adj = avg_volatility * slippage.volatility_multiplier_bps;
        if volatility_adj > 0.0 {
            tolerance += volatility_adj;
            reasoning.push(format!(
                "변동성 조정 +{:.1} bps (평균 변동성 {:.4})",
                volatility_adj, avg_volatility
            ));
        }

        // 2. 유동성 조정: 거래 규모가 얕은 쪽 깊이의 임계 비율을 넘을 때만
        let depth_a = self
            .token_depth
            .get(token_a, now)
            .unwrap_or(conditions.liquidity);
        let depth_b = self
            .token_depth
            .get(token_b, now)
            .unwrap_or(conditions.liquidity);
        let min_depth = depth_a.min(depth_b);
        if min_depth > 0.0 {
            let impact_ratio = trade_size / min_depth;
            if impact_ratio > slippage.liquidity_impact_threshold {
                let liquidity_adj = (impact_ratio * slippage.liquidity_multiplier_bps)
                    .min(slippage.liquidity_adjustment_cap_bps);
                tolerance += liquidity_adj;
                reasoning.push(format!(
                    "유동성 조정 +{:.1} bps (영향 비율 {:.3}, 상한 {} bps)",
                    liquidity_adj, impact_ratio, slippage.liquidity_adjustment_cap_bps
                ));
            }
        }

        // 3. 혼잡도 조정: 임계값 초과분에 비례
        if conditions.congestion > slippage.congestion_threshold {
            let excess = conditions.congestion - slippage.congestion_threshold;
            let congestion_adj = excess * slippage.congestion_multiplier_bps;
            tolerance += congestion_adj;
            reasoning.push(format!(
                "혼잡도 조정 +{:.1} bps (혼잡도 {:.2} > {:.2})",
                congestion_adj, conditions.congestion, slippage.congestion_threshold
            ));
        }

        let clamped = clamp_f64(tolerance, slippage.min_bps as f64, slippage.max_bps as f64);
        if (clamped - tolerance).abs() > f64::EPSILON {
            reasoning.push(format!(
                "클램프 적용: {:.1} -> {:.1} bps [{}, {}]",
                tolerance, clamped, slippage.min_bps, slippage.max_bps
            ));
        }

        let confidence = self.confidence_from_age(conditions.age_seconds(now));

        debug!(
            "🎯 슬리피지 계산 {}/{}: {:.1} bps (신뢰도 {:.2})",
            token_a, token_b, clamped, confidence
        );

        SlippageRecommendation {
            tolerance_bps: clamped.round() as u32,
            confidence,
            reasoning,
        }
    }

    /// 위험 성향별 변형: 보수 -50% / 균형 그대로 / 공격 +30%
    pub async fn slippage_profiles(
        &self,
        token_a: &str,
        token_b: &str,
        trade_size: f64,
        chain_id: ChainId,
    ) -> SlippageProfiles {
        let base = self
            .optimal_slippage(token_a, token_b, trade_size, chain_id)
            .await;
        let slippage = &self.config.slippage;

        let variant = |factor: f64| -> u32 {
            clamp_f64(
                base.tolerance_bps as f64 * factor,
                slippage.min_bps as f64,
                slippage.max_bps as f64,
            )
            .round() as u32
        };

        SlippageProfiles {
            conservative_bps: variant(0.5),
            balanced_bps: base.tolerance_bps,
            aggressive_bps: variant(1.3),
        }
    }

    /// 긴급도 태그로 프로필 선택
    pub fn profile_for_urgency(profiles: &SlippageProfiles, urgency: UrgencyLevel) -> u32 {
        match urgency {
            UrgencyLevel::Low => profiles.conservative_bps,
            UrgencyLevel::Medium => profiles.balanced_bps,
            UrgencyLevel::High => profiles.aggressive_bps,
        }
    }

    /// 시장 데이터 나이에 따라 선형 감소, 하한은 min_confidence
    fn confidence_from_age(&self, age_secs: u64) -> f64 {
        let horizon = self.config.slippage.confidence_horizon_secs as f64;
        let decayed = 1.0 - age_secs as f64 / horizon;
        decayed.max(self.config.slippage.min_confidence)
    }
}

impl std::fmt::Debug for SlippageCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlippageCalculator")
            .field("config", &"Arc<Config>")
            .finish()
    }
}
