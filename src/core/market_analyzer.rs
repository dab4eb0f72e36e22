use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::adapters::{ChainClient, CompetitorFeed};
use crate::common::math::{mean, simple_returns, std_deviation};
use crate::config::Config;
use crate::constants::chain_name;
use crate::types::{ChainId, MarketConditions, MarketRegime, TimeOfDayBucket, TrendDirection};

/// 체인별 롤링 샘플 버퍼 (바운드 고정)
#[derive(Debug, Default)]
struct ChainBuffers {
    prices: VecDeque<Decimal>,
    block_fullness: VecDeque<f64>,
    /// (거래 규모, 가격 영향) 관측치 — 유동성 추정의 원천
    impact_observations: VecDeque<(f64, f64)>,
}

/// 시장 분석기.
///
/// 체인별로 독립적인 롤링 버퍼를 유지하며 변동성/유동성/혼잡도를
/// 추정하고 시장 체제를 분류한다. 신호 수급에 실패하면 실패를
/// 전파하는 대신 설정된 보수적 기본값으로 대체하고, 신선도는
/// 타임스탬프로 추적해 하류에서 할인할 수 있게 한다.
pub struct MarketAnalyzer {
    config: Arc<Config>,
    chain_client: Arc<dyn ChainClient>,
    competitor_feed: Arc<dyn CompetitorFeed>,
    buffers: DashMap<ChainId, ChainBuffers>,
    /// 짧은 TTL 캐시 — 갱신 시 병합 없이 통째로 대체
    cache: DashMap<ChainId, MarketConditions>,
    last_regime: DashMap<ChainId, MarketRegime>,
}

impl MarketAnalyzer {
    pub fn new(
        config: Arc<Config>,
        chain_client: Arc<dyn ChainClient>,
        competitor_feed: Arc<dyn CompetitorFeed>,
    ) -> Self {
        Self {
            config,
            chain_client,
            competitor_feed,
            buffers: DashMap::new(),
            cache: DashMap::new(),
            last_regime: DashMap::new(),
        }
    }

    /// 가격 샘플 주입 (가격 스캐너 등 외부 소스에서 호출)
    pub fn record_price_sample(&self, chain_id: ChainId, price: Decimal) {
        let mut entry = self.buffers.entry(chain_id).or_default();
        entry.prices.push_back(price);
        while entry.prices.len() > self.config.market.buffer_size {
            entry.prices.pop_front();
        }
    }

    /// 거래 규모 대비 가격 영향 관측치 주입
    pub fn record_impact_observation(&self, chain_id: ChainId, trade_size: f64, price_impact: f64) {
        if price_impact <= 0.0 || trade_size <= 0.0 {
            return;
        }
        let mut entry = self.buffers.entry(chain_id).or_default();
        entry.impact_observations.push_back((trade_size, price_impact));
        while entry.impact_observations.len() > self.config.market.buffer_size {
            entry.impact_observations.pop_front();
        }
    }

    /// 체인 시장 상황 분석. 캐시가 신선하면 그대로 반환한다.
    pub async fn analyze(&self, chain_id: ChainId) -> MarketConditions {
        let now = Utc::now();

        if let Some(cached) = self.cache.get(&chain_id) {
            if cached.age_seconds(now) < self.config.market.cache_ttl_secs {
                return cached.clone();
            }
        }

        // 최신 블록 샘플 수집 — 실패는 폴백으로 복구
        match self.chain_client.latest_block(chain_id).await {
            Ok(block) => {
                let mut entry = self.buffers.entry(chain_id).or_default();
                entry.block_fullness.push_back(block.fullness());
                while entry.block_fullness.len() > self.config.market.buffer_size {
                    entry.block_fullness.pop_front();
                }
            }
            Err(e) => {
                warn!(
                    "⚠️ {} 블록 데이터 수급 실패, 폴백 혼잡도 사용: {}",
                    chain_name(chain_id),
                    e
                );
            }
        }

        let volatility = self.estimate_volatility(chain_id);
        let liquidity = self.estimate_liquidity(chain_id);
        let congestion = self.estimate_congestion(chain_id);

        let competitor_density = match self.competitor_feed.competitor_density(chain_id).await {
            Ok(density) => density,
            Err(e) => {
                warn!("⚠️ 경쟁자 밀도 수급 실패, 폴백 사용: {}", e);
                self.config.market.fallback.competitor_density
            }
        };

        let conditions = MarketConditions {
            chain_id,
            volatility,
            liquidity,
            congestion,
            competitor_density,
            time_bucket: TimeOfDayBucket::from_utc(now),
            trend: self.detect_trend(chain_id),
            fetched_at: now,
        };

        self.track_regime_transition(&conditions);

        debug!(
            "📈 {} 시장 분석: vol={:.4} liq={:.0} cong={:.2} comp={:.1}",
            chain_name(chain_id),
            conditions.volatility,
            conditions.liquidity,
            conditions.congestion,
            conditions.competitor_density
        );

        // 캐시는 병합 없이 통째로 대체
        self.cache.insert(chain_id, conditions.clone());
        conditions
    }

    /// 변동성/혼잡도 조합을 고정 임계값으로 버킷화
    pub fn classify_regime(&self, conditions: &MarketConditions) -> MarketRegime {
        let market = &self.config.market;
        if conditions.congestion >= market.congested_threshold {
            MarketRegime::Congested
        } else if conditions.volatility >= market.volatile_threshold {
            MarketRegime::Volatile
        } else if conditions.volatility < market.calm_threshold && conditions.congestion < 0.3 {
            MarketRegime::Calm
        } else {
            MarketRegime::Normal
        }
    }

    fn track_regime_transition(&self, conditions: &MarketConditions) {
        let regime = self.classify_regime(conditions);
        let previous = self.last_regime.insert(conditions.chain_id, regime);

        match previous {
            Some(prev) if prev != regime => {
                // 체제 변화는 조용히 덮어쓰지 않고 전이로 기록한다
                info!(
                    "🔄 {} 시장 체제 전이: {} -> {}",
                    chain_name(conditions.chain_id),
                    prev,
                    regime
                );
            }
            None => {
                info!(
                    "🏁 {} 초기 시장 체제: {}",
                    chain_name(conditions.chain_id),
                    regime
                );
            }
            _ => {}
        }
    }

    /// 단순 수익률 표준편차를 1시간 호라이즌으로 정규화
    fn estimate_volatility(&self, chain_id: ChainId) -> f64 {
        let Some(buffers) = self.buffers.get(&chain_id) else {
            return self.config.market.fallback.volatility;
        };

        let prices: Vec<f64> = buffers
            .prices
            .iter()
            .filter_map(|p| p.to_f64())
            .collect();
        let returns = simple_returns(&prices);
        if returns.len() < 2 {
            return self.config.market.fallback.volatility;
        }

        let per_sample = std_deviation(&returns);
        let block_time = self
            .config
            .chain(chain_id)
            .map(|c| c.block_time_secs.max(1))
            .unwrap_or(12) as f64;
        let samples_per_horizon =
            self.config.market.volatility_horizon_secs as f64 / block_time;

        per_sample * samples_per_horizon.sqrt()
    }

    /// 관측된 거래규모/가격영향 비율로 유동성 깊이 추정
    fn estimate_liquidity(&self, chain_id: ChainId) -> f64 {
        let Some(buffers) = self.buffers.get(&chain_id) else {
            return self.config.market.fallback.liquidity;
        };

        let ratios: Vec<f64> = buffers
            .impact_observations
            .iter()
            .map(|(size, impact)| size / impact)
            .collect();
        if ratios.is_empty() {
            return self.config.market.fallback.liquidity;
        }
        mean(&ratios)
    }

    /// 최근 블록의 gas_used/gas_limit 비율 평균
    fn estimate_congestion(&self, chain_id: ChainId) -> f64 {
        let Some(buffers) = self.buffers.get(&chain_id) else {
            return self.config.market.fallback.congestion;
        };

        if buffers.block_fullness.is_empty() {
            return self.config.market.fallback.congestion;
        }
        let samples: Vec<f64> = buffers.block_fullness.iter().copied().collect();
        mean(&samples).clamp(0.0, 1.0)
    }

    fn detect_trend(&self, chain_id: ChainId) -> TrendDirection {
        let Some(buffers) = self.buffers.get(&chain_id) else {
            return TrendDirection::Sideways;
        };

        let (Some(first), Some(last)) = (
            buffers.prices.front().and_then(|p| p.to_f64()),
            buffers.prices.back().and_then(|p| p.to_f64()),
        ) else {
            return TrendDirection::Sideways;
        };

        if first == 0.0 {
            return TrendDirection::Sideways;
        }
        let period_return = (last - first) / first;
        if period_return > self.config.market.trend_threshold {
            TrendDirection::Up
        } else if period_return < -self.config.market.trend_threshold {
            TrendDirection::Down
        } else {
            TrendDirection::Sideways
        }
    }
}

impl std::fmt::Debug for MarketAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketAnalyzer")
            .field("config", &"Arc<Config>")
            .field("chains_tracked", &self.buffers.len())
            .finish()
    }
}
