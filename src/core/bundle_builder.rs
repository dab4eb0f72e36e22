use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ethers::types::U256;
use tracing::{debug, info, warn};

use crate::adapters::{BundleRelay, CompetitorFeed};
use crate::config::Config;
use crate::constants::{chain_name, gwei, mul_f64, to_gwei};
use crate::core::gas_pricer::GasPricer;
use crate::types::{
    Bundle, BundleCandidate, BundleFailureReason, BundleMetrics, ChainId, FallbackAction,
    FallbackPlan, SimulationOutcome, TransactionIntent, UrgencyLevel,
};

/// 번들 구성기.
///
/// 후보를 복합 점수로 랭킹하고, 토큰 충돌이 없는 상위 후보를
/// 탐욕적으로 골라 최대 3개 레그의 원자적 번들을 만든다.
/// 유효 가스 단가는 프리미엄 단가와 예산 단가(기대 수익의
/// 일정 비율 / 총 가스량) 중 낮은 쪽이며, 예산 단가가 base
/// fee에도 못 미치면 점수가 낮은 레그부터 떨어뜨린다. 실패 대응은
/// 사유별 고정 테이블을 따르며, 같은 기회 시그니처가 반복
/// 실패하면 일정 시간 스킵한다.
pub struct BundleBuilder {
    config: Arc<Config>,
    gas_pricer: Arc<GasPricer>,
    relay: Arc<dyn BundleRelay>,
    competitor_feed: Arc<dyn CompetitorFeed>,
    failure_counts: DashMap<String, u32>,
    skip_until: DashMap<String, DateTime<Utc>>,
}

impl BundleBuilder {
    pub fn new(
        config: Arc<Config>,
        gas_pricer: Arc<GasPricer>,
        relay: Arc<dyn BundleRelay>,
        competitor_feed: Arc<dyn CompetitorFeed>,
    ) -> Self {
        Self {
            config,
            gas_pricer,
            relay,
            competitor_feed,
            failure_counts: DashMap::new(),
            skip_until: DashMap::new(),
        }
    }

    /// 복합 점수 내림차순 랭킹, 상위 max_candidates만 유지
    pub fn rank_candidates(&self, mut candidates: Vec<BundleCandidate>) -> Vec<BundleCandidate> {
        let max_profit = candidates
            .iter()
            .map(|c| c.expected_profit)
            .max()
            .unwrap_or_default();

        candidates.sort_by(|a, b| {
            b.composite_score(max_profit)
                .partial_cmp(&a.composite_score(max_profit))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(self.config.bundle.max_candidates);
        candidates
    }

    /// 토큰 충돌이 없는 상위 후보를 탐욕적으로 선택 (최대 max_bundle_size)
    fn select_compatible(&self, ranked: &[BundleCandidate]) -> Vec<BundleCandidate> {
        let mut selected: Vec<BundleCandidate> = Vec::new();
        let mut used_tokens: HashSet<String> = HashSet::new();

        for candidate in ranked {
            if selected.len() >= self.config.bundle.max_bundle_size {
                break;
            }
            if candidate.tokens.iter().any(|t| used_tokens.contains(t)) {
                continue;
            }
            used_tokens.extend(candidate.tokens.iter().cloned());
            selected.push(candidate.clone());
        }
        selected
    }

    /// 기회 시그니처가 현재 스킵 대상인지 확인
    pub fn is_skipped(&self, signature: &str, now: DateTime<Utc>) -> bool {
        let until = match self.skip_until.get(signature) {
            Some(entry) => *entry,
            None => return false,
        };
        if now < until {
            return true;
        }
        self.skip_until.remove(signature);
        false
    }

    /// 후보 집합에서 번들 구성. 살아남는 레그가 없으면 None.
    pub async fn build_bundle(
        &self,
        candidates: Vec<BundleCandidate>,
        chain_id: ChainId,
        urgency: UrgencyLevel,
        target_block: u64,
        now: DateTime<Utc>,
    ) -> Result<Option<Bundle>> {
        let eligible: Vec<BundleCandidate> = candidates
            .into_iter()
            .filter(|c| c.chain_id == chain_id && !self.is_skipped(&c.signature, now))
            .collect();
        if eligible.is_empty() {
            return Ok(None);
        }

        let ranked = self.rank_candidates(eligible);
        let mut selected = self.select_compatible(&ranked);
        if selected.is_empty() {
            return Ok(None);
        }

        let gas = self.gas_pricer.recommend(chain_id, urgency).await?;

        // 번들 경로는 MEV 프리미엄만큼 팁을 더 낸다 (절대 상한은 유지)
        let premium_tip = mul_f64(
            gas.max_priority_fee_per_gas,
            1.0 + self.config.bundle.mev_premium_pct,
        )
        .min(gwei(self.config.gas.absolute_max_tip_gwei));
        let max_fee = gas.max_fee_per_gas - gas.max_priority_fee_per_gas + premium_tip;

        // 가스 예산: 유효 단가 = min(프리미엄 단가, 예산 단가).
        // 예산 단가(기대 수익의 일정 비율 / 총 가스량)가 base fee 아래로
        // 떨어지면 그 구성은 포함 자체가 불가능하므로 점수가 낮은
        // 레그부터 떨어뜨린다.
        let effective_max_fee = loop {
            let expected_profit: U256 = selected
                .iter()
                .fold(U256::zero(), |acc, c| acc + c.expected_profit);
            let total_gas_units: u64 = selected.iter().map(|c| c.gas_estimate).sum();
            let budget = mul_f64(expected_profit, self.config.bundle.gas_budget_pct);
            let affordable_fee = budget / U256::from(total_gas_units.max(1));

            if affordable_fee >= gas.base_fee {
                break max_fee.min(affordable_fee);
            }
            // 마지막 요소가 가장 낮은 점수 (랭킹 순서 유지)
            if let Some(dropped) = selected.pop() {
                debug!(
                    "💸 예산 단가 {:.3} gwei < base fee, 레그 제외: {}",
                    to_gwei(affordable_fee),
                    dropped.id
                );
            }
            if selected.is_empty() {
                debug!("💸 모든 레그가 가스 예산을 초과해 번들 구성 취소");
                return Ok(None);
            }
        };
        let effective_tip = premium_tip.min(effective_max_fee.saturating_sub(gas.base_fee));

        let expected_profit: U256 = selected
            .iter()
            .fold(U256::zero(), |acc, c| acc + c.expected_profit);
        let total_gas_cost: U256 = selected.iter().fold(U256::zero(), |acc, c| {
            acc + effective_max_fee * U256::from(c.gas_estimate)
        });
        let profit_after_gas =
            expected_profit.as_u128() as i128 - total_gas_cost.as_u128() as i128;

        let margin = Self::margin_after_gas(profit_after_gas, expected_profit);
        let inclusion_probability = Self::inclusion_probability(selected.len(), margin);
        let score = Self::bundle_score(margin);

        // 제출 전 경합 사전 점검 — 같은 블록을 노리는 유사 번들 수
        let similar_bundles = self
            .competitor_feed
            .similar_bundle_count(chain_id, target_block)
            .await
            .unwrap_or(0);

        let mut recommendations = Vec::new();
        if profit_after_gas <= 0 {
            recommendations.push("가스 차감 후 수익이 음수입니다. 제출을 재고하세요".to_string());
        }
        if inclusion_probability < 50.0 {
            recommendations.push("포함 확률이 낮습니다. 팁 인상 또는 다음 블록 대기를 고려하세요".to_string());
        }
        if gas.used_fallback {
            recommendations.push("가스 폴백 값 사용 중입니다. 수수료 데이터 수급을 점검하세요".to_string());
        }
        if similar_bundles > self.config.bundle.contention_threshold {
            recommendations.push(format!(
                "같은 블록을 노리는 유사 번들 {}개가 관측됩니다. 경합에 대비하세요",
                similar_bundles
            ));
        }

        let transactions: Vec<TransactionIntent> = selected
            .iter()
            .map(|c| TransactionIntent {
                candidate_id: c.id.clone(),
                chain_id,
                gas_limit: c.gas_estimate,
                max_fee_per_gas: effective_max_fee,
                max_priority_fee_per_gas: effective_tip,
                target_block,
            })
            .collect();

        let bundle = Bundle {
            id: uuid::Uuid::new_v4().to_string(),
            chain_id,
            target_block,
            transactions,
            candidates: selected,
            metrics: BundleMetrics {
                expected_profit,
                total_gas_cost,
                profit_after_gas,
                score,
                inclusion_probability,
                recommendations,
            },
            created_at: now,
        };

        info!(
            "📦 {} 번들 구성: {}개 레그, 점수 {:.1}, 포함 확률 {:.0}%",
            chain_name(chain_id),
            bundle.candidates.len(),
            bundle.metrics.score,
            bundle.metrics.inclusion_probability
        );

        Ok(Some(bundle))
    }

    /// 가스 차감 후 마진 (기대 수익 대비 비율, 0 ~ 1)
    fn margin_after_gas(profit_after_gas: i128, expected_profit: U256) -> f64 {
        if profit_after_gas <= 0 || expected_profit.is_zero() {
            return 0.0;
        }
        (profit_after_gas as f64 / expected_profit.as_u128() as f64).min(1.0)
    }

    /// 포함 확률 추정: 레그 수 페널티, 저마진 페널티, 고마진 보너스 (30 ~ 95 클램프)
    fn inclusion_probability(legs: usize, margin: f64) -> f64 {
        let mut probability = 80.0 - legs.saturating_sub(1) as f64 * 10.0;
        if margin < 0.75 {
            probability -= 20.0;
        } else if margin > 0.9 {
            probability += 15.0;
        }
        probability.clamp(30.0, 95.0)
    }

    /// 0 ~ 100 번들 점수 (가스 차감 후 마진 기반)
    fn bundle_score(margin: f64) -> f64 {
        (margin * 100.0).clamp(0.0, 100.0)
    }

    /// 릴레이 시뮬레이션. 유사 번들 수가 임계값을 넘으면 경합 플래그.
    pub async fn simulate(&self, bundle: &Bundle) -> Result<SimulationOutcome> {
        let mut outcome = self
            .relay
            .simulate(&bundle.transactions, bundle.target_block)
            .await?;
        outcome.contention =
            outcome.similar_bundle_count > self.config.bundle.contention_threshold;
        if outcome.contention {
            warn!(
                "🔄 번들 {} 경합 감지: 유사 번들 {}개",
                bundle.id, outcome.similar_bundle_count
            );
        }
        Ok(outcome)
    }

    /// 릴레이 제출
    pub async fn submit(&self, bundle: &Bundle) -> Result<bool> {
        self.relay
            .submit(&bundle.transactions, bundle.target_block)
            .await
    }

    /// 성공 시 해당 시그니처들의 실패 카운트 해소
    pub fn record_success(&self, bundle: &Bundle) {
        for candidate in &bundle.candidates {
            self.failure_counts.remove(&candidate.signature);
        }
    }

    /// 실패 대응 테이블.
    ///
    /// 같은 시그니처의 누적 실패가 한도에 도달하면 스킵이 다른
    /// 모든 대응보다 우선한다. 그 외에는 사유별 고정 대응:
    /// 가격 경쟁 -> 가스 인상 재시도, 혼잡/타임아웃 -> 공개 경로,
    /// 나머지 -> 소폭 인상 후 일반 재시도.
    pub fn handle_failure(
        &self,
        bundle: &Bundle,
        reason: BundleFailureReason,
        now: DateTime<Utc>,
    ) -> FallbackPlan {
        let bundle_cfg = &self.config.bundle;

        let mut worst: Option<(String, u32)> = None;
        for candidate in &bundle.candidates {
            let mut count = self
                .failure_counts
                .entry(candidate.signature.clone())
                .or_insert(0);
            *count += 1;
            if worst.as_ref().map(|(_, c)| *count > *c).unwrap_or(true) {
                worst = Some((candidate.signature.clone(), *count));
            }
        }

        if let Some((signature, count)) = worst {
            if count >= bundle_cfg.skip_after_failures {
                let until = now + Duration::minutes(bundle_cfg.skip_duration_minutes);
                self.skip_until.insert(signature.clone(), until);
                warn!(
                    "⏭️ 기회 스킵: {} ({}회 연속 실패, {}분)",
                    signature, count, bundle_cfg.skip_duration_minutes
                );
                return FallbackPlan {
                    bundle_id: bundle.id.clone(),
                    action: FallbackAction::SkipOpportunity { signature, until },
                    justification: format!(
                        "같은 기회가 {}회 실패해 {}분간 스킵",
                        count, bundle_cfg.skip_duration_minutes
                    ),
                };
            }
        }

        let (action, justification) = match reason {
            BundleFailureReason::PriceCompetition => (
                FallbackAction::RetryHigherGas {
                    gas_bump_pct: bundle_cfg.retry_gas_bump_pct,
                },
                format!(
                    "가격 경쟁 패배, 가스 {}% 인상 후 재시도",
                    bundle_cfg.retry_gas_bump_pct
                ),
            ),
            BundleFailureReason::Congestion | BundleFailureReason::Timeout => (
                FallbackAction::PublicSubmission {
                    fee_boost_pct: bundle_cfg.public_fee_boost_pct,
                },
                format!(
                    "혼잡/타임아웃, 수수료 {}% 부스트 후 공개 경로 전환",
                    bundle_cfg.public_fee_boost_pct
                ),
            ),
            _ => (
                FallbackAction::Retry {
                    gas_bump_pct: bundle_cfg.generic_retry_bump_pct,
                },
                format!(
                    "일반 실패, 가스 {}% 인상 후 재시도",
                    bundle_cfg.generic_retry_bump_pct
                ),
            ),
        };

        info!("🔄 번들 {} 실패 대응 ({}): {}", bundle.id, reason, justification);
        FallbackPlan {
            bundle_id: bundle.id.clone(),
            action,
            justification,
        }
    }
}

impl std::fmt::Debug for BundleBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleBuilder")
            .field("config", &"Arc<Config>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ChainClient;
    use crate::constants::ETHEREUM;
    use crate::core::market_analyzer::MarketAnalyzer;
    use crate::mocks::{MockBundleRelay, MockChainClient, MockCompetitorFeed};
    use crate::types::Priority;

    fn make_candidate(id: &str, tokens: &[&str], profit_eth_milli: u64, priority: Priority) -> BundleCandidate {
        BundleCandidate {
            id: id.to_string(),
            chain_id: ETHEREUM,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            // milli-ETH 단위 기대 수익
            expected_profit: U256::from(profit_eth_milli) * U256::exp10(15),
            gas_estimate: 200_000,
            confidence: 0.8,
            priority,
            signature: format!("arb:{}", tokens.join("/")),
        }
    }

    fn make_builder() -> (Arc<MockBundleRelay>, BundleBuilder) {
        let config = Arc::new(Config::default());
        let chain_client = Arc::new(MockChainClient::new());
        let competitor_feed = Arc::new(MockCompetitorFeed::new());
        let analyzer = Arc::new(MarketAnalyzer::new(
            Arc::clone(&config),
            Arc::clone(&chain_client) as Arc<dyn ChainClient>,
            Arc::clone(&competitor_feed) as Arc<dyn CompetitorFeed>,
        ));
        let gas_pricer = Arc::new(GasPricer::new(
            Arc::clone(&config),
            chain_client as Arc<dyn ChainClient>,
            analyzer,
        ));
        let relay = Arc::new(MockBundleRelay::new());
        let builder = BundleBuilder::new(
            config,
            gas_pricer,
            Arc::clone(&relay) as Arc<dyn BundleRelay>,
            competitor_feed as Arc<dyn CompetitorFeed>,
        );
        (relay, builder)
    }

    #[tokio::test]
    async fn test_no_token_conflicts_in_bundle() {
        let (_, builder) = make_builder();
        let candidates = vec![
            make_candidate("c1", &["WETH", "USDC"], 100, Priority::Urgent),
            make_candidate("c2", &["WETH", "DAI"], 90, Priority::High),
            make_candidate("c3", &["WBTC", "USDT"], 80, Priority::High),
        ];

        let bundle = builder
            .build_bundle(candidates, ETHEREUM, UrgencyLevel::Medium, 100, Utc::now())
            .await
            .unwrap()
            .expect("bundle");

        // c2는 c1과 WETH를 공유하므로 제외되어야 한다
        let ids: Vec<&str> = bundle.candidates.iter().map(|c| c.id.as_str()).collect();
        assert!(ids.contains(&"c1"));
        assert!(!ids.contains(&"c2"));
        assert!(ids.contains(&"c3"));
    }

    #[tokio::test]
    async fn test_bundle_size_capped() {
        let (_, builder) = make_builder();
        let candidates = vec![
            make_candidate("c1", &["A1", "B1"], 100, Priority::Urgent),
            make_candidate("c2", &["A2", "B2"], 90, Priority::Urgent),
            make_candidate("c3", &["A3", "B3"], 80, Priority::Urgent),
            make_candidate("c4", &["A4", "B4"], 70, Priority::Urgent),
            make_candidate("c5", &["A5", "B5"], 60, Priority::Urgent),
        ];

        let bundle = builder
            .build_bundle(candidates, ETHEREUM, UrgencyLevel::Medium, 100, Utc::now())
            .await
            .unwrap()
            .expect("bundle");

        assert!(bundle.candidates.len() <= 3);
        // 점수가 가장 높은 후보가 포함되어야 한다
        assert_eq!(bundle.candidates[0].id, "c1");
    }

    #[tokio::test]
    async fn test_gas_budget_rejects_unprofitable_bundle() {
        let (_, builder) = make_builder();
        // 기대 수익이 가스 비용 대비 너무 작은 후보
        let mut candidate = make_candidate("c1", &["WETH", "USDC"], 0, Priority::High);
        candidate.expected_profit = U256::from(1_000u64);

        let bundle = builder
            .build_bundle(vec![candidate], ETHEREUM, UrgencyLevel::Medium, 100, Utc::now())
            .await
            .unwrap();

        assert!(bundle.is_none());
    }

    #[test]
    fn test_inclusion_probability_bounds() {
        // 단일 레그 + 고마진 보너스는 상한 95에서 잘린다
        assert_eq!(BundleBuilder::inclusion_probability(1, 0.95), 95.0);
        // 3레그 저마진: 80 - 20 - 20 = 40
        assert_eq!(BundleBuilder::inclusion_probability(3, 0.5), 40.0);
        let mid = BundleBuilder::inclusion_probability(2, 0.8);
        assert!(mid >= 30.0 && mid <= 95.0);
    }

    #[tokio::test]
    async fn test_fallback_table_by_reason() {
        let (_, builder) = make_builder();
        let candidates = vec![make_candidate("c1", &["WETH", "USDC"], 100, Priority::High)];
        let bundle = builder
            .build_bundle(candidates, ETHEREUM, UrgencyLevel::Medium, 100, Utc::now())
            .await
            .unwrap()
            .expect("bundle");

        let plan = builder.handle_failure(&bundle, BundleFailureReason::PriceCompetition, Utc::now());
        assert_eq!(plan.action, FallbackAction::RetryHigherGas { gas_bump_pct: 25 });

        let plan = builder.handle_failure(&bundle, BundleFailureReason::Congestion, Utc::now());
        assert_eq!(plan.action, FallbackAction::PublicSubmission { fee_boost_pct: 50 });
    }

    #[tokio::test]
    async fn test_skip_after_repeated_failures() {
        let (_, builder) = make_builder();
        let candidates = vec![make_candidate("c1", &["WETH", "USDC"], 100, Priority::High)];
        let now = Utc::now();
        let bundle = builder
            .build_bundle(candidates.clone(), ETHEREUM, UrgencyLevel::Medium, 100, now)
            .await
            .unwrap()
            .expect("bundle");

        builder.handle_failure(&bundle, BundleFailureReason::Revert, now);
        builder.handle_failure(&bundle, BundleFailureReason::Revert, now);
        let plan = builder.handle_failure(&bundle, BundleFailureReason::Revert, now);

        match plan.action {
            FallbackAction::SkipOpportunity { ref signature, until } => {
                assert_eq!(signature, "arb:WETH/USDC");
                assert!(until > now);
            }
            other => panic!("expected skip, got {:?}", other),
        }
        assert!(builder.is_skipped("arb:WETH/USDC", now));

        // 스킵 중인 시그니처는 다음 번들에서 제외된다
        let rebuilt = builder
            .build_bundle(candidates, ETHEREUM, UrgencyLevel::Medium, 101, now)
            .await
            .unwrap();
        assert!(rebuilt.is_none());

        // 스킵 기간이 지나면 다시 대상이 된다
        assert!(!builder.is_skipped("arb:WETH/USDC", now + Duration::minutes(31)));
    }

    #[tokio::test]
    async fn test_success_clears_failure_count() {
        let (_, builder) = make_builder();
        let candidates = vec![make_candidate("c1", &["WETH", "USDC"], 100, Priority::High)];
        let now = Utc::now();
        let bundle = builder
            .build_bundle(candidates, ETHEREUM, UrgencyLevel::Medium, 100, now)
            .await
            .unwrap()
            .expect("bundle");

        builder.handle_failure(&bundle, BundleFailureReason::Revert, now);
        builder.handle_failure(&bundle, BundleFailureReason::Revert, now);
        builder.record_success(&bundle);

        // 카운트가 초기화되어 세 번째 실패도 스킵으로 이어지지 않는다
        let plan = builder.handle_failure(&bundle, BundleFailureReason::Revert, now);
        assert!(matches!(plan.action, FallbackAction::Retry { .. }));
    }

    #[tokio::test]
    async fn test_contention_flag_from_simulation() {
        let (relay, builder) = make_builder();
        let candidates = vec![make_candidate("c1", &["WETH", "USDC"], 100, Priority::High)];
        let bundle = builder
            .build_bundle(candidates, ETHEREUM, UrgencyLevel::Medium, 100, Utc::now())
            .await
            .unwrap()
            .expect("bundle");

        relay
            .set_forced_outcome(SimulationOutcome {
                success: true,
                gas_used: 180_000,
                realized_profit: U256::exp10(17),
                revert_reason: None,
                competitor_density: 8.0,
                similar_bundle_count: 9,
                contention: false,
            })
            .await;

        let outcome = builder.simulate(&bundle).await.unwrap();
        assert!(outcome.contention);
    }
}
