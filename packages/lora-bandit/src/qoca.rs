//! qoca.rs — Quality-of-channel aware UCB (QoC-A) and its discounted form
//!
//! Index for arm i at decision n:
//!
//!   B_i = R_i + β·(G_i / G_max − 1)·ln(n) / N_i + α·sqrt(ln(n) / N_i)
//!
//! R_i is the mean delivery reward and G_i the mean observed channel quality.
//! The quality term vanishes when no arm has positive mean quality, and is
//! zero for an arm that has no quality samples yet.
//!
//! Two estimators:
//! - `Stationary` (QoC-A): plain running sums, N_i = pulls, n = plays + 1
//! - `Discounted` (DQoC-A): every observation scales all reward sums by λ and
//!   all quality sums by λg before adding the new sample, so each sample is
//!   weighted by λ^(age). N_i is the discounted weight and n = Σ N_i.
//!
//! Discounted weights are floored at `WEIGHT_FLOOR`; an arm's "tried"
//! status always comes from its integer pull count.

use lora_types::{Dimension, ParameterSet, PullCounts};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ParameterCatalog;
use crate::energy::EnergyModel;
use crate::error::{check_range, Result};
use crate::policy::{
    argmax_first, first_untried, pulls_per_arm, validate_dimensions, ArmPolicy, ObservationContext,
    SelectionContext,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    Stationary,
    Discounted { lambda: f64, lambda_g: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QocaConfig {
    pub dimensions: Vec<Dimension>,
    /// Exploration weight
    pub alpha:      f64,
    /// Quality weight
    pub beta:       f64,
    pub estimator:  Estimator,
}

impl Default for QocaConfig {
    fn default() -> Self {
        Self::qoca()
    }
}

impl QocaConfig {
    pub fn qoca() -> Self {
        Self {
            dimensions: vec![Dimension::Channel],
            alpha: 1.9,
            beta: 0.9,
            estimator: Estimator::Stationary,
        }
    }

    pub fn dqoca() -> Self {
        Self {
            dimensions: vec![Dimension::Channel],
            alpha: 0.6,
            beta: 0.2,
            estimator: Estimator::Discounted { lambda: 0.98, lambda_g: 0.90 },
        }
    }

    /// Plain UCB comparator: no quality term.
    pub fn ucb() -> Self {
        Self {
            dimensions: vec![Dimension::Channel],
            alpha: 1.28,
            beta: 0.0,
            estimator: Estimator::Stationary,
        }
    }
}

// ── Arm statistics ────────────────────────────────────────────────────────────

/// Smallest discounted weight kept; `ln n / weight` stays finite above it.
pub const WEIGHT_FLOOR: f64 = 1e-300;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QocaArm {
    pub pulls:          u64,
    /// Σ λ^age over reward samples (= pulls when stationary)
    pub weight:         f64,
    pub reward_sum:     f64,
    /// Σ λg^age over samples that carried a quality value
    pub quality_weight: f64,
    pub quality_sum:    f64,
}

impl QocaArm {
    pub fn mean_reward(&self) -> f64 {
        if self.weight > 0.0 {
            self.reward_sum / self.weight
        } else {
            0.0
        }
    }

    pub fn mean_quality(&self) -> f64 {
        if self.quality_weight > 0.0 {
            self.quality_sum / self.quality_weight
        } else {
            0.0
        }
    }

    fn discount(&mut self, lambda: f64, lambda_g: f64) {
        if self.pulls == 0 {
            return;
        }
        self.weight = (self.weight * lambda).max(WEIGHT_FLOOR);
        self.reward_sum *= lambda;
        if self.quality_weight > 0.0 {
            self.quality_weight = (self.quality_weight * lambda_g).max(WEIGHT_FLOOR);
            self.quality_sum *= lambda_g;
        }
    }

    fn add(&mut self, reward: f64, quality: Option<f64>) {
        self.pulls += 1;
        self.weight += 1.0;
        self.reward_sum += reward;
        if let Some(q) = quality.filter(|q| q.is_finite()) {
            self.quality_weight += 1.0;
            self.quality_sum += q;
        }
    }
}

#[derive(Debug, Clone)]
pub struct QocaState {
    pub arms:  Vec<ParameterSet>,
    pub stats: Vec<QocaArm>,
    pub plays: u64,
}

// ── Policy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QocaPolicy {
    cfg: QocaConfig,
}

impl QocaPolicy {
    pub fn new(cfg: QocaConfig) -> Result<Self> {
        check_range("qoca.alpha", cfg.alpha, 0.0, f64::MAX)?;
        check_range("qoca.beta", cfg.beta, 0.0, f64::MAX)?;
        if let Estimator::Discounted { lambda, lambda_g } = cfg.estimator {
            check_range("qoca.lambda", lambda, f64::MIN_POSITIVE, 1.0)?;
            check_range("qoca.lambda_g", lambda_g, f64::MIN_POSITIVE, 1.0)?;
        }
        validate_dimensions(&cfg.dimensions)?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &QocaConfig {
        &self.cfg
    }

    /// Decision index n used in the bound.
    fn horizon(&self, state: &QocaState) -> f64 {
        match self.cfg.estimator {
            Estimator::Stationary => (state.plays + 1) as f64,
            Estimator::Discounted { .. } => state.stats.iter().map(|s| s.weight).sum(),
        }
    }

    /// Per-arm priority; infinite for untried arms.
    pub fn priorities(&self, state: &QocaState) -> Vec<f64> {
        let ln_n = self.horizon(state).max(1.0).ln();
        let g_max = state
            .stats
            .iter()
            .filter(|s| s.pulls > 0 && s.quality_weight > 0.0)
            .map(QocaArm::mean_quality)
            .fold(f64::NEG_INFINITY, f64::max);

        state
            .stats
            .iter()
            .map(|s| {
                if s.pulls == 0 {
                    return f64::INFINITY;
                }
                let n_i = s.weight;
                // no quality samples yet: neutral, not worst
                let quality = if g_max > 0.0 && s.quality_weight > 0.0 {
                    self.cfg.beta * (s.mean_quality() / g_max - 1.0) * ln_n / n_i
                } else {
                    0.0
                };
                s.mean_reward() + quality + self.cfg.alpha * (ln_n / n_i).sqrt()
            })
            .collect()
    }
}

impl ArmPolicy for QocaPolicy {
    type State = QocaState;

    fn name(&self) -> &'static str {
        match self.cfg.estimator {
            Estimator::Stationary if self.cfg.beta == 0.0 => "ucb",
            Estimator::Stationary => "qoca",
            Estimator::Discounted { .. } => "dqoca",
        }
    }

    fn energy_model(&self) -> EnergyModel {
        EnergyModel::TablePower
    }

    fn init_state(&self, catalog: &ParameterCatalog) -> QocaState {
        let arms = catalog.enumerate(&self.cfg.dimensions);
        let stats = vec![QocaArm::default(); arms.len()];
        QocaState { arms, stats, plays: 0 }
    }

    fn select(&self, state: &mut QocaState, ctx: &mut SelectionContext<'_>) -> ParameterSet {
        let pulls: Vec<u64> = state.stats.iter().map(|s| s.pulls).collect();
        if let Some(i) = first_untried(&pulls) {
            debug!(device = ctx.device_id, round = ctx.round, arm = %state.arms[i], "{} forced exploration", self.name());
            return state.arms[i];
        }
        let i = argmax_first(&self.priorities(state));
        debug!(
            device = ctx.device_id,
            round = ctx.round,
            arm = %state.arms[i],
            n = self.horizon(state),
            "{} pick",
            self.name()
        );
        state.arms[i]
    }

    fn observe(&self, state: &mut QocaState, obs: &ObservationContext<'_>) {
        let i = obs.catalog.joint_index(&self.cfg.dimensions, &obs.arm);
        if i >= state.stats.len() {
            return;
        }
        if let Estimator::Discounted { lambda, lambda_g } = self.cfg.estimator {
            for s in &mut state.stats {
                s.discount(lambda, lambda_g);
            }
        }
        let reward = if obs.outcome.success { 1.0 } else { 0.0 };
        state.stats[i].add(reward, obs.outcome.quality);
        state.plays += 1;
    }

    fn pulls(&self, state: &QocaState) -> PullCounts {
        pulls_per_arm(&state.arms, state.stats.iter().map(|s| s.pulls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::EnergyParameters;
    use lora_types::TransmissionOutcome;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn three_channels() -> ParameterCatalog {
        ParameterCatalog::new(vec![868_100, 868_300, 868_500], vec![7], vec![125_000], vec![14]).unwrap()
    }

    fn feed(policy: &QocaPolicy, state: &mut QocaState, catalog: &ParameterCatalog, arm: ParameterSet, ok: bool, quality: Option<f64>) {
        let energy = EnergyParameters::default();
        let tx = catalog.resolve(&arm).unwrap();
        let outcome = TransmissionOutcome { success: ok, payload_bytes: 50, quality };
        let cost = policy.energy_model().cost(&energy, &tx, 50);
        let round = state.plays;
        policy.observe(
            state,
            &ObservationContext { catalog, energy: &energy, device_id: 0, round, arm, tx, outcome, cost },
        );
    }

    /// O(history) reference: Σ λ^(t−s) over every retained sample.
    fn naive(history: &[(usize, f64, Option<f64>)], arm: usize, lambda: f64, lambda_g: f64) -> (f64, f64, f64, f64) {
        let t = history.len() - 1;
        let (mut w, mut r, mut wg, mut g) = (0.0, 0.0, 0.0, 0.0);
        for (s, &(a, reward, quality)) in history.iter().enumerate() {
            if a != arm {
                continue;
            }
            let age = (t - s) as i32;
            w += lambda.powi(age);
            r += lambda.powi(age) * reward;
            if let Some(q) = quality {
                wg += lambda_g.powi(age);
                g += lambda_g.powi(age) * q;
            }
        }
        (w, r, wg, g)
    }

    #[test]
    fn recurrence_matches_naive_recomputation() {
        let catalog = three_channels();
        let (lambda, lambda_g) = (0.95, 0.8);
        let policy = QocaPolicy::new(QocaConfig {
            estimator: Estimator::Discounted { lambda, lambda_g },
            ..QocaConfig::dqoca()
        })
        .unwrap();
        let mut state = policy.init_state(&catalog);
        let mut rng = StdRng::seed_from_u64(11);
        let mut history = Vec::new();

        for _ in 0..200 {
            let a = rng.gen_range(0..3);
            let ok = rng.gen_bool(0.6);
            let quality = if rng.gen_bool(0.8) { Some(rng.gen_range(0.1..2.0)) } else { None };
            let arm = state.arms[a];
            feed(&policy, &mut state, &catalog, arm, ok, quality);
            history.push((a, if ok { 1.0 } else { 0.0 }, quality));
        }

        for arm in 0..3 {
            let (w, r, wg, g) = naive(&history, arm, lambda, lambda_g);
            let s = &state.stats[arm];
            assert!((s.weight - w).abs() < 1e-9);
            assert!((s.reward_sum - r).abs() < 1e-9);
            assert!((s.quality_weight - wg).abs() < 1e-9);
            assert!((s.quality_sum - g).abs() < 1e-9);
        }
    }

    #[test]
    fn unit_discount_matches_stationary_means() {
        let catalog = three_channels();
        let plain = QocaPolicy::new(QocaConfig::qoca()).unwrap();
        let unit = QocaPolicy::new(QocaConfig {
            estimator: Estimator::Discounted { lambda: 1.0, lambda_g: 1.0 },
            ..QocaConfig::qoca()
        })
        .unwrap();
        let mut a = plain.init_state(&catalog);
        let mut b = unit.init_state(&catalog);
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..100 {
            let i = rng.gen_range(0..3);
            let ok = rng.gen_bool(0.5);
            let q = Some(rng.gen_range(0.0..1.0));
            let arm = a.arms[i];
            feed(&plain, &mut a, &catalog, arm, ok, q);
            feed(&unit, &mut b, &catalog, arm, ok, q);
        }
        for (x, y) in a.stats.iter().zip(&b.stats) {
            assert_eq!(x.pulls, y.pulls);
            assert!((x.mean_reward() - y.mean_reward()).abs() < 1e-12);
            assert!((x.mean_quality() - y.mean_quality()).abs() < 1e-12);
        }
    }

    #[test]
    fn untried_first_then_finite_scores() {
        let catalog = three_channels();
        for cfg in [QocaConfig::qoca(), QocaConfig::dqoca(), QocaConfig::ucb()] {
            let policy = QocaPolicy::new(cfg).unwrap();
            let mut state = policy.init_state(&catalog);
            let mut rng = StdRng::seed_from_u64(0);
            for round in 0..3u64 {
                assert!(policy.priorities(&state).iter().any(|p| p.is_infinite()));
                let mut ctx = SelectionContext { catalog: &catalog, device_id: 0, round, rng: &mut rng, distance_m: None };
                let arm = policy.select(&mut state, &mut ctx);
                assert_eq!(arm.channel, round as usize);
                feed(&policy, &mut state, &catalog, arm, true, Some(1.0));
            }
            assert!(policy.priorities(&state).iter().all(|p| p.is_finite()));
        }
    }

    #[test]
    fn quality_term_penalises_weak_channels() {
        let catalog = three_channels();
        let policy = QocaPolicy::new(QocaConfig::qoca()).unwrap();
        let mut state = policy.init_state(&catalog);
        for i in 0..3 {
            let q = if i == 1 { 4.0 } else { 1.0 };
            let arm = state.arms[i];
            feed(&policy, &mut state, &catalog, arm, true, Some(q));
        }
        let p = policy.priorities(&state);
        assert!(p[1] > p[0]);
        assert!((p[0] - p[2]).abs() < 1e-12);
    }

    #[test]
    fn missing_quality_does_not_bias_mean() {
        let mut arm = QocaArm::default();
        arm.add(1.0, Some(2.0));
        arm.add(1.0, None);
        assert_eq!(arm.mean_quality(), 2.0);
        assert_eq!(arm.mean_reward(), 1.0);
    }

    #[test]
    fn weights_never_underflow() {
        let mut arm = QocaArm::default();
        arm.add(1.0, Some(1.0));
        for _ in 0..10_000 {
            arm.discount(0.5, 0.5);
        }
        assert!(arm.weight > 0.0);
        assert!(arm.mean_reward().is_finite());
    }

    #[test]
    fn arm_without_quality_samples_is_neutral() {
        let catalog = three_channels();
        let policy = QocaPolicy::new(QocaConfig::qoca()).unwrap();
        let mut state = policy.init_state(&catalog);
        let (a0, a1, a2) = (state.arms[0], state.arms[1], state.arms[2]);
        feed(&policy, &mut state, &catalog, a0, false, None);
        feed(&policy, &mut state, &catalog, a1, false, Some(1.0));
        feed(&policy, &mut state, &catalog, a2, false, Some(1.0));
        let p = policy.priorities(&state);
        assert!((p[0] - p[1]).abs() < 1e-12, "{p:?}");
        assert!((p[1] - p[2]).abs() < 1e-12, "{p:?}");
    }

    #[test]
    fn stale_arm_scores_stay_finite() {
        let catalog = three_channels();
        let policy = QocaPolicy::new(QocaConfig {
            estimator: Estimator::Discounted { lambda: 0.99, lambda_g: 0.99 },
            ..QocaConfig::dqoca()
        })
        .unwrap();
        let mut state = policy.init_state(&catalog);
        state.stats[0] = QocaArm { pulls: 1, weight: WEIGHT_FLOOR, reward_sum: 0.0, quality_weight: WEIGHT_FLOOR, quality_sum: 0.0 };
        for i in 1..3 {
            state.stats[i] = QocaArm { pulls: 500, weight: 60.0, reward_sum: 30.0, quality_weight: 60.0, quality_sum: 60.0 };
        }
        let p = policy.priorities(&state);
        assert!(p.iter().all(|x| x.is_finite()), "{p:?}");
    }

    #[test]
    fn names_follow_preset() {
        assert_eq!(QocaPolicy::new(QocaConfig::qoca()).unwrap().name(), "qoca");
        assert_eq!(QocaPolicy::new(QocaConfig::dqoca()).unwrap().name(), "dqoca");
        assert_eq!(QocaPolicy::new(QocaConfig::ucb()).unwrap().name(), "ucb");
    }
}
