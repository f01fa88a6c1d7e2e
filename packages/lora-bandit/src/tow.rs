//! tow.rs — Tug-of-War dynamics over independent dimensions
//!
//! Each dimension (channel and SF by default) is its own bandit:
//!   1. Score  X_k = Q_k − mean(Q_others) + A·cos(2π(t + k)/D)
//!   2. Win    Q_k ← α·Q_k + 1
//!   3. Loss   Q_k ← α·Q_k − penalty(top-2 forgetting-weighted success rates)
//!   4. Every observation decays all selection/success counters by β
//!
//! A device's first decision is uniform random per dimension. Until every arm
//! of a dimension has been observed once, the lowest-index untried arm is
//! chosen ahead of the scores.

use std::f64::consts::PI;

use lora_types::{Dimension, DimensionPulls, ParameterSet, PullCounts};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ParameterCatalog;
use crate::energy::EnergyModel;
use crate::error::{check_range, Result};
use crate::policy::{
    argmax_first, first_untried, validate_dimensions, ArmPolicy, ObservationContext, SelectionContext,
};

/// Penalty used when the top-two gap is undefined.
pub const DEFAULT_PENALTY: f64 = 0.1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TowConfig {
    /// Q-value memory factor
    pub alpha:      f64,
    /// Selection/success counter forgetting factor
    pub beta:       f64,
    /// Oscillation amplitude A
    pub amplitude:  f64,
    pub dimensions: Vec<Dimension>,
}

impl Default for TowConfig {
    fn default() -> Self {
        Self {
            alpha: 0.9,
            beta: 0.9,
            amplitude: 0.5,
            dimensions: vec![Dimension::Channel, Dimension::SpreadingFactor],
        }
    }
}

/// A·cos(2π(round + arm)/size), 0 for an empty dimension.
pub fn oscillation(amplitude: f64, arm: usize, round: u64, size: usize) -> f64 {
    if size == 0 {
        return 0.0;
    }
    // (round + arm) mod size, exact for any round
    let phase = ((round % size as u64) as usize + arm % size) % size;
    amplitude * (2.0 * PI * phase as f64 / size as f64).cos()
}

/// Top-two gap penalty over arms that have been tried at least once.
pub fn penalty(selections: &[f64], successes: &[f64], pulls: &[u64]) -> f64 {
    let mut probs: Vec<f64> = (0..pulls.len())
        .filter(|&i| pulls[i] > 0 && selections[i] > 0.0)
        .map(|i| successes[i] / selections[i])
        .collect();
    if probs.len() < 2 {
        return DEFAULT_PENALTY;
    }
    probs.sort_by(|a, b| b.total_cmp(a));
    let (p1, p2) = (probs[0], probs[1]);
    if p1 == p2 {
        return DEFAULT_PENALTY;
    }
    (p1 + p2) / 2.0 - (p1 - p2)
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TowDimension {
    pub dimension:  Dimension,
    pub q:          Vec<f64>,
    /// Forgetting-weighted selection counts
    pub selections: Vec<f64>,
    /// Forgetting-weighted success counts
    pub successes:  Vec<f64>,
    pub pulls:      Vec<u64>,
}

impl TowDimension {
    fn new(dimension: Dimension, size: usize) -> Self {
        Self {
            dimension,
            q: vec![0.0; size],
            selections: vec![0.0; size],
            successes: vec![0.0; size],
            pulls: vec![0; size],
        }
    }

    fn size(&self) -> usize {
        self.q.len()
    }

    pub fn scores(&self, amplitude: f64, round: u64) -> Vec<f64> {
        let d = self.size();
        let total: f64 = self.q.iter().sum();
        (0..d)
            .map(|k| {
                let others = if d > 1 { (total - self.q[k]) / (d - 1) as f64 } else { 0.0 };
                self.q[k] - others + oscillation(amplitude, k, round, d)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct TowState {
    pub dims:           Vec<TowDimension>,
    pub last_selection: Option<ParameterSet>,
}

// ── Policy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TowPolicy {
    cfg: TowConfig,
}

impl TowPolicy {
    pub fn new(cfg: TowConfig) -> Result<Self> {
        check_range("tow.alpha", cfg.alpha, 0.0, 1.0)?;
        check_range("tow.beta", cfg.beta, 0.0, 1.0)?;
        check_range("tow.amplitude", cfg.amplitude, 0.0, f64::MAX)?;
        validate_dimensions(&cfg.dimensions)?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &TowConfig {
        &self.cfg
    }
}

impl ArmPolicy for TowPolicy {
    type State = TowState;

    fn name(&self) -> &'static str {
        "tow"
    }

    fn energy_model(&self) -> EnergyModel {
        EnergyModel::TablePower
    }

    fn init_state(&self, catalog: &ParameterCatalog) -> TowState {
        TowState {
            dims: self
                .cfg
                .dimensions
                .iter()
                .map(|&d| TowDimension::new(d, catalog.len(d)))
                .collect(),
            last_selection: None,
        }
    }

    fn select(&self, state: &mut TowState, ctx: &mut SelectionContext<'_>) -> ParameterSet {
        let mut arm = ParameterSet::default();

        if state.last_selection.is_none() {
            for dim in &state.dims {
                arm.set(dim.dimension, ctx.rng.gen_range(0..dim.size()));
            }
            debug!(device = ctx.device_id, round = ctx.round, %arm, "tow initial random pick");
        } else {
            for dim in &state.dims {
                let k = match first_untried(&dim.pulls) {
                    Some(k) => k,
                    None => argmax_first(&dim.scores(self.cfg.amplitude, ctx.round)),
                };
                arm.set(dim.dimension, k);
            }
            debug!(device = ctx.device_id, round = ctx.round, %arm, "tow pick");
        }

        state.last_selection = Some(arm);
        arm
    }

    fn observe(&self, state: &mut TowState, obs: &ObservationContext<'_>) {
        let success = obs.outcome.success;
        for dim in &mut state.dims {
            let k = obs.arm.index(dim.dimension);
            if k >= dim.size() {
                continue;
            }

            if success {
                dim.q[k] = self.cfg.alpha * dim.q[k] + 1.0;
            } else {
                let pen = penalty(&dim.selections, &dim.successes, &dim.pulls);
                dim.q[k] = self.cfg.alpha * dim.q[k] - pen;
            }

            for i in 0..dim.size() {
                dim.selections[i] *= self.cfg.beta;
                dim.successes[i] *= self.cfg.beta;
            }
            dim.selections[k] += 1.0;
            if success {
                dim.successes[k] += 1.0;
            }
            dim.pulls[k] += 1;
        }
    }

    fn pulls(&self, state: &TowState) -> PullCounts {
        PullCounts::PerDimension(
            state
                .dims
                .iter()
                .map(|d| DimensionPulls { dimension: d.dimension, counts: d.pulls.clone() })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::EnergyParameters;
    use lora_types::TransmissionOutcome;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn observe(policy: &TowPolicy, state: &mut TowState, catalog: &ParameterCatalog, arm: ParameterSet, ok: bool) {
        let energy = EnergyParameters::default();
        let tx = catalog.resolve(&arm).unwrap();
        let outcome = if ok { TransmissionOutcome::delivered(50) } else { TransmissionOutcome::lost(50) };
        let cost = policy.energy_model().cost(&energy, &tx, 50);
        policy.observe(
            state,
            &ObservationContext { catalog, energy: &energy, device_id: 1, round: 0, arm, tx, outcome, cost },
        );
    }

    fn select(policy: &TowPolicy, state: &mut TowState, catalog: &ParameterCatalog, rng: &mut StdRng, round: u64) -> ParameterSet {
        let mut ctx = SelectionContext { catalog, device_id: 1, round, rng, distance_m: None };
        policy.select(state, &mut ctx)
    }

    #[test]
    fn oscillation_formula() {
        assert!((oscillation(0.5, 0, 0, 4) - 0.5).abs() < 1e-12);
        assert!((oscillation(0.5, 1, 1, 4) + 0.5).abs() < 1e-12);
        assert!(oscillation(0.5, 1, 0, 4).abs() < 1e-12);
        assert_eq!(oscillation(0.5, 0, 3, 0), 0.0);
    }

    #[test]
    fn penalty_cases() {
        // fewer than two tried arms
        assert_eq!(penalty(&[1.0, 0.0], &[1.0, 0.0], &[1, 0]), DEFAULT_PENALTY);
        // tie
        assert_eq!(penalty(&[1.0, 2.0], &[1.0, 2.0], &[1, 2]), DEFAULT_PENALTY);
        // p1 = 1.0, p2 = 0.5 → 0.75 − 0.5
        let p = penalty(&[1.0, 2.0, 1.0], &[1.0, 1.0, 0.0], &[1, 2, 1]);
        assert!((p - 0.25).abs() < 1e-12);
    }

    #[test]
    fn first_pick_random_then_untried_in_order() {
        let catalog = ParameterCatalog::tow();
        let policy = TowPolicy::new(TowConfig::default()).unwrap();
        let mut state = policy.init_state(&catalog);
        let mut rng = StdRng::seed_from_u64(7);

        let first = select(&policy, &mut state, &catalog, &mut rng, 0);
        assert!(catalog.contains(&first));
        observe(&policy, &mut state, &catalog, first, true);

        let mut seen_sf = vec![first.spreading_factor];
        for round in 1..3 {
            let arm = select(&policy, &mut state, &catalog, &mut rng, round);
            let expected = (0..3).find(|k| !seen_sf.contains(k)).unwrap();
            assert_eq!(arm.spreading_factor, expected);
            seen_sf.push(arm.spreading_factor);
            observe(&policy, &mut state, &catalog, arm, false);
        }
        assert_eq!(state.dims[1].pulls, vec![1, 1, 1]);
    }

    #[test]
    fn reward_update_and_decay() {
        let catalog = ParameterCatalog::tow();
        let policy = TowPolicy::new(TowConfig::default()).unwrap();
        let mut state = policy.init_state(&catalog);
        let arm = ParameterSet::default();

        observe(&policy, &mut state, &catalog, arm, true);
        observe(&policy, &mut state, &catalog, arm, true);
        let ch = &state.dims[0];
        assert!((ch.q[0] - 1.9).abs() < 1e-12);
        assert!((ch.selections[0] - 1.9).abs() < 1e-12);
        assert!((ch.successes[0] - 1.9).abs() < 1e-12);

        // failing on another channel decays channel 0 too
        let other = arm.with(Dimension::Channel, 1);
        observe(&policy, &mut state, &catalog, other, false);
        let ch = &state.dims[0];
        assert!((ch.selections[0] - 1.71).abs() < 1e-12);
        assert!((ch.q[1] + DEFAULT_PENALTY).abs() < 1e-12);
        assert_eq!(ch.pulls[..2], [2, 1]);
    }

    #[test]
    fn exploits_the_reinforced_arm() {
        let catalog = ParameterCatalog::tow();
        let policy = TowPolicy::new(TowConfig::default()).unwrap();
        let mut state = policy.init_state(&catalog);
        let mut rng = StdRng::seed_from_u64(1);
        state.last_selection = Some(ParameterSet::default());
        for dim in &mut state.dims {
            dim.pulls.iter_mut().for_each(|n| *n = 1);
        }
        state.dims[0].q[3] = 5.0;

        for round in 10..20 {
            let arm = select(&policy, &mut state, &catalog, &mut rng, round);
            assert_eq!(arm.channel, 3);
        }
    }

    #[test]
    fn rejects_out_of_range_factors() {
        assert!(TowPolicy::new(TowConfig { alpha: 1.5, ..TowConfig::default() }).is_err());
        assert!(TowPolicy::new(TowConfig { dimensions: vec![], ..TowConfig::default() }).is_err());
    }
}
