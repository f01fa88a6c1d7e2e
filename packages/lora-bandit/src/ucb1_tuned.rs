//! ucb1_tuned.rs — Variance-aware UCB over joint parameter tuples
//!
//! Arms are the Cartesian product of the configured dimensions (channel ×
//! power by default). Index for arm i after t plays:
//!
//!   mean_i + sqrt( ln t / n_i · min(1/4, var_i + sqrt(2 ln t / n_i)) )
//!
//! Untried arms have infinite priority and are returned in catalog order, so
//! the first |arms| decisions sweep the catalog exactly once.

use lora_types::{Dimension, ParameterSet, PullCounts};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ParameterCatalog;
use crate::energy::EnergyModel;
use crate::error::Result;
use crate::policy::{
    argmax_first, first_untried, pulls_per_arm, validate_dimensions, ArmPolicy, ObservationContext,
    SelectionContext,
};

/// How a delivered packet is turned into a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardShape {
    /// 1 on success
    Binary,
    /// 1 / E_ToA on success (mJ⁻¹)
    InverseEnergy,
    /// E_min / E_ToA on success, in (0, 1]
    NormalizedInverseEnergy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ucb1TunedConfig {
    pub dimensions: Vec<Dimension>,
    pub reward:     RewardShape,
}

impl Default for Ucb1TunedConfig {
    fn default() -> Self {
        Self {
            dimensions: vec![Dimension::Channel, Dimension::Power],
            reward: RewardShape::NormalizedInverseEnergy,
        }
    }
}

// ── Arm statistics ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArmStats {
    pub pulls:         u64,
    pub reward_sum:    f64,
    pub reward_sq_sum: f64,
}

impl ArmStats {
    pub fn record(&mut self, reward: f64) {
        self.pulls += 1;
        self.reward_sum += reward;
        self.reward_sq_sum += reward * reward;
    }

    pub fn mean(&self) -> f64 {
        if self.pulls == 0 {
            0.0
        } else {
            self.reward_sum / self.pulls as f64
        }
    }

    /// Sample variance with Bessel's correction, 0 below two pulls.
    pub fn variance(&self) -> f64 {
        if self.pulls < 2 {
            return 0.0;
        }
        let n = self.pulls as f64;
        let mean = self.reward_sum / n;
        ((self.reward_sq_sum - n * mean * mean) / (n - 1.0)).max(0.0)
    }
}

/// UCB1-Tuned index; infinite for an untried arm.
pub fn tuned_index(stats: &ArmStats, total_plays: u64) -> f64 {
    if stats.pulls == 0 {
        return f64::INFINITY;
    }
    let ln_t = (total_plays.max(1) as f64).ln();
    let n = stats.pulls as f64;
    let v = (stats.variance() + (2.0 * ln_t / n).sqrt()).min(0.25);
    stats.mean() + (ln_t / n * v).sqrt()
}

#[derive(Debug, Clone)]
pub struct Ucb1TunedState {
    pub arms:  Vec<ParameterSet>,
    pub stats: Vec<ArmStats>,
    pub plays: u64,
}

impl Ucb1TunedState {
    pub fn priorities(&self) -> Vec<f64> {
        self.stats.iter().map(|s| tuned_index(s, self.plays)).collect()
    }
}

// ── Policy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Ucb1TunedPolicy {
    cfg: Ucb1TunedConfig,
}

impl Ucb1TunedPolicy {
    pub fn new(cfg: Ucb1TunedConfig) -> Result<Self> {
        validate_dimensions(&cfg.dimensions)?;
        Ok(Self { cfg })
    }

    fn reward(&self, state: &Ucb1TunedState, obs: &ObservationContext<'_>) -> f64 {
        if !obs.outcome.success {
            return 0.0;
        }
        let payload = obs.outcome.payload_bytes;
        let energy = obs.energy.airtime_energy_mj(&obs.tx, payload);
        if energy <= 0.0 {
            return 0.0;
        }
        match self.cfg.reward {
            RewardShape::Binary => 1.0,
            RewardShape::InverseEnergy => 1.0 / energy,
            RewardShape::NormalizedInverseEnergy => {
                let cheapest = state
                    .arms
                    .iter()
                    .filter_map(|arm| obs.catalog.resolve(arm).ok())
                    .map(|tx| obs.energy.airtime_energy_mj(&tx, payload))
                    .fold(energy, f64::min);
                cheapest / energy
            }
        }
    }
}

impl ArmPolicy for Ucb1TunedPolicy {
    type State = Ucb1TunedState;

    fn name(&self) -> &'static str {
        "ucb1_tuned"
    }

    fn energy_model(&self) -> EnergyModel {
        EnergyModel::ActivityPhase
    }

    fn init_state(&self, catalog: &ParameterCatalog) -> Ucb1TunedState {
        let arms = catalog.enumerate(&self.cfg.dimensions);
        let stats = vec![ArmStats::default(); arms.len()];
        Ucb1TunedState { arms, stats, plays: 0 }
    }

    fn select(&self, state: &mut Ucb1TunedState, ctx: &mut SelectionContext<'_>) -> ParameterSet {
        let pulls: Vec<u64> = state.stats.iter().map(|s| s.pulls).collect();
        if let Some(i) = first_untried(&pulls) {
            debug!(device = ctx.device_id, round = ctx.round, arm = %state.arms[i], "ucb1-tuned forced exploration");
            return state.arms[i];
        }
        let i = argmax_first(&state.priorities());
        debug!(device = ctx.device_id, round = ctx.round, arm = %state.arms[i], "ucb1-tuned pick");
        state.arms[i]
    }

    fn observe(&self, state: &mut Ucb1TunedState, obs: &ObservationContext<'_>) {
        let i = obs.catalog.joint_index(&self.cfg.dimensions, &obs.arm);
        if i >= state.stats.len() {
            return;
        }
        let reward = self.reward(state, obs);
        state.stats[i].record(reward);
        state.plays += 1;
    }

    fn pulls(&self, state: &Ucb1TunedState) -> PullCounts {
        pulls_per_arm(&state.arms, state.stats.iter().map(|s| s.pulls))
    }
}
