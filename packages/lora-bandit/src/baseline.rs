//! baseline.rs — Non-learning comparators
//!
//! None of these keep reward statistics. Rotation-based baselines keep a
//! cursor; all of them count pulls so the statistics query stays uniform.

use std::collections::BTreeMap;

use lora_types::{Dimension, ParameterSet, PullCounts};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ParameterCatalog;
use crate::energy::EnergyModel;
use crate::error::Result;
use crate::policy::{validate_dimensions, ArmPolicy, ObservationContext, SelectionContext};

fn default_rotation_dims() -> Vec<Dimension> {
    vec![Dimension::Channel]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineKind {
    /// Uniform draw per dimension every round
    Random {
        #[serde(default = "default_rotation_dims")]
        dimensions: Vec<Dimension>,
    },
    /// Joint rotation starting at device_id mod |arms|
    RoundRobin {
        #[serde(default = "default_rotation_dims")]
        dimensions: Vec<Dimension>,
        #[serde(default = "default_true")]
        min_power:  bool,
    },
    /// One channel per device from `allowed_channels` (all when empty), min power
    Fixed {
        #[serde(default)]
        allowed_channels: Vec<usize>,
    },
    /// SF from a distance step function, narrowest bandwidth, min power
    DistanceGreedy,
    /// Halving walk over (power, channel) pairs driven by delivery
    AdrLite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub kind:         BaselineKind,
    pub energy_model: EnergyModel,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            kind: BaselineKind::RoundRobin { dimensions: default_rotation_dims(), min_power: true },
            energy_model: EnergyModel::TablePower,
        }
    }
}

/// ADR-style SF for a device `distance_m` from its gateway.
pub fn adr_spreading_factor(distance_m: f64) -> u8 {
    match distance_m {
        d if d < 500.0 => 7,
        d if d < 800.0 => 8,
        d if d < 1100.0 => 9,
        d if d < 1400.0 => 10,
        d if d < 1700.0 => 11,
        _ => 12,
    }
}

/// (power, channel) pairs, power ascending then channels in catalog order.
pub fn adr_ladder(catalog: &ParameterCatalog) -> Vec<ParameterSet> {
    let mut ladder = Vec::with_capacity(catalog.arm_count(&[Dimension::Power, Dimension::Channel]));
    for p in catalog.ascending(Dimension::Power) {
        for c in 0..catalog.len(Dimension::Channel) {
            ladder.push(ParameterSet { channel: c, power: p, ..ParameterSet::default() });
        }
    }
    ladder
}

#[derive(Debug, Clone, Default)]
pub struct BaselineState {
    pub cursor: Option<usize>,
    pub pulls:  BTreeMap<ParameterSet, u64>,
}

#[derive(Debug, Clone)]
pub struct BaselinePolicy {
    cfg: BaselineConfig,
}

impl BaselinePolicy {
    pub fn new(cfg: BaselineConfig) -> Result<Self> {
        match &cfg.kind {
            BaselineKind::Random { dimensions } | BaselineKind::RoundRobin { dimensions, .. } => {
                validate_dimensions(dimensions)?
            }
            _ => {}
        }
        Ok(Self { cfg })
    }

    pub fn kind(&self) -> &BaselineKind {
        &self.cfg.kind
    }
}

impl ArmPolicy for BaselinePolicy {
    type State = BaselineState;

    fn name(&self) -> &'static str {
        match self.cfg.kind {
            BaselineKind::Random { .. } => "random",
            BaselineKind::RoundRobin { .. } => "round_robin",
            BaselineKind::Fixed { .. } => "fixed",
            BaselineKind::DistanceGreedy => "distance_greedy",
            BaselineKind::AdrLite => "adr_lite",
        }
    }

    fn energy_model(&self) -> EnergyModel {
        self.cfg.energy_model
    }

    fn init_state(&self, _catalog: &ParameterCatalog) -> BaselineState {
        BaselineState::default()
    }

    fn select(&self, state: &mut BaselineState, ctx: &mut SelectionContext<'_>) -> ParameterSet {
        let catalog = ctx.catalog;
        let arm = match &self.cfg.kind {
            BaselineKind::Random { dimensions } => {
                let mut arm = ParameterSet::default();
                for &d in dimensions {
                    arm.set(d, ctx.rng.gen_range(0..catalog.len(d)));
                }
                arm
            }
            BaselineKind::RoundRobin { dimensions, min_power } => {
                let arms = catalog.enumerate(dimensions);
                let idx = state.cursor.unwrap_or(ctx.device_id as usize % arms.len());
                state.cursor = Some((idx + 1) % arms.len());
                let mut arm = arms[idx];
                if *min_power && !dimensions.contains(&Dimension::Power) {
                    arm.power = catalog.min_power_index();
                }
                arm
            }
            BaselineKind::Fixed { allowed_channels } => {
                let id = ctx.device_id as usize;
                let valid: Vec<usize> = allowed_channels
                    .iter()
                    .copied()
                    .filter(|&c| c < catalog.len(Dimension::Channel))
                    .collect();
                let channel = if valid.is_empty() {
                    id % catalog.len(Dimension::Channel)
                } else {
                    valid[id % valid.len()]
                };
                ParameterSet { channel, power: catalog.min_power_index(), ..ParameterSet::default() }
            }
            BaselineKind::DistanceGreedy => {
                let target = ctx.distance_m.map_or(7, adr_spreading_factor);
                ParameterSet {
                    channel: ctx.rng.gen_range(0..catalog.len(Dimension::Channel)),
                    spreading_factor: catalog.sf_index_at_least(target),
                    bandwidth: catalog.narrowest_bandwidth_index(),
                    power: catalog.min_power_index(),
                }
            }
            BaselineKind::AdrLite => {
                let ladder = adr_ladder(catalog);
                let idx = state.cursor.unwrap_or(ladder.len() - 1).min(ladder.len() - 1);
                state.cursor = Some(idx);
                ladder[idx]
            }
        };
        debug!(device = ctx.device_id, round = ctx.round, %arm, "{} pick", self.name());
        arm
    }

    fn observe(&self, state: &mut BaselineState, obs: &ObservationContext<'_>) {
        *state.pulls.entry(obs.arm).or_insert(0) += 1;

        if matches!(self.cfg.kind, BaselineKind::AdrLite) {
            let len = obs.catalog.arm_count(&[Dimension::Power, Dimension::Channel]);
            let idx = state.cursor.unwrap_or(len - 1);
            let next = if obs.outcome.success { idx / 2 } else { (idx + len) / 2 };
            state.cursor = Some(next.min(len - 1));
        }
    }

    fn pulls(&self, state: &BaselineState) -> PullCounts {
        PullCounts::Joint(state.pulls.iter().map(|(a, n)| (*a, *n)).collect())
    }
}
