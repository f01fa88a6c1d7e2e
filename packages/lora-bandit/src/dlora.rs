//! dlora.rs — Per-dimension UCB with metric-shaped rewards (D-LoRa)
//!
//! SF, bandwidth, channel and power are four independent base bandits. Each
//! picks `mean + c·sqrt(ln(total + 1) / (2·n))`, untried arms first. After a
//! transmission every dimension is rewarded 1/0 for delivery plus a shaping
//! bonus for its own value:
//!   - SF:        ξ · 2^SF / Σ 2^SF
//!   - bandwidth: ζ · BW / Σ BW
//!   - power:     η · (1 − P / Σ P)
//! Channel gets the plain delivery reward.

use lora_types::{Dimension, DimensionPulls, ParameterSet, PullCounts};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::ParameterCatalog;
use crate::energy::EnergyModel;
use crate::error::{check_range, Result};
use crate::policy::{
    argmax_first, first_untried, validate_dimensions, ArmPolicy, ObservationContext, SelectionContext,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DloraConfig {
    pub dimensions:  Vec<Dimension>,
    /// Exploration weight c
    pub exploration: f64,
    pub xi:          f64,
    pub zeta:        f64,
    pub eta:         f64,
}

impl Default for DloraConfig {
    fn default() -> Self {
        Self {
            dimensions: vec![
                Dimension::SpreadingFactor,
                Dimension::Bandwidth,
                Dimension::Channel,
                Dimension::Power,
            ],
            exploration: 2.0,
            xi: 0.0,
            zeta: 0.0,
            eta: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DloraDimension {
    pub dimension: Dimension,
    pub pulls:     Vec<u64>,
    pub mean:      Vec<f64>,
}

impl DloraDimension {
    pub fn bounds(&self, exploration: f64) -> Vec<f64> {
        let total: u64 = self.pulls.iter().sum();
        let ln_total = ((total + 1) as f64).ln();
        self.pulls
            .iter()
            .zip(&self.mean)
            .map(|(&n, &m)| {
                if n == 0 {
                    f64::INFINITY
                } else {
                    m + exploration * (ln_total / (2.0 * n as f64)).sqrt()
                }
            })
            .collect()
    }

    fn update(&mut self, k: usize, reward: f64) {
        self.pulls[k] += 1;
        self.mean[k] += (reward - self.mean[k]) / self.pulls[k] as f64;
    }
}

#[derive(Debug, Clone)]
pub struct DloraState {
    pub dims: Vec<DloraDimension>,
}

#[derive(Debug, Clone)]
pub struct DloraPolicy {
    cfg: DloraConfig,
}

impl DloraPolicy {
    pub fn new(cfg: DloraConfig) -> Result<Self> {
        check_range("dlora.exploration", cfg.exploration, 0.0, f64::MAX)?;
        check_range("dlora.xi", cfg.xi, 0.0, f64::MAX)?;
        check_range("dlora.zeta", cfg.zeta, 0.0, f64::MAX)?;
        check_range("dlora.eta", cfg.eta, 0.0, f64::MAX)?;
        validate_dimensions(&cfg.dimensions)?;
        Ok(Self { cfg })
    }

    /// Delivery reward plus the shaping bonus for `dim` at index `k`.
    pub fn shaped_reward(&self, catalog: &ParameterCatalog, dim: Dimension, k: usize, success: bool) -> f64 {
        let base = if success { 1.0 } else { 0.0 };
        let bonus = match dim {
            Dimension::SpreadingFactor if self.cfg.xi > 0.0 => {
                let sum: f64 = catalog.spreading_factors.iter().map(|&s| 2f64.powi(s as i32)).sum();
                self.cfg.xi * 2f64.powi(catalog.spreading_factors[k] as i32) / sum
            }
            Dimension::Bandwidth if self.cfg.zeta > 0.0 => {
                let sum: f64 = catalog.bandwidths_hz.iter().map(|&b| b as f64).sum();
                self.cfg.zeta * catalog.bandwidths_hz[k] as f64 / sum
            }
            Dimension::Power if self.cfg.eta > 0.0 => {
                let sum: f64 = catalog.powers_dbm.iter().map(|&p| p as f64).sum();
                if sum == 0.0 {
                    0.0
                } else {
                    self.cfg.eta * (1.0 - catalog.powers_dbm[k] as f64 / sum)
                }
            }
            _ => 0.0,
        };
        base + bonus
    }
}

impl ArmPolicy for DloraPolicy {
    type State = DloraState;

    fn name(&self) -> &'static str {
        "dlora"
    }

    fn energy_model(&self) -> EnergyModel {
        EnergyModel::RadiatedPower
    }

    fn init_state(&self, catalog: &ParameterCatalog) -> DloraState {
        DloraState {
            dims: self
                .cfg
                .dimensions
                .iter()
                .map(|&d| DloraDimension {
                    dimension: d,
                    pulls: vec![0; catalog.len(d)],
                    mean: vec![0.0; catalog.len(d)],
                })
                .collect(),
        }
    }

    fn select(&self, state: &mut DloraState, ctx: &mut SelectionContext<'_>) -> ParameterSet {
        let mut arm = ParameterSet::default();
        for dim in &state.dims {
            let k = match first_untried(&dim.pulls) {
                Some(k) => k,
                None => argmax_first(&dim.bounds(self.cfg.exploration)),
            };
            arm.set(dim.dimension, k);
        }
        debug!(device = ctx.device_id, round = ctx.round, %arm, "dlora pick");
        arm
    }

    fn observe(&self, state: &mut DloraState, obs: &ObservationContext<'_>) {
        for dim in &mut state.dims {
            let k = obs.arm.index(dim.dimension);
            if k >= dim.pulls.len() {
                continue;
            }
            let reward = self.shaped_reward(obs.catalog, dim.dimension, k, obs.outcome.success);
            dim.update(k, reward);
        }
    }

    fn pulls(&self, state: &DloraState) -> PullCounts {
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

    #[test]
    fn shaping_terms() {
        let catalog = ParameterCatalog::dlora();
        let policy = DloraPolicy::new(DloraConfig { xi: 1.0, zeta: 1.0, eta: 1.0, ..DloraConfig::default() }).unwrap();

        // Σ 2^s for s = 7..=12 is 8064; SF12 is 4096 of it
        let r = policy.shaped_reward(&catalog, Dimension::SpreadingFactor, 5, true);
        assert!((r - (1.0 + 4096.0 / 8064.0)).abs() < 1e-12);

        // 125 / (125 + 250 + 500)
        let r = policy.shaped_reward(&catalog, Dimension::Bandwidth, 0, false);
        assert!((r - 125.0 / 875.0).abs() < 1e-12);

        // 1 − 2/56
        let r = policy.shaped_reward(&catalog, Dimension::Power, 0, true);
        assert!((r - (2.0 - 2.0 / 56.0)).abs() < 1e-12);

        assert_eq!(policy.shaped_reward(&catalog, Dimension::Channel, 3, true), 1.0);
    }

    #[test]
    fn unshaped_by_default() {
        let catalog = ParameterCatalog::dlora();
        let policy = DloraPolicy::new(DloraConfig::default()).unwrap();
        for dim in Dimension::ALL {
            assert_eq!(policy.shaped_reward(&catalog, dim, 0, true), 1.0);
            assert_eq!(policy.shaped_reward(&catalog, dim, 0, false), 0.0);
        }
    }

    #[test]
    fn incremental_mean_and_bounds() {
        let mut d = DloraDimension { dimension: Dimension::Channel, pulls: vec![0, 0], mean: vec![0.0, 0.0] };
        d.update(0, 1.0);
        d.update(0, 0.0);
        assert!((d.mean[0] - 0.5).abs() < 1e-12);
        let b = d.bounds(2.0);
        assert!((b[0] - (0.5 + 2.0 * (3f64.ln() / 4.0).sqrt())).abs() < 1e-12);
        assert!(b[1].is_infinite());
    }
}
