//! policy.rs — Strategy seam between the engine and the selector families
//!
//! Each family implements `ArmPolicy` with its own `State` type, so a device
//! record only carries the statistics that family needs. The engine owns the
//! ledger, RNG and energy accounting; policies only pick and learn.

use std::fmt::Debug;

use lora_types::{DeviceId, Dimension, ParameterSet, PullCounts, TransmissionOutcome, TxParameters};
use rand::rngs::StdRng;

use crate::catalog::ParameterCatalog;
use crate::energy::{EnergyCost, EnergyModel, EnergyParameters};
use crate::error::{EngineError, Result};

/// Inputs available to a policy when choosing an arm.
pub struct SelectionContext<'a> {
    pub catalog:    &'a ParameterCatalog,
    pub device_id:  DeviceId,
    pub round:      u64,
    pub rng:        &'a mut StdRng,
    /// Device-to-gateway distance, when the harness knows it
    pub distance_m: Option<f64>,
}

/// One resolved transmission, handed back to the policy after the ledger
/// has been charged.
pub struct ObservationContext<'a> {
    pub catalog:   &'a ParameterCatalog,
    pub energy:    &'a EnergyParameters,
    pub device_id: DeviceId,
    pub round:     u64,
    pub arm:       ParameterSet,
    pub tx:        TxParameters,
    pub outcome:   TransmissionOutcome,
    pub cost:      EnergyCost,
}

pub trait ArmPolicy {
    type State: Debug + Clone;

    fn name(&self) -> &'static str;

    /// Energy accounting family this policy is evaluated under.
    fn energy_model(&self) -> EnergyModel;

    fn init_state(&self, catalog: &ParameterCatalog) -> Self::State;

    fn select(&self, state: &mut Self::State, ctx: &mut SelectionContext<'_>) -> ParameterSet;

    fn observe(&self, state: &mut Self::State, obs: &ObservationContext<'_>);

    fn pulls(&self, state: &Self::State) -> PullCounts;
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Index of the largest score, lowest index on ties. NaN never wins.
pub fn argmax_first(scores: &[f64]) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, &s) in scores.iter().enumerate() {
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    best
}

/// Lowest index whose pull count is zero.
pub fn first_untried(pulls: &[u64]) -> Option<usize> {
    pulls.iter().position(|&n| n == 0)
}

pub(crate) fn validate_dimensions(dims: &[Dimension]) -> Result<()> {
    if dims.is_empty() {
        return Err(EngineError::NoDimensions);
    }
    for (i, d) in dims.iter().enumerate() {
        if dims[..i].contains(d) {
            return Err(EngineError::DuplicateDimension(*d));
        }
    }
    Ok(())
}

pub(crate) fn pulls_per_arm(arms: &[ParameterSet], pulls: impl Iterator<Item = u64>) -> PullCounts {
    PullCounts::Joint(arms.iter().copied().zip(pulls).collect())
}
