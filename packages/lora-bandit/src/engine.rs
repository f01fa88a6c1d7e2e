//! engine.rs — Orchestration façade over one selector family
//!
//! The harness drives it once per device per round:
//!   1. `select_parameters(device, round)`  → arm to transmit with
//!   2. harness resolves the arm and asks its outcome oracle
//!   3. `record_outcome(device, arm, outcome)` → ledger + policy update
//!
//! `device_statistics` is a pure read. Device records are created lazily by
//! either mutating call and are never shared between devices.

use std::collections::BTreeMap;
use std::sync::Arc;

use lora_types::{DeviceId, DeviceStatistics, EnergyReading, EnergyUnit, ParameterSet, TransmissionOutcome};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::catalog::ParameterCatalog;
use crate::device::{device_seed, DeviceRecord};
use crate::energy::EnergyParameters;
use crate::error::Result;
use crate::policy::{ArmPolicy, ObservationContext, SelectionContext};

pub struct Engine<P: ArmPolicy> {
    policy:  P,
    catalog: ParameterCatalog,
    energy:  Arc<EnergyParameters>,
    seed:    u64,
    devices: BTreeMap<DeviceId, DeviceRecord<P::State>>,
}

fn record<'a, P: ArmPolicy>(
    devices: &'a mut BTreeMap<DeviceId, DeviceRecord<P::State>>,
    policy: &P,
    catalog: &ParameterCatalog,
    seed: u64,
    device_id: DeviceId,
) -> &'a mut DeviceRecord<P::State> {
    devices.entry(device_id).or_insert_with(|| {
        debug!(device = device_id, policy = policy.name(), "device state created");
        DeviceRecord::new(policy.init_state(catalog), device_seed(seed, device_id))
    })
}

impl<P: ArmPolicy> Engine<P> {
    pub fn new(policy: P, catalog: ParameterCatalog, energy: Arc<EnergyParameters>, seed: u64) -> Result<Self> {
        catalog.validate()?;
        info!(
            policy = policy.name(),
            energy_model = ?policy.energy_model(),
            channels = catalog.channels_khz.len(),
            sfs = catalog.spreading_factors.len(),
            bandwidths = catalog.bandwidths_hz.len(),
            powers = catalog.powers_dbm.len(),
            "engine ready"
        );
        Ok(Self { policy, catalog, energy, seed, devices: BTreeMap::new() })
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn catalog(&self) -> &ParameterCatalog {
        &self.catalog
    }

    pub fn energy_unit(&self) -> EnergyUnit {
        self.policy.energy_model().unit()
    }

    pub fn device_ids(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.devices.keys().copied()
    }

    pub fn device_state(&self, device_id: DeviceId) -> Option<&P::State> {
        self.devices.get(&device_id).map(|r| &r.state)
    }

    /// Replace the device's generator with one seeded from `seed`.
    pub fn seed_device(&mut self, device_id: DeviceId, seed: u64) {
        let r = record(&mut self.devices, &self.policy, &self.catalog, self.seed, device_id);
        r.rng = StdRng::seed_from_u64(seed);
    }

    pub fn set_distance(&mut self, device_id: DeviceId, distance_m: f64) {
        let r = record(&mut self.devices, &self.policy, &self.catalog, self.seed, device_id);
        r.distance_m = Some(distance_m);
    }

    pub fn select_parameters(&mut self, device_id: DeviceId, round: u64) -> ParameterSet {
        let r = record(&mut self.devices, &self.policy, &self.catalog, self.seed, device_id);
        if let Some(last) = r.last_round {
            if round < last {
                warn!(device = device_id, round, last, "round went backwards");
            }
        }
        r.last_round = Some(round);

        let mut ctx = SelectionContext {
            catalog: &self.catalog,
            device_id,
            round,
            rng: &mut r.rng,
            distance_m: r.distance_m,
        };
        self.policy.select(&mut r.state, &mut ctx)
    }

    pub fn record_outcome(&mut self, device_id: DeviceId, arm: ParameterSet, outcome: TransmissionOutcome) -> Result<()> {
        let tx = self.catalog.resolve(&arm)?;
        let cost = self.policy.energy_model().cost(&self.energy, &tx, outcome.payload_bytes);

        let r = record(&mut self.devices, &self.policy, &self.catalog, self.seed, device_id);
        r.ledger.charge(&outcome, &cost);

        let obs = ObservationContext {
            catalog: &self.catalog,
            energy: &self.energy,
            device_id,
            round: r.last_round.unwrap_or(0),
            arm,
            tx,
            outcome,
            cost,
        };
        self.policy.observe(&mut r.state, &obs);

        debug!(
            device = device_id,
            %arm,
            success = outcome.success,
            energy = cost.value,
            unit = cost.unit.symbol(),
            airtime = ?cost.airtime.source,
            "outcome recorded"
        );
        Ok(())
    }

    /// Snapshot for one device. Zeros for a device never seen; no side effects.
    pub fn device_statistics(&self, device_id: DeviceId) -> DeviceStatistics {
        let unit = self.energy_unit();
        match self.devices.get(&device_id) {
            Some(r) => DeviceStatistics {
                device_id,
                pulls: self.policy.pulls(&r.state),
                attempts: r.ledger.attempts,
                successes: r.ledger.successes,
                total_energy: EnergyReading { value: r.ledger.energy, unit },
                total_bits_delivered: r.ledger.bits_delivered,
                pdr: r.ledger.pdr(),
                energy_efficiency_bits_per_joule: r.ledger.energy_efficiency(unit),
                estimated_airtime_lookups: r.ledger.estimated_airtime_lookups,
            },
            None => DeviceStatistics {
                device_id,
                pulls: self.policy.pulls(&self.policy.init_state(&self.catalog)),
                attempts: 0,
                successes: 0,
                total_energy: EnergyReading::zero(unit),
                total_bits_delivered: 0,
                pdr: 0.0,
                energy_efficiency_bits_per_joule: 0.0,
                estimated_airtime_lookups: 0,
            },
        }
    }
}
