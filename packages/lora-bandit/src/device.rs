//! device.rs — Per-device record: policy state, delivery ledger, RNG
//!
//! PDR and energy efficiency are never stored; they are derived from the
//! ledger on every read.

use lora_types::{EnergyUnit, TransmissionOutcome};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use crate::energy::{energy_efficiency, AirtimeSource, EnergyCost};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryLedger {
    pub attempts:                  u64,
    pub successes:                 u64,
    /// In the owning policy's energy unit
    pub energy:                    f64,
    pub bits_delivered:            u64,
    pub estimated_airtime_lookups: u64,
}

impl DeliveryLedger {
    pub fn charge(&mut self, outcome: &TransmissionOutcome, cost: &EnergyCost) {
        self.attempts += 1;
        if outcome.success {
            self.successes += 1;
            self.bits_delivered += outcome.payload_bytes as u64 * 8;
        }
        if cost.value.is_finite() && cost.value >= 0.0 {
            self.energy += cost.value;
        } else {
            warn!(value = cost.value, "non-finite or negative energy cost ignored");
        }
        if cost.airtime.source == AirtimeSource::Estimated {
            self.estimated_airtime_lookups += 1;
        }
    }

    pub fn pdr(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }

    pub fn energy_efficiency(&self, unit: EnergyUnit) -> f64 {
        energy_efficiency(self.bits_delivered, self.energy, unit)
    }
}

/// splitmix64 finaliser over (seed, device id).
pub fn device_seed(seed: u64, device_id: u32) -> u64 {
    let mut z = seed ^ (device_id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone)]
pub struct DeviceRecord<S> {
    pub state:      S,
    pub ledger:     DeliveryLedger,
    pub rng:        StdRng,
    pub last_round: Option<u64>,
    pub distance_m: Option<f64>,
}

impl<S> DeviceRecord<S> {
    pub fn new(state: S, rng_seed: u64) -> Self {
        Self {
            state,
            ledger: DeliveryLedger::default(),
            rng: StdRng::seed_from_u64(rng_seed),
            last_round: None,
            distance_m: None,
        }
    }
}
