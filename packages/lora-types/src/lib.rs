//! # lora-types
//!
//! Shared transmission-parameter structures for the LoRa bandit engine.
//!
//! These types are used by:
//! - `lora-bandit`: the selection engine (arms, outcomes, statistics)
//! - `lora-sim`: the demonstration harness that resolves arms against a
//!   synthetic channel and prints per-device summaries
//! - any reporting layer that consumes `DeviceStatistics` as JSON
//!
//! ## Conventions
//!
//! - An arm (`ParameterSet`) is four catalog *indices*, never raw values.
//!   The catalog resolves an arm into concrete `TxParameters`.
//! - Frequencies are kHz, bandwidths Hz, powers dBm, payloads bytes.
//! - Energy totals always travel with their `EnergyUnit`; the two published
//!   accounting families (mJ and mWh) are never added together.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer device identifier, caller-assigned.
pub type DeviceId = u32;

// ── Dimensions ────────────────────────────────────────────────────────────────

/// One selectable axis of the transmission-parameter space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Channel,
    SpreadingFactor,
    Bandwidth,
    Power,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::Channel,
        Dimension::SpreadingFactor,
        Dimension::Bandwidth,
        Dimension::Power,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::SpreadingFactor => "spreading_factor",
            Self::Bandwidth => "bandwidth",
            Self::Power => "power",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Arms ──────────────────────────────────────────────────────────────────────

/// One selectable combination, as catalog indices.
///
/// Dimensions a policy does not learn over stay at index 0 unless the policy's
/// rule pins them elsewhere (minimum power, distance-derived SF).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ParameterSet {
    pub channel:          usize,
    pub spreading_factor: usize,
    pub bandwidth:        usize,
    pub power:            usize,
}

impl ParameterSet {
    pub fn index(&self, dim: Dimension) -> usize {
        match dim {
            Dimension::Channel => self.channel,
            Dimension::SpreadingFactor => self.spreading_factor,
            Dimension::Bandwidth => self.bandwidth,
            Dimension::Power => self.power,
        }
    }

    pub fn set(&mut self, dim: Dimension, index: usize) {
        match dim {
            Dimension::Channel => self.channel = index,
            Dimension::SpreadingFactor => self.spreading_factor = index,
            Dimension::Bandwidth => self.bandwidth = index,
            Dimension::Power => self.power = index,
        }
    }

    pub fn with(mut self, dim: Dimension, index: usize) -> Self {
        self.set(dim, index);
        self
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ch{}/sf{}/bw{}/tp{}",
            self.channel, self.spreading_factor, self.bandwidth, self.power
        )
    }
}

/// Concrete radio settings an arm resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TxParameters {
    pub frequency_khz:    u32,
    pub spreading_factor: u8,
    pub bandwidth_hz:     u32,
    pub tx_power_dbm:     i8,
}

impl TxParameters {
    pub fn bandwidth_khz(&self) -> u32 {
        self.bandwidth_hz / 1000
    }

    /// Radiated power in milliwatts (10^(dBm/10)).
    pub fn tx_power_mw(&self) -> f64 {
        dbm_to_mw(self.tx_power_dbm as f64)
    }
}

pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// What the transmission-outcome oracle reports for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransmissionOutcome {
    pub success:       bool,
    pub payload_bytes: u32,
    /// Channel-condition metric in linear units (e.g. ESP in mW), if measured
    #[serde(default)]
    pub quality:       Option<f64>,
}

impl TransmissionOutcome {
    pub fn delivered(payload_bytes: u32) -> Self {
        Self { success: true, payload_bytes, quality: None }
    }

    pub fn lost(payload_bytes: u32) -> Self {
        Self { success: false, payload_bytes, quality: None }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality);
        self
    }
}

// ── Energy ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyUnit {
    Millijoule,
    MilliwattHour,
}

impl EnergyUnit {
    pub fn to_joules(&self, value: f64) -> f64 {
        match self {
            Self::Millijoule => value / 1000.0,
            // 1 mWh = 3.6 J
            Self::MilliwattHour => value * 3.6,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Millijoule => "mJ",
            Self::MilliwattHour => "mWh",
        }
    }
}

/// An energy total tagged with the unit of the model that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyReading {
    pub value: f64,
    pub unit:  EnergyUnit,
}

impl EnergyReading {
    pub fn zero(unit: EnergyUnit) -> Self {
        Self { value: 0.0, unit }
    }

    pub fn joules(&self) -> f64 {
        self.unit.to_joules(self.value)
    }
}

impl fmt::Display for EnergyReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} {}", self.value, self.unit.symbol())
    }
}

// ── Statistics ────────────────────────────────────────────────────────────────

/// Pull counts for one independently learned dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionPulls {
    pub dimension: Dimension,
    pub counts:    Vec<u64>,
}

/// Per-arm pull counts, shaped by how the policy learns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "arms", rename_all = "snake_case")]
pub enum PullCounts {
    /// One counter per joint arm
    Joint(Vec<(ParameterSet, u64)>),
    /// Separate counter vectors per dimension
    PerDimension(Vec<DimensionPulls>),
}

impl PullCounts {
    /// Sum of pulls for each independently counted vector.
    pub fn totals(&self) -> Vec<u64> {
        match self {
            Self::Joint(arms) => vec![arms.iter().map(|(_, n)| n).sum()],
            Self::PerDimension(dims) => dims.iter().map(|d| d.counts.iter().sum()).collect(),
        }
    }
}

/// Read-only snapshot returned by the statistics query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatistics {
    pub device_id:                        DeviceId,
    pub pulls:                            PullCounts,
    pub attempts:                         u64,
    pub successes:                        u64,
    pub total_energy:                     EnergyReading,
    pub total_bits_delivered:             u64,
    /// successes / attempts, 0 with no attempts
    pub pdr:                              f64,
    /// delivered bits per joule, 0 with no energy spent
    pub energy_efficiency_bits_per_joule: f64,
    /// Attempts whose airtime came from the estimate rather than the table
    pub estimated_airtime_lookups:        u64,
}
