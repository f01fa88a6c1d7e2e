//! catalog.rs — Discrete parameter catalog and arm enumeration
//!
//! A catalog is four immutable value lists (channel, SF, bandwidth, power).
//! Arms are index tuples into those lists; `enumerate` walks the Cartesian
//! product of the requested dimensions with the first dimension slowest.

use lora_types::{Dimension, ParameterSet, TxParameters};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCatalog {
    pub channels_khz:      Vec<u32>,
    pub spreading_factors: Vec<u8>,
    pub bandwidths_hz:     Vec<u32>,
    pub powers_dbm:        Vec<i8>,
}

/// Named catalogs from the four published evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogPreset {
    Tow,
    Ucb1Tuned,
    Qoca,
    Dlora,
}

impl CatalogPreset {
    pub fn catalog(&self) -> ParameterCatalog {
        match self {
            Self::Tow => ParameterCatalog::tow(),
            Self::Ucb1Tuned => ParameterCatalog::ucb1_tuned(),
            Self::Qoca => ParameterCatalog::qoca(),
            Self::Dlora => ParameterCatalog::dlora(),
        }
    }
}

fn spaced_khz(start_khz: u32, step_khz: u32, count: u32) -> Vec<u32> {
    (0..count).map(|i| start_khz + i * step_khz).collect()
}

impl ParameterCatalog {
    pub fn new(
        channels_khz: Vec<u32>,
        spreading_factors: Vec<u8>,
        bandwidths_hz: Vec<u32>,
        powers_dbm: Vec<i8>,
    ) -> Result<Self> {
        let catalog = Self { channels_khz, spreading_factors, bandwidths_hz, powers_dbm };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        for dim in Dimension::ALL {
            if self.len(dim) == 0 {
                return Err(EngineError::EmptyDimension(dim));
            }
        }
        Ok(())
    }

    /// EU868 default channels, SF7–SF9 at 125 kHz, 14 dBm.
    pub fn tow() -> Self {
        Self {
            channels_khz: vec![868_100, 868_300, 868_500, 867_100, 867_300],
            spreading_factors: vec![7, 8, 9],
            bandwidths_hz: vec![125_000],
            powers_dbm: vec![14],
        }
    }

    /// AS923 channels 920.6–922.2 MHz and five power levels, SF7.
    pub fn ucb1_tuned() -> Self {
        Self {
            channels_khz: spaced_khz(920_600, 400, 5),
            spreading_factors: vec![7],
            bandwidths_hz: vec![125_000],
            powers_dbm: vec![-3, 1, 5, 9, 13],
        }
    }

    /// Eight EU868 channels 867.1–868.5 MHz, SF7.
    pub fn qoca() -> Self {
        Self {
            channels_khz: spaced_khz(867_100, 200, 8),
            spreading_factors: vec![7],
            bandwidths_hz: vec![125_000],
            powers_dbm: vec![14],
        }
    }

    /// CN470 sub-band: full SF, bandwidth and power ranges.
    pub fn dlora() -> Self {
        Self {
            channels_khz: spaced_khz(470_100, 200, 8),
            spreading_factors: vec![7, 8, 9, 10, 11, 12],
            bandwidths_hz: vec![125_000, 250_000, 500_000],
            powers_dbm: vec![2, 4, 6, 8, 10, 12, 14],
        }
    }

    pub fn len(&self, dim: Dimension) -> usize {
        match dim {
            Dimension::Channel => self.channels_khz.len(),
            Dimension::SpreadingFactor => self.spreading_factors.len(),
            Dimension::Bandwidth => self.bandwidths_hz.len(),
            Dimension::Power => self.powers_dbm.len(),
        }
    }

    /// Number of joint arms over `dims`.
    pub fn arm_count(&self, dims: &[Dimension]) -> usize {
        dims.iter().map(|d| self.len(*d)).product()
    }

    /// All joint arms over `dims`, first dimension varying slowest.
    /// Dimensions not listed stay at index 0.
    pub fn enumerate(&self, dims: &[Dimension]) -> Vec<ParameterSet> {
        let total = self.arm_count(dims);
        let mut arms = Vec::with_capacity(total);
        for mut n in 0..total {
            let mut arm = ParameterSet::default();
            for dim in dims.iter().rev() {
                let len = self.len(*dim);
                arm.set(*dim, n % len);
                n /= len;
            }
            arms.push(arm);
        }
        arms
    }

    /// Position of `arm` within `enumerate(dims)`.
    pub fn joint_index(&self, dims: &[Dimension], arm: &ParameterSet) -> usize {
        dims.iter().fold(0, |acc, d| acc * self.len(*d) + arm.index(*d))
    }

    pub fn contains(&self, arm: &ParameterSet) -> bool {
        Dimension::ALL.iter().all(|d| arm.index(*d) < self.len(*d))
    }

    pub fn resolve(&self, arm: &ParameterSet) -> Result<TxParameters> {
        if !self.contains(arm) {
            return Err(EngineError::ArmOutOfCatalog { arm: *arm });
        }
        Ok(TxParameters {
            frequency_khz: self.channels_khz[arm.channel],
            spreading_factor: self.spreading_factors[arm.spreading_factor],
            bandwidth_hz: self.bandwidths_hz[arm.bandwidth],
            tx_power_dbm: self.powers_dbm[arm.power],
        })
    }

    pub fn min_power_index(&self) -> usize {
        index_of_min(&self.powers_dbm)
    }

    pub fn narrowest_bandwidth_index(&self) -> usize {
        index_of_min(&self.bandwidths_hz)
    }

    /// Index of the smallest catalog SF ≥ `sf`, or of the largest SF if none.
    pub fn sf_index_at_least(&self, sf: u8) -> usize {
        let mut best: Option<(usize, u8)> = None;
        for (i, &s) in self.spreading_factors.iter().enumerate() {
            if s >= sf && best.map_or(true, |(_, b)| s < b) {
                best = Some((i, s));
            }
        }
        match best {
            Some((i, _)) => i,
            None => index_of_max(&self.spreading_factors),
        }
    }

    /// Indices of `dim` ordered by ascending value.
    pub fn ascending(&self, dim: Dimension) -> Vec<usize> {
        let mut idx: Vec<usize> = (0..self.len(dim)).collect();
        match dim {
            Dimension::Channel => idx.sort_by_key(|&i| self.channels_khz[i]),
            Dimension::SpreadingFactor => idx.sort_by_key(|&i| self.spreading_factors[i]),
            Dimension::Bandwidth => idx.sort_by_key(|&i| self.bandwidths_hz[i]),
            Dimension::Power => idx.sort_by_key(|&i| self.powers_dbm[i]),
        }
        idx
    }
}

fn index_of_min<T: Ord + Copy>(values: &[T]) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| **v)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn index_of_max<T: Ord + Copy>(values: &[T]) -> usize {
    // first index on ties
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for preset in [CatalogPreset::Tow, CatalogPreset::Ucb1Tuned, CatalogPreset::Qoca, CatalogPreset::Dlora] {
            preset.catalog().validate().unwrap();
        }
        let q = ParameterCatalog::qoca();
        assert_eq!(q.channels_khz.first(), Some(&867_100));
        assert_eq!(q.channels_khz.last(), Some(&868_500));
    }

    #[test]
    fn empty_dimension_rejected() {
        let err = ParameterCatalog::new(vec![868_100], vec![], vec![125_000], vec![14]).unwrap_err();
        assert!(matches!(err, EngineError::EmptyDimension(Dimension::SpreadingFactor)));
    }

    #[test]
    fn enumerate_is_first_dimension_major() {
        let c = ParameterCatalog::ucb1_tuned();
        let arms = c.enumerate(&[Dimension::Channel, Dimension::Power]);
        assert_eq!(arms.len(), 25);
        assert_eq!(arms[0], ParameterSet::default());
        assert_eq!(arms[1], ParameterSet::default().with(Dimension::Power, 1));
        assert_eq!(arms[5], ParameterSet::default().with(Dimension::Channel, 1));
        assert_eq!(arms[24].channel, 4);
        assert_eq!(arms[24].power, 4);
        for (i, arm) in arms.iter().enumerate() {
            assert_eq!(c.joint_index(&[Dimension::Channel, Dimension::Power], arm), i);
        }
    }

    #[test]
    fn resolve_and_reject_foreign_arms() {
        let c = ParameterCatalog::tow();
        let tx = c.resolve(&ParameterSet { channel: 1, spreading_factor: 2, bandwidth: 0, power: 0 }).unwrap();
        assert_eq!(tx.frequency_khz, 868_300);
        assert_eq!(tx.spreading_factor, 9);

        let foreign = ParameterSet::default().with(Dimension::Channel, 5);
        assert!(!c.contains(&foreign));
        assert!(matches!(c.resolve(&foreign), Err(EngineError::ArmOutOfCatalog { .. })));
    }

    #[test]
    fn value_helpers() {
        let c = ParameterCatalog::dlora();
        assert_eq!(c.min_power_index(), 0);
        assert_eq!(c.narrowest_bandwidth_index(), 0);
        assert_eq!(c.sf_index_at_least(9), 2);
        assert_eq!(c.sf_index_at_least(13), 5);

        let tow = ParameterCatalog::tow();
        assert_eq!(tow.ascending(Dimension::Channel), vec![3, 4, 0, 1, 2]);
    }
}
