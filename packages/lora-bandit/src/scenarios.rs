//! scenarios.rs — Channel-condition presets for the outcome oracle
//!
//! A scenario fixes the ESP each catalog channel sees at the gateway, how
//! that table changes over the run, and which channels the gateway hears.

use serde::{Deserialize, Serialize};

// ESP at the gateway per channel index, dBm at the reference power
const STATIONARY_ESP_DBM: [f64; 8] = [-118.0, -124.0, -116.0, -115.0, -114.0, -116.0, -115.0, -117.0];

const LOCATION_ESP_DBM: [[f64; 8]; 3] = [
    [-118.0, -116.0, -115.0, -114.0, -112.0, -115.0, -114.0, -118.0],
    [-119.0, -120.0, -118.0, -117.0, -119.0, -114.0, -113.0, -115.0],
    [-122.0, -123.0, -121.0, -120.0, -122.0, -117.0, -116.0, -118.0],
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// One fixed ESP table, channel 1 in a deep fade
    Stationary,
    /// ESP table switches location at each third of the run
    NonStationary,
    /// Gateway hears only a few channels; delivery rises with power
    ReceivableSubset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub kind:                ScenarioType,
    /// One ESP table per location, indexed by channel
    pub locations:           Vec<Vec<f64>>,
    /// Channel indices the gateway hears; empty means all
    pub receivable_channels: Vec<usize>,
    /// Delivery probability is `floor + (1 − floor)·logistic`
    pub success_floor:       f64,
    /// Device i sits at `base + i·spacing` metres (cycled over 6 rings)
    pub distance_base_m:     f64,
    pub distance_spacing_m:  f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        preset_stationary()
    }
}

impl ScenarioConfig {
    /// Location index in effect at `round` of a `total_rounds` run.
    pub fn location_at(&self, round: u64, total_rounds: u64) -> usize {
        let n = self.locations.len().max(1);
        if total_rounds == 0 {
            return 0;
        }
        ((round.saturating_mul(n as u64) / total_rounds) as usize).min(n - 1)
    }

    /// Base ESP for `channel` at location `loc`; tables cycle when the
    /// catalog has more channels than the table.
    pub fn esp_dbm(&self, loc: usize, channel: usize) -> f64 {
        match self.locations.get(loc) {
            Some(table) if !table.is_empty() => table[channel % table.len()],
            _ => STATIONARY_ESP_DBM[channel % STATIONARY_ESP_DBM.len()],
        }
    }

    pub fn hears(&self, channel: usize) -> bool {
        self.receivable_channels.is_empty() || self.receivable_channels.contains(&channel)
    }

    pub fn distance_m(&self, device_id: u32) -> f64 {
        self.distance_base_m + (device_id % 6) as f64 * self.distance_spacing_m
    }
}

pub fn preset_stationary() -> ScenarioConfig {
    ScenarioConfig {
        kind: ScenarioType::Stationary,
        locations: vec![STATIONARY_ESP_DBM.to_vec()],
        receivable_channels: vec![],
        success_floor: 0.4,
        distance_base_m: 500.0,
        distance_spacing_m: 0.0,
    }
}

pub fn preset_non_stationary() -> ScenarioConfig {
    ScenarioConfig {
        kind: ScenarioType::NonStationary,
        locations: LOCATION_ESP_DBM.iter().map(|t| t.to_vec()).collect(),
        success_floor: 0.2,
        ..preset_stationary()
    }
}

/// Gateway tuned to channels 1..=3 only; devices spread from 200 m to 1.7 km.
pub fn preset_receivable_subset() -> ScenarioConfig {
    ScenarioConfig {
        kind: ScenarioType::ReceivableSubset,
        locations: vec![vec![-121.0; 8]],
        receivable_channels: vec![1, 2, 3],
        success_floor: 0.0,
        distance_base_m: 200.0,
        distance_spacing_m: 300.0,
    }
}

pub fn preset(name: &str) -> Option<ScenarioConfig> {
    match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "stationary" => Some(preset_stationary()),
        "non_stationary" => Some(preset_non_stationary()),
        "receivable_subset" => Some(preset_receivable_subset()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_switch_at_thirds() {
        let s = preset_non_stationary();
        assert_eq!(s.location_at(0, 300), 0);
        assert_eq!(s.location_at(99, 300), 0);
        assert_eq!(s.location_at(100, 300), 1);
        assert_eq!(s.location_at(200, 300), 2);
        assert_eq!(s.location_at(299, 300), 2);
        assert_eq!(s.location_at(5000, 300), 2);
        assert_eq!(preset_stationary().location_at(250, 300), 0);
    }

    #[test]
    fn tables_cycle_over_wider_catalogs() {
        let s = preset_stationary();
        assert_eq!(s.esp_dbm(0, 1), -124.0);
        assert_eq!(s.esp_dbm(0, 9), -124.0);
    }

    #[test]
    fn subset_gateway_filters_channels() {
        let s = preset_receivable_subset();
        assert!(!s.hears(0));
        assert!(s.hears(2));
        assert!(preset_stationary().hears(7));
        assert_eq!(s.distance_m(5), 1700.0);
    }

    #[test]
    fn preset_names() {
        assert!(preset("non-stationary").is_some());
        assert_eq!(preset("RECEIVABLE_SUBSET").map(|s| s.kind), Some(ScenarioType::ReceivableSubset));
        assert!(preset("urban").is_none());
    }
}
