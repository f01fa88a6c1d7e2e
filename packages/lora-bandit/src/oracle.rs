//! oracle.rs — Synthetic transmission-outcome oracle
//!
//! Per transmission:
//!   1. ESP = scenario table + power offset − distance loss + N(0, σ) shadowing
//!   2. sensitivity threshold drops 2.5 dB per SF step above SF7
//!   3. P(deliver) = floor + (1 − floor) · logistic((ESP − threshold) / scale)
//!   4. quality reported back is ESP in linear mW, delivered or not
//!
//! Channels the gateway does not listen on never deliver.

use lora_types::{dbm_to_mw, DeviceId, TransmissionOutcome, TxParameters};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use tracing::trace;

use crate::scenarios::ScenarioConfig;

pub trait OutcomeOracle {
    fn transmit(&mut self, device_id: DeviceId, round: u64, tx: &TxParameters) -> TransmissionOutcome;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub shadowing_sigma_db:      f64,
    pub threshold_dbm:           f64,
    pub sf_gain_db:              f64,
    pub logistic_scale_db:       f64,
    /// Power at which the scenario tables were measured
    pub reference_power_dbm:     f64,
    pub distance_loss_db_per_km: f64,
    pub reference_distance_m:    f64,
    pub payload_min_bytes:       u32,
    pub payload_max_bytes:       u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            shadowing_sigma_db: 1.5,
            threshold_dbm: -120.0,
            sf_gain_db: 2.5,
            logistic_scale_db: 2.5,
            reference_power_dbm: 14.0,
            distance_loss_db_per_km: 6.0,
            reference_distance_m: 500.0,
            payload_min_bytes: 50,
            payload_max_bytes: 50,
        }
    }
}

pub fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub struct SyntheticChannel {
    cfg:          ChannelConfig,
    scenario:     ScenarioConfig,
    channels_khz: Vec<u32>,
    total_rounds: u64,
    shadowing:    Normal<f64>,
    rng:          StdRng,
}

impl SyntheticChannel {
    pub fn new(
        cfg: ChannelConfig,
        scenario: ScenarioConfig,
        channels_khz: Vec<u32>,
        total_rounds: u64,
        seed: u64,
    ) -> anyhow::Result<Self> {
        let shadowing = Normal::new(0.0, cfg.shadowing_sigma_db)
            .map_err(|e| anyhow::anyhow!("shadowing_sigma_db {}: {e}", cfg.shadowing_sigma_db))?;
        anyhow::ensure!(
            cfg.payload_min_bytes <= cfg.payload_max_bytes,
            "payload_min_bytes {} exceeds payload_max_bytes {}",
            cfg.payload_min_bytes,
            cfg.payload_max_bytes
        );
        Ok(Self { cfg, scenario, channels_khz, total_rounds, shadowing, rng: StdRng::seed_from_u64(seed) })
    }

    fn channel_index(&self, frequency_khz: u32) -> usize {
        self.channels_khz.iter().position(|&f| f == frequency_khz).unwrap_or(0)
    }

    /// Mean ESP before shadowing.
    pub fn mean_esp_dbm(&self, device_id: DeviceId, round: u64, tx: &TxParameters) -> f64 {
        let loc = self.scenario.location_at(round, self.total_rounds);
        let base = self.scenario.esp_dbm(loc, self.channel_index(tx.frequency_khz));
        let power = tx.tx_power_dbm as f64 - self.cfg.reference_power_dbm;
        let distance_km = (self.scenario.distance_m(device_id) - self.cfg.reference_distance_m) / 1000.0;
        base + power - self.cfg.distance_loss_db_per_km * distance_km
    }

    pub fn threshold_dbm(&self, sf: u8) -> f64 {
        self.cfg.threshold_dbm - (sf as f64 - 7.0) * self.cfg.sf_gain_db
    }

    pub fn delivery_probability(&self, esp_dbm: f64, sf: u8) -> f64 {
        let p = logistic((esp_dbm - self.threshold_dbm(sf)) / self.cfg.logistic_scale_db);
        let floor = self.scenario.success_floor.clamp(0.0, 1.0);
        floor + (1.0 - floor) * p
    }
}

impl OutcomeOracle for SyntheticChannel {
    fn transmit(&mut self, device_id: DeviceId, round: u64, tx: &TxParameters) -> TransmissionOutcome {
        let payload = self.rng.gen_range(self.cfg.payload_min_bytes..=self.cfg.payload_max_bytes);
        let channel = self.channel_index(tx.frequency_khz);
        if !self.scenario.hears(channel) {
            return TransmissionOutcome::lost(payload);
        }

        let esp = self.mean_esp_dbm(device_id, round, tx) + self.shadowing.sample(&mut self.rng);
        let p = self.delivery_probability(esp, tx.spreading_factor);
        let success = self.rng.gen::<f64>() < p;
        trace!(device = device_id, round, channel, esp, p, success, "transmission");

        let outcome = if success { TransmissionOutcome::delivered(payload) } else { TransmissionOutcome::lost(payload) };
        outcome.with_quality(dbm_to_mw(esp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::{preset_receivable_subset, preset_stationary};

    fn tx(frequency_khz: u32, sf: u8, power: i8) -> TxParameters {
        TxParameters { frequency_khz, spreading_factor: sf, bandwidth_hz: 125_000, tx_power_dbm: power }
    }

    fn channels() -> Vec<u32> {
        (0..8).map(|i| 867_100 + i * 200).collect()
    }

    #[test]
    fn faded_channel_delivers_less() {
        let ch = SyntheticChannel::new(ChannelConfig::default(), preset_stationary(), channels(), 100, 1).unwrap();
        let good = ch.mean_esp_dbm(0, 0, &tx(867_900, 7, 14));
        let faded = ch.mean_esp_dbm(0, 0, &tx(867_300, 7, 14));
        assert_eq!(good, -114.0);
        assert_eq!(faded, -124.0);
        assert!(ch.delivery_probability(good, 7) > ch.delivery_probability(faded, 7));
        // floor of the stationary preset
        assert!(ch.delivery_probability(-200.0, 7) >= 0.4);
    }

    #[test]
    fn higher_sf_lowers_threshold() {
        let ch = SyntheticChannel::new(ChannelConfig::default(), preset_stationary(), channels(), 100, 1).unwrap();
        assert_eq!(ch.threshold_dbm(7), -120.0);
        assert_eq!(ch.threshold_dbm(9), -125.0);
    }

    #[test]
    fn unheard_channels_never_deliver() {
        let mut ch =
            SyntheticChannel::new(ChannelConfig::default(), preset_receivable_subset(), channels(), 100, 3).unwrap();
        for round in 0..50 {
            let o = ch.transmit(0, round, &tx(867_100, 7, 14));
            assert!(!o.success);
            assert_eq!(o.quality, None);
        }
    }

    #[test]
    fn power_raises_subset_delivery() {
        let ch =
            SyntheticChannel::new(ChannelConfig::default(), preset_receivable_subset(), channels(), 100, 3).unwrap();
        let low = ch.mean_esp_dbm(1, 0, &tx(867_300, 7, -3));
        let high = ch.mean_esp_dbm(1, 0, &tx(867_300, 7, 13));
        assert!(ch.delivery_probability(high, 7) > ch.delivery_probability(low, 7));
    }

    #[test]
    fn heard_attempts_carry_linear_quality() {
        let cfg = ChannelConfig { shadowing_sigma_db: 0.0, ..ChannelConfig::default() };
        let mut ch = SyntheticChannel::new(cfg, preset_stationary(), channels(), 100, 5).unwrap();
        let mut delivered = 0;
        for round in 0..200 {
            let o = ch.transmit(0, round, &tx(867_900, 7, 14));
            assert_eq!(o.payload_bytes, 50);
            let q = o.quality.unwrap();
            assert!((q - dbm_to_mw(-114.0)).abs() < 1e-18);
            if o.success {
                delivered += 1;
            }
        }
        assert!(delivered > 100);

        // deep fade at -124 dBm: lost attempts still report their ESP
        let cfg = ChannelConfig { shadowing_sigma_db: 0.0, ..ChannelConfig::default() };
        let mut ch = SyntheticChannel::new(cfg, preset_stationary(), channels(), 100, 9).unwrap();
        let mut lost = 0;
        for round in 0..200 {
            let o = ch.transmit(0, round, &tx(867_300, 7, 14));
            if !o.success {
                lost += 1;
                assert!((o.quality.unwrap() - dbm_to_mw(-124.0)).abs() < 1e-18);
            }
        }
        assert!(lost > 0);
    }

    #[test]
    fn bad_payload_range_rejected() {
        let cfg = ChannelConfig { payload_min_bytes: 60, payload_max_bytes: 40, ..ChannelConfig::default() };
        assert!(SyntheticChannel::new(cfg, preset_stationary(), channels(), 10, 0).is_err());
    }
}
