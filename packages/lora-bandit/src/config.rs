//! config.rs — Engine configuration loaded from TOML
//!
//! Every section is optional; missing values fall back to the published
//! defaults of each algorithm. Sections:
//!   [engine]     seed, algorithm
//!   [catalog]    preset and/or explicit value lists
//!   [energy]     EnergyParameters (+ [[energy.airtime_table]] rows)
//!   [tow] [ucb1_tuned] [qoca] [dqoca] [ucb] [dlora] [baseline]

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use lora_types::Dimension;

use crate::baseline::BaselineConfig;
use crate::catalog::{CatalogPreset, ParameterCatalog};
use crate::dlora::DloraConfig;
use crate::energy::EnergyParameters;
use crate::error::Result;
use crate::qoca::{Estimator, QocaConfig};
use crate::tow::TowConfig;
use crate::ucb1_tuned::Ucb1TunedConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Tow,
    Ucb1Tuned,
    Qoca,
    Dqoca,
    Ucb,
    Dlora,
    Baseline,
}

impl Algorithm {
    pub const ALL: [Algorithm; 7] = [
        Algorithm::Tow,
        Algorithm::Ucb1Tuned,
        Algorithm::Qoca,
        Algorithm::Dqoca,
        Algorithm::Ucb,
        Algorithm::Dlora,
        Algorithm::Baseline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tow => "tow",
            Self::Ucb1Tuned => "ucb1_tuned",
            Self::Qoca => "qoca",
            Self::Dqoca => "dqoca",
            Self::Ucb => "ucb",
            Self::Dlora => "dlora",
            Self::Baseline => "baseline",
        }
    }

    /// Catalog the algorithm was evaluated on.
    pub fn default_catalog(&self) -> CatalogPreset {
        match self {
            Self::Tow => CatalogPreset::Tow,
            Self::Ucb1Tuned => CatalogPreset::Ucb1Tuned,
            Self::Qoca | Self::Dqoca | Self::Ucb | Self::Baseline => CatalogPreset::Qoca,
            Self::Dlora => CatalogPreset::Dlora,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAlgorithm(pub String);

impl fmt::Display for UnknownAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown algorithm '{}'", self.0)
    }
}

impl std::error::Error for UnknownAlgorithm {}

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| UnknownAlgorithm(s.to_string()))
    }
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub seed:      u64,
    pub algorithm: Algorithm,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self { seed: 1, algorithm: Algorithm::Tow }
    }
}

/// Preset plus optional per-dimension overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub preset:            Option<CatalogPreset>,
    pub channels_khz:      Option<Vec<u32>>,
    pub spreading_factors: Option<Vec<u8>>,
    pub bandwidths_hz:     Option<Vec<u32>>,
    pub powers_dbm:        Option<Vec<i8>>,
}

impl CatalogSection {
    pub fn build(&self, algorithm: Algorithm) -> Result<ParameterCatalog> {
        let mut catalog = self.preset.unwrap_or_else(|| algorithm.default_catalog()).catalog();
        if let Some(v) = &self.channels_khz {
            catalog.channels_khz = v.clone();
        }
        if let Some(v) = &self.spreading_factors {
            catalog.spreading_factors = v.clone();
        }
        if let Some(v) = &self.bandwidths_hz {
            catalog.bandwidths_hz = v.clone();
        }
        if let Some(v) = &self.powers_dbm {
            catalog.powers_dbm = v.clone();
        }
        catalog.validate()?;
        Ok(catalog)
    }
}

/// `[qoca]`, `[dqoca]` and `[ucb]` as written; unset keys come from the
/// section's own preset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QocaSection {
    pub dimensions: Option<Vec<Dimension>>,
    pub alpha:      Option<f64>,
    pub beta:       Option<f64>,
    pub estimator:  Option<Estimator>,
}

impl QocaSection {
    pub fn onto(self, preset: QocaConfig) -> QocaConfig {
        QocaConfig {
            dimensions: self.dimensions.unwrap_or(preset.dimensions),
            alpha: self.alpha.unwrap_or(preset.alpha),
            beta: self.beta.unwrap_or(preset.beta),
            estimator: self.estimator.unwrap_or(preset.estimator),
        }
    }
}

fn qoca_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<QocaConfig, D::Error> {
    QocaSection::deserialize(d).map(|s| s.onto(QocaConfig::qoca()))
}

fn dqoca_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<QocaConfig, D::Error> {
    QocaSection::deserialize(d).map(|s| s.onto(QocaConfig::dqoca()))
}

fn ucb_section<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<QocaConfig, D::Error> {
    QocaSection::deserialize(d).map(|s| s.onto(QocaConfig::ucb()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine:     EngineSection,
    pub catalog:    CatalogSection,
    pub energy:     EnergyParameters,
    pub tow:        TowConfig,
    pub ucb1_tuned: Ucb1TunedConfig,
    #[serde(default = "QocaConfig::qoca", deserialize_with = "qoca_section")]
    pub qoca:       QocaConfig,
    #[serde(default = "QocaConfig::dqoca", deserialize_with = "dqoca_section")]
    pub dqoca:      QocaConfig,
    #[serde(default = "QocaConfig::ucb", deserialize_with = "ucb_section")]
    pub ucb:        QocaConfig,
    pub dlora:      DloraConfig,
    pub baseline:   BaselineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: EngineSection::default(),
            catalog: CatalogSection::default(),
            energy: EnergyParameters::default(),
            tow: TowConfig::default(),
            ucb1_tuned: Ucb1TunedConfig::default(),
            qoca: QocaConfig::qoca(),
            dqoca: QocaConfig::dqoca(),
            ucb: QocaConfig::ucb(),
            dlora: DloraConfig::default(),
            baseline: BaselineConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn catalog(&self) -> Result<ParameterCatalog> {
        self.catalog.build(self.engine.algorithm)
    }
}
