//! lora-bandit — Adaptive LoRa transmission-parameter selection
//!
//! Each end device runs its own online learner over a discrete catalog of
//! (channel, SF, bandwidth, power) combinations and is charged an airtime
//! based energy cost for every transmission it reports back.
//!
//! Selector families:
//!   - ToW           tug-of-war dynamics, per-dimension, oscillation driven
//!   - UCB1-Tuned    variance-aware UCB over the joint channel × power space
//!   - QoC-A/DQoC-A  UCB with a channel-quality term, stationary or discounted
//!   - D-LoRa        per-dimension UCB with metric-shaped rewards
//!   - baselines     random, round-robin, fixed, distance-greedy, ADR-Lite
//!
//! `Engine` is the façade: select_parameters / record_outcome /
//! device_statistics, generic over any `ArmPolicy`.

pub mod baseline;
pub mod catalog;
pub mod config;
pub mod device;
pub mod dlora;
pub mod energy;
pub mod engine;
pub mod error;
pub mod policy;
pub mod qoca;
pub mod tow;
pub mod ucb1_tuned;

pub use baseline::{BaselineConfig, BaselineKind, BaselinePolicy};
pub use catalog::{CatalogPreset, ParameterCatalog};
pub use config::{Algorithm, EngineConfig};
pub use dlora::{DloraConfig, DloraPolicy};
pub use energy::{EnergyModel, EnergyParameters};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use policy::ArmPolicy;
pub use qoca::{Estimator, QocaConfig, QocaPolicy};
pub use tow::{TowConfig, TowPolicy};
pub use ucb1_tuned::{Ucb1TunedConfig, Ucb1TunedPolicy};

pub use lora_types;
