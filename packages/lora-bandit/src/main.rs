//! main.rs — lora-sim: drives one selector family against a synthetic channel
//!
//! Every round, each device:
//!   1. asks the engine for an arm
//!   2. resolves it to concrete radio settings
//!   3. transmits through the outcome oracle
//!   4. reports the outcome back to the engine
//!
//! At the end a per-device summary is logged, and with `--json` the full
//! statistics are written to stdout.

mod oracle;
mod scenarios;

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use serde::Deserialize;
use tracing::{info, warn};

use lora_bandit::device::device_seed;
use lora_bandit::energy::EnergyParameters;
use lora_bandit::lora_types::DeviceStatistics;
use lora_bandit::{
    Algorithm, ArmPolicy, BaselinePolicy, DloraPolicy, Engine, EngineConfig, ParameterCatalog, QocaPolicy,
    TowPolicy, Ucb1TunedPolicy,
};

use oracle::{ChannelConfig, OutcomeOracle, SyntheticChannel};
use scenarios::ScenarioConfig;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lora-sim", about = "Adaptive LoRa parameter selection simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// tow | ucb1_tuned | qoca | dqoca | ucb | dlora | baseline
    #[arg(short, long)]
    algorithm: Option<String>,
    /// Number of end devices
    #[arg(long)]
    devices: Option<u32>,
    /// Transmissions per device
    #[arg(long)]
    rounds: Option<u64>,
    #[arg(long)]
    seed: Option<u64>,
    /// stationary | non_stationary | receivable_subset
    #[arg(long)]
    scenario: Option<String>,
    /// Print device statistics as JSON on stdout
    #[arg(long)]
    json: bool,
}

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FullConfig {
    #[serde(flatten)]
    engine:     EngineConfig,
    #[serde(default)]
    simulation: SimulationSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SimulationSection {
    devices:  u32,
    rounds:   u64,
    scenario: String,
    json:     bool,
    channel:  ChannelConfig,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            devices: 10,
            rounds: 1000,
            scenario: "stationary".into(),
            json: false,
            channel: ChannelConfig::default(),
        }
    }
}

struct RunSetup<'a> {
    catalog:  ParameterCatalog,
    energy:   Arc<EnergyParameters>,
    seed:     u64,
    sim:      &'a SimulationSection,
    scenario: &'a ScenarioConfig,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lora_bandit=info,lora_sim=info".into()),
        )
        .init();

    let args = Args::parse();

    let config_str = std::fs::read_to_string(&args.config).unwrap_or_else(|_| {
        warn!("{} not readable, using built-in defaults", args.config);
        include_str!("../config.toml").to_string()
    });
    let mut cfg: FullConfig = toml::from_str(&config_str).context("invalid config.toml")?;

    if let Some(a) = &args.algorithm {
        cfg.engine.engine.algorithm = a.parse()?;
    }
    if let Some(seed) = args.seed {
        cfg.engine.engine.seed = seed;
    }
    if let Some(n) = args.devices {
        cfg.simulation.devices = n;
    }
    if let Some(r) = args.rounds {
        cfg.simulation.rounds = r;
    }
    if let Some(s) = args.scenario {
        cfg.simulation.scenario = s;
    }
    let json = args.json || cfg.simulation.json;

    let scenario = scenarios::preset(&cfg.simulation.scenario)
        .ok_or_else(|| anyhow!("unknown scenario '{}'", cfg.simulation.scenario))?;
    let algorithm = cfg.engine.engine.algorithm;

    info!(
        "📡 lora-sim starting: {} on {:?}, {} devices × {} rounds, seed {}",
        algorithm, scenario.kind, cfg.simulation.devices, cfg.simulation.rounds, cfg.engine.engine.seed
    );

    let setup = RunSetup {
        catalog: cfg.engine.catalog()?,
        energy: Arc::new(cfg.engine.energy.clone()),
        seed: cfg.engine.engine.seed,
        sim: &cfg.simulation,
        scenario: &scenario,
    };
    let e = &cfg.engine;
    let stats = match algorithm {
        Algorithm::Tow => run(TowPolicy::new(e.tow.clone())?, setup)?,
        Algorithm::Ucb1Tuned => run(Ucb1TunedPolicy::new(e.ucb1_tuned.clone())?, setup)?,
        Algorithm::Qoca => run(QocaPolicy::new(e.qoca.clone())?, setup)?,
        Algorithm::Dqoca => run(QocaPolicy::new(e.dqoca.clone())?, setup)?,
        Algorithm::Ucb => run(QocaPolicy::new(e.ucb.clone())?, setup)?,
        Algorithm::Dlora => run(DloraPolicy::new(e.dlora.clone())?, setup)?,
        Algorithm::Baseline => run(BaselinePolicy::new(e.baseline.clone())?, setup)?,
    };

    summarize(&stats);
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

fn run<P: ArmPolicy>(policy: P, setup: RunSetup<'_>) -> anyhow::Result<Vec<DeviceStatistics>> {
    let RunSetup { catalog, energy, seed, sim, scenario } = setup;
    let mut channel = SyntheticChannel::new(
        sim.channel.clone(),
        scenario.clone(),
        catalog.channels_khz.clone(),
        sim.rounds,
        device_seed(seed, u32::MAX),
    )?;
    let mut engine = Engine::new(policy, catalog, energy, seed)?;

    for id in 0..sim.devices {
        engine.set_distance(id, scenario.distance_m(id));
    }

    for round in 0..sim.rounds {
        for id in 0..sim.devices {
            let arm = engine.select_parameters(id, round);
            let tx = engine.catalog().resolve(&arm)?;
            let outcome = channel.transmit(id, round, &tx);
            engine
                .record_outcome(id, arm, outcome)
                .with_context(|| format!("device {id} round {round}"))?;
        }
        if sim.rounds >= 10 && (round + 1) % (sim.rounds / 10) == 0 {
            let (s, m) = (0..sim.devices)
                .map(|id| engine.device_statistics(id))
                .fold((0, 0), |(s, m), d| (s + d.successes, m + d.attempts));
            info!("⏱ round {}/{} | network PDR {:.3}", round + 1, sim.rounds, ratio(s, m));
        }
    }

    Ok((0..sim.devices).map(|id| engine.device_statistics(id)).collect())
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn summarize(stats: &[DeviceStatistics]) {
    for s in stats {
        info!(
            "📟 device {:>3} | PDR {:.3} | {} | {:.1} bit/J | pulls {:?}",
            s.device_id,
            s.pdr,
            s.total_energy,
            s.energy_efficiency_bits_per_joule,
            s.pulls.totals()
        );
        if s.estimated_airtime_lookups > 0 {
            warn!("device {} used the airtime estimate {} times", s.device_id, s.estimated_airtime_lookups);
        }
    }
    let successes: u64 = stats.iter().map(|s| s.successes).sum();
    let attempts: u64 = stats.iter().map(|s| s.attempts).sum();
    let bits: u64 = stats.iter().map(|s| s.total_bits_delivered).sum();
    let joules: f64 = stats.iter().map(|s| s.total_energy.joules()).sum();
    let efficiency = if joules > 0.0 { bits as f64 / joules } else { 0.0 };
    info!(
        "✅ network | PDR {:.3} | {:.3} J | {:.1} bit/J over {} devices",
        ratio(successes, attempts),
        joules,
        efficiency,
        stats.len()
    );
}
