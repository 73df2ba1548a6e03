//! TOML configuration surface. Every option the engine recognizes is a
//! field here; unknown keys are rejected by `serde`'s default strictness,
//! giving the "unknown option" configuration error for free.

use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};
use crate::strategy::OutOfBoundsBehavior;
use crate::topology::UpdateMode;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CheckPrecisionSetting {
    All,
    AllExceptStatistics,
    Never,
}

impl From<CheckPrecisionSetting> for crate::bigfloat::PrecisionCheckPolicy {
    fn from(value: CheckPrecisionSetting) -> Self {
        match value {
            CheckPrecisionSetting::All => crate::bigfloat::PrecisionCheckPolicy::Always,
            CheckPrecisionSetting::AllExceptStatistics => crate::bigfloat::PrecisionCheckPolicy::AlwaysExceptStatistics,
            CheckPrecisionSetting::Never => crate::bigfloat::PrecisionCheckPolicy::Never,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum VelocityInitMode {
    Zero,
    HalfDiff,
    Random,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UpdateGlobalAttractorSetting {
    EachIteration,
    EachParticle,
}

impl From<UpdateGlobalAttractorSetting> for UpdateMode {
    fn from(value: UpdateGlobalAttractorSetting) -> Self {
        match value {
            UpdateGlobalAttractorSetting::EachIteration => UpdateMode::EachIteration,
            UpdateGlobalAttractorSetting::EachParticle => UpdateMode::EachParticle,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OutOfBoundsSetting {
    Normal,
    Infinity,
    Periodic,
}

impl From<OutOfBoundsSetting> for OutOfBoundsBehavior {
    fn from(value: OutOfBoundsSetting) -> Self {
        match value {
            OutOfBoundsSetting::Normal => OutOfBoundsBehavior::Normal,
            OutOfBoundsSetting::Infinity => OutOfBoundsBehavior::Infinity,
            OutOfBoundsSetting::Periodic => OutOfBoundsBehavior::Periodic,
        }
    }
}

/// One of the five initialization-record kinds, applied in declaration
/// order so later records refine earlier ones.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InitRule {
    Bounds { lo: f64, hi: f64 },
    CenterAndRange { center: f64, range: f64 },
    RandomCenterAndRange { lo: f64, hi: f64, range: f64 },
    Scale { factor: f64 },
    PowerScale { exponent: i32 },
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum InitTarget {
    Position,
    Velocity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitRecord {
    pub target: InitTarget,
    pub particle_from: usize,
    pub particle_to: usize,
    pub dimension_from: usize,
    pub dimension_to: usize,
    pub rule: InitRule,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionBoundsRecord {
    pub dimension_from: usize,
    pub dimension_to: usize,
    pub lo: f64,
    pub hi: f64,
}

/// A scheduling window: a named statistic is recorded at every `step`
/// with `from <= step <= to` and `(step - from) % period == 0`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsWindow {
    pub name: String,
    pub preset: StatisticPreset,
    pub from: u64,
    pub to: u64,
    pub period: u64,
}

/// A fixed catalog of commonly-needed named statistics. The full composable
/// statistic grammar (`src/statistics`) supports arbitrary nesting of
/// reductions, combines, and elementwise ops; wiring an equally general
/// textual grammar through the configuration file is left for a config
/// front-end layered on top of this core.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StatisticPreset {
    GlobalBestValue,
    GlobalBestPosition,
    PositionSumPerDimension,
    VelocityMeanPerDimension,
    LocalAttractorUpdateCounts,
    GlobalAttractorUpdateCounts,
    WorkingPrecision,
}

impl StatisticPreset {
    pub fn build(self, name: String) -> crate::statistics::Statistic {
        use crate::statistics::{Axis, Reducer, Specific, Statistic};
        let inner = match self {
            StatisticPreset::GlobalBestValue => Statistic::GlobalBestValue,
            StatisticPreset::GlobalBestPosition => Statistic::GlobalBestPosition,
            StatisticPreset::PositionSumPerDimension => {
                Statistic::Reduction { axis: Axis::Particles, reducer: Reducer::Sum, specific: Specific::Position }
            }
            StatisticPreset::VelocityMeanPerDimension => {
                Statistic::Reduction { axis: Axis::Particles, reducer: Reducer::ArithmeticMean, specific: Specific::Velocity }
            }
            StatisticPreset::LocalAttractorUpdateCounts => Statistic::LocalAttractorUpdateCounts,
            StatisticPreset::GlobalAttractorUpdateCounts => Statistic::GlobalAttractorUpdateCounts,
            StatisticPreset::WorkingPrecision => Statistic::WorkingPrecision,
        };
        Statistic::Named { name, inner: Box::new(inner) }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TopologySetting {
    GlobalBest,
    LBest { num_neighbors: usize },
    Ring,
    Grid { rows: usize, cols: usize },
    Wheel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RngSpec {
    pub variant: RngVariantSetting,
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RngVariantSetting {
    Fast2p63,
    Intense2p63 { accept_bits: u32 },
    FastGeneric { modulus: u64 },
    IntenseGeneric { modulus: u64 },
}

impl From<RngVariantSetting> for crate::rng::RngVariant {
    fn from(value: RngVariantSetting) -> Self {
        match value {
            RngVariantSetting::Fast2p63 => crate::rng::RngVariant::Fast2p63,
            RngVariantSetting::Intense2p63 { accept_bits } => crate::rng::RngVariant::Intense2p63 { accept_bits },
            RngVariantSetting::FastGeneric { modulus } => crate::rng::RngVariant::FastGeneric { modulus },
            RngVariantSetting::IntenseGeneric { modulus } => crate::rng::RngVariant::IntenseGeneric { modulus },
        }
    }
}

/// Visualization toggles are recognized (so a shared config file round-trips
/// through tools that set them) but are a no-op in this core — the
/// visualization sink itself is out of scope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebugSwarmConfig {
    pub resolution: Option<u32>,
    pub frequency: Option<u64>,
    pub gnuplot_terminal: Option<String>,
    pub output_extension: Option<String>,
    pub trajectory_length: Option<u32>,
    pub echo_global_attractor: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub particles: usize,
    pub dimensions: usize,
    pub steps: u64,

    pub parameter_chi: f64,
    pub parameter_coefficient_local_attractor: f64,
    pub parameter_coefficient_global_attractor: f64,

    pub initial_precision: u32,
    pub precision: u32,
    pub output_precision: u32,
    pub check_precision: CheckPrecisionSetting,
    pub check_precision_probability: f64,

    pub initialize_velocity: VelocityInitMode,
    pub update_global_attractor: UpdateGlobalAttractorSetting,
    pub function_behavior_outside_of_bounds: OutOfBoundsSetting,

    #[serde(default)]
    pub initialization_information: Vec<InitRecord>,
    #[serde(default)]
    pub function_bounds: Vec<FunctionBoundsRecord>,

    #[serde(default)]
    pub show_statistics: Vec<StatisticsWindow>,

    #[serde(default)]
    pub preserve_backup: Vec<u64>,
    pub run_check: Option<String>,

    pub topology: TopologySetting,
    pub srand: RngSpec,

    #[serde(default = "default_backup_interval_seconds")]
    pub backup_interval_seconds: u64,
    #[serde(default = "default_run_check_interval_seconds")]
    pub run_check_interval_seconds: u64,

    #[serde(default)]
    pub debug_swarm: DebugSwarmConfig,
}

fn default_backup_interval_seconds() -> u64 {
    300
}

fn default_run_check_interval_seconds() -> u64 {
    60
}

impl Config {
    pub fn load(path: &Path) -> EngineResult<Config> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path.display().to_string(), e))?;
        let config: Config = toml::from_str(&text).map_err(|e| EngineError::configuration(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.particles == 0 {
            return Err(EngineError::configuration("particles must be at least 1"));
        }
        if self.dimensions == 0 {
            return Err(EngineError::configuration("dimensions must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.check_precision_probability) {
            return Err(EngineError::configuration("checkPrecisionProbability must be in [0, 1]"));
        }
        match self.topology {
            TopologySetting::LBest { num_neighbors } if num_neighbors % 2 != 0 => {
                return Err(EngineError::configuration("lbest neighbor count must be even"));
            }
            TopologySetting::Grid { rows, cols } if rows * cols != self.particles => {
                return Err(EngineError::configuration("grid rows * cols must equal the particle count"));
            }
            _ => {}
        }
        Ok(())
    }

    /// Changes between a `restart`'s original and modified config that must
    /// not affect the trajectory: everything except swarm sizing, topology
    /// shape, and RNG seed is considered safe to vary.
    pub fn trajectory_compatible_with(&self, other: &Config) -> bool {
        self.particles == other.particles
            && self.dimensions == other.dimensions
            && self.initial_precision == other.initial_precision
            && self.srand.seed == other.srand.seed
            && std::mem::discriminant(&self.srand.variant) == std::mem::discriminant(&other.srand.variant)
            && std::mem::discriminant(&self.topology) == std::mem::discriminant(&other.topology)
    }
}
