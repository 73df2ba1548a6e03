//! The single-threaded, cooperative iteration engine: swarm state,
//! initialization, the main loop (spec step 4.7), and restore.
//!
//! Suspension points exist only between particle updates, between
//! iterations, and at the entry of statistics/backup work — precision
//! escalation and queued attractor application happen exclusively there.

mod checkpoint;
pub mod runcheck;

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::bigfloat::{BigFloat, Context};
use crate::config::{Config, FunctionBoundsRecord, InitRule, InitTarget, VelocityInitMode};
use crate::particle::Particle;
use crate::rng::RandomEngine;
use crate::statistics::{Accumulator, SwarmView};
use crate::strategy::bound_handling::Nearest;
use crate::strategy::updater::DefaultUpdater;
use crate::strategy::velocity_adjustment::Zero;
use crate::strategy::{BoundHandling, Function, OutOfBoundsBehavior, PositionVelocityUpdater, VelocityAdjustment};
use crate::topology::{AdjacencyList, AdjacencyShape, GlobalBest, Topology, UpdateMode};
use crate::vector::Vector;
use crate::error::{EngineError, EngineResult};

use self::runcheck::RunGate;

/// Every moving part the engine drives: particle swarm, attractor service,
/// strategy plugins, and the bookkeeping the main loop needs to decide when
/// to check the run-gate, write a backup, or escalate precision.
pub struct Engine {
    pub ctx: Context,
    pub particles: Vec<Particle>,
    pub topology: Box<dyn Topology>,
    pub function: Box<dyn Function>,
    pub bounds: OutOfBoundsBehavior,
    pub updater: Box<dyn PositionVelocityUpdater>,
    pub bound_handling: Box<dyn BoundHandling>,
    pub velocity_adjustment: Box<dyn VelocityAdjustment>,

    pub dimensions: usize,
    pub step: u64,
    pub max_steps: u64,
    pub parameter_chi: f64,
    pub parameter_coefficient_local_attractor: f64,
    pub parameter_coefficient_global_attractor: f64,

    accumulators: Vec<(crate::config::StatisticsWindow, Accumulator)>,

    prefix: PathBuf,
    run_gate: Option<RunGate>,
    run_check_interval_seconds: u64,
    backup_interval_seconds: u64,
    last_run_check: u64,
    last_backup: u64,
    preserved_backups: Vec<u64>,
    preserved_cursor: usize,
    leak_baseline: Option<i64>,
    start_step: u64,
}

fn now_unix_seconds() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Refines a [`Function`]'s declared bounds per the configuration's
/// `functionBounds` records, applied in declaration order so a later
/// record overrides an earlier one on the dimensions it covers. Every
/// other query (evaluation, the 1-D-optimum distance) passes straight
/// through to the wrapped function.
struct BoundedFunction {
    inner: Box<dyn Function>,
    overrides: Vec<FunctionBoundsRecord>,
}

impl BoundedFunction {
    fn refine(&self, ctx: &mut Context, dimensions: usize, mut bound: Vector, pick: impl Fn(&FunctionBoundsRecord) -> f64) -> Vector {
        for record in &self.overrides {
            let to = record.dimension_to.min(dimensions.saturating_sub(1));
            for d in record.dimension_from..=to {
                let old = std::mem::replace(&mut bound[d], ctx.from_f64(pick(record)));
                ctx.release(old);
            }
        }
        bound
    }
}

impl Function for BoundedFunction {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn evaluate_raw(&self, ctx: &mut Context, position: &[BigFloat]) -> BigFloat {
        self.inner.evaluate_raw(ctx, position)
    }

    fn lower_bound(&self, ctx: &mut Context, dimensions: usize) -> Vector {
        let bound = self.inner.lower_bound(ctx, dimensions);
        self.refine(ctx, dimensions, bound, |r| r.lo)
    }

    fn upper_bound(&self, ctx: &mut Context, dimensions: usize) -> Vector {
        let bound = self.inner.upper_bound(ctx, dimensions);
        self.refine(ctx, dimensions, bound, |r| r.hi)
    }

    fn distance_to_1d_optimum(&self, ctx: &mut Context, position: &[BigFloat], dimension: usize) -> BigFloat {
        self.inner.distance_to_1d_optimum(ctx, position, dimension)
    }
}

fn build_topology(config: &Config) -> Box<dyn Topology> {
    let mode: UpdateMode = config.update_global_attractor.into();
    match config.topology {
        crate::config::TopologySetting::GlobalBest => Box::new(GlobalBest::with_mode(mode)),
        crate::config::TopologySetting::LBest { num_neighbors } => {
            Box::new(AdjacencyList::new(AdjacencyShape::LBest { num_neighbors }, config.particles, mode))
        }
        crate::config::TopologySetting::Ring => Box::new(AdjacencyList::new(AdjacencyShape::Ring, config.particles, mode)),
        crate::config::TopologySetting::Grid { rows, cols } => Box::new(AdjacencyList::new(AdjacencyShape::Grid { rows, cols }, config.particles, mode)),
        crate::config::TopologySetting::Wheel => Box::new(AdjacencyList::new(AdjacencyShape::Wheel, config.particles, mode)),
    }
}

impl Engine {
    /// Builds a fresh engine and initializes the swarm per §4.7's
    /// initialization mode (init records applied in order, uniform sampling,
    /// velocity mode, then an initial drain of topology updates).
    pub fn initialize(config: &Config, prefix: impl Into<PathBuf>, function: Box<dyn Function>) -> EngineResult<Self> {
        let rng = RandomEngine::new(config.srand.variant.into(), config.srand.seed);
        let mut ctx = Context::new(config.initial_precision, 16, rng);
        ctx.precision.check_policy = config.check_precision.into();
        ctx.precision.check_probability = config.check_precision_probability;

        let function: Box<dyn Function> = Box::new(BoundedFunction { inner: function, overrides: config.function_bounds.clone() });

        let mut topology = build_topology(config);
        let bounds: OutOfBoundsBehavior = config.function_behavior_outside_of_bounds.into();

        let mut particles = Vec::with_capacity(config.particles);
        for id in 0..config.particles {
            let (position_lo, position_hi) = resolve_interval(&mut ctx, config, InitTarget::Position, id, config.dimensions, function.as_ref());
            let position: Vec<_> = (0..config.dimensions).map(|d| sample_uniform(&mut ctx, &position_lo[d], &position_hi[d])).collect();

            let velocity = match config.initialize_velocity {
                VelocityInitMode::Zero => (0..config.dimensions).map(|_| ctx.zero()).collect(),
                VelocityInitMode::Random => {
                    let (velocity_lo, velocity_hi) = resolve_interval(&mut ctx, config, InitTarget::Velocity, id, config.dimensions, function.as_ref());
                    let v = (0..config.dimensions).map(|d| sample_uniform(&mut ctx, &velocity_lo[d], &velocity_hi[d])).collect();
                    crate::vector::release(&mut ctx, velocity_lo);
                    crate::vector::release(&mut ctx, velocity_hi);
                    v
                }
                VelocityInitMode::HalfDiff => {
                    let second: Vec<_> = (0..config.dimensions).map(|d| sample_uniform(&mut ctx, &position_lo[d], &position_hi[d])).collect();
                    let diff = crate::vector::subtract(&mut ctx, &position, &second);
                    let halved = crate::vector::scale_f64(&mut ctx, &diff, 0.5);
                    crate::vector::release(&mut ctx, second);
                    crate::vector::release(&mut ctx, diff);
                    halved
                }
            };
            crate::vector::release(&mut ctx, position_lo);
            crate::vector::release(&mut ctx, position_hi);

            let mut particle = Particle::new(id, position, velocity);
            let initial_position = crate::vector::clone_vector(&mut ctx, &particle.position);
            particle.set_position(&mut ctx, function.as_ref(), &bounds, topology.as_mut(), initial_position);
            particles.push(particle);
        }
        topology.apply_pending_updates(&mut ctx);

        let accumulators = config
            .show_statistics
            .iter()
            .map(|window| (window.clone(), Accumulator::new(window.preset.build(window.name.clone()))))
            .collect();

        let run_gate = match &config.run_check {
            Some(path) => Some(RunGate::load(Path::new(path))?),
            None => None,
        };

        Ok(Engine {
            ctx,
            particles,
            topology,
            function,
            bounds,
            updater: Box::new(DefaultUpdater),
            bound_handling: Box::new(Nearest),
            velocity_adjustment: Box::new(Zero),
            dimensions: config.dimensions,
            step: 0,
            max_steps: config.steps,
            parameter_chi: config.parameter_chi,
            parameter_coefficient_local_attractor: config.parameter_coefficient_local_attractor,
            parameter_coefficient_global_attractor: config.parameter_coefficient_global_attractor,
            accumulators,
            prefix: prefix.into(),
            run_gate,
            run_check_interval_seconds: config.run_check_interval_seconds,
            backup_interval_seconds: config.backup_interval_seconds,
            last_run_check: 0,
            last_backup: 0,
            preserved_backups: {
                let mut v = config.preserve_backup.clone();
                v.sort_unstable();
                v
            },
            preserved_cursor: 0,
            leak_baseline: None,
            start_step: 0,
        })
    }

    /// Restores an engine's swarm/topology/RNG state from a backup file,
    /// leaving all config-driven strategy wiring in place.
    pub fn restore(config: &Config, prefix: impl Into<PathBuf>, function: Box<dyn Function>, backup_path: &Path) -> EngineResult<Self> {
        let mut engine = Self::initialize(config, prefix, function)?;
        engine.read_checkpoint(backup_path)?;
        engine.start_step = engine.step;
        Ok(engine)
    }

    fn backup_path(&self) -> PathBuf {
        self.prefix.with_extension("backup")
    }

    fn shutdown_path(&self) -> PathBuf {
        self.prefix.with_extension("SHUTDOWN")
    }

    fn step_stamped_path(&self, step: u64) -> PathBuf {
        let mut name = self.prefix.file_name().and_then(|n| n.to_str()).unwrap_or("run").to_string();
        name.push_str(&format!(".S{step}.backup"));
        self.prefix.with_file_name(name)
    }

    /// Runs the main loop for at most `steps` iterations (fewer if
    /// `max_steps` is reached or the run-gate shuts the engine down).
    /// Returns the number of iterations actually executed.
    pub fn run_steps(&mut self, steps: u64) -> EngineResult<u64> {
        let mut executed = 0;
        while executed < steps && self.step < self.max_steps {
            if !self.run_one_step()? {
                break;
            }
            executed += 1;
        }
        Ok(executed)
    }

    /// Runs until `max_steps` is reached or the run-gate shuts the engine
    /// down, then writes the final backup and logs completion.
    pub fn run_to_completion(&mut self) -> EngineResult<()> {
        while self.step < self.max_steps {
            if !self.run_one_step()? {
                return Ok(());
            }
        }
        self.write_checkpoint(&self.backup_path())?;
        info!("run complete at step {}", self.step);
        self.flush_statistics()?;
        Ok(())
    }

    /// Executes one full iteration (§4.7 steps 1-10). Returns `false` if the
    /// run-gate forced a graceful shutdown, in which case the caller should
    /// stop calling it again.
    fn run_one_step(&mut self) -> EngineResult<bool> {
        let now = now_unix_seconds();

        if now.saturating_sub(self.last_run_check) >= self.run_check_interval_seconds {
            self.last_run_check = now;
            if let Some(gate) = &self.run_gate {
                if !gate.allows(runcheck::minute_of_day_now()) {
                    self.shutdown()?;
                    return Ok(false);
                }
            }
        }

        if now.saturating_sub(self.last_backup) >= self.backup_interval_seconds {
            self.last_backup = now;
            self.write_checkpoint(&self.backup_path())?;
        }

        if self.preserved_cursor < self.preserved_backups.len() && self.preserved_backups[self.preserved_cursor] == self.step {
            self.write_checkpoint(&self.backup_path())?;
            std::fs::copy(self.backup_path(), self.step_stamped_path(self.step)).map_err(|e| EngineError::io(self.step_stamped_path(self.step).display().to_string(), e))?;
            while self.preserved_cursor < self.preserved_backups.len() && self.preserved_backups[self.preserved_cursor] <= self.step {
                self.preserved_cursor += 1;
            }
        }

        let in_use = self.ctx.alloc.in_use_count() as i64;
        let cached = self.ctx.alloc.cached_count();
        let live = in_use - cached;
        if let Some(baseline) = self.leak_baseline {
            if live != baseline && self.step > self.start_step + 2 {
                warn!("handle accounting drifted: in_use-cached = {live}, baseline = {baseline}, step = {}", self.step);
            }
        }
        self.leak_baseline = Some(live);

        for id in 0..self.particles.len() {
            self.update_particle(id);
            if self.topology.mode() == UpdateMode::EachParticle {
                self.topology.apply_pending_updates(&mut self.ctx);
            }
            if self.ctx.precision.raise_precision_pending {
                self.ctx.raise_precision();
                info!("precision raised to {} bits at step {} (particle {id})", self.ctx.precision_bits(), self.step);
            }
        }

        if self.topology.mode() == UpdateMode::EachIteration {
            self.topology.apply_pending_updates(&mut self.ctx);
        }

        if self.ctx.precision.raise_precision_pending {
            self.ctx.raise_precision();
            info!("precision raised to {} bits at step {} (end of iteration)", self.ctx.precision_bits(), self.step);
        }

        self.record_statistics();

        self.step += 1;
        Ok(true)
    }

    fn update_particle(&mut self, id: usize) {
        let position = crate::vector::clone_vector(&mut self.ctx, &self.particles[id].position);
        let velocity = crate::vector::clone_vector(&mut self.ctx, &self.particles[id].velocity);
        let local_attractor = crate::vector::clone_vector(&mut self.ctx, &self.particles[id].local_attractor);
        let global_attractor = self.topology.global_attractor_position(&mut self.ctx, id);

        let proposed_velocity = self.updater.update(
            &mut self.ctx,
            &position,
            &velocity,
            &local_attractor,
            &global_attractor,
            self.parameter_chi,
            self.parameter_coefficient_local_attractor,
            self.parameter_coefficient_global_attractor,
        );
        crate::vector::release(&mut self.ctx, velocity);
        crate::vector::release(&mut self.ctx, local_attractor);
        crate::vector::release(&mut self.ctx, global_attractor);

        let proposed_position = crate::vector::add(&mut self.ctx, &position, &proposed_velocity);
        crate::vector::release(&mut self.ctx, position);

        let (corrected_position, modified) = self.bound_handling.apply(&mut self.ctx, proposed_position, self.function.as_ref());

        let mut new_velocity = proposed_velocity;
        let old_position = crate::vector::clone_vector(&mut self.ctx, &self.particles[id].position);
        self.velocity_adjustment.adjust(&mut self.ctx, &mut new_velocity, &modified, &old_position);
        crate::vector::release(&mut self.ctx, old_position);

        self.particles[id].set_velocity(&mut self.ctx, new_velocity);
        self.particles[id].set_position(&mut self.ctx, self.function.as_ref(), &self.bounds, self.topology.as_mut(), corrected_position);
    }

    fn record_statistics(&mut self) {
        if self.accumulators.is_empty() {
            return;
        }
        self.ctx.precision.enter_statistics_region();
        let step = self.step;
        for (window, accumulator) in &mut self.accumulators {
            if step < window.from || step > window.to {
                continue;
            }
            if (step - window.from) % window.period.max(1) != 0 {
                continue;
            }
            let mut swarm = SwarmView { particles: &mut self.particles, topology: self.topology.as_mut(), function: self.function.as_ref(), bounds: &self.bounds };
            accumulator.record(&mut self.ctx, step, &mut swarm);
        }
        self.ctx.precision.exit_statistics_region();
    }

    /// Flushes every accumulator's pending rows to its `<prefix>.STAT.<name>.txt` file.
    pub fn flush_statistics(&mut self) -> EngineResult<()> {
        for (_, accumulator) in &mut self.accumulators {
            let Some(name) = accumulator.statistic.name() else { continue };
            let mut file_name = self.prefix.file_name().and_then(|n| n.to_str()).unwrap_or("run").to_string();
            file_name.push_str(&format!(".STAT.{name}.txt"));
            let path = self.prefix.with_file_name(file_name);
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path).map_err(|e| EngineError::io(path.display().to_string(), e))?;
            accumulator.flush(&mut file)?;
        }
        Ok(())
    }

    /// Writes the final backup and a `.SHUTDOWN` sentinel so a supervisor
    /// knows to relaunch from this point.
    pub fn shutdown(&mut self) -> EngineResult<()> {
        self.write_checkpoint(&self.backup_path())?;
        std::fs::write(self.shutdown_path(), b"").map_err(|e| EngineError::io(self.shutdown_path().display().to_string(), e))?;
        self.flush_statistics()?;
        info!("graceful shutdown at step {}", self.step);
        Ok(())
    }
}

/// Resolves the position or velocity interval for one particle/dimension
/// range by applying every matching init record in declaration order.
fn resolve_interval(ctx: &mut Context, config: &Config, target: InitTarget, particle_id: usize, dimensions: usize, function: &dyn Function) -> (Vec<crate::bigfloat::BigFloat>, Vec<crate::bigfloat::BigFloat>) {
    let mut lo = function.lower_bound(ctx, dimensions);
    let mut hi = function.upper_bound(ctx, dimensions);

    for record in &config.initialization_information {
        if record.target != target {
            continue;
        }
        if particle_id < record.particle_from || particle_id > record.particle_to {
            continue;
        }
        for d in record.dimension_from..=record.dimension_to.min(dimensions.saturating_sub(1)) {
            let (new_lo, new_hi) = apply_init_rule(ctx, &record.rule, &lo[d], &hi[d]);
            let old_lo = std::mem::replace(&mut lo[d], new_lo);
            let old_hi = std::mem::replace(&mut hi[d], new_hi);
            ctx.release(old_lo);
            ctx.release(old_hi);
        }
    }
    (lo, hi)
}

fn apply_init_rule(ctx: &mut Context, rule: &InitRule, current_lo: &crate::bigfloat::BigFloat, current_hi: &crate::bigfloat::BigFloat) -> (crate::bigfloat::BigFloat, crate::bigfloat::BigFloat) {
    match *rule {
        InitRule::Bounds { lo, hi } => (ctx.from_f64(lo), ctx.from_f64(hi)),
        InitRule::CenterAndRange { center, range } => {
            let c = ctx.from_f64(center);
            let half = ctx.from_f64(range / 2.0);
            let lo = ctx.subtract(&c, &half);
            let hi = ctx.add(&c, &half);
            ctx.release(c);
            ctx.release(half);
            (lo, hi)
        }
        InitRule::RandomCenterAndRange { lo, hi, range } => {
            let u = ctx.uniform_01();
            let span = ctx.from_f64(hi - lo);
            let base = ctx.from_f64(lo);
            let scaled = ctx.multiply(&u, &span);
            let center = ctx.add(&base, &scaled);
            ctx.release(u);
            ctx.release(span);
            ctx.release(base);
            ctx.release(scaled);
            let half = ctx.from_f64(range / 2.0);
            let result_lo = ctx.subtract(&center, &half);
            let result_hi = ctx.add(&center, &half);
            ctx.release(center);
            ctx.release(half);
            (result_lo, result_hi)
        }
        InitRule::Scale { factor } => {
            let f = ctx.from_f64(factor);
            let lo = ctx.multiply(current_lo, &f);
            let hi = ctx.multiply(current_hi, &f);
            ctx.release(f);
            (lo, hi)
        }
        InitRule::PowerScale { exponent } => {
            let lo = ctx.pow_i32(current_lo, exponent);
            let hi = ctx.pow_i32(current_hi, exponent);
            (lo, hi)
        }
    }
}

fn sample_uniform(ctx: &mut Context, lo: &crate::bigfloat::BigFloat, hi: &crate::bigfloat::BigFloat) -> crate::bigfloat::BigFloat {
    let u = ctx.uniform_01();
    let range = ctx.subtract(hi, lo);
    let scaled = ctx.multiply(&u, &range);
    ctx.release(u);
    ctx.release(range);
    let result = ctx.add(lo, &scaled);
    ctx.release(scaled);
    result
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{CheckPrecisionSetting, FunctionBoundsRecord, OutOfBoundsSetting, RngSpec, RngVariantSetting, TopologySetting, UpdateGlobalAttractorSetting, VelocityInitMode};
    use crate::strategy::function::Sphere;

    pub fn test_config() -> Config {
        Config {
            particles: 4,
            dimensions: 2,
            steps: 100,
            parameter_chi: 0.7298,
            parameter_coefficient_local_attractor: 1.49618,
            parameter_coefficient_global_attractor: 1.49618,
            initial_precision: 64,
            precision: 64,
            output_precision: 20,
            check_precision: CheckPrecisionSetting::AllExceptStatistics,
            check_precision_probability: 1.0,
            initialize_velocity: VelocityInitMode::Zero,
            update_global_attractor: UpdateGlobalAttractorSetting::EachParticle,
            function_behavior_outside_of_bounds: OutOfBoundsSetting::Normal,
            initialization_information: Vec::new(),
            function_bounds: Vec::new(),
            show_statistics: Vec::new(),
            preserve_backup: Vec::new(),
            run_check: None,
            topology: TopologySetting::GlobalBest,
            srand: RngSpec { variant: RngVariantSetting::Fast2p63, seed: 42 },
            backup_interval_seconds: 300,
            run_check_interval_seconds: 60,
            debug_swarm: Default::default(),
        }
    }

    pub fn test_engine() -> Engine {
        let config = test_config();
        Engine::initialize(&config, "/tmp/hippso-engine-test", Box::new(Sphere)).unwrap()
    }

    #[test]
    fn initialization_samples_within_function_bounds() {
        let engine = test_engine();
        assert_eq!(engine.particles.len(), 4);
        for p in &engine.particles {
            assert_eq!(p.position.len(), 2);
        }
    }

    #[test]
    fn function_bounds_config_narrows_the_declared_search_box() {
        let mut config = test_config();
        config.function_bounds = vec![FunctionBoundsRecord { dimension_from: 0, dimension_to: 0, lo: -1.0, hi: 1.0 }];
        let mut engine = Engine::initialize(&config, "/tmp/hippso-engine-bounds-test", Box::new(Sphere)).unwrap();

        let lo = engine.function.lower_bound(&mut engine.ctx, 2);
        let hi = engine.function.upper_bound(&mut engine.ctx, 2);
        assert!((engine.ctx.to_f64(&lo[0]).unwrap() - (-1.0)).abs() < 1e-9, "dimension 0 takes the configured override");
        assert!((engine.ctx.to_f64(&hi[0]).unwrap() - 1.0).abs() < 1e-9);
        assert!((engine.ctx.to_f64(&lo[1]).unwrap() - (-100.0)).abs() < 1e-9, "dimension 1 keeps the objective's default bound");
        crate::vector::release(&mut engine.ctx, lo);
        crate::vector::release(&mut engine.ctx, hi);
    }

    #[test]
    fn running_steps_advances_the_counter_and_improves_global_best() {
        let mut engine = test_engine();
        let before = engine.topology.overall_attractor_value(&mut engine.ctx, engine.function.as_ref());
        let before_f64 = engine.ctx.to_f64(&before).unwrap();
        engine.ctx.release(before);

        let executed = engine.run_steps(20).unwrap();
        assert_eq!(executed, 20);
        assert_eq!(engine.step, 20);

        let after = engine.topology.overall_attractor_value(&mut engine.ctx, engine.function.as_ref());
        let after_f64 = engine.ctx.to_f64(&after).unwrap();
        engine.ctx.release(after);
        assert!(after_f64 <= before_f64);
    }
}
