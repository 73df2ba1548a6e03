//! End-to-end behavior of the swarm engine assembled purely from its public
//! API: deterministic zero-coefficient stasis, out-of-bounds policies,
//! precision escalation, and backup/restore trajectory equivalence.

use hippso_core::bigfloat::Context;
use hippso_core::config::{
    CheckPrecisionSetting, Config, DebugSwarmConfig, InitRecord, InitRule, InitTarget, OutOfBoundsSetting, RngSpec,
    RngVariantSetting, StatisticPreset, StatisticsWindow, TopologySetting, UpdateGlobalAttractorSetting, VelocityInitMode,
};
use hippso_core::engine::Engine;
use hippso_core::rng::{RandomEngine, RngVariant};
use hippso_core::strategy::function::Sphere;
use hippso_core::strategy::{Function, OutOfBoundsBehavior};
use hippso_core::topology::Topology;
use hippso_core::vector::Vector;
use hippso_core::BigFloat;

fn pinned_position(particle: usize, dimension: usize, dimensions: usize, value: f64) -> InitRecord {
    InitRecord {
        target: InitTarget::Position,
        particle_from: particle,
        particle_to: particle,
        dimension_from: dimension,
        dimension_to: dimension.min(dimensions.saturating_sub(1)),
        rule: InitRule::CenterAndRange { center: value, range: 0.0 },
    }
}

fn base_config() -> Config {
    Config {
        particles: 2,
        dimensions: 2,
        steps: 2,
        parameter_chi: 0.0,
        parameter_coefficient_local_attractor: 0.0,
        parameter_coefficient_global_attractor: 0.0,
        initial_precision: 128,
        precision: 128,
        output_precision: 30,
        check_precision: CheckPrecisionSetting::Never,
        check_precision_probability: 0.0,
        initialize_velocity: VelocityInitMode::Zero,
        update_global_attractor: UpdateGlobalAttractorSetting::EachParticle,
        function_behavior_outside_of_bounds: OutOfBoundsSetting::Normal,
        initialization_information: vec![
            pinned_position(0, 0, 2, 10.0),
            pinned_position(0, 1, 2, 0.0),
            pinned_position(1, 0, 2, 0.0),
            pinned_position(1, 1, 2, 10.0),
        ],
        function_bounds: Vec::new(),
        show_statistics: Vec::new(),
        preserve_backup: Vec::new(),
        run_check: None,
        topology: TopologySetting::GlobalBest,
        srand: RngSpec { variant: RngVariantSetting::Fast2p63, seed: 1 },
        backup_interval_seconds: 300,
        run_check_interval_seconds: 60,
        debug_swarm: DebugSwarmConfig::default(),
    }
}

#[test]
fn zero_coefficients_leave_a_pinned_swarm_at_its_initial_optimum() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config();
    let mut engine = Engine::initialize(&config, dir.path().join("pinned"), Box::new(Sphere)).unwrap();

    let best = engine.topology.overall_attractor_value(&mut engine.ctx, engine.function.as_ref());
    assert!((engine.ctx.to_f64(&best).unwrap() - 100.0).abs() < 1e-20);
    engine.ctx.release(best);

    engine.run_steps(1).unwrap();
    assert_eq!(engine.step, 1);

    for p in &engine.particles {
        for v in &p.velocity {
            assert!(engine.ctx.is_zero(v), "velocity must stay zero when chi and both coefficients are zero");
        }
    }
    let p0x = engine.ctx.to_f64(&engine.particles[0].position[0]).unwrap();
    let p0y = engine.ctx.to_f64(&engine.particles[0].position[1]).unwrap();
    let p1x = engine.ctx.to_f64(&engine.particles[1].position[0]).unwrap();
    let p1y = engine.ctx.to_f64(&engine.particles[1].position[1]).unwrap();
    assert!((p0x - 10.0).abs() < 1e-20 && p0y.abs() < 1e-20);
    assert!(p1x.abs() < 1e-20 && (p1y - 10.0).abs() < 1e-20);

    let best_after = engine.topology.overall_attractor_value(&mut engine.ctx, engine.function.as_ref());
    assert!((engine.ctx.to_f64(&best_after).unwrap() - 100.0).abs() < 1e-20);
    engine.ctx.release(best_after);

    // Both particles start with no cached local-attractor value, so
    // `Engine::initialize` adopts once per particle (count 1). The one
    // real step holds every particle at its pinned optimum, so the
    // re-evaluated value ties the cached one; the `<=` tie-break adopts
    // again, bringing both counts to 2 rather than staying at 1 — the
    // same re-adopt-on-tie behavior `examples/original_source`'s
    // `particle.cpp` has for its own `<=` comparison.
    assert_eq!(engine.particles[0].local_attractor_update_count, 2);
    assert_eq!(engine.particles[1].local_attractor_update_count, 2);
    assert_eq!(engine.topology.global_attractor_update_count(0), 2);
    assert_eq!(engine.topology.global_attractor_update_count(1), 2);

    // Particles are updated in index order and each tied proposal
    // re-adopts, so the last particle processed in the step (particle 1)
    // is the one whose position the overall attractor ends up holding.
    let overall_position = engine.topology.overall_attractor_position(&mut engine.ctx);
    assert!(engine.ctx.to_f64(&overall_position[0]).unwrap().abs() < 1e-20);
    assert!((engine.ctx.to_f64(&overall_position[1]).unwrap() - 10.0).abs() < 1e-20);
    hippso_core::vector::release(&mut engine.ctx, overall_position);
}

/// `f(x) = x` on `[-1, 1]`, exercised purely through [`OutOfBoundsBehavior`]
/// without involving the swarm at all.
struct Identity;

impl Function for Identity {
    fn name(&self) -> &str {
        "Identity"
    }
    fn evaluate_raw(&self, ctx: &mut Context, position: &[BigFloat]) -> BigFloat {
        ctx.clone_value(&position[0])
    }
    fn lower_bound(&self, ctx: &mut Context, dimensions: usize) -> Vector {
        (0..dimensions).map(|_| ctx.from_f64(-1.0)).collect()
    }
    fn upper_bound(&self, ctx: &mut Context, dimensions: usize) -> Vector {
        (0..dimensions).map(|_| ctx.from_f64(1.0)).collect()
    }
}

fn test_ctx() -> Context {
    Context::new(64, 8, RandomEngine::new(RngVariant::Fast2p63, 0))
}

#[test]
fn periodic_bounds_fold_into_the_half_open_interval() {
    let mut ctx = test_ctx();
    let bounds = OutOfBoundsBehavior::Periodic;

    let at_2_5 = vec![ctx.from_f64(2.5)];
    let value = bounds.evaluate(&mut ctx, &Identity, &at_2_5);
    assert!((ctx.to_f64(&value).unwrap() - 0.5).abs() < 1e-12);
    ctx.release(value);
    hippso_core::vector::release(&mut ctx, at_2_5);

    let at_neg_0_5 = vec![ctx.from_f64(-0.5)];
    let value = bounds.evaluate(&mut ctx, &Identity, &at_neg_0_5);
    assert!((ctx.to_f64(&value).unwrap() - (-0.5)).abs() < 1e-12);
    ctx.release(value);
    hippso_core::vector::release(&mut ctx, at_neg_0_5);

    let at_3_0 = vec![ctx.from_f64(3.0)];
    let value = bounds.evaluate(&mut ctx, &Identity, &at_3_0);
    let folded = ctx.to_f64(&value).unwrap();
    assert!((folded - 1.0).abs() < 1e-12 || (folded - (-1.0)).abs() < 1e-12);
    ctx.release(value);
    hippso_core::vector::release(&mut ctx, at_3_0);
}

#[test]
fn infinity_bounds_reject_anything_outside_the_box() {
    let mut ctx = test_ctx();
    let bounds = OutOfBoundsBehavior::Infinity;

    let outside = vec![ctx.from_f64(1.1)];
    let value = bounds.evaluate(&mut ctx, &Identity, &outside);
    assert!(value.is_plus_infinity());
    ctx.release(value);
    hippso_core::vector::release(&mut ctx, outside);

    let inside = vec![ctx.zero()];
    let value = bounds.evaluate(&mut ctx, &Identity, &inside);
    assert!(ctx.is_zero(&value));
    ctx.release(value);
    hippso_core::vector::release(&mut ctx, inside);
}

#[test]
fn precision_stops_flagging_once_raised_past_the_cancellation() {
    let mut ctx = test_ctx();
    ctx.precision.check_policy = hippso_core::bigfloat::PrecisionCheckPolicy::Always;
    ctx.precision.check_probability = 1.0;
    ctx.precision.safety_margin = 8;

    let cancel = |ctx: &mut Context| -> bool {
        let one = ctx.one();
        let tiny = ctx.multiply2exp(&one, -60);
        let sum = ctx.add(&one, &tiny);
        let diff = ctx.subtract(&sum, &one);
        let flagged = ctx.precision.raise_precision_pending;
        ctx.release(one);
        ctx.release(tiny);
        ctx.release(sum);
        ctx.release(diff);
        flagged
    };

    assert!(cancel(&mut ctx), "a near-cancellation at 64 bits must flag precision loss");
    ctx.precision.raise_precision_pending = false;
    ctx.raise_precision();
    assert_eq!(ctx.precision_bits(), 74);
    ctx.precision.raise_precision_pending = false;
    assert!(!cancel(&mut ctx), "the same cancellation at 74 bits has enough headroom to not flag");
}

fn backup_roundtrip_config(dir_count: usize) -> Config {
    let mut config = base_config();
    config.particles = 3;
    config.dimensions = 2;
    config.steps = 10;
    config.parameter_chi = 0.7298;
    config.parameter_coefficient_local_attractor = 1.49618;
    config.parameter_coefficient_global_attractor = 1.49618;
    config.initialize_velocity = VelocityInitMode::Zero;
    config.initialization_information = Vec::new();
    config.srand = RngSpec { variant: RngVariantSetting::Fast2p63, seed: 777 };
    config.show_statistics = vec![StatisticsWindow { name: "best".to_string(), preset: StatisticPreset::GlobalBestValue, from: 0, to: 9, period: 1 }];
    let _ = dir_count;
    config
}

#[test]
fn backup_restore_and_continue_reproduces_an_uninterrupted_run() {
    let dir_a = tempfile::tempdir().unwrap();
    let config_a = backup_roundtrip_config(0);
    let mut engine_a = Engine::initialize(&config_a, dir_a.path().join("run_a"), Box::new(Sphere)).unwrap();
    engine_a.run_steps(10).unwrap();
    engine_a.flush_statistics().unwrap();
    let best_a = engine_a.topology.overall_attractor_value(&mut engine_a.ctx, engine_a.function.as_ref());
    let best_a_f64 = engine_a.ctx.to_f64(&best_a).unwrap();
    engine_a.ctx.release(best_a);

    let dir_bc = tempfile::tempdir().unwrap();
    let config_b = backup_roundtrip_config(0);
    let prefix_bc = dir_bc.path().join("run_bc");
    let mut engine_b = Engine::initialize(&config_b, prefix_bc.clone(), Box::new(Sphere)).unwrap();
    engine_b.run_steps(5).unwrap();
    engine_b.flush_statistics().unwrap();
    let backup_path = prefix_bc.with_extension("backup");
    engine_b.write_checkpoint(&backup_path).unwrap();

    let config_c = backup_roundtrip_config(0);
    let mut engine_c = Engine::restore(&config_c, prefix_bc.clone(), Box::new(Sphere), &backup_path).unwrap();
    assert_eq!(engine_c.step, 5);
    engine_c.run_steps(5).unwrap();
    engine_c.flush_statistics().unwrap();

    let best_c = engine_c.topology.overall_attractor_value(&mut engine_c.ctx, engine_c.function.as_ref());
    let best_c_f64 = engine_c.ctx.to_f64(&best_c).unwrap();
    engine_c.ctx.release(best_c);

    assert_eq!(best_a_f64, best_c_f64, "an interrupted run must reach the same attractor value as an uninterrupted one");

    let stats_a = std::fs::read_to_string(dir_a.path().join("run_a.STAT.best.txt")).unwrap();
    let stats_bc = std::fs::read_to_string(dir_bc.path().join("run_bc.STAT.best.txt")).unwrap();
    assert_eq!(stats_a, stats_bc, "statistics rows must be identical across the backup boundary");
}
