criterion::criterion_main!(benches);
criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .sample_size(30)
        .measurement_time(std::time::Duration::from_secs(2));
    targets =
        adding_at_64_bits,
        adding_at_4096_bits,
        multiplying_at_4096_bits,
        dividing_at_4096_bits,
        sqrt_at_4096_bits,
        drawing_a_uniform_bignum,
        running_a_small_swarm_for_fifty_steps,
}

use hippso_core::bigfloat::Context;
use hippso_core::config::{
    CheckPrecisionSetting, Config, DebugSwarmConfig, OutOfBoundsSetting, RngSpec, RngVariantSetting, TopologySetting, UpdateGlobalAttractorSetting,
    VelocityInitMode,
};
use hippso_core::engine::Engine;
use hippso_core::rng::{RandomEngine, RngVariant};
use hippso_core::strategy::function::Sphere;

fn ctx_at(precision: u32) -> Context {
    Context::new(precision, 8, RandomEngine::new(RngVariant::Fast2p63, 0x2545F4914F6CDD1D))
}

fn adding_at_64_bits(c: &mut criterion::Criterion) {
    let mut ctx = ctx_at(64);
    let a = ctx.from_f64(1.0);
    let b = ctx.from_f64(2.0);
    c.bench_function("add two 64-bit floats", |bencher| {
        bencher.iter(|| {
            let sum = ctx.add(&a, &b);
            ctx.release(sum);
        })
    });
    ctx.release(a);
    ctx.release(b);
}

fn adding_at_4096_bits(c: &mut criterion::Criterion) {
    let mut ctx = ctx_at(4096);
    let a = ctx.from_f64(1.0);
    let b = ctx.from_f64(2.0);
    c.bench_function("add two 4096-bit floats", |bencher| {
        bencher.iter(|| {
            let sum = ctx.add(&a, &b);
            ctx.release(sum);
        })
    });
    ctx.release(a);
    ctx.release(b);
}

fn multiplying_at_4096_bits(c: &mut criterion::Criterion) {
    let mut ctx = ctx_at(4096);
    let a = ctx.from_f64(1.2345);
    let b = ctx.from_f64(6.789);
    c.bench_function("multiply two 4096-bit floats", |bencher| {
        bencher.iter(|| {
            let product = ctx.multiply(&a, &b);
            ctx.release(product);
        })
    });
    ctx.release(a);
    ctx.release(b);
}

fn dividing_at_4096_bits(c: &mut criterion::Criterion) {
    let mut ctx = ctx_at(4096);
    let a = ctx.from_f64(1.2345);
    let b = ctx.from_f64(6.789);
    c.bench_function("divide two 4096-bit floats", |bencher| {
        bencher.iter(|| {
            let quotient = ctx.divide(&a, &b);
            ctx.release(quotient);
        })
    });
    ctx.release(a);
    ctx.release(b);
}

fn sqrt_at_4096_bits(c: &mut criterion::Criterion) {
    let mut ctx = ctx_at(4096);
    let a = ctx.from_f64(2.0);
    c.bench_function("square root of a 4096-bit float", |bencher| {
        bencher.iter(|| {
            let root = ctx.sqrt(&a);
            ctx.release(root);
        })
    });
    ctx.release(a);
}

fn drawing_a_uniform_bignum(c: &mut criterion::Criterion) {
    let mut rng = RandomEngine::new(RngVariant::Intense2p63 { accept_bits: 16 }, 42);
    c.bench_function("draw a 4096-bit uniform", |bencher| {
        bencher.iter(|| rng.uniform_bignum(4096, 4096))
    });
}

fn small_swarm_config() -> Config {
    Config {
        particles: 20,
        dimensions: 5,
        steps: 10_000,
        parameter_chi: 0.7298,
        parameter_coefficient_local_attractor: 1.49618,
        parameter_coefficient_global_attractor: 1.49618,
        initial_precision: 128,
        precision: 128,
        output_precision: 30,
        check_precision: CheckPrecisionSetting::AllExceptStatistics,
        check_precision_probability: 0.1,
        initialize_velocity: VelocityInitMode::Zero,
        update_global_attractor: UpdateGlobalAttractorSetting::EachParticle,
        function_behavior_outside_of_bounds: OutOfBoundsSetting::Normal,
        initialization_information: Vec::new(),
        function_bounds: Vec::new(),
        show_statistics: Vec::new(),
        preserve_backup: Vec::new(),
        run_check: None,
        topology: TopologySetting::GlobalBest,
        srand: RngSpec { variant: RngVariantSetting::Fast2p63, seed: 7 },
        backup_interval_seconds: u64::MAX,
        run_check_interval_seconds: u64::MAX,
        debug_swarm: DebugSwarmConfig::default(),
    }
}

fn running_a_small_swarm_for_fifty_steps(c: &mut criterion::Criterion) {
    let config = small_swarm_config();
    c.bench_function("run 20 particles for 50 steps", |bencher| {
        bencher.iter(|| {
            let mut engine = Engine::initialize(&config, "/tmp/hippso-bench-swarm", Box::new(Sphere)).unwrap();
            engine.run_steps(50).unwrap();
        })
    });
}
