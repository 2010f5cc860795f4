use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{uvec2, vec2, vec3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use splash_cursor::cpu::CpuBackend;
use splash_cursor::{Simulation, SimulationConfig};

fn stirred(sim_resolution: u32, dye_resolution: u32) -> Simulation<CpuBackend> {
    let config = SimulationConfig {
        sim_resolution,
        dye_resolution,
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::with_rng(CpuBackend::new(uvec2(640, 360)), config, StdRng::seed_from_u64(0))
        .expect("benchmark simulation");
    sim.splat(vec2(0.3, 0.5), vec2(800.0, 200.0), vec3(0.8, 0.2, 0.1));
    sim.splat(vec2(0.7, 0.4), vec2(-600.0, 300.0), vec3(0.1, 0.3, 0.9));
    sim
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample-size-10");
    group.sample_size(10);

    let mut sim = stirred(64, 256);
    group.bench_function("step: sim=64, dye=256", |b| b.iter(|| sim.step(black_box(1.0 / 60.0))));

    let mut sim = stirred(128, 512);
    group.bench_function("step: sim=128, dye=512", |b| b.iter(|| sim.step(black_box(1.0 / 60.0))));

    let mut sim = stirred(128, 512);
    let mut now = 0.0;
    group.bench_function("frame with present: sim=128, dye=512", |b| {
        b.iter(|| {
            now += 16.0;
            sim.frame(black_box(now));
        })
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
