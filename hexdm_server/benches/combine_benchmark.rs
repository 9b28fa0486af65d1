//! Combine cycle and transform benchmarks

use criterion::{Criterion, criterion_group, criterion_main};
use hexdm_common::consts::{NSEG, NVACT};
use hexdm_common::dm::config::TransformConfig;
use hexdm_common::dm::types::ActuatorCommand;
use hexdm_server::combiner::CombineCycle;
use hexdm_server::transform::ptt_to_actuator_into;
use hexdm_shared_memory::ChannelSet;
use std::hint::black_box;
use tempfile::TempDir;

/// Benchmark the PTT to actuator conversion of a full mirror
fn bench_transform(c: &mut Criterion) {
    let config = TransformConfig::default();
    let ptt: Vec<f64> = (0..NVACT).map(|i| i as f64 * 0.01).collect();
    let mut command = ActuatorCommand::zeroed(config.command_size, NVACT);

    c.bench_function("ptt_to_actuator_169_segments", |b| {
        b.iter(|| {
            ptt_to_actuator_into(black_box(&ptt), NSEG, &config, &mut command);
            black_box(command.values()[0]);
        });
    });
}

/// Benchmark a full combine cycle for different channel counts
fn bench_combine(c: &mut Criterion) {
    for nch in [1, 4, 16] {
        let dir = TempDir::new().unwrap();
        let set = ChannelSet::create(dir.path(), "", nch, NSEG).unwrap();
        for index in 0..nch {
            set.write(index, &vec![index as f64; NVACT]).unwrap();
        }
        let mut cycle = CombineCycle::new(NSEG, TransformConfig::default());

        c.bench_function(&format!("combine_{nch}_channels"), |b| {
            b.iter(|| {
                black_box(cycle.combine(&set).unwrap());
            });
        });
    }
}

/// Benchmark a single channel write through the versioned protocol
fn bench_channel_write(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let set = ChannelSet::create(dir.path(), "", 1, NSEG).unwrap();
    let data = vec![1.5; NVACT];

    c.bench_function("channel_write_169_segments", |b| {
        b.iter(|| {
            black_box(set.write(0, black_box(&data)).unwrap());
        });
    });
}

criterion_group!(benches, bench_transform, bench_combine, bench_channel_write);
criterion_main!(benches);
