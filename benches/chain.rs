use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use radiofx::radio::chain::ProcessingChain;
use radiofx::settings::RadioSettings;
use std::hint::black_box;

const BUFFER_SIZES: [usize; 3] = [256, 1024, 2048];

fn build_chain(block_size: usize, oversampling: bool) -> ProcessingChain {
    let mut settings = RadioSettings::default();
    settings.block_size = block_size;
    settings.saturator.oversampling = oversampling;
    settings
        .build_chain()
        .expect("preset settings must build a chain")
}

fn test_signal(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.6 * (n as f32 * 0.07).sin() + 0.2 * (n as f32 * 0.31).sin())
        .collect()
}

fn bench_preset_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("Preset chain");

    for &size in &BUFFER_SIZES {
        for oversampling in [false, true] {
            let label = if oversampling { "2x" } else { "1x" };
            group.bench_with_input(
                BenchmarkId::new(format!("saturator {label}"), size),
                &size,
                |b, &size| {
                    let mut chain = build_chain(size, oversampling);
                    let input = test_signal(size);
                    let mut buffer = input.clone();

                    b.iter(|| {
                        buffer.copy_from_slice(&input);
                        chain
                            .process_block(black_box(&mut buffer))
                            .expect("finite input must process");
                        black_box(&buffer);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_eq_quality(c: &mut Criterion) {
    let mut group = c.benchmark_group("EQ precision");
    let size = 2048;

    for quality in [0, 2] {
        group.bench_with_input(
            BenchmarkId::new("quality", quality),
            &quality,
            |b, &quality| {
                let mut chain = build_chain(size, false);
                chain
                    .configure_chain(true, false, false, [0, 1, 2])
                    .expect("valid order");
                chain
                    .configure_eq(-11.0, false, quality)
                    .expect("valid quality");
                let input = test_signal(size);
                let mut buffer = input.clone();

                b.iter(|| {
                    buffer.copy_from_slice(&input);
                    chain
                        .process_block(black_box(&mut buffer))
                        .expect("finite input must process");
                    black_box(&buffer);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_preset_chain, bench_eq_quality);
criterion_main!(benches);
