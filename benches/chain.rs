use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use twindeck::audio::block::AudioBlock;
use twindeck::fx::chain::EffectChain;
use twindeck::fx::stages::ProcessSpec;

const SAMPLE_RATE: f32 = 48000.0;

fn build_chain(block_size: usize, busy: bool) -> EffectChain {
    let mut chain = EffectChain::default();
    chain.prepare(&ProcessSpec {
        sample_rate: SAMPLE_RATE,
        max_block_size: block_size,
        channels: 2,
    });
    if busy {
        chain.set_high_pass_amount(0.1);
        chain.set_low_pass_amount(0.6);
        chain.set_mid_band_amount(0.4);
        chain.set_reverb_amount(0.3);
        chain.set_flanger_amount(0.5);
        chain.set_tremolo_amount(0.7);
    }
    chain
}

fn noise_block(block_size: usize) -> AudioBlock {
    let channel: Vec<f32> = (0..block_size)
        .map(|i| ((i * 7919) % 1024) as f32 / 512.0 - 1.0)
        .collect();
    AudioBlock::from_channels(vec![channel.clone(), channel])
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("Effect Chain");

    for &block_size in &[64usize, 256, 1024] {
        for (label, busy) in [("neutral", false), ("all effects", true)] {
            group.bench_with_input(
                BenchmarkId::new(label, block_size),
                &block_size,
                |b, &block_size| {
                    let mut chain = build_chain(block_size, busy);
                    let input = noise_block(block_size);
                    let mut block = input.clone();

                    b.iter(|| {
                        block.copy_from(&input);
                        chain.process_block(black_box(&mut block));
                        black_box(&block);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_parameter_sweep(c: &mut Criterion) {
    c.bench_function("filter sweep per block", |b| {
        let mut chain = build_chain(256, true);
        let input = noise_block(256);
        let mut block = input.clone();
        let mut step = 0u32;

        b.iter(|| {
            step = (step + 1) % 100;
            chain.set_low_pass_amount(step as f32 / 100.0);
            block.copy_from(&input);
            chain.process_block(black_box(&mut block));
        });
    });
}

criterion_group!(benches, bench_chain, bench_parameter_sweep);
criterion_main!(benches);
