use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use twindeck::audio::block::AudioBlock;
use twindeck::audio::mixer::{Mixer, MixerConfig};
use twindeck::audio::track::Track;

const SAMPLE_RATE: u32 = 48000;

fn test_track(seconds: usize) -> Arc<Track> {
    let frames = SAMPLE_RATE as usize * seconds;
    let samples: Vec<f32> = (0..frames)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin() * 0.5)
        .collect();
    Arc::new(Track::new("bench", SAMPLE_RATE, vec![samples.clone(), samples]).unwrap())
}

fn bench_mixer(c: &mut Criterion) {
    let mut group = c.benchmark_group("Two Deck Mixer");
    let track = test_track(10);

    for &block_size in &[128usize, 512] {
        group.bench_with_input(
            BenchmarkId::new("playing", block_size),
            &block_size,
            |b, &block_size| {
                let (mut mixer, handle) = Mixer::new(&MixerConfig::default());
                mixer.prepare(block_size, f64::from(SAMPLE_RATE));

                for deck in [handle.deck_a(), handle.deck_b()] {
                    deck.load_track(Arc::clone(&track));
                    deck.set_speed(1.07);
                    deck.set_reverb_amount(0.3);
                    deck.set_flanger_amount(0.3);
                    deck.set_tremolo_amount(0.5);
                    deck.start();
                }

                let mut out = AudioBlock::new(2, block_size);
                b.iter(|| {
                    if !handle.deck_a().is_playing() {
                        handle.deck_a().set_position(0.0);
                        handle.deck_b().set_position(0.0);
                        handle.deck_a().start();
                        handle.deck_b().start();
                    }
                    mixer.process_block(black_box(&mut out));
                    black_box(&out);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_mixer);
criterion_main!(benches);
