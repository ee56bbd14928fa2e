use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use twindeck::audio::block::AudioBlock;
use twindeck::audio::deck::{Control, Deck, DeckConfig, DeckHandle, DeckState};
use twindeck::audio::track::Track;

const SAMPLE_RATE: u32 = 44_100;
const BLOCK_SIZE: usize = 512;

fn sine_track(freq: f32, seconds: f32) -> Result<Arc<Track>> {
    let frames = (SAMPLE_RATE as f32 * seconds) as usize;
    let samples: Vec<f32> = (0..frames)
        .map(|i| (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin() * 0.8)
        .collect();
    Ok(Arc::new(Track::new("sine", SAMPLE_RATE, vec![samples.clone(), samples])?))
}

fn noise_track(seed: u64, seconds: f32) -> Result<Arc<Track>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let frames = (SAMPLE_RATE as f32 * seconds) as usize;
    let channels = (0..2)
        .map(|_| (0..frames).map(|_| rng.random_range(-0.5f32..0.5)).collect())
        .collect();
    Ok(Arc::new(Track::new("noise", SAMPLE_RATE, channels)?))
}

fn prepared_deck() -> (Deck, DeckHandle) {
    let (mut deck, handle) = Deck::new(&DeckConfig::default());
    deck.prepare(BLOCK_SIZE, f64::from(SAMPLE_RATE));
    (deck, handle)
}

fn render(deck: &mut Deck, blocks: usize) -> Vec<AudioBlock> {
    (0..blocks)
        .map(|_| {
            let mut block = AudioBlock::new(2, BLOCK_SIZE);
            deck.process_block(&mut block);
            block
        })
        .collect()
}

fn apply_busy_settings(handle: &DeckHandle) {
    handle.set_high_pass_amount(0.1);
    handle.set_low_pass_amount(0.7);
    handle.set_mid_band_amount(0.3);
    handle.set_reverb_amount(0.4);
    handle.set_flanger_amount(0.5);
    handle.set_tremolo_amount(0.6);
    handle.set_speed(1.25);
}

#[test]
fn out_of_range_gain_keeps_previous_value() {
    let (_deck, handle) = prepared_deck();

    handle.set_gain(0.5);
    handle.set_gain(1.5);
    assert_eq!(handle.gain(), 0.5);

    handle.set_gain(-0.1);
    handle.set_gain(f64::NAN);
    assert_eq!(handle.gain(), 0.5);
}

#[test]
fn out_of_range_speed_keeps_previous_value() {
    let (_deck, handle) = prepared_deck();

    handle.set_speed(2.0);
    handle.set_speed(0.0);
    handle.set_speed(-1.0);
    handle.set_speed(100.5);
    assert_eq!(handle.speed(), 2.0);

    handle.set_speed(100.0);
    assert_eq!(handle.speed(), 100.0);
}

#[test]
fn relative_seek_converts_to_seconds() -> Result<()> {
    const RATE: u32 = 1000;
    let track = Arc::new(Track::new("long", RATE, vec![vec![0.0; 200 * RATE as usize]])?);
    assert_eq!(track.length_seconds(), 200.0);

    let (mut deck, handle) = Deck::new(&DeckConfig::default());
    deck.prepare(64, f64::from(RATE));
    handle.load_track(track);
    handle.set_position_relative(0.5);

    let mut block = AudioBlock::new(2, 64);
    deck.process_block(&mut block);
    assert!((handle.position_seconds() - 100.0).abs() < 1e-9);
    assert!((handle.position_relative() - 0.5).abs() < 1e-12);

    // Rejected seeks leave the position alone
    handle.set_position_relative(1.5);
    handle.set_position_relative(-0.5);
    deck.process_block(&mut block);
    assert!((handle.position_seconds() - 100.0).abs() < 1e-9);

    handle.set_position(250.0);
    deck.process_block(&mut block);
    assert!((handle.position_seconds() - 200.0).abs() < 1e-9);

    Ok(())
}

#[test]
fn neutral_pipeline_is_transparent() -> Result<()> {
    let track = sine_track(440.0, 1.0)?;
    let (mut deck, handle) = prepared_deck();
    handle.set_high_pass_amount(0.0);
    handle.set_low_pass_amount(1.0);
    handle.set_mid_band_amount(0.0);
    handle.set_reverb_amount(0.0);
    handle.set_flanger_amount(0.0);
    handle.set_tremolo_amount(0.0);
    handle.load_track(Arc::clone(&track));
    handle.start();

    let mut output = Vec::with_capacity(track.num_frames());
    let mut block = AudioBlock::new(2, BLOCK_SIZE);
    while output.len() < track.num_frames() {
        block.set_len((track.num_frames() - output.len()).min(BLOCK_SIZE));
        deck.process_block(&mut block);
        assert_eq!(block.channel(0), block.channel(1));
        output.extend_from_slice(block.channel(0));
    }

    let max_err = output
        .iter()
        .zip(track.channel(0))
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max);
    assert!(max_err < 1e-6, "max error {max_err}");
    assert!(!handle.is_playing());
    assert_eq!(handle.blocks_processed(), track.num_frames().div_ceil(BLOCK_SIZE) as u64);

    Ok(())
}

#[test]
fn prepare_release_prepare_matches_fresh_deck() -> Result<()> {
    let track = noise_track(3, 2.0)?;

    let (mut reused, reused_handle) = prepared_deck();
    apply_busy_settings(&reused_handle);
    reused_handle.load_track(Arc::clone(&track));
    reused_handle.start();
    render(&mut reused, 40);

    reused.release_resources();
    assert_eq!(reused.state(), DeckState::Unprepared);
    reused.prepare(BLOCK_SIZE, f64::from(SAMPLE_RATE));
    reused_handle.load_track(Arc::clone(&track));
    reused_handle.start();

    let (mut fresh, fresh_handle) = prepared_deck();
    apply_busy_settings(&fresh_handle);
    fresh_handle.load_track(track);
    fresh_handle.start();

    let a = render(&mut reused, 40);
    let b = render(&mut fresh, 40);
    assert_eq!(a, b);
    assert!(a.iter().any(|block| block.peak() > 0.0));

    Ok(())
}

#[test]
fn end_of_track_stops_playback() -> Result<()> {
    let track = sine_track(220.0, 0.05)?;
    let (mut deck, handle) = prepared_deck();
    handle.load_track(track);
    handle.start();

    let blocks = render(&mut deck, 8);
    assert!(!handle.is_playing());
    assert!((handle.position_relative() - 1.0).abs() < 1e-9);
    assert_eq!(blocks.last().map(AudioBlock::peak), Some(0.0));

    Ok(())
}

#[test]
fn named_controls_dispatch_to_setters() {
    let (_deck, handle) = prepared_deck();

    handle.apply_control("reverb".parse().unwrap(), 0.3);
    handle.apply_control(Control::Gain, 0.25);
    handle.apply_control(Control::HighPass, 0.4);
    handle.apply_control(Control::Tremolo, 2.0);
    handle.apply_control(Control::TremoloRate, 8.0);
    handle.apply_control(Control::Speed, 0.0);

    assert!((handle.reverb_parameters().wet_level - 0.3).abs() < 1e-7);
    assert_eq!(handle.gain(), 0.25);
    assert!((handle.high_pass_amount() - 0.4).abs() < 1e-7);
    assert_eq!(handle.tremolo_amount(), 1.0);
    assert_eq!(handle.tremolo_rate(), 8.0);
    assert_eq!(handle.speed(), 1.0);
}

#[test]
fn composite_sets_are_never_seen_half_written() -> Result<()> {
    let (mut deck, handle) = prepared_deck();
    handle.load_track(noise_track(11, 1.0)?);
    handle.start();

    let done = Arc::new(AtomicBool::new(false));
    let writer = {
        let handle = handle.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(99);
            while !done.load(Ordering::Relaxed) {
                handle.set_reverb_amount(rng.random_range(0.0..=1.0));
                handle.set_flanger_amount(rng.random_range(0.0..=1.0));
            }
        })
    };

    let mut block = AudioBlock::new(2, BLOCK_SIZE);
    for _ in 0..200 {
        deck.process_block(&mut block);
        let reverb = deck.chain().reverb().parameters();
        assert!((reverb.wet_level + reverb.dry_level - 1.0).abs() < 1e-6);
        assert!(block.channels().all(|ch| ch.iter().all(|s| s.is_finite())));
    }

    done.store(true, Ordering::Relaxed);
    writer.join().map_err(|_| anyhow::anyhow!("writer thread panicked"))?;
    Ok(())
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "called in state Unprepared")]
fn processing_before_prepare_panics_in_debug() {
    let (mut deck, _handle) = Deck::new(&DeckConfig::default());
    let mut block = AudioBlock::new(2, 64);
    deck.process_block(&mut block);
}

#[cfg(not(debug_assertions))]
#[test]
fn processing_before_prepare_outputs_silence() {
    let (mut deck, handle) = Deck::new(&DeckConfig::default());
    let mut block = AudioBlock::from_channels(vec![vec![1.0; 64], vec![1.0; 64]]);
    deck.process_block(&mut block);

    assert_eq!(block.peak(), 0.0);
    assert_eq!(handle.precondition_violations(), 1);
    assert_eq!(deck.state(), DeckState::Unprepared);
}

#[test]
fn zero_length_blocks_are_accepted() -> Result<()> {
    let (mut deck, handle) = prepared_deck();
    apply_busy_settings(&handle);
    handle.load_track(sine_track(440.0, 0.1)?);
    handle.start();

    let mut block = AudioBlock::new(2, BLOCK_SIZE);
    block.set_len(0);
    deck.process_block(&mut block);
    assert!(block.is_empty());
    assert_eq!(handle.position_seconds(), 0.0);
    assert_eq!(handle.deadline_misses(), 0);
    Ok(())
}
