use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use twindeck::audio::block::AudioBlock;
use twindeck::audio::deck::{Control, DeckHandle};
use twindeck::audio::mixer::{DeckId, Mixer};
use twindeck::audio::recorder::{PcmBlock, Recorder, to_pcm16};
use twindeck::audio::track::Track;
use twindeck::settings::Settings;

#[cfg(debug_assertions)]
use assert_no_alloc::AllocDisabler;
use assert_no_alloc::assert_no_alloc;

#[cfg(debug_assertions)]
#[global_allocator]
static ALLOCATOR: AllocDisabler = AllocDisabler;

/// `deck:control=value`, e.g. `a:reverb=0.3`.
#[derive(Debug, Clone, Copy)]
struct ControlArg {
    deck: DeckId,
    control: Control,
    value: f64,
}

impl FromStr for ControlArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (deck, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("expected deck:control=value, got '{s}'"))?;
        let (control, value) = rest
            .split_once('=')
            .ok_or_else(|| format!("expected deck:control=value, got '{s}'"))?;

        Ok(Self {
            deck: deck.parse::<DeckId>()?,
            control: control.parse::<Control>().map_err(|e| e.to_string())?,
            value: value
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid value '{value}': {e}"))?,
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "twindeck-render")]
#[command(version)]
#[command(about = "Render two decks through their effect chains and a crossfader to a WAV file.")]
struct Args {
    #[arg(long, help = "WAV file to load on deck A")]
    deck_a: PathBuf,
    #[arg(long, help = "WAV file to load on deck B")]
    deck_b: Option<PathBuf>,
    #[arg(long, env = "TWINDECK_SECONDS", default_value_t = 30.0, help = "Length of the render in seconds")]
    seconds: f64,
    #[arg(long, default_value_t = 0.5, help = "Crossfader position, 0 = deck A, 1 = deck B")]
    crossfader: f64,
    #[arg(long = "control", help = "Deck control as deck:control=value, e.g. a:reverb=0.3")]
    controls: Vec<ControlArg>,
    #[arg(long, env = "TWINDECK_RENDER_DIR", help = "Directory to write the render to")]
    output_dir: Option<PathBuf>,
    #[arg(long, env = "TWINDECK_SAMPLE_RATE", help = "Override the configured sample rate")]
    sample_rate: Option<u32>,
    #[arg(long, env = "TWINDECK_BLOCK_SIZE", help = "Override the configured block size")]
    block_size: Option<u32>,
}

fn load_track(path: &Path, sample_rate: u32) -> Result<Arc<Track>> {
    let track = Track::from_wav(path)?;
    let track = track
        .resample(sample_rate)
        .with_context(|| format!("failed to resample '{}'", path.display()))?;
    Ok(Arc::new(track))
}

fn report(id: DeckId, deck: &DeckHandle) {
    info!(
        "Deck {id}: {} blocks, position {:.2}/{:.2} s, {} deadline misses",
        deck.blocks_processed(),
        deck.position_seconds(),
        deck.length_seconds(),
        deck.deadline_misses()
    );
    let violations = deck.precondition_violations();
    if violations > 0 {
        warn!("Deck {id}: {violations} blocks rendered as silence");
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    info!("twindeck-render v{}", env!("CARGO_PKG_VERSION"));
    info!("Args: {:?}", args);

    if !(args.seconds.is_finite() && args.seconds > 0.0) {
        bail!("--seconds must be a positive number, got {}", args.seconds);
    }

    let mut settings = Settings::load().context("failed to load settings")?;
    if let Some(rate) = args.sample_rate {
        settings.audio.sample_rate = rate;
    }
    if let Some(size) = args.block_size {
        settings.audio.block_size = size;
    }
    info!("{settings}");

    let sample_rate = settings.audio.sample_rate;
    let block_size = settings.audio.block_size.max(1) as usize;
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(&settings.render_dir));

    let (mut mixer, handle) = Mixer::new(&settings.mixer_config());
    mixer.prepare(block_size, f64::from(sample_rate));
    handle.set_crossfader(args.crossfader);

    let decks = [(DeckId::A, Some(&args.deck_a)), (DeckId::B, args.deck_b.as_ref())];
    for (id, path) in decks {
        let Some(path) = path else { continue };
        let track = load_track(path, sample_rate)
            .with_context(|| format!("failed to load deck {id}"))?;
        handle.deck(id).load_track(track);
    }

    for arg in &args.controls {
        info!("Deck {}: {} = {}", arg.deck, arg.control, arg.value);
        handle.deck(arg.deck).apply_control(arg.control, arg.value);
    }

    for (id, path) in decks {
        if path.is_some() {
            handle.deck(id).start();
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    let shutdown_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, finishing render...");
        shutdown_flag.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl+C handler")?;

    let recorder = Recorder::new(sample_rate, &output_dir)?;
    let render_path = recorder.path().to_path_buf();
    let tx = recorder.sender();

    let total_frames = (args.seconds * f64::from(sample_rate)).round() as usize;
    let mut out = AudioBlock::new(2, block_size);
    let mut interleaved = vec![0.0f32; block_size * 2];
    let mut rendered = 0;

    while rendered < total_frames && running.load(Ordering::SeqCst) {
        let frames = (total_frames - rendered).min(block_size);
        out.set_len(frames);

        assert_no_alloc(|| mixer.process_block(&mut out));

        let written = out.write_interleaved(&mut interleaved);
        let mut pcm = PcmBlock::with_capacity(written * 2);
        to_pcm16(&interleaved[..written * 2], &mut pcm);
        tx.send(pcm).context("render writer stopped")?;
        rendered += frames;

        if !handle.deck_a().is_playing() && !handle.deck_b().is_playing() {
            info!("All decks finished");
            break;
        }
    }

    drop(tx);
    recorder.stop()?;

    info!(
        "Rendered {:.2} s to {}",
        rendered as f64 / f64::from(sample_rate),
        render_path.display()
    );
    report(DeckId::A, handle.deck_a());
    report(DeckId::B, handle.deck_b());
    handle.deck_a().reclaim_retired();
    handle.deck_b().reclaim_retired();

    Ok(())
}
