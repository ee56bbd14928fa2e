use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use log::{debug, info, warn};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::audio::block::AudioBlock;
use crate::audio::params::{
    DeckParameters, DeckStatus, ParameterError, clamp_amount, validate_gain,
    validate_relative_position, validate_speed,
};
use crate::audio::track::Track;
use crate::audio::transport::Transport;
use crate::fx::chain::{ChainConfig, EffectChain};
use crate::fx::stages::ProcessSpec;
use crate::fx::stages::chorus::ChorusParameters;
use crate::fx::stages::reverb::ReverbParameters;

const COMMAND_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeckConfig {
    pub chain: ChainConfig,
    pub channels: usize,
    pub command_capacity: usize,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            chain: ChainConfig::default(),
            channels: 2,
            command_capacity: COMMAND_CAPACITY,
        }
    }
}

/// Transport changes, applied in order at the start of the next block.
#[derive(Debug)]
pub enum DeckCommand {
    Load(Arc<Track>),
    Unload,
    Start,
    Stop,
    Seek(f64),
    SeekRelative(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckState {
    Unprepared,
    Prepared,
    Processing,
}

/// Named deck controls, as used on the command line (`reverb=0.3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Gain,
    Speed,
    Position,
    HighPass,
    LowPass,
    MidBand,
    Reverb,
    Flanger,
    Tremolo,
    TremoloRate,
}

impl Control {
    pub const ALL: [Self; 10] = [
        Self::Gain,
        Self::Speed,
        Self::Position,
        Self::HighPass,
        Self::LowPass,
        Self::MidBand,
        Self::Reverb,
        Self::Flanger,
        Self::Tremolo,
        Self::TremoloRate,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Gain => "gain",
            Self::Speed => "speed",
            Self::Position => "position",
            Self::HighPass => "high-pass",
            Self::LowPass => "low-pass",
            Self::MidBand => "mid",
            Self::Reverb => "reverb",
            Self::Flanger => "flanger",
            Self::Tremolo => "tremolo",
            Self::TremoloRate => "tremolo-rate",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown control '{0}'")]
pub struct UnknownControl(pub String);

impl FromStr for Control {
    type Err = UnknownControl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "hp" | "highpass" => return Ok(Self::HighPass),
            "lp" | "lowpass" => return Ok(Self::LowPass),
            "mid-band" | "band" => return Ok(Self::MidBand),
            "volume" => return Ok(Self::Gain),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| UnknownControl(s.to_string()))
    }
}

/// Whether processing `frames` took longer than the time they represent.
pub fn deadline_exceeded(elapsed: Duration, frames: usize, sample_rate: f64) -> bool {
    if frames == 0 || sample_rate <= 0.0 {
        return false;
    }
    elapsed.as_secs_f64() > frames as f64 / sample_rate
}

/// One deck's real-time pipeline: transport fetch followed by the effect
/// chain. Lives on the audio thread; all control goes through `DeckHandle`.
pub struct Deck {
    state: DeckState,
    transport: Transport,
    chain: EffectChain,
    channels: usize,
    max_block_size: usize,
    sample_rate: f64,
    params: Arc<DeckParameters>,
    status: Arc<DeckStatus>,
    rx_commands: Receiver<DeckCommand>,
    tx_retired: Sender<Arc<Track>>,
}

/// Control-thread side of a `Deck`.
///
/// Setters validate their input; anything out of range is logged and
/// ignored, leaving the previous value in place.
#[derive(Clone)]
pub struct DeckHandle {
    params: Arc<DeckParameters>,
    status: Arc<DeckStatus>,
    tx_commands: Sender<DeckCommand>,
    rx_retired: Receiver<Arc<Track>>,
}

impl Deck {
    pub fn new(config: &DeckConfig) -> (Self, DeckHandle) {
        let capacity = config.command_capacity.max(1);
        let (tx_commands, rx_commands) = bounded(capacity);
        // Every queued command can retire at most one track, plus one in flight
        let (tx_retired, rx_retired) = bounded(capacity * 2);

        let params = Arc::new(DeckParameters::new(
            config.chain.reverb.clamped(),
            config.chain.chorus.clamped(),
            config.chain.tremolo_rate_hz,
        ));
        let status = Arc::new(DeckStatus::default());

        let deck = Self {
            state: DeckState::Unprepared,
            transport: Transport::new(),
            chain: EffectChain::new(&config.chain),
            channels: config.channels,
            max_block_size: 0,
            sample_rate: 0.0,
            params: Arc::clone(&params),
            status: Arc::clone(&status),
            rx_commands,
            tx_retired,
        };

        let handle = DeckHandle {
            params,
            status,
            tx_commands,
            rx_retired,
        };

        (deck, handle)
    }

    pub const fn state(&self) -> DeckState {
        self.state
    }

    pub const fn chain(&self) -> &EffectChain {
        &self.chain
    }

    /// Size every buffer for `max_block_size` frames at `sample_rate`.
    /// Must be called before the first `process_block`.
    pub fn prepare(&mut self, max_block_size: usize, sample_rate: f64) {
        let spec = ProcessSpec {
            sample_rate: sample_rate as f32,
            max_block_size,
            channels: self.channels,
        };
        self.chain.prepare(&spec);
        self.max_block_size = max_block_size;
        self.sample_rate = sample_rate;

        self.sync_parameters();
        self.transport.prepare(sample_rate);
        self.state = DeckState::Prepared;

        info!("Deck prepared: {max_block_size} frames at {sample_rate} Hz");
    }

    /// Free delay lines and scratch buffers and return to `Unprepared`.
    /// The loaded track and all parameter values are kept.
    pub fn release_resources(&mut self) {
        self.chain.release();
        self.max_block_size = 0;
        self.state = DeckState::Unprepared;
        debug!("Deck resources released");
    }

    /// Render the next block in place.
    ///
    /// Calling this before `prepare`, or with more frames than were
    /// prepared for, is a precondition violation: debug builds panic,
    /// release builds output silence and count it in the status.
    pub fn process_block(&mut self, block: &mut AudioBlock) {
        let valid = self.state != DeckState::Unprepared && block.len() <= self.max_block_size;
        debug_assert!(
            valid,
            "Deck::process_block called in state {:?} with {} frames (prepared for {})",
            self.state,
            block.len(),
            self.max_block_size
        );
        if !valid {
            block.clear();
            self.count_violation();
            return;
        }

        let started = Instant::now();
        self.state = DeckState::Processing;

        self.handle_commands();
        self.sync_parameters();

        self.transport.next_block(block);
        self.chain.process_block(block);

        self.publish_status();
        if deadline_exceeded(started.elapsed(), block.len(), self.sample_rate) {
            self.status.deadline_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn count_violation(&self) {
        self.status
            .precondition_violations
            .fetch_add(1, Ordering::Relaxed);
    }

    fn handle_commands(&mut self) {
        while let Ok(command) = self.rx_commands.try_recv() {
            match command {
                DeckCommand::Load(track) => {
                    if let Some(old) = self.transport.load(track) {
                        self.retire(old);
                    }
                    // Tails of the previous track do not carry over
                    self.chain.reset();
                }
                DeckCommand::Unload => {
                    if let Some(old) = self.transport.unload() {
                        self.retire(old);
                    }
                }
                DeckCommand::Start => self.transport.start(),
                DeckCommand::Stop => self.transport.stop(),
                DeckCommand::Seek(seconds) => self.transport.set_position(seconds),
                DeckCommand::SeekRelative(relative) => {
                    self.transport.set_position_relative(relative);
                }
            }
        }
    }

    // Hand a replaced track back to the control thread for dropping. If the
    // return queue is full it is dropped here.
    fn retire(&self, track: Arc<Track>) {
        let _ = self.tx_retired.try_send(track);
    }

    fn sync_parameters(&mut self) {
        let p = &self.params;
        self.transport.set_gain(p.gain.load());
        self.transport.set_speed(p.speed.load());

        self.chain.set_high_pass_amount(p.high_pass_amount.load());
        self.chain.set_low_pass_amount(p.low_pass_amount.load());
        self.chain.set_mid_band_amount(p.mid_band_mix.load());
        self.chain.set_reverb_parameters(**p.reverb.load());
        self.chain.set_chorus_parameters(**p.chorus.load());
        self.chain.set_tremolo_amount(p.tremolo_depth.load());
        self.chain.set_tremolo_rate(p.tremolo_rate.load());
    }

    fn publish_status(&self) {
        let status = &self.status;
        status.position_seconds.store(self.transport.position_seconds());
        status.length_seconds.store(self.transport.length_seconds());
        status
            .playing
            .store(self.transport.is_playing(), Ordering::Relaxed);
        status.blocks_processed.fetch_add(1, Ordering::Relaxed);
    }
}

impl DeckHandle {
    pub fn set_gain(&self, gain: f64) {
        match validate_gain(gain) {
            Ok(gain) => {
                self.params.gain.store(gain as f32);
                debug!("Deck gain set to {gain}");
            }
            Err(e) => warn!("Ignoring gain change: {e}"),
        }
    }

    pub fn set_speed(&self, ratio: f64) {
        match validate_speed(ratio) {
            Ok(ratio) => {
                self.params.speed.store(ratio);
                debug!("Deck speed set to {ratio}");
            }
            Err(e) => warn!("Ignoring speed change: {e}"),
        }
    }

    /// Seek to `relative` times the track length.
    pub fn set_position_relative(&self, relative: f64) {
        match validate_relative_position(relative) {
            Ok(relative) => self.send(DeckCommand::SeekRelative(relative)),
            Err(e) => warn!("Ignoring seek: {e}"),
        }
    }

    /// Seek to an absolute time, clamped to the track.
    pub fn set_position(&self, seconds: f64) {
        if seconds.is_finite() {
            self.send(DeckCommand::Seek(seconds));
        } else {
            warn!(
                "Ignoring seek: {}",
                ParameterError::NotFinite { name: "position" }
            );
        }
    }

    pub fn set_high_pass_amount(&self, amount: f64) {
        self.params.high_pass_amount.store(clamp_amount(amount as f32));
    }

    pub fn set_low_pass_amount(&self, amount: f64) {
        self.params.low_pass_amount.store(clamp_amount(amount as f32));
    }

    pub fn set_mid_band_amount(&self, amount: f64) {
        self.params.mid_band_mix.store(clamp_amount(amount as f32));
    }

    pub fn set_reverb_amount(&self, amount: f64) {
        let amount = amount as f32;
        self.params
            .reverb
            .rcu(|current| Arc::new(current.with_amount(amount)));
    }

    pub fn set_reverb_parameters(&self, params: ReverbParameters) {
        self.params.reverb.store(Arc::new(params.clamped()));
        debug!("Deck reverb set to {params:?}");
    }

    pub fn set_flanger_amount(&self, amount: f64) {
        let amount = amount as f32;
        self.params
            .chorus
            .rcu(|current| Arc::new(current.with_amount(amount)));
    }

    pub fn set_chorus_parameters(&self, params: ChorusParameters) {
        self.params.chorus.store(Arc::new(params.clamped()));
        debug!("Deck chorus set to {params:?}");
    }

    pub fn set_tremolo_amount(&self, depth: f64) {
        self.params.tremolo_depth.store(clamp_amount(depth as f32));
    }

    pub fn set_tremolo_rate(&self, rate_hz: f64) {
        if rate_hz.is_finite() && rate_hz >= 0.0 {
            self.params.tremolo_rate.store(rate_hz as f32);
        } else {
            warn!("Ignoring tremolo rate {rate_hz}: must be a non-negative number");
        }
    }

    /// Set one named control.
    pub fn apply_control(&self, control: Control, value: f64) {
        match control {
            Control::Gain => self.set_gain(value),
            Control::Speed => self.set_speed(value),
            Control::Position => self.set_position_relative(value),
            Control::HighPass => self.set_high_pass_amount(value),
            Control::LowPass => self.set_low_pass_amount(value),
            Control::MidBand => self.set_mid_band_amount(value),
            Control::Reverb => self.set_reverb_amount(value),
            Control::Flanger => self.set_flanger_amount(value),
            Control::Tremolo => self.set_tremolo_amount(value),
            Control::TremoloRate => self.set_tremolo_rate(value),
        }
    }

    pub fn load_track(&self, track: Arc<Track>) {
        info!("Loading '{}' ({:.2} s)", track.name(), track.length_seconds());
        self.send(DeckCommand::Load(track));
    }

    pub fn unload(&self) {
        self.send(DeckCommand::Unload);
    }

    pub fn start(&self) {
        self.send(DeckCommand::Start);
    }

    pub fn stop(&self) {
        self.send(DeckCommand::Stop);
    }

    fn send(&self, command: DeckCommand) {
        self.reclaim_retired();
        match self.tx_commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                warn!("Deck command queue full, dropping {command:?}");
            }
            Err(TrySendError::Disconnected(command)) => {
                warn!("Deck is gone, dropping {command:?}");
            }
        }
    }

    /// Drop tracks the audio thread has finished with. Returns how many
    /// were reclaimed.
    pub fn reclaim_retired(&self) -> usize {
        let mut count = 0;
        while let Ok(track) = self.rx_retired.try_recv() {
            debug!("Releasing track '{}'", track.name());
            count += 1;
        }
        count
    }

    pub fn gain(&self) -> f64 {
        f64::from(self.params.gain.load())
    }

    pub fn speed(&self) -> f64 {
        self.params.speed.load()
    }

    pub fn high_pass_amount(&self) -> f64 {
        f64::from(self.params.high_pass_amount.load())
    }

    pub fn low_pass_amount(&self) -> f64 {
        f64::from(self.params.low_pass_amount.load())
    }

    pub fn mid_band_amount(&self) -> f64 {
        f64::from(self.params.mid_band_mix.load())
    }

    pub fn reverb_parameters(&self) -> ReverbParameters {
        **self.params.reverb.load()
    }

    pub fn chorus_parameters(&self) -> ChorusParameters {
        **self.params.chorus.load()
    }

    pub fn tremolo_amount(&self) -> f64 {
        f64::from(self.params.tremolo_depth.load())
    }

    pub fn tremolo_rate(&self) -> f64 {
        f64::from(self.params.tremolo_rate.load())
    }

    pub fn status(&self) -> &DeckStatus {
        &self.status
    }

    pub fn position_seconds(&self) -> f64 {
        self.status.position_seconds.load()
    }

    pub fn position_relative(&self) -> f64 {
        self.status.position_relative()
    }

    pub fn length_seconds(&self) -> f64 {
        self.status.length_seconds.load()
    }

    pub fn is_playing(&self) -> bool {
        self.status.playing.load(Ordering::Relaxed)
    }

    pub fn blocks_processed(&self) -> u64 {
        self.status.blocks_processed.load(Ordering::Relaxed)
    }

    pub fn deadline_misses(&self) -> u64 {
        self.status.deadline_misses.load(Ordering::Relaxed)
    }

    pub fn precondition_violations(&self) -> u64 {
        self.status.precondition_violations.load(Ordering::Relaxed)
    }
}
