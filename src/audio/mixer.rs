use log::{debug, info, warn};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::audio::block::AudioBlock;
use crate::audio::deck::{Deck, DeckConfig, DeckHandle};
use crate::audio::params::{AtomicF32, validate_unit};

pub const CENTRE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerConfig {
    pub deck: DeckConfig,
    pub crossfader: f32,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            deck: DeckConfig::default(),
            crossfader: CENTRE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeckId {
    A,
    B,
}

impl fmt::Display for DeckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

impl FromStr for DeckId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "a" | "A" => Ok(Self::A),
            "b" | "B" => Ok(Self::B),
            other => Err(format!("unknown deck '{other}', expected 'a' or 'b'")),
        }
    }
}

/// Gains for decks A and B at crossfader position `x`.
///
/// Each side stays at unity until the fader passes the centre, so the centre
/// position is a plain sum of both decks.
pub fn crossfader_gains(x: f32) -> (f32, f32) {
    let x = x.clamp(0.0, 1.0);
    ((2.0 * (1.0 - x)).min(1.0), (2.0 * x).min(1.0))
}

/// Two independent decks summed through a crossfader.
pub struct Mixer {
    deck_a: Deck,
    deck_b: Deck,
    scratch_a: AudioBlock,
    scratch_b: AudioBlock,
    channels: usize,
    crossfader: Arc<AtomicF32>,
}

#[derive(Clone)]
pub struct MixerHandle {
    deck_a: DeckHandle,
    deck_b: DeckHandle,
    crossfader: Arc<AtomicF32>,
}

impl Mixer {
    pub fn new(config: &MixerConfig) -> (Self, MixerHandle) {
        let (deck_a, handle_a) = Deck::new(&config.deck);
        let (deck_b, handle_b) = Deck::new(&config.deck);
        let crossfader = Arc::new(AtomicF32::new(config.crossfader.clamp(0.0, 1.0)));

        let mixer = Self {
            deck_a,
            deck_b,
            scratch_a: AudioBlock::new(0, 0),
            scratch_b: AudioBlock::new(0, 0),
            channels: config.deck.channels,
            crossfader: Arc::clone(&crossfader),
        };

        let handle = MixerHandle {
            deck_a: handle_a,
            deck_b: handle_b,
            crossfader,
        };

        (mixer, handle)
    }

    pub fn prepare(&mut self, max_block_size: usize, sample_rate: f64) {
        self.deck_a.prepare(max_block_size, sample_rate);
        self.deck_b.prepare(max_block_size, sample_rate);
        self.scratch_a = AudioBlock::new(self.channels, max_block_size);
        self.scratch_b = AudioBlock::new(self.channels, max_block_size);
        info!("Mixer prepared: {} channels", self.channels);
    }

    pub fn release_resources(&mut self) {
        self.deck_a.release_resources();
        self.deck_b.release_resources();
        self.scratch_a = AudioBlock::new(0, 0);
        self.scratch_b = AudioBlock::new(0, 0);
        debug!("Mixer resources released");
    }

    pub const fn deck(&self, id: DeckId) -> &Deck {
        match id {
            DeckId::A => &self.deck_a,
            DeckId::B => &self.deck_b,
        }
    }

    /// Render both decks and sum them into `out`.
    ///
    /// A block longer than the prepared size is a precondition violation,
    /// handled like the decks handle it: debug builds panic, release builds
    /// output silence and count it on both decks.
    pub fn process_block(&mut self, out: &mut AudioBlock) {
        let frames = out.len();
        let capacity = self.scratch_a.capacity();
        debug_assert!(
            frames <= capacity,
            "Mixer::process_block called with {frames} frames (prepared for {capacity})"
        );
        if frames > capacity {
            out.clear();
            self.deck_a.count_violation();
            self.deck_b.count_violation();
            return;
        }

        self.scratch_a.set_len(frames);
        self.scratch_b.set_len(frames);

        self.deck_a.process_block(&mut self.scratch_a);
        self.deck_b.process_block(&mut self.scratch_b);

        let (gain_a, gain_b) = crossfader_gains(self.crossfader.load());
        out.clear();
        out.add_scaled_from(&self.scratch_a, gain_a);
        out.add_scaled_from(&self.scratch_b, gain_b);
    }
}

impl MixerHandle {
    pub const fn deck(&self, id: DeckId) -> &DeckHandle {
        match id {
            DeckId::A => &self.deck_a,
            DeckId::B => &self.deck_b,
        }
    }

    pub const fn deck_a(&self) -> &DeckHandle {
        &self.deck_a
    }

    pub const fn deck_b(&self) -> &DeckHandle {
        &self.deck_b
    }

    pub fn set_crossfader(&self, position: f64) {
        match validate_unit("crossfader", position) {
            Ok(position) => {
                self.crossfader.store(position as f32);
                debug!("Crossfader set to {position}");
            }
            Err(e) => warn!("Ignoring crossfader change: {e}"),
        }
    }

    pub fn crossfader(&self) -> f64 {
        f64::from(self.crossfader.load())
    }
}
