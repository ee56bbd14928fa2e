//! Freeverb-style stereo reverb.
//!
//! Eight damped comb filters in parallel feed four all-pass diffusers per
//! channel. Delay lengths are tuned for 44.1 kHz and scaled to the prepared
//! rate; the right channel is spread by a few samples for width.

use serde::{Deserialize, Serialize};

use crate::audio::block::AudioBlock;
use crate::audio::params::clamp_amount;
use crate::fx::stages::{ProcessSpec, Stage};

const COMB_LENGTHS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];
const ALLPASS_LENGTHS: [usize; 4] = [556, 441, 341, 225];
const STEREO_SPREAD: usize = 23;
const REFERENCE_RATE: f32 = 44_100.0;

const ALLPASS_FEEDBACK: f32 = 0.5;
const INPUT_GAIN: f32 = 0.015;
const WET_SCALE: f32 = 3.0;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbParameters {
    pub room_size: f32,
    pub damping: f32,
    pub wet_level: f32,
    pub dry_level: f32,
    pub width: f32,
    pub freeze: bool,
}

impl Default for ReverbParameters {
    fn default() -> Self {
        Self {
            room_size: 0.5,
            damping: 0.5,
            wet_level: 0.0,
            dry_level: 1.0,
            width: 1.0,
            freeze: false,
        }
    }
}

impl ReverbParameters {
    pub fn clamped(self) -> Self {
        Self {
            room_size: clamp_amount(self.room_size),
            damping: clamp_amount(self.damping),
            wet_level: clamp_amount(self.wet_level),
            dry_level: clamp_amount(self.dry_level),
            width: clamp_amount(self.width),
            freeze: self.freeze,
        }
    }

    /// Single-knob control: `amount` of wet signal, the rest dry.
    pub fn with_amount(self, amount: f32) -> Self {
        let amount = clamp_amount(amount);
        Self {
            wet_level: amount,
            dry_level: 1.0 - amount,
            ..self
        }
    }
}

#[derive(Debug, Clone)]
struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl Comb {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output.mul_add(1.0 - damp, self.filter_state * damp);
        self.buffer[self.pos] = self.filter_state.mul_add(feedback, input);
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
        self.filter_state = 0.0;
    }
}

#[derive(Debug, Clone)]
struct Allpass {
    buffer: Vec<f32>,
    pos: usize,
}

impl Allpass {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        self.buffer[self.pos] = buffered.mul_add(ALLPASS_FEEDBACK, input);
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
        buffered - input
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

#[derive(Debug, Clone, Default)]
struct Tank {
    combs: Vec<Comb>,
    allpasses: Vec<Allpass>,
}

impl Tank {
    fn new(scale: f32, spread: usize) -> Self {
        let scaled = |len: usize| ((len + spread) as f32 * scale) as usize;
        Self {
            combs: COMB_LENGTHS.iter().map(|&l| Comb::new(scaled(l))).collect(),
            allpasses: ALLPASS_LENGTHS
                .iter()
                .map(|&l| Allpass::new(scaled(l)))
                .collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, feedback, damp);
        }
        for ap in &mut self.allpasses {
            out = ap.process(out);
        }
        out
    }

    fn reset(&mut self) {
        self.combs.iter_mut().for_each(Comb::reset);
        self.allpasses.iter_mut().for_each(Allpass::reset);
    }
}

pub struct ReverbStage {
    params: ReverbParameters,
    left: Tank,
    right: Tank,
    // Derived gains, refreshed whenever params change
    feedback: f32,
    damp: f32,
    input_gain: f32,
    wet1: f32,
    wet2: f32,
    dry: f32,
}

impl ReverbStage {
    pub fn new(params: ReverbParameters) -> Self {
        let mut stage = Self {
            params: ReverbParameters::default(),
            left: Tank::default(),
            right: Tank::default(),
            feedback: 0.0,
            damp: 0.0,
            input_gain: 0.0,
            wet1: 0.0,
            wet2: 0.0,
            dry: 1.0,
        };
        stage.set_parameters(params);
        stage
    }

    pub const fn parameters(&self) -> ReverbParameters {
        self.params
    }

    pub fn set_parameters(&mut self, params: ReverbParameters) {
        let p = params.clamped();
        self.params = p;

        if p.freeze {
            self.feedback = 1.0;
            self.damp = 0.0;
            self.input_gain = 0.0;
        } else {
            self.feedback = p.room_size.mul_add(ROOM_SCALE, ROOM_OFFSET);
            self.damp = p.damping * DAMP_SCALE;
            self.input_gain = INPUT_GAIN;
        }

        let wet = p.wet_level * WET_SCALE;
        self.wet1 = wet * (p.width / 2.0 + 0.5);
        self.wet2 = wet * ((1.0 - p.width) / 2.0);
        self.dry = p.dry_level;
    }

    pub fn is_prepared(&self) -> bool {
        !self.left.combs.is_empty()
    }
}

impl Default for ReverbStage {
    fn default() -> Self {
        Self::new(ReverbParameters::default())
    }
}

impl Stage for ReverbStage {
    fn prepare(&mut self, spec: &ProcessSpec) {
        let scale = spec.sample_rate / REFERENCE_RATE;
        self.left = Tank::new(scale, 0);
        self.right = Tank::new(scale, STEREO_SPREAD);
    }

    fn process_block(&mut self, block: &mut AudioBlock) {
        if !self.is_prepared() {
            return;
        }

        match block.num_channels() {
            0 => {}
            1 => {
                let ch = block.channel_mut(0);
                for s in ch.iter_mut() {
                    let input = *s * self.input_gain;
                    let out = self.left.process(input, self.feedback, self.damp);
                    *s = s.mul_add(self.dry, out * (self.wet1 + self.wet2));
                }
            }
            _ => {
                let frames = block.len();
                for i in 0..frames {
                    let l = block.channel(0)[i];
                    let r = block.channel(1)[i];
                    let input = (l + r) * self.input_gain;

                    let out_l = self.left.process(input, self.feedback, self.damp);
                    let out_r = self.right.process(input, self.feedback, self.damp);

                    block.channel_mut(0)[i] = out_r.mul_add(self.wet2, out_l.mul_add(self.wet1, l * self.dry));
                    block.channel_mut(1)[i] = out_l.mul_add(self.wet2, out_r.mul_add(self.wet1, r * self.dry));
                }
            }
        }
    }

    fn reset(&mut self) {
        self.left.reset();
        self.right.reset();
    }

    fn release(&mut self) {
        self.left = Tank::default();
        self.right = Tank::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44_100.0;

    fn prepared(params: ReverbParameters) -> ReverbStage {
        let mut stage = ReverbStage::new(params);
        stage.prepare(&ProcessSpec {
            sample_rate: SR,
            max_block_size: 512,
            channels: 2,
        });
        stage
    }

    fn impulse(frames: usize) -> AudioBlock {
        let mut block = AudioBlock::new(2, frames);
        block.channel_mut(0)[0] = 1.0;
        block.channel_mut(1)[0] = 1.0;
        block
    }

    #[test]
    fn zero_amount_passes_dry_signal_exactly() {
        let mut stage = prepared(ReverbParameters::default().with_amount(0.0));
        let input = AudioBlock::from_channels(vec![
            (0..512).map(|i| (i as f32 * 0.01).sin()).collect(),
            (0..512).map(|i| (i as f32 * 0.02).cos()).collect(),
        ]);
        for _ in 0..4 {
            let mut block = input.clone();
            stage.process_block(&mut block);
            assert_eq!(block, input);
        }
    }

    #[test]
    fn tail_persists_across_blocks() {
        let mut stage = prepared(ReverbParameters::default().with_amount(1.0));
        let mut block = impulse(512);
        stage.process_block(&mut block);

        // The shortest comb is longer than one block, so the tail shows up later
        let mut energy = 0.0;
        for _ in 0..16 {
            let mut silent = AudioBlock::new(2, 512);
            stage.process_block(&mut silent);
            energy += silent.channel(0).iter().map(|s| s * s).sum::<f32>();
        }
        assert!(energy > 1e-6, "expected reverb tail, energy {energy}");
    }

    #[test]
    fn reset_clears_tail() {
        let mut stage = prepared(ReverbParameters::default().with_amount(1.0));
        let mut block = impulse(512);
        stage.process_block(&mut block);
        stage.reset();

        for _ in 0..16 {
            let mut silent = AudioBlock::new(2, 512);
            stage.process_block(&mut silent);
            assert_eq!(silent.peak(), 0.0);
        }
    }

    #[test]
    fn freeze_holds_energy() {
        let params = ReverbParameters {
            room_size: 0.9,
            ..ReverbParameters::default().with_amount(1.0)
        };
        let mut stage = prepared(params);
        let mut noise = AudioBlock::from_channels(vec![
            (0..512).map(|i| ((i * 7919) % 97) as f32 / 97.0 - 0.5).collect(),
            (0..512).map(|i| ((i * 104_729) % 89) as f32 / 89.0 - 0.5).collect(),
        ]);
        for _ in 0..8 {
            stage.process_block(&mut noise);
        }

        stage.set_parameters(ReverbParameters {
            freeze: true,
            ..stage.parameters()
        });

        let mut late_energy = 0.0;
        for _ in 0..200 {
            let mut silent = AudioBlock::new(2, 512);
            stage.process_block(&mut silent);
            late_energy = silent.channel(0).iter().map(|s| s * s).sum::<f32>();
        }
        assert!(late_energy > 1e-6, "frozen tail decayed: {late_energy}");
    }

    #[test]
    fn parameters_are_clamped() {
        let stage = ReverbStage::new(ReverbParameters {
            room_size: 3.0,
            damping: -1.0,
            wet_level: 2.0,
            dry_level: f32::NAN,
            width: 0.5,
            freeze: false,
        });
        let p = stage.parameters();
        assert_eq!(p.room_size, 1.0);
        assert_eq!(p.damping, 0.0);
        assert_eq!(p.wet_level, 1.0);
        assert_eq!(p.dry_level, 0.0);
    }

    #[test]
    fn unprepared_stage_is_a_no_op() {
        let mut stage = ReverbStage::new(ReverbParameters::default().with_amount(1.0));
        let mut block = impulse(64);
        let before = block.clone();
        stage.process_block(&mut block);
        assert_eq!(block, before);

        stage.prepare(&ProcessSpec {
            sample_rate: SR,
            max_block_size: 64,
            channels: 2,
        });
        stage.release();
        assert!(!stage.is_prepared());
    }
}
