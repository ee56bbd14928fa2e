use std::f32::consts::TAU;

use crate::audio::block::AudioBlock;
use crate::audio::params::clamp_amount;
use crate::fx::stages::{ProcessSpec, Stage};

pub const DEFAULT_RATE_HZ: f32 = 5.0;
pub const MAX_RATE_HZ: f32 = 20.0;

/// Sine-LFO amplitude modulation.
///
/// The LFO runs per sample and its phase is carried from one block to the
/// next, so splitting a stream into blocks of any size gives the same gain
/// sequence.
pub struct TremoloStage {
    depth: f32,
    rate_hz: f32,
    phase: f32,
    phase_inc: f32,
    sample_rate: Option<f32>,
}

impl TremoloStage {
    pub fn new(rate_hz: f32, depth: f32) -> Self {
        let mut stage = Self {
            depth: 0.0,
            rate_hz: 0.0,
            phase: 0.0,
            phase_inc: 0.0,
            sample_rate: None,
        };
        stage.set_rate(rate_hz);
        stage.set_depth(depth);
        stage
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.depth = clamp_amount(depth);
    }

    pub fn set_rate(&mut self, rate_hz: f32) {
        self.rate_hz = if rate_hz.is_finite() {
            rate_hz.clamp(0.0, MAX_RATE_HZ)
        } else {
            0.0
        };
        self.update_increment();
    }

    pub const fn depth(&self) -> f32 {
        self.depth
    }

    pub const fn rate(&self) -> f32 {
        self.rate_hz
    }

    pub const fn phase(&self) -> f32 {
        self.phase
    }

    /// Set the LFO phase, wrapped into `[0, 2π)`.
    pub fn set_phase(&mut self, phase: f32) {
        self.phase = if phase.is_finite() {
            phase.rem_euclid(TAU)
        } else {
            0.0
        };
    }

    /// Gain for the current phase.
    #[inline]
    pub fn current_gain(&self) -> f32 {
        (1.0 - self.depth) + self.depth * (self.phase.sin() + 1.0) * 0.5
    }

    fn update_increment(&mut self) {
        self.phase_inc = self
            .sample_rate
            .map_or(0.0, |sr| TAU * self.rate_hz / sr);
    }
}

impl Default for TremoloStage {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_HZ, 0.0)
    }
}

impl Stage for TremoloStage {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = Some(spec.sample_rate);
        self.phase = 0.0;
        self.update_increment();
    }

    fn process_block(&mut self, block: &mut AudioBlock) {
        for i in 0..block.len() {
            let gain = self.current_gain();
            for ch in block.channels_mut() {
                ch[i] *= gain;
            }

            self.phase += self.phase_inc;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn release(&mut self) {
        self.sample_rate = None;
        self.phase = 0.0;
        self.update_increment();
    }
}
