use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::audio::block::AudioBlock;
use crate::audio::params::clamp_amount;
use crate::fx::stages::common::calculate_coefficient;
use crate::fx::stages::{ProcessSpec, Stage};

pub const MAX_CENTRE_DELAY_MS: f32 = 100.0;
const MIN_CENTRE_DELAY_MS: f32 = 1.0;
const MAX_RATE_HZ: f32 = 20.0;
const MAX_FEEDBACK: f32 = 0.95;
const SMOOTH_TIME_MS: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChorusParameters {
    pub rate_hz: f32,
    /// Modulation depth as a fraction of the centre delay.
    pub depth: f32,
    pub centre_delay_ms: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for ChorusParameters {
    fn default() -> Self {
        Self {
            rate_hz: 0.5,
            depth: 0.5,
            centre_delay_ms: 7.0,
            feedback: 0.4,
            mix: 0.0,
        }
    }
}

impl ChorusParameters {
    pub fn clamped(self) -> Self {
        let finite_or = |v: f32, fallback: f32| if v.is_finite() { v } else { fallback };
        Self {
            rate_hz: finite_or(self.rate_hz, 0.0).clamp(0.0, MAX_RATE_HZ),
            depth: clamp_amount(self.depth),
            centre_delay_ms: finite_or(self.centre_delay_ms, MIN_CENTRE_DELAY_MS)
                .clamp(MIN_CENTRE_DELAY_MS, MAX_CENTRE_DELAY_MS),
            feedback: finite_or(self.feedback, 0.0).clamp(-MAX_FEEDBACK, MAX_FEEDBACK),
            mix: clamp_amount(self.mix),
        }
    }

    pub fn with_amount(self, amount: f32) -> Self {
        Self {
            mix: clamp_amount(amount),
            ..self
        }
    }
}

/// Chorus / flanger: a short delay line swept by a sine LFO, with feedback.
///
/// Delay lines are sized in `prepare` for the longest centre delay at full
/// depth, so no parameter change ever reallocates.
pub struct ChorusStage {
    params: ChorusParameters,
    lines: Vec<Vec<f32>>,
    write_pos: usize,
    phase: f32,
    sample_rate: f32,
    centre_smoothed: f32,
    smooth_coeff: f32,
}

impl ChorusStage {
    pub fn new(params: ChorusParameters) -> Self {
        let params = params.clamped();
        Self {
            params,
            lines: Vec::new(),
            write_pos: 0,
            phase: 0.0,
            sample_rate: 0.0,
            centre_smoothed: 0.0,
            smooth_coeff: 0.0,
        }
    }

    pub const fn parameters(&self) -> ChorusParameters {
        self.params
    }

    pub fn set_parameters(&mut self, params: ChorusParameters) {
        self.params = params.clamped();
    }

    pub const fn phase(&self) -> f32 {
        self.phase
    }

    fn centre_samples(&self) -> f32 {
        self.params.centre_delay_ms * 0.001 * self.sample_rate
    }
}

impl Default for ChorusStage {
    fn default() -> Self {
        Self::new(ChorusParameters::default())
    }
}

impl Stage for ChorusStage {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.sample_rate = spec.sample_rate;
        // Full depth can swing to twice the centre delay
        let max_samples = (2.0 * MAX_CENTRE_DELAY_MS * 0.001 * spec.sample_rate) as usize + 2;
        self.lines = vec![vec![0.0; max_samples]; spec.channels];
        self.smooth_coeff = calculate_coefficient(SMOOTH_TIME_MS, spec.sample_rate);
        self.write_pos = 0;
        self.phase = 0.0;
        self.centre_smoothed = self.centre_samples();
    }

    fn process_block(&mut self, block: &mut AudioBlock) {
        let Some(buf_len) = self.lines.first().map(Vec::len) else {
            return;
        };

        let p = self.params;
        let centre_target = self.centre_samples();
        let phase_inc = TAU * p.rate_hz / self.sample_rate;
        let dry_gain = 1.0 - p.mix;
        let channels = block.num_channels().min(self.lines.len());

        for i in 0..block.len() {
            self.centre_smoothed = self
                .smooth_coeff
                .mul_add(self.centre_smoothed, (1.0 - self.smooth_coeff) * centre_target);

            let lfo = self.phase.sin();
            let delay = (self.centre_smoothed * p.depth.mul_add(lfo, 1.0)).max(1.0);

            // Fractional read position with linear interpolation
            let read_pos = self.write_pos as f32 - delay + buf_len as f32;
            let read_idx = read_pos as usize % buf_len;
            let frac = read_pos.fract();
            let next_idx = (read_idx + 1) % buf_len;

            for c in 0..channels {
                let line = &mut self.lines[c];
                let input = block.channel(c)[i];
                let delayed = (1.0 - frac).mul_add(line[read_idx], frac * line[next_idx]);
                line[self.write_pos] = p.feedback.mul_add(delayed, input);
                block.channel_mut(c)[i] = input * dry_gain + delayed * p.mix;
            }

            self.write_pos = (self.write_pos + 1) % buf_len;
            self.phase += phase_inc;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write_pos = 0;
        self.phase = 0.0;
        self.centre_smoothed = self.centre_samples();
    }

    fn release(&mut self) {
        self.lines = Vec::new();
        self.write_pos = 0;
        self.phase = 0.0;
    }
}
