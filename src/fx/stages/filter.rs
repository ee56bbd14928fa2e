use crate::audio::block::AudioBlock;
use crate::audio::params::{LOW_PASS_MAX_HZ, clamp_amount, high_pass_cutoff, low_pass_cutoff};
use crate::fx::stages::common::{BUTTERWORTH_Q, Biquad, BiquadCoeffs, BiquadKind, MAX_CUTOFF_RATIO};
use crate::fx::stages::{ProcessSpec, Stage};

pub const MID_BAND_CENTRE_HZ: f32 = 500.0;

/// Filter section of a deck: high-pass and low-pass shaping plus a fixed
/// band-pass blended in by a mix amount.
///
/// Per block the raw input is copied to a dry scratch block, high-passed and
/// low-passed there, while the band-pass runs on the live block. The output
/// is `dry * (1 - mix) + band * mix`, so the dry path always carries the
/// high/low-pass shaping.
pub struct FilterStage {
    high_pass: Biquad,
    low_pass: Biquad,
    mid_band: Biquad,
    high_pass_amount: f32,
    low_pass_amount: f32,
    mid_mix: f32,
    high_was_open: bool,
    low_was_open: bool,
    dry: AudioBlock,
}

impl FilterStage {
    pub fn new(high_pass_q: f32, low_pass_q: f32, mid_centre_hz: f32, mid_q: f32) -> Self {
        let mut stage = Self {
            high_pass: Biquad::new(BiquadKind::HighPass, 0.0, high_pass_q),
            low_pass: Biquad::new(BiquadKind::LowPass, LOW_PASS_MAX_HZ, low_pass_q),
            mid_band: Biquad::new(BiquadKind::BandPass, mid_centre_hz, mid_q),
            high_pass_amount: 0.0,
            low_pass_amount: 1.0,
            mid_mix: 0.0,
            high_was_open: true,
            low_was_open: true,
            dry: AudioBlock::new(0, 0),
        };
        stage.set_high_pass_amount(0.0);
        stage.set_low_pass_amount(1.0);
        stage
    }

    /// Map `amount` in `[0, 1]` onto 0-2 kHz. Coefficients are recomputed now
    /// if the sample rate is known, otherwise on `prepare`.
    pub fn set_high_pass_amount(&mut self, amount: f32) {
        self.high_pass_amount = clamp_amount(amount);
        self.high_pass.set_cutoff(high_pass_cutoff(amount));
    }

    /// Map `amount` in `[0, 1]` onto 0-20 kHz.
    pub fn set_low_pass_amount(&mut self, amount: f32) {
        self.low_pass_amount = clamp_amount(amount);
        self.low_pass.set_cutoff(low_pass_cutoff(amount));
    }

    /// Band-pass mix only; the band-pass coefficients are fixed.
    pub fn set_mid_band_amount(&mut self, amount: f32) {
        self.mid_mix = clamp_amount(amount);
    }

    pub const fn high_pass_amount(&self) -> f32 {
        self.high_pass_amount
    }

    pub const fn low_pass_amount(&self) -> f32 {
        self.low_pass_amount
    }

    pub const fn mid_band_amount(&self) -> f32 {
        self.mid_mix
    }

    pub const fn high_pass_cutoff(&self) -> f32 {
        self.high_pass.cutoff()
    }

    pub const fn low_pass_cutoff(&self) -> f32 {
        self.low_pass.cutoff()
    }

    pub const fn high_pass_coefficients(&self) -> BiquadCoeffs {
        self.high_pass.coefficients()
    }

    pub const fn low_pass_coefficients(&self) -> BiquadCoeffs {
        self.low_pass.coefficients()
    }

    pub const fn mid_band_coefficients(&self) -> BiquadCoeffs {
        self.mid_band.coefficients()
    }

    // A high-pass at 0 Hz is fully open.
    fn high_pass_is_open(&self) -> bool {
        self.high_pass.cutoff() <= 0.0
    }

    // A low-pass at the top of its range, or above what the rate can
    // represent, is fully open.
    fn low_pass_is_open(&self) -> bool {
        let cutoff = self.low_pass.cutoff();
        cutoff >= LOW_PASS_MAX_HZ
            || self
                .low_pass
                .sample_rate()
                .is_some_and(|sr| cutoff >= sr * MAX_CUTOFF_RATIO)
    }
}

impl Default for FilterStage {
    fn default() -> Self {
        Self::new(BUTTERWORTH_Q, BUTTERWORTH_Q, MID_BAND_CENTRE_HZ, BUTTERWORTH_Q)
    }
}

impl Stage for FilterStage {
    fn prepare(&mut self, spec: &ProcessSpec) {
        self.high_pass.prepare(spec.sample_rate, spec.channels);
        self.low_pass.prepare(spec.sample_rate, spec.channels);
        self.mid_band.prepare(spec.sample_rate, spec.channels);
        self.dry = AudioBlock::new(spec.channels, spec.max_block_size);
    }

    fn process_block(&mut self, block: &mut AudioBlock) {
        self.dry.copy_from(block);

        // A bypassed section keeps stale history; clear it when it closes again.
        let high_open = self.high_pass_is_open();
        let low_open = self.low_pass_is_open();
        if self.high_was_open && !high_open {
            self.high_pass.reset();
        }
        if self.low_was_open && !low_open {
            self.low_pass.reset();
        }
        self.high_was_open = high_open;
        self.low_was_open = low_open;

        for (c, ch) in self.dry.channels_mut().enumerate() {
            if !high_open {
                self.high_pass.process_channel(c, ch);
            }
            if !low_open {
                self.low_pass.process_channel(c, ch);
            }
        }

        for (c, ch) in block.channels_mut().enumerate() {
            self.mid_band.process_channel(c, ch);
        }

        let mix = self.mid_mix;
        let dry_gain = 1.0 - mix;
        for (c, live) in block.channels_mut().enumerate() {
            if c >= self.dry.num_channels() {
                break;
            }
            let dry = self.dry.channel(c);
            for (l, d) in live.iter_mut().zip(dry) {
                *l = *d * dry_gain + *l * mix;
            }
        }
    }

    fn reset(&mut self) {
        self.high_pass.reset();
        self.low_pass.reset();
        self.mid_band.reset();
    }

    fn release(&mut self) {
        self.high_pass.release();
        self.low_pass.release();
        self.mid_band.release();
        self.dry = AudioBlock::new(0, 0);
    }
}
