use crate::audio::block::AudioBlock;
use crate::fx::stages::chorus::{ChorusParameters, ChorusStage};
use crate::fx::stages::filter::FilterStage;
use crate::fx::stages::reverb::{ReverbParameters, ReverbStage};
use crate::fx::stages::tremolo::TremoloStage;
use crate::fx::stages::{ProcessSpec, Stage};

/// Settings an `EffectChain` is built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainConfig {
    pub high_pass_q: f32,
    pub low_pass_q: f32,
    pub mid_centre_hz: f32,
    pub mid_q: f32,
    pub reverb: ReverbParameters,
    pub chorus: ChorusParameters,
    pub tremolo_rate_hz: f32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        use crate::fx::stages::common::BUTTERWORTH_Q;
        use crate::fx::stages::filter::MID_BAND_CENTRE_HZ;
        use crate::fx::stages::tremolo::DEFAULT_RATE_HZ;

        Self {
            high_pass_q: BUTTERWORTH_Q,
            low_pass_q: BUTTERWORTH_Q,
            mid_centre_hz: MID_BAND_CENTRE_HZ,
            mid_q: BUTTERWORTH_Q,
            reverb: ReverbParameters::default(),
            chorus: ChorusParameters::default(),
            tremolo_rate_hz: DEFAULT_RATE_HZ,
        }
    }
}

// EffectChain runs the deck effects in a fixed order over one shared block:
// filters (with band-pass blend) -> reverb -> chorus/flanger -> tremolo.
pub struct EffectChain {
    filter: FilterStage,
    reverb: ReverbStage,
    chorus: ChorusStage,
    tremolo: TremoloStage,
    spec: Option<ProcessSpec>,
}

impl EffectChain {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            filter: FilterStage::new(
                config.high_pass_q,
                config.low_pass_q,
                config.mid_centre_hz,
                config.mid_q,
            ),
            reverb: ReverbStage::new(config.reverb),
            chorus: ChorusStage::new(config.chorus),
            tremolo: TremoloStage::new(config.tremolo_rate_hz, 0.0),
            spec: None,
        }
    }

    pub fn prepare(&mut self, spec: &ProcessSpec) {
        self.filter.prepare(spec);
        self.reverb.prepare(spec);
        self.chorus.prepare(spec);
        self.tremolo.prepare(spec);
        self.spec = Some(*spec);
    }

    pub const fn is_prepared(&self) -> bool {
        self.spec.is_some()
    }

    // process_block runs one block through every stage in order.
    pub fn process_block(&mut self, block: &mut AudioBlock) {
        self.filter.process_block(block);
        self.reverb.process_block(block);
        self.chorus.process_block(block);
        self.tremolo.process_block(block);
    }

    pub fn reset(&mut self) {
        self.filter.reset();
        self.reverb.reset();
        self.chorus.reset();
        self.tremolo.reset();
    }

    pub fn release(&mut self) {
        self.filter.release();
        self.reverb.release();
        self.chorus.release();
        self.tremolo.release();
        self.spec = None;
    }

    // The setters below only touch DSP state when the value actually changed,
    // so they can be called with the current control values every block.

    pub fn set_high_pass_amount(&mut self, amount: f32) {
        if amount != self.filter.high_pass_amount() {
            self.filter.set_high_pass_amount(amount);
        }
    }

    pub fn set_low_pass_amount(&mut self, amount: f32) {
        if amount != self.filter.low_pass_amount() {
            self.filter.set_low_pass_amount(amount);
        }
    }

    pub fn set_mid_band_amount(&mut self, amount: f32) {
        if amount != self.filter.mid_band_amount() {
            self.filter.set_mid_band_amount(amount);
        }
    }

    pub fn set_reverb_amount(&mut self, amount: f32) {
        let params = self.reverb.parameters().with_amount(amount);
        self.set_reverb_parameters(params);
    }

    pub fn set_reverb_parameters(&mut self, params: ReverbParameters) {
        if params.clamped() != self.reverb.parameters() {
            self.reverb.set_parameters(params);
        }
    }

    pub fn set_flanger_amount(&mut self, amount: f32) {
        let params = self.chorus.parameters().with_amount(amount);
        self.set_chorus_parameters(params);
    }

    pub fn set_chorus_parameters(&mut self, params: ChorusParameters) {
        if params.clamped() != self.chorus.parameters() {
            self.chorus.set_parameters(params);
        }
    }

    pub fn set_tremolo_amount(&mut self, depth: f32) {
        if depth != self.tremolo.depth() {
            self.tremolo.set_depth(depth);
        }
    }

    pub fn set_tremolo_rate(&mut self, rate_hz: f32) {
        if rate_hz != self.tremolo.rate() {
            self.tremolo.set_rate(rate_hz);
        }
    }

    pub const fn filter(&self) -> &FilterStage {
        &self.filter
    }

    pub const fn reverb(&self) -> &ReverbStage {
        &self.reverb
    }

    pub const fn chorus(&self) -> &ChorusStage {
        &self.chorus
    }

    pub const fn tremolo(&self) -> &TremoloStage {
        &self.tremolo
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self::new(&ChainConfig::default())
    }
}
