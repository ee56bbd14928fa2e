use crate::audio::block::AudioBlock;

pub mod chorus;
pub mod common;
pub mod filter;
pub mod reverb;
pub mod tremolo;

/// Stream format a stage is prepared for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSpec {
    pub sample_rate: f32,
    pub max_block_size: usize,
    pub channels: usize,
}

// The core trait that all processing stages must implement
pub trait Stage: Send + 'static {
    // Size internal state for the stream and clear it. Allocation happens here only.
    fn prepare(&mut self, spec: &ProcessSpec);

    // Process a block of samples in place
    fn process_block(&mut self, block: &mut AudioBlock);

    // Clear delay lines, histories and oscillator phases without freeing them
    fn reset(&mut self);

    // Free everything allocated by prepare
    fn release(&mut self);
}
