use arc_swap::ArcSwap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use thiserror::Error;

use crate::fx::stages::chorus::ChorusParameters;
use crate::fx::stages::reverb::ReverbParameters;
use crate::fx::stages::tremolo::DEFAULT_RATE_HZ;

/// Upper end of the high-pass cutoff range, reached at amount 1.
pub const HIGH_PASS_MAX_HZ: f32 = 2000.0;
/// Upper end of the low-pass cutoff range, reached at amount 1.
pub const LOW_PASS_MAX_HZ: f32 = 20000.0;
pub const MAX_SPEED: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ParameterError {
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{name} must be strictly greater than {min} and at most {max}, got {value}")]
    OutOfOpenRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{name} must be a finite number")]
    NotFinite { name: &'static str },
}

fn validate_closed(name: &'static str, value: f64, min: f64, max: f64) -> Result<f64, ParameterError> {
    if !value.is_finite() {
        return Err(ParameterError::NotFinite { name });
    }
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ParameterError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

pub fn validate_gain(gain: f64) -> Result<f64, ParameterError> {
    validate_closed("gain", gain, 0.0, 1.0)
}

/// Speed is a resampling ratio in `(0, 100]`; 1.0 plays at the original rate.
pub fn validate_speed(ratio: f64) -> Result<f64, ParameterError> {
    if !ratio.is_finite() {
        return Err(ParameterError::NotFinite { name: "speed" });
    }
    if ratio > 0.0 && ratio <= f64::from(MAX_SPEED) {
        Ok(ratio)
    } else {
        Err(ParameterError::OutOfOpenRange {
            name: "speed",
            value: ratio,
            min: 0.0,
            max: f64::from(MAX_SPEED),
        })
    }
}

pub fn validate_relative_position(pos: f64) -> Result<f64, ParameterError> {
    validate_closed("position", pos, 0.0, 1.0)
}

pub fn validate_unit(name: &'static str, value: f64) -> Result<f64, ParameterError> {
    validate_closed(name, value, 0.0, 1.0)
}

/// Clamp a normalised control amount to `[0, 1]`. NaN maps to 0.
pub fn clamp_amount(amount: f32) -> f32 {
    if amount.is_nan() {
        0.0
    } else {
        amount.clamp(0.0, 1.0)
    }
}

pub fn high_pass_cutoff(amount: f32) -> f32 {
    HIGH_PASS_MAX_HZ * clamp_amount(amount)
}

pub fn low_pass_cutoff(amount: f32) -> f32 {
    LOW_PASS_MAX_HZ * clamp_amount(amount)
}

/// `f32` cell stored as its bit pattern, so loads can never observe a torn value.
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Control block written by the control thread and read by the audio thread
/// once per block.
pub struct DeckParameters {
    pub gain: AtomicF32,
    pub speed: AtomicF64,
    pub high_pass_amount: AtomicF32,
    pub low_pass_amount: AtomicF32,
    pub mid_band_mix: AtomicF32,
    pub tremolo_depth: AtomicF32,
    pub tremolo_rate: AtomicF32,
    /// Multi-field sets are swapped as a whole, never edited in place.
    pub reverb: ArcSwap<ReverbParameters>,
    pub chorus: ArcSwap<ChorusParameters>,
}

impl DeckParameters {
    pub fn new(reverb: ReverbParameters, chorus: ChorusParameters, tremolo_rate: f32) -> Self {
        Self {
            gain: AtomicF32::new(1.0),
            speed: AtomicF64::new(1.0),
            high_pass_amount: AtomicF32::new(0.0),
            low_pass_amount: AtomicF32::new(1.0),
            mid_band_mix: AtomicF32::new(0.0),
            tremolo_depth: AtomicF32::new(0.0),
            tremolo_rate: AtomicF32::new(tremolo_rate),
            reverb: ArcSwap::from_pointee(reverb),
            chorus: ArcSwap::from_pointee(chorus),
        }
    }
}

impl Default for DeckParameters {
    fn default() -> Self {
        Self::new(
            ReverbParameters::default(),
            ChorusParameters::default(),
            DEFAULT_RATE_HZ,
        )
    }
}

/// Values published by the audio thread for the control side to observe.
#[derive(Debug, Default)]
pub struct DeckStatus {
    pub position_seconds: AtomicF64,
    pub length_seconds: AtomicF64,
    pub playing: AtomicBool,
    pub blocks_processed: AtomicU64,
    pub deadline_misses: AtomicU64,
    pub precondition_violations: AtomicU64,
}

impl DeckStatus {
    pub fn position_relative(&self) -> f64 {
        let length = self.length_seconds.load();
        if length > 0.0 {
            self.position_seconds.load() / length
        } else {
            0.0
        }
    }
}
