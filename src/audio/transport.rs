use std::sync::Arc;

use crate::audio::block::AudioBlock;
use crate::audio::track::Track;

/// Plays one `Track` into blocks at the device rate.
///
/// The read position is kept in fractional track frames so any speed ratio
/// can be followed without drift. Speed changes take effect at the next
/// block, gain changes are ramped across it.
#[derive(Debug)]
pub struct Transport {
    track: Option<Arc<Track>>,
    position: f64,
    playing: bool,
    gain: f32,
    target_gain: f32,
    speed: f64,
    device_rate: f64,
}

impl Transport {
    pub const fn new() -> Self {
        Self {
            track: None,
            position: 0.0,
            playing: false,
            gain: 1.0,
            target_gain: 1.0,
            speed: 1.0,
            device_rate: 0.0,
        }
    }

    pub fn prepare(&mut self, device_rate: f64) {
        self.device_rate = device_rate;
        self.gain = self.target_gain;
    }

    /// Replace the current track and rewind. Returns the previous track so
    /// the caller decides where it gets dropped.
    pub fn load(&mut self, track: Arc<Track>) -> Option<Arc<Track>> {
        self.position = 0.0;
        self.playing = false;
        self.track.replace(track)
    }

    pub fn unload(&mut self) -> Option<Arc<Track>> {
        self.position = 0.0;
        self.playing = false;
        self.track.take()
    }

    pub fn start(&mut self) {
        self.playing = self.track.is_some();
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub const fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.target_gain = gain;
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    pub const fn speed(&self) -> f64 {
        self.speed
    }

    pub fn length_seconds(&self) -> f64 {
        self.track.as_ref().map_or(0.0, |t| t.length_seconds())
    }

    pub fn position_seconds(&self) -> f64 {
        self.track
            .as_ref()
            .map_or(0.0, |t| self.position / f64::from(t.sample_rate()))
    }

    pub fn position_relative(&self) -> f64 {
        let length = self.length_seconds();
        if length > 0.0 {
            self.position_seconds() / length
        } else {
            0.0
        }
    }

    /// Seek to `seconds`, clamped to the track.
    pub fn set_position(&mut self, seconds: f64) {
        let Some(track) = self.track.as_ref() else {
            return;
        };
        let seconds = if seconds.is_finite() {
            seconds.clamp(0.0, track.length_seconds())
        } else {
            0.0
        };
        self.position = seconds * f64::from(track.sample_rate());
    }

    pub fn set_position_relative(&mut self, relative: f64) {
        self.set_position(relative * self.length_seconds());
    }

    /// Render the next block.
    ///
    /// Silence when stopped or empty. When the end of the track is reached
    /// playback stops and the rest of the block is padded with silence.
    pub fn next_block(&mut self, block: &mut AudioBlock) {
        let frames = block.len();
        let start_gain = self.gain;
        self.gain = self.target_gain;

        let track = match self.track.as_ref() {
            Some(track) if self.playing && self.device_rate > 0.0 => track,
            _ => {
                block.clear();
                return;
            }
        };

        let step = self.speed * f64::from(track.sample_rate()) / self.device_rate;
        let total = track.num_frames();
        let track_channels = track.num_channels();
        let gain_delta = (self.target_gain - start_gain) / frames.max(1) as f32;

        let mut rendered = 0;
        for i in 0..frames {
            let index = self.position as usize;
            if index >= total {
                break;
            }
            let frac = (self.position - index as f64) as f32;
            let gain = gain_delta.mul_add((i + 1) as f32, start_gain);

            for c in 0..block.num_channels() {
                let src = c % track_channels;
                let a = track.sample(src, index);
                let b = track.sample(src, index + 1);
                block.channel_mut(c)[i] = (b - a).mul_add(frac, a) * gain;
            }

            self.position += step;
            rendered = i + 1;
        }

        if rendered < frames {
            for ch in block.channels_mut() {
                ch[rendered..].fill(0.0);
            }
        }

        if self.position >= total as f64 {
            self.position = total as f64;
            self.playing = false;
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
