/// Planar block of `f32` samples handed to one processing callback.
///
/// Storage is allocated once with a fixed capacity. The active length is
/// changed per callback with [`AudioBlock::set_len`], which never allocates,
/// so a block can be reused on the audio thread indefinitely.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    channels: Vec<Vec<f32>>,
    len: usize,
}

impl AudioBlock {
    pub fn new(num_channels: usize, max_frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; max_frames]; num_channels],
            len: max_frames,
        }
    }

    /// Build a block from planar channel data. Shorter channels are zero padded
    /// to the longest one.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Self {
        let len = channels.iter().map(Vec::len).max().unwrap_or(0);
        let channels = channels
            .into_iter()
            .map(|mut ch| {
                ch.resize(len, 0.0);
                ch
            })
            .collect();
        Self { channels, len }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Number of active frames.
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of frames the block can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Set the active length, clamped to the capacity.
    pub fn set_len(&mut self, frames: usize) {
        self.len = frames.min(self.capacity());
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index][..self.len]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let len = self.len;
        &mut self.channels[index][..len]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        let len = self.len;
        self.channels.iter().map(move |ch| &ch[..len])
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        let len = self.len;
        self.channels.iter_mut().map(move |ch| &mut ch[..len])
    }

    /// Zero the active region.
    pub fn clear(&mut self) {
        for ch in self.channels_mut() {
            ch.fill(0.0);
        }
    }

    /// Copy `other` into this block, taking over its active length.
    ///
    /// Channels missing from `other` are zeroed and frames beyond this block's
    /// capacity are dropped.
    pub fn copy_from(&mut self, other: &Self) {
        self.set_len(other.len());
        let len = self.len;
        for (i, dst) in self.channels.iter_mut().enumerate() {
            match other.channels.get(i) {
                Some(src) => dst[..len].copy_from_slice(&src[..len]),
                None => dst[..len].fill(0.0),
            }
        }
    }

    /// `self += other * gain` over the common active region.
    pub fn add_scaled_from(&mut self, other: &Self, gain: f32) {
        let len = self.len.min(other.len);
        for (dst, src) in self.channels.iter_mut().zip(&other.channels) {
            for (d, s) in dst[..len].iter_mut().zip(&src[..len]) {
                *d = s.mul_add(gain, *d);
            }
        }
    }

    /// Write the active frames interleaved into `out`. Returns the number of
    /// frames written, bounded by the size of `out`.
    pub fn write_interleaved(&self, out: &mut [f32]) -> usize {
        let num_channels = self.num_channels();
        if num_channels == 0 {
            return 0;
        }

        let frames = self.len.min(out.len() / num_channels);
        for (frame, chunk) in out.chunks_exact_mut(num_channels).take(frames).enumerate() {
            for (c, slot) in chunk.iter_mut().enumerate() {
                *slot = self.channels[c][frame];
            }
        }
        frames
    }

    pub fn peak(&self) -> f32 {
        self.channels()
            .flat_map(|ch| ch.iter())
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}
