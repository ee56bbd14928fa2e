use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader};
use log::{debug, info};
use rubato::{FftFixedInOut, Resampler};
use std::fmt;
use std::path::Path;

const RESAMPLER_CHUNK: usize = 1024;

/// Decoded audio held in memory, planar.
///
/// Tracks are built on the control thread and shared with the audio thread
/// behind an `Arc`; they are never mutated once loaded.
#[derive(Clone, PartialEq)]
pub struct Track {
    name: String,
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("name", &self.name)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.num_channels())
            .field("frames", &self.num_frames())
            .finish()
    }
}

impl Track {
    pub fn new(name: impl Into<String>, sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            bail!("track sample rate must be non-zero");
        }
        if channels.is_empty() {
            bail!("track must have at least one channel");
        }
        let frames = channels[0].len();
        if channels.iter().any(|ch| ch.len() != frames) {
            bail!("track channels must all have the same length");
        }

        Ok(Self {
            name: name.into(),
            sample_rate,
            channels,
        })
    }

    /// Decode a WAV file. Integer formats are scaled to `[-1, 1)`.
    pub fn from_wav(path: &Path) -> Result<Self> {
        let mut reader = WavReader::open(path)
            .with_context(|| format!("failed to open WAV file '{}'", path.display()))?;
        let spec = reader.spec();
        let num_channels = usize::from(spec.channels);

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<_, _>>()
                .context("failed to read float samples")?,
            SampleFormat::Int => {
                let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()
                    .context("failed to read integer samples")?
            }
        };

        let frames = interleaved.len() / num_channels.max(1);
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in channels.iter_mut().zip(frame) {
                ch.push(sample);
            }
        }

        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        info!(
            "Loaded '{}': {} Hz, {} channel(s), {:.2} s",
            name,
            spec.sample_rate,
            num_channels,
            frames as f64 / f64::from(spec.sample_rate)
        );

        Self::new(name, spec.sample_rate, channels)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn length_seconds(&self) -> f64 {
        self.num_frames() as f64 / f64::from(self.sample_rate)
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Sample at `frame`, or silence outside the track.
    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.channels
            .get(channel)
            .and_then(|ch| ch.get(frame))
            .copied()
            .unwrap_or(0.0)
    }

    /// Convert to `target_rate` offline, trimming the resampler delay so the
    /// result lines up with the original.
    pub fn resample(&self, target_rate: u32) -> Result<Self> {
        if target_rate == self.sample_rate {
            return Ok(self.clone());
        }
        if target_rate == 0 {
            bail!("target sample rate must be non-zero");
        }

        let num_channels = self.num_channels();
        let mut resampler = FftFixedInOut::<f32>::new(
            self.sample_rate as usize,
            target_rate as usize,
            RESAMPLER_CHUNK,
            num_channels,
        )
        .context("failed to create resampler")?;

        let delay = resampler.output_delay();
        let expected = (self.num_frames() as u64 * u64::from(target_rate))
            .div_ceil(u64::from(self.sample_rate)) as usize;

        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); num_channels];
        let mut chunk: Vec<Vec<f32>> = vec![Vec::new(); num_channels];
        let mut pos = 0;

        while output[0].len() < expected + delay {
            let needed = resampler.input_frames_next();
            for (c, buf) in chunk.iter_mut().enumerate() {
                buf.clear();
                let src = &self.channels[c];
                let end = (pos + needed).min(src.len());
                if pos < end {
                    buf.extend_from_slice(&src[pos..end]);
                }
                buf.resize(needed, 0.0);
            }
            pos += needed;

            let produced = resampler
                .process(&chunk, None)
                .context("resampler failed")?;
            for (out, ch) in output.iter_mut().zip(produced) {
                out.extend_from_slice(&ch);
            }
        }

        for out in &mut output {
            out.drain(..delay.min(out.len()));
            out.truncate(expected);
        }

        debug!(
            "Resampled '{}' {} Hz -> {} Hz ({} -> {} frames)",
            self.name,
            self.sample_rate,
            target_rate,
            self.num_frames(),
            expected
        );

        Self::new(self.name.clone(), target_rate, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::f32::consts::PI;
    use tempfile::TempDir;

    fn sine(freq: f32, rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn rejects_malformed_tracks() {
        assert!(Track::new("x", 0, vec![vec![0.0]]).is_err());
        assert!(Track::new("x", 44_100, vec![]).is_err());
        assert!(Track::new("x", 44_100, vec![vec![0.0; 3], vec![0.0; 2]]).is_err());
    }

    #[test]
    fn samples_outside_track_are_silent() -> Result<()> {
        let track = Track::new("t", 1000, vec![vec![0.5; 10]])?;
        assert_eq!(track.sample(0, 9), 0.5);
        assert_eq!(track.sample(0, 10), 0.0);
        assert_eq!(track.sample(1, 0), 0.0);
        assert!((track.length_seconds() - 0.01).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn reads_int_and_float_wav_files() -> Result<()> {
        let dir = TempDir::new()?;

        let int_path = dir.path().join("int.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&int_path, spec)?;
        for _ in 0..100 {
            writer.write_sample(i16::MAX / 2)?;
            writer.write_sample(i16::MIN / 2)?;
        }
        writer.finalize()?;

        let track = Track::from_wav(&int_path)?;
        assert_eq!(track.sample_rate(), 22_050);
        assert_eq!(track.num_channels(), 2);
        assert_eq!(track.num_frames(), 100);
        assert!((track.sample(0, 0) - 0.5).abs() < 1e-3);
        assert!((track.sample(1, 0) + 0.5).abs() < 1e-3);
        assert_eq!(track.name(), "int.wav");

        let float_path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&float_path, spec)?;
        for i in 0..64 {
            writer.write_sample(i as f32 / 64.0)?;
        }
        writer.finalize()?;

        let track = Track::from_wav(&float_path)?;
        assert_eq!(track.num_channels(), 1);
        assert_eq!(track.sample(0, 32), 0.5);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(Track::from_wav(Path::new("/nonexistent/nothing.wav")).is_err());
    }

    #[test]
    fn resample_preserves_length_and_tone() -> Result<()> {
        const FREQ: f32 = 440.0;

        for &(from, to) in &[(44_100u32, 48_000u32), (48_000, 44_100), (22_050, 44_100)] {
            let frames = from as usize;
            let track = Track::new("sine", from, vec![sine(FREQ, from, frames); 2])?;
            let resampled = track.resample(to)?;

            assert_eq!(resampled.sample_rate(), to);
            assert_eq!(resampled.num_frames(), to as usize);
            assert!((resampled.length_seconds() - track.length_seconds()).abs() < 1e-3);

            // Compare the middle of the signal against an ideal sine at the new rate
            let reference = sine(FREQ, to, to as usize);
            let mid = to as usize / 4..to as usize * 3 / 4;
            let ratio = rms(&resampled.channel(0)[mid.clone()]) / rms(&reference[mid.clone()]);
            assert!(
                (0.95..1.05).contains(&ratio),
                "{from} -> {to}: rms ratio {ratio}"
            );

            let max_err = resampled.channel(0)[mid.clone()]
                .iter()
                .zip(&reference[mid])
                .map(|(a, b)| (a - b).abs())
                .fold(0.0f32, f32::max);
            assert!(max_err < 0.05, "{from} -> {to}: misaligned, max error {max_err}");
        }
        Ok(())
    }

    #[test]
    fn resample_to_same_rate_is_identity() -> Result<()> {
        let track = Track::new("t", 44_100, vec![sine(100.0, 44_100, 500)])?;
        assert_eq!(track.resample(44_100)?, track);
        Ok(())
    }
}
