use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, Sender, bounded};
use hound::WavWriter;
use log::{error, info};
use std::path::{Path, PathBuf};
use std::{fs, thread};

/// Interleaved stereo 16-bit samples.
pub type PcmBlock = Vec<i16>;
const BLOCK_CHANNEL_CAPACITY: usize = 32;

pub struct Recorder {
    tx: Sender<PcmBlock>,
    handle: thread::JoinHandle<()>,
    path: PathBuf,
}

impl Recorder {
    /// Start a writer thread recording into a new timestamped file in
    /// `record_dir`.
    pub fn new(sample_rate: u32, record_dir: &Path) -> Result<Self> {
        let (tx, rx) = bounded::<PcmBlock>(BLOCK_CHANNEL_CAPACITY);
        fs::create_dir_all(record_dir).with_context(|| {
            format!("failed to create render directory '{}'", record_dir.display())
        })?;

        let path = record_dir.join(format!(
            "render_{}.wav",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ));
        info!("Rendering to: {}", path.display());

        let writer_path = path.clone();
        let handle = thread::spawn(move || run_writer_thread(sample_rate, &writer_path, rx));

        Ok(Self { tx, handle, path })
    }

    pub fn sender(&self) -> Sender<PcmBlock> {
        self.tx.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the channel and wait for the writer to finalize the file.
    pub fn stop(self) -> Result<()> {
        drop(self.tx);
        self.handle
            .join()
            .map_err(|e| anyhow::anyhow!("Writer thread panicked (join failed): {:?}", e))
    }
}

/// Convert float samples to 16-bit PCM, clipping at full scale.
pub fn to_pcm16(samples: &[f32], out: &mut PcmBlock) {
    out.clear();
    out.extend(
        samples
            .iter()
            .map(|&s| (s.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16),
    );
}

fn run_writer_thread(sample_rate: u32, path: &Path, rx: Receiver<PcmBlock>) {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = match WavWriter::create(path, spec) {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create WAV file '{}': {e}", path.display());
            return;
        }
    };

    for block in rx {
        for &sample in &block {
            if let Err(e) = writer.write_sample(sample) {
                error!("Failed to write sample to '{}': {e}", path.display());
            }
        }
    }

    if let Err(e) = writer.finalize() {
        error!("Failed to finalize WAV file: {e}");
    } else {
        info!("Render saved: {}", path.display());
    }
}
