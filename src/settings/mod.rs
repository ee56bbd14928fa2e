use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::deck::DeckConfig;
use crate::audio::mixer::{CENTRE, MixerConfig};
use crate::fx::chain::ChainConfig;
use crate::fx::stages::chorus::ChorusParameters;
use crate::fx::stages::common::BUTTERWORTH_Q;
use crate::fx::stages::filter::MID_BAND_CENTRE_HZ;
use crate::fx::stages::reverb::ReverbParameters;
use crate::fx::stages::tremolo::DEFAULT_RATE_HZ;

const APP_DIR: &str = "twindeck";
const SETTINGS_FILENAME: &str = "settings.json";

impl std::fmt::Display for AudioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sample Rate: {}", self.sample_rate)?;
        writeln!(f, "Block Size: {}", self.block_size)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub block_size: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
        }
    }
}

impl std::fmt::Display for DeckSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "High-pass Q: {}", self.high_pass_q)?;
        writeln!(f, "Low-pass Q: {}", self.low_pass_q)?;
        writeln!(f, "Mid Band: {} Hz, Q {}", self.mid_centre_hz, self.mid_q)?;
        writeln!(f, "Tremolo Rate: {} Hz", self.tremolo_rate_hz)?;
        writeln!(f, "Reverb: {:?}", self.reverb)?;
        writeln!(f, "Chorus: {:?}", self.chorus)?;
        Ok(())
    }
}

/// Per-deck defaults applied when the pipeline is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckSettings {
    pub high_pass_q: f32,
    pub low_pass_q: f32,
    pub mid_centre_hz: f32,
    pub mid_q: f32,
    pub tremolo_rate_hz: f32,
    pub reverb: ReverbParameters,
    pub chorus: ChorusParameters,
}

impl Default for DeckSettings {
    fn default() -> Self {
        Self {
            high_pass_q: BUTTERWORTH_Q,
            low_pass_q: BUTTERWORTH_Q,
            mid_centre_hz: MID_BAND_CENTRE_HZ,
            mid_q: BUTTERWORTH_Q,
            tremolo_rate_hz: DEFAULT_RATE_HZ,
            reverb: ReverbParameters::default(),
            chorus: ChorusParameters::default(),
        }
    }
}

impl DeckSettings {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            high_pass_q: self.high_pass_q,
            low_pass_q: self.low_pass_q,
            mid_centre_hz: self.mid_centre_hz,
            mid_q: self.mid_q,
            reverb: self.reverb,
            chorus: self.chorus,
            tremolo_rate_hz: self.tremolo_rate_hz,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub audio: AudioSettings,
    pub deck: DeckSettings,
    pub render_dir: String,
}

impl std::fmt::Display for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "------------------------------")?;

        writeln!(f, "Audio Settings:")?;
        writeln!(f, "{}", self.audio)?;

        writeln!(f, "Deck Settings:")?;
        writeln!(f, "{}", self.deck)?;

        writeln!(f, "Render Directory: {}", self.render_dir)?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            audio: AudioSettings::default(),
            deck: DeckSettings::default(),
            render_dir: "./renders".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_settings_path())
    }

    /// Load settings from `path`, writing the defaults there if it does not
    /// exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path).context("Failed to read settings file")?;
            let settings: Self =
                serde_json::from_str(&contents).context("Failed to parse settings")?;
            debug!("Loaded settings from {:?}", path);
            Ok(settings)
        } else {
            info!("No settings file found, using defaults");
            let settings = Self::default();
            // Try to save defaults, but don't fail if we can't
            let _ = settings.save_to(path);
            Ok(settings)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).context("Failed to write settings file")?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn get_settings_path() -> PathBuf {
        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir)
                .join(APP_DIR)
                .join(SETTINGS_FILENAME)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join(APP_DIR)
                .join(SETTINGS_FILENAME)
        } else {
            PathBuf::from(".").join(SETTINGS_FILENAME)
        }
    }

    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig {
            deck: DeckConfig {
                chain: self.deck.chain_config(),
                ..DeckConfig::default()
            },
            crossfader: CENTRE,
        }
    }
}
