use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::mixer::TonePlacement;
use crate::radio::chain::{DEFAULT_ORDER, ProcessingChain, StageKind};
use crate::radio::error::ChainResult;
use crate::radio::stages::compressor::{CompressorParams, CompressorStyle};
use crate::radio::stages::equalizer::EqBand;
use crate::radio::stages::filter::FilterType;
use crate::radio::stages::saturator::{SaturatorParams, SaturatorStyle};

const SETTINGS_FILENAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainSettings {
    pub equalizer: bool,
    pub compressor: bool,
    pub saturator: bool,
    pub order: [StageKind; 3],
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            equalizer: true,
            compressor: true,
            saturator: true,
            order: DEFAULT_ORDER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EqualizerSettings {
    pub output_gain_db: f32,
    pub analyzer: bool,
    pub quality: i32,
    pub bands: Vec<EqBand>,
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self {
            output_gain_db: -11.0,
            analyzer: true,
            quality: 2,
            bands: vec![
                EqBand::new(FilterType::LowCut, 519.13, 0.0, 1.113).with_slope(28),
                EqBand::new(FilterType::HighCut, 2791.8, 0.0, 1.202).with_slope(22),
                EqBand::new(FilterType::Bell, 3544.9, 2.25, 1.0),
            ],
        }
    }
}

/// Fixed linear gains used when summing the processed voice with the beds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MixSettings {
    pub voice_gain: f32,
    /// Static level under the voice, before the saturator's static volume.
    pub static_gain: f32,
    pub tone_gain: f32,
    /// Static level while the priority tone plays.
    pub tone_static_gain: f32,
}

impl Default for MixSettings {
    fn default() -> Self {
        Self {
            voice_gain: 1.4,
            static_gain: 0.5,
            tone_gain: 3.5,
            tone_static_gain: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BedSettings {
    pub static_bed: Option<PathBuf>,
    pub priority_tone: Option<PathBuf>,
    pub tone_placement: TonePlacement,
}

impl Default for BedSettings {
    fn default() -> Self {
        Self {
            static_bed: Some(PathBuf::from("./audio/radio_static.wav")),
            priority_tone: Some(PathBuf::from("./audio/priority_tone.wav")),
            tone_placement: TonePlacement::Preamble,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadioSettings {
    pub working_sample_rate: u32,
    pub block_size: usize,
    pub chain: ChainSettings,
    pub equalizer: EqualizerSettings,
    pub compressor: CompressorParams,
    pub saturator: SaturatorParams,
    pub mix: MixSettings,
    pub beds: BedSettings,
    pub output_dir: PathBuf,
}

/// The dispatch-radio preset.
impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            working_sample_rate: 48_000,
            block_size: 2048,
            chain: ChainSettings::default(),
            equalizer: EqualizerSettings::default(),
            compressor: CompressorParams {
                threshold_db: -35.2,
                ratio: 11.18,
                attack_ms: 0.5,
                release_ms: 50.0,
                knee_db: 50.0,
                makeup_db: 10.0,
                style: CompressorStyle::Clean,
                auto_gain: false,
                dry_mix: 70.0,
            },
            saturator: SaturatorParams {
                drive: 8.1,
                low_cut_hz: 1600.0,
                high_cut_hz: 5800.0,
                tone: 0.2,
                mix: 85.0,
                punish: true,
                style: SaturatorStyle::T,
                output_db: 5.0,
                oversampling: true,
                static_volume: 0.0,
            },
            mix: MixSettings::default(),
            beds: BedSettings::default(),
            output_dir: PathBuf::from("./transmissions"),
        }
    }
}

impl std::fmt::Display for RadioSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "------------------------------")?;
        writeln!(f, "Working Sample Rate: {}", self.working_sample_rate)?;
        writeln!(f, "Block Size: {}", self.block_size)?;
        writeln!(
            f,
            "Chain: {:?} (eq {}, comp {}, sat {})",
            self.chain.order, self.chain.equalizer, self.chain.compressor, self.chain.saturator
        )?;
        writeln!(f, "EQ Bands:")?;
        for band in &self.equalizer.bands {
            writeln!(
                f,
                "  {} {} Hz, {} dB, Q {}, slope {}",
                band.filter_type, band.frequency, band.gain_db, band.q, band.slope
            )?;
        }
        writeln!(f, "EQ Output: {} dB", self.equalizer.output_gain_db)?;
        writeln!(
            f,
            "Compressor: {} dB, {}:1, {}",
            self.compressor.threshold_db, self.compressor.ratio, self.compressor.style
        )?;
        writeln!(
            f,
            "Saturator: style {}, drive {}, mix {}%",
            self.saturator.style, self.saturator.drive, self.saturator.mix
        )?;
        writeln!(
            f,
            "Static Bed: {}",
            self.beds
                .static_bed
                .as_deref()
                .map_or_else(|| "None".to_string(), |p| p.display().to_string())
        )?;
        writeln!(
            f,
            "Priority Tone: {}",
            self.beds
                .priority_tone
                .as_deref()
                .map_or_else(|| "None".to_string(), |p| p.display().to_string())
        )?;
        writeln!(f, "Output Directory: {}", self.output_dir.display())?;
        Ok(())
    }
}

impl RadioSettings {
    /// Load from the default location, writing defaults there if nothing exists.
    pub fn load() -> Result<Self> {
        let settings_path = Self::settings_path();

        if settings_path.exists() {
            Self::load_from(&settings_path)
        } else {
            info!("No settings file found, using defaults");
            let settings = Self::default();
            // Try to save defaults, but don't fail if we can't
            let _ = settings.save();
            Ok(settings)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        let settings: Self =
            serde_json::from_str(&contents).context("Failed to parse settings")?;
        debug!("Loaded settings from {path:?}");
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::settings_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).context("Failed to write settings file")?;

        debug!("Saved settings to {path:?}");
        Ok(())
    }

    pub fn settings_path() -> PathBuf {
        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir)
                .join("radiofx")
                .join(SETTINGS_FILENAME)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("radiofx")
                .join(SETTINGS_FILENAME)
        } else {
            PathBuf::from(".").join(SETTINGS_FILENAME)
        }
    }

    /// Push the whole configuration into `chain`, stopping at the first
    /// rejected parameter. Existing bands are replaced.
    pub fn apply(&self, chain: &mut ProcessingChain) -> ChainResult<()> {
        chain.clear_eq_bands();
        for band in &self.equalizer.bands {
            chain.add_eq_band(*band)?;
        }
        chain.configure_eq(
            self.equalizer.output_gain_db,
            self.equalizer.analyzer,
            self.equalizer.quality,
        )?;
        chain.set_compressor(self.compressor)?;
        chain.set_saturator(self.saturator)?;
        chain.set_layout(
            [
                self.chain.equalizer,
                self.chain.compressor,
                self.chain.saturator,
            ],
            self.chain.order,
        );
        Ok(())
    }

    /// Fresh chain at the working format, configured from these settings.
    pub fn build_chain(&self) -> ChainResult<ProcessingChain> {
        let mut chain =
            ProcessingChain::new(f64::from(self.working_sample_rate), self.block_size)?;
        self.apply(&mut chain)?;
        Ok(chain)
    }
}
