/*!
Configuration management for the DDC capture application.
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::device::DEFAULT_SAMPLES_PER_BANK;
use shared::file_index::DEFAULT_BASE_NAME;
use shared::InstrumentSettings;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub instrument: InstrumentSettings,
    pub acquisition: AcquisitionSettings,
    pub image: ImageSettings,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }
}

/// Where and how many trace files an acquisition writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Directory receiving `<base_name>_<n>.txt`
    pub output_directory: PathBuf,

    /// File name prefix
    pub base_name: String,

    /// Number of files per session
    pub file_count: u32,

    /// Samples captured per bank and channel
    pub samples_per_bank: usize,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("./data"),
            base_name: DEFAULT_BASE_NAME.to_string(),
            file_count: 1,
            samples_per_bank: DEFAULT_SAMPLES_PER_BANK,
        }
    }
}

/// Image reconstruction inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub decoder_matrix: PathBuf,
    pub edge_left: usize,
    pub edge_right: usize,

    /// Divide by the open beam image
    pub normalize: bool,
    pub clamp_to_one: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_beam_file: Option<PathBuf>,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            decoder_matrix: PathBuf::from("decoder_matrix.txt"),
            edge_left: 156,
            edge_right: 356,
            normalize: false,
            clamp_to_one: false,
            open_beam_file: None,
        }
    }
}
