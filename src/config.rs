use anyhow::{Context, Result};
use facecrop_vision::{model::DEFAULT_DETECTOR_MODEL, DetectorParams, ParamsError, SynthesisParams};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> =
    Lazy::new(|| Path::new(option_env!("FACECROP_CONFIG_PATH").unwrap_or("facecrop.toml")));

pub static MODEL_DIR: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACECROP_MODEL_DIR").unwrap_or("/usr/local/share/facecrop/models"))
});

/// What to do with a source file that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log a warning and move on to the next image.
    #[default]
    Skip,
    /// Stop the batch with an error.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The batch stops once more than this many crops were written.
    pub max_total_crops: u64,
    /// Log progress every this many images.
    pub sampling_frequency: u64,
    /// Longer image side after normalization.
    pub normalize_size: u32,
    pub on_decode_error: ErrorPolicy,
    /// Model file name inside [`MODEL_DIR`], or a path when `custom_model` is set.
    pub model: String,
    pub custom_model: bool,
    pub detector: DetectorParams,
    pub synthesis: SynthesisParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_total_crops: 100_000,
            sampling_frequency: 100,
            normalize_size: 500,
            on_decode_error: ErrorPolicy::Skip,
            model: DEFAULT_DETECTOR_MODEL.to_string(),
            custom_model: false,
            detector: DetectorParams::default(),
            synthesis: SynthesisParams::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ParamsError> {
        self.detector.validate()?;
        self.synthesis.validate()?;
        if self.sampling_frequency == 0 {
            return Err(ParamsError::SamplingFrequency);
        }
        if self.normalize_size == 0 {
            return Err(ParamsError::NormalizeSize);
        }
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        if self.custom_model {
            PathBuf::from(&self.model)
        } else {
            MODEL_DIR.join(&self.model)
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// Writes `cfg` as TOML, creating parent directories. Returns the path written.
pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<PathBuf> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg).context("serializing config")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, data).with_context(|| format!("writing config to {}", path.display()))?;
    Ok(path.to_path_buf())
}
