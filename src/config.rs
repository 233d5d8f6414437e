//! File configuration.
//!
//! Every section is optional; a missing file section falls back to its
//! defaults, which select the software backend with a single bridge worker.

use crate::backend::{Capabilities, DeviceConfig, ExactBitsPolicy, RdseedConfig, SttyMinOne};
use crate::bridge::DEFAULT_WORKERS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Which backend variant to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// ChaCha20 seeded from the OS.
    #[default]
    Pseudo,
    /// The x86-64 RDSEED instruction.
    Rdseed,
    /// A character device or serial TRNG.
    Device,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pseudo" => Ok(Self::Pseudo),
            "rdseed" => Ok(Self::Rdseed),
            "device" => Ok(Self::Device),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// `backend.kind` named no known backend.
    #[error("unknown backend kind {0:?} (expected pseudo, rdseed or device)")]
    UnknownBackend(String),
    /// `bridge.workers` was zero.
    #[error("bridge worker count must be positive")]
    ZeroWorkers,
    /// `backend.device.path` was empty.
    #[error("device path must not be empty")]
    EmptyDevicePath,
    /// `backend.rdseed.retries` was zero.
    #[error("rdseed retry budget must be positive")]
    ZeroRetries,
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file was not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[backend]` table.
    #[serde(default)]
    pub backend: BackendConfig,
    /// `[bridge]` table.
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// `[sampling]` table.
    #[serde(default)]
    pub sampling: SamplingConfig,
}

/// Backend selection and per-variant settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    /// Which backend the CLI opens.
    #[serde(default)]
    pub kind: BackendKind,
    /// Settings for the serial device backend.
    #[serde(default)]
    pub device: DeviceSection,
    /// Settings for the RDSEED backend.
    #[serde(default)]
    pub rdseed: RdseedSection,
}

/// Device backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    /// Device node to open.
    pub path: PathBuf,
    /// Exact-bit alignment rule for this device.
    pub exact_bits: ExactBitsPolicy,
    /// Whether the device accepts fold-aware requests.
    pub folding: bool,
    /// Run `stty min 1` on the device after opening (serial TRNGs).
    pub stty_fixup: bool,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/hwrng"),
            exact_bits: ExactBitsPolicy::ByteAligned,
            folding: true,
            stty_fixup: false,
        }
    }
}

impl DeviceSection {
    /// Builds the factory for this device.
    pub fn to_device_config(&self) -> DeviceConfig {
        let config = DeviceConfig::new(&self.path)
            .with_capabilities(Capabilities::new(self.exact_bits, self.folding));
        if self.stty_fixup {
            config.with_hooks(SttyMinOne)
        } else {
            config
        }
    }
}

/// RDSEED backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RdseedSection {
    /// Attempts per 64-bit step before giving up.
    pub retries: u32,
}

impl Default for RdseedSection {
    fn default() -> Self {
        Self {
            retries: RdseedConfig::default().retries,
        }
    }
}

impl RdseedSection {
    /// Builds the factory for the RDSEED backend.
    pub fn to_rdseed_config(&self) -> RdseedConfig {
        RdseedConfig {
            retries: self.retries,
        }
    }
}

/// Async bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Worker threads serving async requests.
    pub workers: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Defaults applied by the CLI to sampling requests.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SamplingConfig {
    /// XOR-fold passes applied when a command does not say otherwise.
    pub folds: u32,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        content.parse()
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.backend.device.path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDevicePath);
        }
        if self.backend.rdseed.retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        Ok(())
    }
}

impl FromStr for FileConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: FileConfig =
            toml::from_str(s).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
