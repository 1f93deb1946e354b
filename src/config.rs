//! Workflow configuration
//!
//! Everything the upgrade workflow needs besides the device and its
//! credentials lives in [`UpgradeConfig`]. It can be built in code or loaded
//! from a TOML file:
//!
//! ```toml
//! package_url = "https://downloads.example.com/agent-5.0.1.cisco.tar"
//! destination = "bootflash:/apps"
//! quiet_file_prompts = false
//! transfer_delay_secs = 120
//!
//! [no_app_policy]
//! fallback = "te"
//!
//! [markers]
//! directory_missing = ["No such file", "%Error opening"]
//! ```

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default flash directory that receives the package
pub const DEFAULT_DESTINATION: &str = "bootflash:/apps";

/// Errors loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is present but unusable.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// What to do when no application is in the RUNNING state.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NoAppPolicy {
    /// Record `SkippedNoApp` and stop.
    #[default]
    Skip,
    /// Upgrade this application id instead.
    Fallback(String),
}

/// Text markers used to classify device responses.
///
/// These are firmware-dependent heuristics, so every list can be replaced
/// from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResponseMarkers {
    /// Any of these in a `dir` response means the directory does not exist.
    pub directory_missing: Vec<String>,
    /// Any of these in a `mkdir` response means it is waiting for a confirmation.
    /// A bracketed echo of the directory name is always checked as well.
    pub mkdir_confirm: Vec<String>,
    /// Copy sub-prompt asking for the destination filename.
    pub destination_filename: Vec<String>,
    /// Copy sub-prompt asking to confirm or overwrite (matched case-insensitively).
    pub overwrite_confirm: Vec<String>,
    /// Link-wrapping fragments that mark a rewritten URL (domains matched
    /// case-insensitively).
    pub obfuscation: Vec<String>,
}

impl Default for ResponseMarkers {
    fn default() -> Self {
        Self {
            directory_missing: strings(&["not a directory", "No such file", "%Error opening"]),
            mkdir_confirm: strings(&["confirm"]),
            destination_filename: strings(&["Destination filename"]),
            overwrite_confirm: strings(&["[confirm]", "overwrite"]),
            obfuscation: strings(&["urldefense", "__"]),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Configuration for one upgrade run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// HTTP(S) URL of the application package
    pub package_url: String,
    /// Flash directory the package is copied into
    pub destination: String,
    /// Behaviour when no application is running
    pub no_app_policy: NoAppPolicy,
    /// Issue `file prompt quiet` before copying
    pub quiet_file_prompts: bool,
    /// Blind-send delay for short interactive commands
    pub command_delay_secs: u64,
    /// Blind-send delay for the package copy
    pub transfer_delay_secs: u64,
    /// How long to wait for the device prompt once the transfer is running
    pub transfer_timeout_secs: u64,
    /// Overall limit for one device's workflow (0 disables it)
    pub device_timeout_secs: u64,
    /// Response classification markers
    pub markers: ResponseMarkers,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            package_url: String::new(),
            destination: DEFAULT_DESTINATION.to_string(),
            no_app_policy: NoAppPolicy::Skip,
            quiet_file_prompts: false,
            command_delay_secs: 2,
            transfer_delay_secs: 60,
            transfer_timeout_secs: 1800,
            device_timeout_secs: 3600,
            markers: ResponseMarkers::default(),
        }
    }
}

impl UpgradeConfig {
    /// Config with defaults for everything but the package URL
    pub fn new(package_url: impl Into<String>) -> Self {
        Self {
            package_url: package_url.into(),
            ..Self::default()
        }
    }

    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the values the workflow cannot run without.
    ///
    /// Obfuscated URLs are *not* rejected here; that is a per-device outcome.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package_url.trim().is_empty() {
            return Err(ConfigError::Invalid("package_url is required".to_string()));
        }
        if self.destination.trim().is_empty() {
            return Err(ConfigError::Invalid("destination is empty".to_string()));
        }
        if self.package_file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "package_url has no file name: {}",
                self.package_url
            )));
        }
        if let NoAppPolicy::Fallback(id) = &self.no_app_policy {
            if id.trim().is_empty() || id.contains(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!("bad fallback app id: {:?}", id)));
            }
        }
        Ok(())
    }

    /// Last path segment of the package URL, without query or fragment.
    pub fn package_file_name(&self) -> Option<&str> {
        let url = self.package_url.trim();
        let url = url.split(['?', '#']).next().unwrap_or(url);
        let path = url.split_once("://").map_or(url, |(_, rest)| rest);
        let (_, name) = path.rsplit_once('/')?;
        (!name.is_empty()).then_some(name)
    }

    /// Full device path of the copied package, e.g. `bootflash:/apps/agent.tar`
    pub fn package_path(&self) -> Option<String> {
        let name = self.package_file_name()?;
        Some(format!("{}/{}", self.destination.trim_end_matches('/'), name))
    }

    /// Blind-send delay for short interactive commands
    pub fn command_delay(&self) -> Duration {
        Duration::from_secs(self.command_delay_secs)
    }

    /// Blind-send delay for the package copy
    pub fn transfer_delay(&self) -> Duration {
        Duration::from_secs(self.transfer_delay_secs)
    }

    /// Prompt wait after the copy sub-prompts are answered
    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    /// Per-device workflow limit, if any
    pub fn device_timeout(&self) -> Option<Duration> {
        (self.device_timeout_secs > 0).then(|| Duration::from_secs(self.device_timeout_secs))
    }
}
