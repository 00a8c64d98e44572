//! Configuration for s5cmd runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tool::binary_name;

/// Name of the per-user configuration directory and file.
const APP_DIR: &str = "s5cmd-runner";
const CONFIG_FILE: &str = "config.toml";

/// Configuration for the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Where the s5cmd executable lives (or will be installed).
    pub tool_path: PathBuf,
    /// Directory for generated command files and downloaded inputs.
    pub scratch_dir: PathBuf,
    /// Seconds between progress samples for `run` and bulk downloads.
    pub report_interval_secs: u64,
    /// Seconds between progress samples for `sync` and `cp`.
    pub sync_interval_secs: u64,
    /// Seconds between progress samples while listing.
    pub list_interval_secs: u64,
    /// Whether to download s5cmd when it is missing.
    pub auto_install: bool,
}

/// Returns the default executable location, `~/s5cmd`.
fn default_tool_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(binary_name())
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            tool_path: default_tool_path(),
            scratch_dir: std::env::temp_dir(),
            report_interval_secs: 5,
            sync_interval_secs: 10,
            list_interval_secs: 5,
            auto_install: true,
        }
    }
}

impl RunnerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the s5cmd executable path.
    #[must_use]
    pub fn with_tool_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_path = path.into();
        self
    }

    /// Sets the scratch directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Sets the report interval used by `run` and bulk downloads.
    #[must_use]
    pub const fn with_report_interval(mut self, secs: u64) -> Self {
        self.report_interval_secs = secs;
        self
    }

    /// Sets the report interval used by `sync` and `cp`.
    #[must_use]
    pub const fn with_sync_interval(mut self, secs: u64) -> Self {
        self.sync_interval_secs = secs;
        self
    }

    /// Sets the report interval used while listing.
    #[must_use]
    pub const fn with_list_interval(mut self, secs: u64) -> Self {
        self.list_interval_secs = secs;
        self
    }

    /// Sets whether a missing s5cmd is installed automatically.
    #[must_use]
    pub const fn with_auto_install(mut self, auto_install: bool) -> Self {
        self.auto_install = auto_install;
        self
    }

    /// Report interval for `run` and bulk downloads.
    #[must_use]
    pub const fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Report interval for `sync` and `cp`.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Report interval while listing.
    #[must_use]
    pub const fn list_interval(&self) -> Duration {
        Duration::from_secs(self.list_interval_secs)
    }

    /// Returns the default configuration file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Loads configuration from a TOML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed, or
    /// if any report interval is zero.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every report interval is positive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first zero interval.
    pub fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("report_interval_secs", self.report_interval_secs),
            ("sync_interval_secs", self.sync_interval_secs),
            ("list_interval_secs", self.list_interval_secs),
        ] {
            if secs == 0 {
                return Err(Error::Config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    /// Loads the per-user configuration file if it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but is invalid.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => {
                log::debug!("Loading config from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}
