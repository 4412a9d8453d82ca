use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::downloader::CookiePolicy;

/// Where the config lives, relative to the working directory.
pub const CONFIG_FILE: &str = "config.json";

/// Persisted user preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Last folder picked in the directory dialog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<String>,
    /// Browser cookie settings; built-in defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookiePolicy>,
    /// Keys this version does not know about, kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Config {
    pub fn cookie_policy(&self) -> CookiePolicy {
        self.cookies.clone().unwrap_or_default()
    }
}

/// Loads and saves [`Config`]. I/O failures never reach the user.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    /// Missing or malformed files give the default config.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match read_config(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!(error = %e, path = %path.display(), "using default config");
                Config::default()
            }
        };
        Self { path, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn download_dir(&self) -> Option<&str> {
        self.config.download_dir.as_deref()
    }

    /// Records a newly picked folder and persists it.
    pub fn set_download_dir(&mut self, dir: impl Into<String>) {
        self.config.download_dir = Some(dir.into());
        self.save();
    }

    pub fn save(&self) {
        if let Err(e) = write_config(&self.path, &self.config) {
            tracing::warn!(error = %e, path = %self.path.display(), "could not save config");
        }
    }
}

fn read_config(path: &Path) -> Result<Config, Box<dyn std::error::Error + Send + Sync>> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_config(path: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}
