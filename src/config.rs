//! Settings persistence.
//!
//! Reads and writes the mapping produced by `Configurable::export` and
//! consumed by `Configurable::restore`. Files ending in `.toml` are TOML,
//! anything else is JSON.
//!
//! `SessionConfig::load` layers, lowest first:
//! 1. `CameraSettings::default()`
//! 2. the file named by `CAMERA_CONFIG`, if set
//! 3. `CAMERA_*` environment overrides

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use crate::configurable::{ConfigMap, Configurable};
use crate::settings::CameraSettings;

const CONFIG_PATH_ENV: &str = "CAMERA_CONFIG";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub settings: CameraSettings,
    /// File the settings were read from, if any.
    pub source_path: Option<PathBuf>,
}

impl SessionConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());
        let mut cfg = match config_path.as_deref() {
            Some(path) => Self::from_file(Path::new(path))?,
            None => Self {
                settings: CameraSettings::default(),
                source_path: None,
            },
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overlaid with one settings file; no environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let map = load_settings_file(path)?;
        let mut settings = CameraSettings::default();
        settings
            .restore(&map)
            .map_err(|e| anyhow!("invalid settings in {}: {}", path.display(), e))?;
        Ok(Self {
            settings,
            source_path: Some(path.to_path_buf()),
        })
    }

    /// Write the declared settings to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        save_settings_file(path, &self.settings.export()?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(address) = std::env::var("CAMERA_IP_ADDRESS") {
            if !address.trim().is_empty() {
                self.settings.ip_address = address.trim().to_string();
            }
        }
        if let Ok(timeout) = std::env::var("CAMERA_GRAB_TIMEOUT_MS") {
            self.settings.grab_timeout = timeout.trim().parse().map_err(|_| {
                anyhow!("CAMERA_GRAB_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
        }
        if let Some(exposure) = float_env("CAMERA_EXPOSURE_TIME")? {
            self.settings.exposure_time = exposure;
        }
        if let Some(frame_rate) = float_env("CAMERA_FRAME_RATE")? {
            self.settings.frame_rate = frame_rate;
        }
        if let Some(gain) = float_env("CAMERA_GAIN")? {
            self.settings.gain = gain;
        }
        if let Some(gamma) = float_env("CAMERA_GAMMA")? {
            self.settings.gamma = gamma;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let s = &self.settings;
        if !(s.gamma.is_finite() && s.gamma > 0.0) {
            return Err(anyhow!("gamma must be greater than zero"));
        }
        if !(s.gain.is_finite() && s.gain >= 0.0) {
            return Err(anyhow!("gain must not be negative"));
        }
        if !(s.exposure_time.is_finite() && s.exposure_time >= 0.0) {
            return Err(anyhow!("exposure_time must not be negative"));
        }
        if !(s.frame_rate.is_finite() && s.frame_rate >= 0.0) {
            return Err(anyhow!("frame_rate must not be negative"));
        }
        if s.grab_timeout == 0 {
            return Err(anyhow!("grab_timeout must be greater than zero"));
        }
        Ok(())
    }
}

pub fn load_settings_file(path: &Path) -> Result<ConfigMap> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read settings file {}: {}", path.display(), e))?;
    let map = if is_toml(path) {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid settings file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid settings file {}: {}", path.display(), e))?
    };
    Ok(map)
}

pub fn save_settings_file(path: &Path, map: &ConfigMap) -> Result<()> {
    let raw = if is_toml(path) {
        toml::to_string(map)
            .map_err(|e| anyhow!("failed to encode settings for {}: {}", path.display(), e))?
    } else {
        serde_json::to_string_pretty(map)
            .map_err(|e| anyhow!("failed to encode settings for {}: {}", path.display(), e))?
    };
    std::fs::write(path, raw)
        .map_err(|e| anyhow!("failed to write settings file {}: {}", path.display(), e))?;
    log::debug!("saved camera settings to {}", path.display());
    Ok(())
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn float_env(key: &str) -> Result<Option<f64>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number", key)),
        _ => Ok(None),
    }
}
