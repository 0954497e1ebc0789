use crate::error::Result;
use crate::source::DEFAULT_ANTI_REPEAT_RATIO;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "stationflow";
const CONFIG_FILE: &str = "config.json";

/// Scheduler tuning. Every field has a default so old or partial files
/// keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Share of a group held back after being played.
    pub anti_repeat_ratio: f64,
    /// Main-track volume while a mix plays.
    pub duck_volume: f32,
    /// Length of the ducking ramps in seconds.
    pub duck_ramp_secs: f64,
    /// Program content that must remain queued before the next item is built.
    pub look_ahead_secs: f64,
    /// Quiet period after a station switch before building.
    pub debounce_ms: u64,
    /// Offset of the station's local time from UTC, used for day boundaries.
    pub utc_offset_secs: i32,
    /// Check that every composed file exists on disk.
    pub verify_assets: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            anti_repeat_ratio: DEFAULT_ANTI_REPEAT_RATIO,
            duck_volume: 0.3,
            duck_ramp_secs: 1.0,
            look_ahead_secs: 3600.0,
            debounce_ms: 2000,
            utc_offset_secs: 0,
            verify_assets: true,
        }
    }
}

impl Config {
    /// `<config dir>/stationflow/config.json`, or the working directory when
    /// the platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join(CONFIG_DIR))
            .unwrap_or_default()
            .join(CONFIG_FILE)
    }

    /// Load the config from JSON, or fall back to defaults if not found.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<Config>(&data) {
                    Ok(config) => return config.sanitized(path),
                    Err(e) => tracing::warn!(
                        "Corrupt config file '{}', using defaults: {}",
                        path.display(),
                        e
                    ),
                },
                Err(e) => tracing::warn!("Could not read config file '{}': {}", path.display(), e),
            }
        }
        Config::default()
    }

    /// Replace out-of-range values with their defaults.
    fn sanitized(mut self, path: &Path) -> Self {
        if !(0.0..1.0).contains(&self.anti_repeat_ratio) {
            tracing::warn!(
                "anti_repeat_ratio {} in '{}' is outside [0, 1), using {:.4}",
                self.anti_repeat_ratio,
                path.display(),
                DEFAULT_ANTI_REPEAT_RATIO
            );
            self.anti_repeat_ratio = DEFAULT_ANTI_REPEAT_RATIO;
        }
        self
    }

    /// Persist the config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
