use riff_render::MixdownConfig;
use riff_transport::MIN_CLIP_DURATION;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Editor and mixdown tunables, read from `riff/config.toml` in the user's
/// config directory. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_pixels_per_second: f64,
    /// Magnetic snap radius, in beats.
    pub snap_threshold_beats: f64,
    pub min_clip_duration: f64,
    pub autosave_debounce_ms: u64,
    /// Run the overlap resolver when a resize is committed, not only on move.
    pub resize_resolves_overlaps: bool,
    pub mixdown: MixdownConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_pixels_per_second: 100.0,
            snap_threshold_beats: 0.25,
            min_clip_duration: MIN_CLIP_DURATION,
            autosave_debounce_ms: 2000,
            resize_resolves_overlaps: false,
            mixdown: MixdownConfig::default(),
        }
    }
}

impl EngineConfig {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("riff").join("config.toml"))
    }

    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("ignoring invalid config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            return;
        };
        if let Err(e) = self.save_to(&path) {
            log::warn!("failed to save config {}: {e}", path.display());
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}
