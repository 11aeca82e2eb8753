use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pdf::{DEFAULT_PRINT_DPI, ViewerError};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdf-embed";

/// Acceptable range for displayed width ÷ raster width before a resize
/// triggers a re-render
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionBand {
    #[serde(default = "default_band_min")]
    pub min: f64,
    #[serde(default = "default_band_max")]
    pub max: f64,
}

impl Default for ResolutionBand {
    fn default() -> Self {
        Self {
            min: default_band_min(),
            max: default_band_max(),
        }
    }
}

impl ResolutionBand {
    pub fn contains(&self, ratio: f64) -> bool {
        ratio >= self.min && ratio <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_print_dpi")]
    pub default_print_dpi: u32,

    /// Width reserved for the container's scrollbar when fitting pages
    #[serde(default = "default_scroll_width")]
    pub scroll_width: f64,

    #[serde(default)]
    pub resolution_band: ResolutionBand,

    /// Send credentials with URL fetches for raw sources
    #[serde(default)]
    pub with_credentials: bool,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_print_dpi() -> u32 {
    DEFAULT_PRINT_DPI
}

fn default_scroll_width() -> f64 {
    10.0
}

fn default_band_min() -> f64 {
    0.85
}

fn default_band_max() -> f64 {
    1.15
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            default_print_dpi: default_print_dpi(),
            scroll_width: default_scroll_width(),
            resolution_band: ResolutionBand::default(),
            with_credentials: false,
        }
    }
}

impl ViewerConfig {
    /// Parse a YAML document; missing fields take their defaults
    pub fn from_yaml_str(content: &str) -> Result<Self, ViewerError> {
        let mut config: Self = serde_yaml::from_str(content).map_err(|e| ViewerError::Config {
            detail: e.to_string(),
        })?;
        if config.version < CURRENT_VERSION {
            migrate_settings(&mut config);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ViewerError> {
        serde_yaml::to_string(self).map_err(|e| ViewerError::Config {
            detail: e.to_string(),
        })
    }

    fn validate(&self) -> Result<(), ViewerError> {
        if self.default_print_dpi == 0 {
            return Err(ViewerError::Config {
                detail: "default_print_dpi must be positive".into(),
            });
        }
        if !(self.resolution_band.min <= 1.0 && self.resolution_band.max >= 1.0) {
            return Err(ViewerError::Config {
                detail: format!(
                    "resolution_band [{}, {}] must contain 1.0",
                    self.resolution_band.min, self.resolution_band.max
                ),
            });
        }
        Ok(())
    }

    /// Load from the user config directory, creating the file with defaults
    /// when it does not exist. Unreadable files fall back to defaults.
    pub fn load() -> Self {
        let Some(path) = preferred_config_path() else {
            warn!("Could not determine config directory, using default settings");
            return Self::default();
        };

        if path.exists() {
            Self::load_from_path(&path)
        } else {
            info!("Settings file not found, creating with defaults at {path:?}");
            let config = Self::default();
            if let Err(e) = config.save_to(&path) {
                error!("Failed to save settings to {path:?}: {e}");
            }
            config
        }
    }

    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match Self::from_yaml_str(&content) {
                Ok(config) => {
                    debug!("Loaded settings from {path:?}");
                    config
                }
                Err(e) => {
                    error!("Failed to parse settings file {path:?}: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read settings file {path:?}: {e}");
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ViewerError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| ViewerError::Config {
                    detail: format!("create {parent:?}: {e}"),
                })?;
            }
        }

        let content = self.to_yaml_string()?;
        fs::write(path, content).map_err(|e| ViewerError::Config {
            detail: format!("write {path:?}: {e}"),
        })?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }
}

pub fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

fn migrate_settings(config: &mut ViewerConfig) {
    info!(
        "Migrating settings from v{} to v{}",
        config.version, CURRENT_VERSION
    );

    config.version = CURRENT_VERSION;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ViewerConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, ViewerConfig::default());
        assert_eq!(config.default_print_dpi, 150);
        assert_eq!(config.scroll_width, 10.0);
        assert!(config.resolution_band.contains(1.0));
        assert!(!config.resolution_band.contains(0.5));
    }

    #[test]
    fn old_versions_are_migrated() {
        let config = ViewerConfig::from_yaml_str("version: 0\nscroll_width: 0\n").unwrap();
        assert_eq!(config.version, CURRENT_VERSION);
        assert_eq!(config.scroll_width, 0.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            ViewerConfig::from_yaml_str("default_print_dpi: 0"),
            Err(ViewerError::Config { .. })
        ));
        assert!(ViewerConfig::from_yaml_str("resolution_band: { min: 1.2 }").is_err());
        assert!(ViewerConfig::from_yaml_str("scroll_width: [").is_err());
    }

    #[test]
    fn save_and_reload_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILENAME);

        let config = ViewerConfig {
            default_print_dpi: 300,
            with_credentials: true,
            ..ViewerConfig::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(ViewerConfig::load_from_path(&path), config);
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILENAME);
        std::fs::write(&path, "default_print_dpi: nope").unwrap();
        assert_eq!(ViewerConfig::load_from_path(&path), ViewerConfig::default());
    }
}
