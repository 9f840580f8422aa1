use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{PlotError, Result};

/// File name looked up in the working directory when no config path is given
pub const DEFAULT_CONFIG_FILE: &str = "gensimplot.cnf";

/// Hyperparameters of the plot-fitting search
///
/// Keys match the original `gensimplot.cnf` JSON layout. Absent keys keep the
/// built-in defaults; `sideRatioMax: null` disables the side-ratio clamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlotConfig {
    /// Number of random perturbations tried per plot
    pub random_iterations: usize,
    /// Maximum translation as a fraction of the plot's projected footprint
    pub perc_translate: f64,
    /// Maximum rotation per perturbation, in degrees
    pub max_alpha: f64,
    /// Maximum relative change of the long side per resize
    pub max_resize_perc: f64,
    /// Upper bound on a/b for rectangles and ellipses
    pub side_ratio_max: Option<f64>,
    /// Base seed for the per-feature generators; drawn from the OS when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            random_iterations: 750,
            perc_translate: 0.10,
            max_alpha: 25.0,
            max_resize_perc: 0.15,
            side_ratio_max: Some(4.0),
            seed: None,
        }
    }
}

impl PlotConfig {
    /// Read a configuration file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| PlotError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| PlotError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`PlotConfig::load`], but a file that does not exist yields the defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|source| PlotError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| PlotError::OutputWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ratio) = self.side_ratio_max {
            if !(ratio >= 1.0) {
                return Err(PlotError::InvalidParameter(format!(
                    "sideRatioMax must be at least 1.0, got {ratio}"
                )));
            }
        }
        for (name, value) in [
            ("percTranslate", self.perc_translate),
            ("maxAlpha", self.max_alpha),
            ("maxResizePerc", self.max_resize_perc),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PlotError::InvalidParameter(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.max_resize_perc >= 1.0 {
            return Err(PlotError::InvalidParameter(format!(
                "maxResizePerc must be below 1.0, got {}",
                self.max_resize_perc
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_keys_keep_defaults() {
        let config: PlotConfig = serde_json::from_str(r#"{ "randomIterations": 10 }"#).unwrap();
        assert_eq!(config.random_iterations, 10);
        assert_eq!(config.max_alpha, 25.0);
        assert_eq!(config.side_ratio_max, Some(4.0));
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_null_side_ratio_disables_clamp() {
        let config: PlotConfig = serde_json::from_str(r#"{ "sideRatioMax": null }"#).unwrap();
        assert_eq!(config.side_ratio_max, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let config = PlotConfig {
            random_iterations: 120,
            perc_translate: 0.2,
            seed: Some(7),
            ..PlotConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(PlotConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PlotConfig::load_or_default(&dir.path().join("absent.cnf")).unwrap();
        assert_eq!(config, PlotConfig::default());
        assert!(PlotConfig::load(&dir.path().join("absent.cnf")).is_err());
    }

    #[test]
    fn test_validate_rejects_small_ratio() {
        let config = PlotConfig {
            side_ratio_max: Some(0.5),
            ..PlotConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(PlotConfig::default().validate().is_ok());
    }
}
