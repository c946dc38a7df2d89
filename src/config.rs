//! TOML configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::prediction::{
    CyclePredictor, DEFAULT_FERTILE_DAYS_BEFORE_OVULATION, DEFAULT_HISTORY_LIMIT,
    DEFAULT_LUTEAL_PHASE_DAYS, DEFAULT_MIN_CYCLES,
};
use crate::storage;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("cannot find config directory")]
    NoConfigDir,
    #[error(transparent)]
    Storage(#[from] storage::StorageError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Where vault files live. Defaults to the platform's local data directory.
    pub data_dir: Option<PathBuf>,
    pub log_filter: String,
    pub prediction: PredictionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            log_filter: "info".into(),
            prediction: PredictionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PredictionConfig {
    pub luteal_phase_days: u32,
    pub fertile_days_before_ovulation: u32,
    pub min_cycles: usize,
    /// Most recent records read when forecasting.
    pub history_limit: usize,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            luteal_phase_days: DEFAULT_LUTEAL_PHASE_DAYS,
            fertile_days_before_ovulation: DEFAULT_FERTILE_DAYS_BEFORE_OVULATION,
            min_cycles: DEFAULT_MIN_CYCLES,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl PredictionConfig {
    pub fn predictor(&self) -> CyclePredictor {
        CyclePredictor::new()
            .with_luteal_phase_days(self.luteal_phase_days)
            .with_fertile_days_before_ovulation(self.fertile_days_before_ovulation)
            .with_min_cycles(self.min_cycles)
            .with_history_limit(self.history_limit)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=30).contains(&self.luteal_phase_days) {
            return Err(ConfigError::Invalid(format!(
                "luteal_phase_days must be between 1 and 30, got {}",
                self.luteal_phase_days
            )));
        }
        if self.fertile_days_before_ovulation > 10 {
            return Err(ConfigError::Invalid(format!(
                "fertile_days_before_ovulation must be at most 10, got {}",
                self.fertile_days_before_ovulation
            )));
        }
        if self.min_cycles == 0 {
            return Err(ConfigError::Invalid("min_cycles must be at least 1".into()));
        }
        if self.history_limit < self.min_cycles {
            return Err(ConfigError::Invalid(format!(
                "history_limit ({}) must not be below min_cycles ({})",
                self.history_limit, self.min_cycles
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path, source },
            other => other,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.prediction.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("cyclekit").join("config.toml"))
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(storage::default_data_dir()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_luteal_phase() {
        let config = Config::default();
        assert_eq!(config.prediction.luteal_phase_days, 14);
        assert_eq!(config.prediction.min_cycles, 3);
        assert_eq!(config.prediction.history_limit, 12);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/cyclekit/config.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            data_dir = "/tmp/cycles"

            [prediction]
            luteal_phase_days = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/cycles")));
        assert_eq!(config.prediction.luteal_phase_days, 12);
        assert_eq!(config.prediction.fertile_days_before_ovulation, 5);
        assert_eq!(config.prediction.predictor().luteal_phase_days(), 12);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(matches!(
            Config::from_toml("[prediction]\nluteal_phase_days = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml("[prediction]\nmin_cycles = 5\nhistory_limit = 4"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_filter = [").unwrap();

        match Config::load(Some(path.as_path())) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
