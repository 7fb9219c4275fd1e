use std::{fs, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};

use crate::{
    agent::policy::EpsilonGreedy,
    constants::{
        self, agent,
        files::{self, DATA_PATH},
        portfolio, shape,
    },
    error::{Result, TraderError},
};

/// Fixed tensor dimensions every state must satisfy to be stored or trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    pub history_days: usize,
    pub stock_features: usize,
    pub news_per_day: usize,
    pub news_features: usize,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            history_days: shape::HISTORY_DAYS,
            stock_features: shape::STOCK_FEATURES.len(),
            news_per_day: shape::NEWS_PER_DAY,
            news_features: shape::NEWS_FEATURES.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub min_experiences: usize,
    pub batch_size: usize,
    pub epochs_per_day: usize,
    pub learning_rate: f64,
    pub gamma: f64,
    pub boost_below: usize,
    pub boost_epoch_factor: usize,
    pub boost_lr_factor: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_experiences: agent::MIN_EXPERIENCES,
            batch_size: agent::BATCH_SIZE,
            epochs_per_day: agent::EPOCHS_PER_DAY,
            learning_rate: agent::LEARNING_RATE,
            gamma: agent::GAMMA,
            boost_below: agent::BOOST_BELOW,
            boost_epoch_factor: agent::BOOST_EPOCH_FACTOR,
            boost_lr_factor: agent::BOOST_LR_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub initial_cash: f64,
    pub initial_shares: u64,
    pub max_cash: f64,
    pub max_shares: u64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_cash: agent::STARTING_CASH,
            initial_shares: agent::STARTING_SHARES,
            max_cash: portfolio::MAX_PLAUSIBLE_CASH,
            max_shares: portfolio::MAX_PLAUSIBLE_SHARES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub buffer_file: PathBuf,
    pub portfolio_file: PathBuf,
    pub sessions_file: PathBuf,
    /// Decision snapshots land in `<results_dir>/<symbol>/today.json`
    pub results_dir: PathBuf,
    pub weights_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_PATH),
            buffer_file: PathBuf::from(files::BUFFER_FILE),
            portfolio_file: PathBuf::from(files::PORTFOLIO_FILE),
            sessions_file: PathBuf::from(files::SESSIONS_FILE),
            results_dir: PathBuf::from(files::RESULTS_DIR),
            weights_file: PathBuf::from(files::WEIGHTS_PATH),
        }
    }
}

impl PathsConfig {
    /// Every file rooted under `dir`, keeping the relative layout.
    pub fn rooted_at(dir: &Path) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: dir.join(defaults.data_dir),
            buffer_file: dir.join(defaults.buffer_file),
            portfolio_file: dir.join(defaults.portfolio_file),
            sessions_file: dir.join(defaults.sessions_file),
            results_dir: dir.join(defaults.results_dir),
            weights_file: dir.join(defaults.weights_file),
        }
    }
}

/// Immutable engine configuration handed to every component at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub symbol: String,
    pub shape: ShapeConfig,
    pub buffer_capacity: usize,
    pub min_history_points: usize,
    pub live_policy: EpsilonGreedy,
    pub simulation_policy: EpsilonGreedy,
    pub training: TrainingConfig,
    pub portfolio: PortfolioConfig,
    pub paths: PathsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: constants::TICKER.to_string(),
            shape: ShapeConfig::default(),
            buffer_capacity: agent::BUFFER_CAPACITY,
            min_history_points: constants::MIN_HISTORICAL_DATA_POINTS,
            live_policy: EpsilonGreedy::live(),
            simulation_policy: EpsilonGreedy::simulation(),
            training: TrainingConfig::default(),
            portfolio: PortfolioConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads a TOML file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| TraderError::io(path, err))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.paths
            .results_dir
            .join(&self.symbol)
            .join(files::SNAPSHOT_FILE)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            symbol = "AAPL"

            [shape]
            history_days = 90

            [live_policy]
            floor_epsilon = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.symbol, "AAPL");
        assert_eq!(config.shape.history_days, 90);
        assert_eq!(config.shape.stock_features, 12);
        assert_eq!(config.shape.news_per_day, 5);
        assert_eq!(config.live_policy.floor_epsilon, 0.25);
        assert_eq!(config.live_policy.noise_weight, 0.4);
        assert_eq!(config.simulation_policy, EpsilonGreedy::simulation());
        assert_eq!(config.buffer_capacity, 50);
        assert_eq!(config.training.gamma, 0.95);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let err = EngineConfig::from_toml("symbol = [").unwrap_err();
        assert!(matches!(err, TraderError::Config(_)));
    }

    #[test]
    fn rooted_paths_share_a_directory() {
        let paths = PathsConfig::rooted_at(Path::new("/tmp/run"));
        assert_eq!(paths.buffer_file, PathBuf::from("/tmp/run/rl_experience_buffer.bin"));
        assert_eq!(paths.weights_file, PathBuf::from("/tmp/run/weights/policy.bin"));

        let config = EngineConfig {
            paths,
            ..EngineConfig::default()
        };
        assert_eq!(config.snapshot_path(), PathBuf::from("/tmp/run/results/OCTO/today.json"));
    }
}
