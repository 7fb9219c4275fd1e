use std::{
    fmt,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    config::PortfolioConfig,
    error::{Result, TraderError},
    types::Holdings,
    utils::{read_optional, write_json_pretty},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Traded,
    #[serde(rename = "no_trade_today_already_completed")]
    NoTradeAlreadyCompleted,
    Failed,
    Advisory,
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CycleStatus::Traded => "traded",
            CycleStatus::NoTradeAlreadyCompleted => "no trade, already completed today",
            CycleStatus::Failed => "failed",
            CycleStatus::Advisory => "advisory",
        };
        f.write_str(label)
    }
}

/// What the portfolio file holds after every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub total_value: f64,
    pub cash: f64,
    pub shares: u64,
    pub current_price: f64,
    pub timestamp: DateTime<Local>,
    pub status: CycleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PortfolioSnapshot {
    pub fn new(holdings: Holdings, price: f64, status: CycleStatus) -> Self {
        Self {
            total_value: holdings.value_with_price(price),
            cash: holdings.cash,
            shares: holdings.shares,
            current_price: price,
            timestamp: Local::now(),
            status,
            error: None,
        }
    }

    pub fn failed(holdings: Holdings, price: f64, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(holdings, price, CycleStatus::Failed)
        }
    }

    pub fn holdings(&self) -> Holdings {
        Holdings::new(self.cash, self.shares)
    }
}

pub struct PortfolioStore {
    path: PathBuf,
    config: PortfolioConfig,
}

impl PortfolioStore {
    pub fn new(path: &Path, config: PortfolioConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            config,
        }
    }

    pub fn defaults(&self) -> Holdings {
        Holdings::new(self.config.initial_cash, self.config.initial_shares)
    }

    /// Holdings to start the cycle from.
    ///
    /// Missing file or fields fall back to the configured defaults, as do values that are
    /// negative, non-finite or above the plausibility limits. Only unparsable JSON is an error.
    pub fn load(&self) -> Result<Holdings> {
        let Some(bytes) = read_optional(&self.path)? else {
            return Ok(self.defaults());
        };
        let stored: Value =
            serde_json::from_slice(&bytes).map_err(|err| TraderError::corrupt(&self.path, err))?;
        let Value::Object(stored) = stored else {
            return Err(TraderError::corrupt(&self.path, "portfolio is not an object"));
        };

        let cash = stored
            .get("cash")
            .and_then(Value::as_f64)
            .unwrap_or(self.config.initial_cash);
        let shares = stored
            .get("shares")
            .and_then(Value::as_f64)
            .unwrap_or(self.config.initial_shares as f64);

        let plausible = cash.is_finite()
            && shares.is_finite()
            && cash >= 0.
            && shares >= 0.
            && cash <= self.config.max_cash
            && shares <= self.config.max_shares as f64;
        if !plausible {
            warn!(
                cash,
                shares,
                default_cash = self.config.initial_cash,
                default_shares = self.config.initial_shares,
                "stored portfolio is out of range, resetting to defaults"
            );
            return Ok(self.defaults());
        }

        Ok(Holdings::new(cash, shares.floor() as u64))
    }

    pub fn read_snapshot(&self) -> Result<Option<PortfolioSnapshot>> {
        match read_optional(&self.path)? {
            Some(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).map_err(|err| TraderError::corrupt(&self.path, err))?,
            )),
            None => Ok(None),
        }
    }

    pub fn save(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        write_json_pretty(&self.path, snapshot)
    }
}
