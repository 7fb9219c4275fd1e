use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    constants::snapshot::RECENT_VALUES,
    error::Result,
    gym::TradeAction,
    history::CycleStatus,
    types::Holdings,
    utils::{read_optional, round2, write_json_pretty},
};

/// The `today.json` document served over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionSnapshot {
    pub ticker: String,
    pub status: CycleStatus,
    pub last_action_type: TradeAction,
    pub last_action_value: f64,
    pub last_reward: f64,
    pub total_capital: f64,
    pub cash: f64,
    pub shares: u64,
    pub current_price: f64,
    pub net_profit: f64,
    pub message: String,
    pub last_action: DateTime<Local>,
    pub last_updated: DateTime<Local>,
    /// Newest first
    #[serde(default)]
    pub values_last30: Vec<f64>,
}

pub struct SnapshotInput<'a> {
    pub ticker: &'a str,
    pub status: CycleStatus,
    pub action: f64,
    pub reward: f64,
    pub holdings: Holdings,
    pub price: f64,
    pub initial_cash: f64,
    pub message: String,
}

impl DecisionSnapshot {
    pub fn from_input(input: SnapshotInput, previous: Option<&DecisionSnapshot>) -> Self {
        let now = Local::now();
        let total_capital = input.holdings.value_with_price(input.price);

        let mut values_last30 = Vec::with_capacity(RECENT_VALUES);
        values_last30.push(round2(total_capital));
        if let Some(previous) = previous {
            values_last30.extend(previous.values_last30.iter().copied());
        }
        values_last30.truncate(RECENT_VALUES);

        Self {
            ticker: input.ticker.to_string(),
            status: input.status,
            last_action_type: TradeAction::from_value(input.action),
            last_action_value: input.action,
            last_reward: input.reward,
            total_capital,
            cash: input.holdings.cash,
            shares: input.holdings.shares,
            current_price: input.price,
            net_profit: total_capital - input.initial_cash,
            message: input.message,
            last_action: now,
            last_updated: now,
            values_last30,
        }
    }
}

/// Reads the previous snapshot. An unreadable one is ignored so the next write starts over.
pub fn read_snapshot(path: &Path) -> Result<Option<DecisionSnapshot>> {
    let Some(bytes) = read_optional(path)? else {
        return Ok(None);
    };

    match serde_json::from_slice(&bytes) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(err) => {
            warn!(path = %path.display(), %err, "ignoring unreadable decision snapshot");
            Ok(None)
        }
    }
}

/// Builds the new snapshot on top of the previous one and writes it.
pub fn write_snapshot(path: &Path, input: SnapshotInput) -> Result<DecisionSnapshot> {
    let previous = read_snapshot(path)?;
    let snapshot = DecisionSnapshot::from_input(input, previous.as_ref());
    write_json_pretty(path, &snapshot)?;

    debug!(path = %path.display(), status = ?snapshot.status, "decision snapshot written");
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(value_cash: f64, status: CycleStatus) -> SnapshotInput<'static> {
        SnapshotInput {
            ticker: "OCTO",
            status,
            action: 0.6,
            reward: 6.3,
            holdings: Holdings::new(value_cash, 2),
            price: 10.,
            initial_cash: 1_500.,
            message: "done".to_string(),
        }
    }

    #[test]
    fn values_are_newest_first_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("OCTO/today.json");

        for i in 0..35 {
            write_snapshot(&path, input(1_000. + i as f64, CycleStatus::Traded)).unwrap();
        }

        let snapshot = read_snapshot(&path).unwrap().unwrap();
        assert_eq!(snapshot.values_last30.len(), 30);
        assert_eq!(snapshot.values_last30[0], 1_054.);
        assert_eq!(snapshot.values_last30[29], 1_025.);
        assert_eq!(snapshot.last_action_type, TradeAction::Buy);
        assert_eq!(snapshot.net_profit, 1_054. - 1_500.);
    }

    #[test]
    fn first_snapshot_has_a_single_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("today.json");

        let snapshot = write_snapshot(&path, input(100., CycleStatus::Advisory)).unwrap();

        assert_eq!(snapshot.values_last30, vec![120.]);
        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["totalCapital"], 120.);
        assert_eq!(raw["lastActionType"], "buy");
        assert_eq!(raw["status"], "advisory");
    }

    #[test]
    fn unreadable_previous_snapshot_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("today.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let snapshot = write_snapshot(&path, input(100., CycleStatus::Traded)).unwrap();

        assert_eq!(snapshot.values_last30.len(), 1);
    }
}
