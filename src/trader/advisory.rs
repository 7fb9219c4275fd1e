use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    agent::PolicyModel,
    data::MarketData,
    error::Result,
    gym::TradeAction,
    history::CycleStatus,
    types::Holdings,
};

use super::{
    cycle::{build_state, latest_prices, DailyTrader},
    snapshot::{write_snapshot, DecisionSnapshot, SnapshotInput},
};

/// A recommendation for the coming session. Nothing is traded or learned.
#[derive(Debug, Clone, Serialize)]
pub struct Advice {
    pub action: f64,
    pub kind: TradeAction,
    /// Shares the action would move at the reference price
    pub shares: u64,
    pub price: f64,
    pub value: f64,
    pub holdings: Holdings,
    pub snapshot: Option<DecisionSnapshot>,
}

impl<M: PolicyModel, R: Rng> DailyTrader<M, R> {
    /// Asks the model for a greedy action at the latest close and publishes it to the snapshot.
    pub fn advise(&mut self, market: &MarketData) -> Result<Advice> {
        let holdings = self.portfolio_store().load()?;
        market.ensure_sufficient(self.config.min_history_points)?;

        let prepared = market.prepare(&self.config.shape);
        let (_, price) = latest_prices(&prepared)?;
        let state = build_state(&self.state_builder(), &prepared, holdings, price);

        let evaluation = self.model.evaluate_one(&state)?;
        let action = if evaluation.action.is_finite() {
            evaluation.action.clamp(-1., 1.)
        } else {
            0.
        };
        let kind = TradeAction::from_value(action);
        let shares = match kind {
            TradeAction::Buy if price > 0. => (action * (holdings.cash / price).floor()).floor() as u64,
            TradeAction::Sell => (action.abs() * holdings.shares as f64).floor() as u64,
            _ => 0,
        };

        info!(action, %kind, shares, price, "morning advisory");

        let snapshot = write_snapshot(
            &self.config.snapshot_path(),
            SnapshotInput {
                ticker: &self.config.symbol,
                status: CycleStatus::Advisory,
                action,
                reward: 0.,
                holdings,
                price,
                initial_cash: self.config.portfolio.initial_cash,
                message: format!("advise {kind} {shares} shares"),
            },
        )
        .map_err(|err| warn!(%err, "could not write decision snapshot"))
        .ok();

        Ok(Advice {
            action,
            kind,
            shares,
            price,
            value: evaluation.value,
            holdings,
            snapshot,
        })
    }
}
