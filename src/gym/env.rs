use serde::{Deserialize, Serialize};

use crate::types::Holdings;

use super::action::{TradeAction, DEAD_ZONE};

/// What one `execute_action` call did to the portfolio and how its reward was made up
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeInfo {
    pub action: f64,
    pub kind: TradeAction,
    pub shares_traded: u64,
    pub pre_cash: f64,
    pub pre_shares: u64,
    pub cash: f64,
    pub shares: u64,
    pub value_open: f64,
    pub baseline_value: f64,
    pub portfolio_value: f64,
    pub base_reward: f64,
    pub risk_bonus: f64,
    pub hold_penalty: f64,
    pub reward: f64,
}

/// Single-symbol portfolio simulation. Built fresh each cycle from the persisted holdings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioEnvironment {
    pub cash: f64,
    pub shares: u64,
}

impl PortfolioEnvironment {
    pub const RISK_BONUS_SCALE: f64 = 0.5;
    pub const HOLD_PENALTY: f64 = 0.1;

    pub fn new(holdings: Holdings) -> Self {
        Self {
            cash: holdings.cash,
            shares: holdings.shares,
        }
    }

    pub fn holdings(&self) -> Holdings {
        Holdings::new(self.cash, self.shares)
    }

    pub fn portfolio_value(&self, price: f64) -> f64 {
        self.cash + self.shares as f64 * price
    }

    /// Trades at `open_price` and scores the result at `close_price`.
    ///
    /// The base reward is the percent difference between the post-trade value at close
    /// and the value the pre-trade holdings would have had at close. A zero baseline
    /// scores zero instead of dividing.
    pub fn execute_action(&mut self, action: f64, open_price: f64, close_price: f64) -> (f64, TradeInfo) {
        let pre_cash = self.cash;
        let pre_shares = self.shares;
        let value_open = self.portfolio_value(open_price);
        let baseline_value = self.portfolio_value(close_price);

        let kind = TradeAction::from_value(action);
        let shares_traded = match kind {
            TradeAction::Buy => {
                let affordable = self.affordable_shares(open_price);
                let shares = ((action * affordable as f64).floor() as u64).min(affordable);

                self.cash -= shares as f64 * open_price;
                self.shares += shares;
                shares
            }
            TradeAction::Sell => {
                let sellable = self.shares;
                let shares = ((action.abs() * sellable as f64).floor() as u64).min(sellable);

                self.cash += shares as f64 * open_price;
                self.shares -= shares;
                shares
            }
            TradeAction::Hold => 0,
        };

        let portfolio_value = self.portfolio_value(close_price);
        let base_reward = if baseline_value == 0. || !baseline_value.is_finite() {
            0.
        } else {
            (portfolio_value - baseline_value) / baseline_value * 100.
        };

        // Shaping is keyed on the action, so a buy signal with no affordable shares still earns the bonus
        let (risk_bonus, hold_penalty) = if action.abs() > DEAD_ZONE {
            (action.abs() * Self::RISK_BONUS_SCALE, 0.)
        } else {
            (0., Self::HOLD_PENALTY)
        };
        let reward = base_reward + risk_bonus - hold_penalty;

        let info = TradeInfo {
            action,
            kind,
            shares_traded,
            pre_cash,
            pre_shares,
            cash: self.cash,
            shares: self.shares,
            value_open,
            baseline_value,
            portfolio_value,
            base_reward,
            risk_bonus,
            hold_penalty,
            reward,
        };

        (reward, info)
    }

    fn affordable_shares(&self, open_price: f64) -> u64 {
        if open_price <= 0. || !open_price.is_finite() || self.cash <= 0. {
            return 0;
        }

        (self.cash / open_price).floor() as u64
    }
}
