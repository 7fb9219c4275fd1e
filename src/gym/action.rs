use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-width of the band around zero where no trade is made
pub const DEAD_ZONE: f64 = 0.1;

#[derive(Clone, Copy, enum_map::Enum, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn from_value(action: f64) -> Self {
        if action > DEAD_ZONE {
            TradeAction::Buy
        } else if action < -DEAD_ZONE {
            TradeAction::Sell
        } else {
            TradeAction::Hold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Hold => "hold",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
