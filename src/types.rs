use serde::{Deserialize, Serialize};

/// A list of values, where the last index is the most recent
pub type Data = Vec<f64>;

/// Cash and whole shares held for the traded symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Holdings {
    pub cash: f64,
    pub shares: u64,
}

impl Holdings {
    pub fn new(cash: f64, shares: u64) -> Self {
        Self { cash, shares }
    }

    pub fn value_with_price(&self, price: f64) -> f64 {
        self.cash + self.shares as f64 * price
    }
}
