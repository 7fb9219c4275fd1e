pub mod portfolio;
pub mod sessions;

pub use portfolio::{CycleStatus, PortfolioSnapshot, PortfolioStore};
pub use sessions::{session_id, SessionStore, TradingSession};
