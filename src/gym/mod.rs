pub mod action;
pub mod env;
pub mod memory;
pub mod obs_state;

pub use action::TradeAction;
pub use env::{PortfolioEnvironment, TradeInfo};
pub use memory::{ExperienceReplayBuffer, LoadReport, Transition};
pub use obs_state::{validate_shape, State, StateBuilder};
