pub mod agent;
pub mod config;
pub mod constants;
pub mod data;
pub mod error;
pub mod gym;
pub mod history;
pub mod server;
pub mod status;
pub mod trader;
pub mod types;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::EngineConfig;
pub use error::{Result, TraderError};
