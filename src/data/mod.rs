pub mod historical;
pub mod indicators;

pub use historical::{DailyBar, MarketData, NewsItem, PreparedHistory};
