use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use crate::{
    config::EngineConfig,
    error::Result,
    gym::ExperienceReplayBuffer,
    history::{PortfolioStore, SessionStore, TradingSession},
};

#[derive(Debug, Clone, Serialize)]
pub struct SessionsStatus {
    pub total: usize,
    pub traded_today: bool,
    pub traded_yesterday: bool,
    pub latest: Option<TradingSession>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BufferStatus {
    pub experiences: usize,
    pub capacity: usize,
    pub dropped_on_load: usize,
    pub last_action: Option<f64>,
    pub last_reward: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortfolioStatus {
    pub last_update: Option<DateTime<Local>>,
    pub hours_since_update: Option<f64>,
    pub total_value: Option<f64>,
    pub cash: f64,
    pub shares: u64,
}

/// Read-only view over the persisted state, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub symbol: String,
    pub generated_at: DateTime<Local>,
    pub sessions: SessionsStatus,
    pub buffer: BufferStatus,
    pub portfolio: PortfolioStatus,
}

impl StatusReport {
    pub fn collect(config: &EngineConfig, now: DateTime<Local>) -> Result<Self> {
        let today = now.date_naive();
        let sessions = SessionStore::open(&config.paths.sessions_file)?;
        let (buffer, load) =
            ExperienceReplayBuffer::open(&config.paths.buffer_file, config.buffer_capacity, config.shape)?;
        let store = PortfolioStore::new(&config.paths.portfolio_file, config.portfolio);
        let snapshot = store.read_snapshot()?;
        let holdings = store.load()?;

        let last = buffer.last();
        Ok(Self {
            symbol: config.symbol.clone(),
            generated_at: now,
            sessions: SessionsStatus {
                total: sessions.len(),
                traded_today: sessions.has_traded(today),
                traded_yesterday: today
                    .pred_opt()
                    .is_some_and(|yesterday: NaiveDate| sessions.has_traded(yesterday)),
                latest: sessions.latest().cloned(),
            },
            buffer: BufferStatus {
                experiences: buffer.len(),
                capacity: buffer.capacity(),
                dropped_on_load: load.dropped,
                last_action: last.map(|t| t.action),
                last_reward: last.map(|t| t.reward),
            },
            portfolio: PortfolioStatus {
                last_update: snapshot.as_ref().map(|s| s.timestamp),
                hours_since_update: snapshot
                    .as_ref()
                    .map(|s| (now - s.timestamp).num_seconds() as f64 / 3_600.),
                total_value: snapshot.as_ref().map(|s| s.total_value),
                cash: holdings.cash,
                shares: holdings.shares,
            },
        })
    }
}
