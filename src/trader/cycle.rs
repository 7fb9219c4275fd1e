use chrono::NaiveDate;
use rand::Rng;
use tracing::{error, info, warn};

use crate::{
    agent::{train_from_buffer, Decision, PolicyModel, TrainingSummary},
    config::EngineConfig,
    data::{MarketData, PreparedHistory},
    error::{Result, TraderError},
    gym::{ExperienceReplayBuffer, PortfolioEnvironment, State, StateBuilder, TradeInfo, Transition},
    history::{CycleStatus, PortfolioSnapshot, PortfolioStore, SessionStore},
    types::Holdings,
};

use super::snapshot::{write_snapshot, SnapshotInput};

/// Result of one `run`
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub status: CycleStatus,
    pub portfolio_value: f64,
    pub reward: f64,
    pub holdings: Holdings,
    pub decision: Option<Decision>,
    pub trade: Option<TradeInfo>,
    pub training: Option<TrainingSummary>,
    pub buffer: ExperienceReplayBuffer,
}

/// Runs the once-per-day decision cycle against the files named in the config.
pub struct DailyTrader<M, R> {
    pub config: EngineConfig,
    pub model: M,
    pub rng: R,
}

impl<M: PolicyModel, R: Rng> DailyTrader<M, R> {
    pub fn new(config: EngineConfig, model: M, rng: R) -> Self {
        Self { config, model, rng }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub(super) fn portfolio_store(&self) -> PortfolioStore {
        PortfolioStore::new(&self.config.paths.portfolio_file, self.config.portfolio)
    }

    pub(super) fn state_builder(&self) -> StateBuilder {
        StateBuilder::new(self.config.shape)
    }

    pub(super) fn open_buffer(&self) -> Result<ExperienceReplayBuffer> {
        let (buffer, _) = ExperienceReplayBuffer::open(
            &self.config.paths.buffer_file,
            self.config.buffer_capacity,
            self.config.shape,
        )?;
        Ok(buffer)
    }

    /// One decision for `today`.
    ///
    /// A day that already has a session is skipped with reward 0. A failure before the new
    /// holdings are saved marks the portfolio file as failed with the prior holdings, and a
    /// failure before the buffer is saved also leaves the buffer untouched, so a retry on the
    /// same day is still possible. Once the traded holdings are saved the portfolio file is
    /// left as is: a failure to record the session then surfaces as an error while the
    /// buffer and portfolio already reflect the trade.
    pub fn run(&mut self, market: &MarketData, today: NaiveDate) -> Result<CycleOutcome> {
        let mut committed = false;
        let result = self.try_run(market, today, &mut committed);

        if let Err(err) = &result {
            error!(%err, date = %today, committed, "trading cycle failed");
            if !committed {
                self.persist_failure(market, err);
            }
        }
        result
    }

    fn try_run(&mut self, market: &MarketData, today: NaiveDate, committed: &mut bool) -> Result<CycleOutcome> {
        let mut sessions = SessionStore::open(&self.config.paths.sessions_file)?;
        if sessions.has_traded(today) {
            return self.already_traded(market, today);
        }

        let portfolio = self.portfolio_store();
        let holdings = portfolio.load()?;
        market.ensure_sufficient(self.config.min_history_points)?;

        let mut buffer = self.open_buffer()?;
        let prepared = market.prepare(&self.config.shape);
        let (open, close) = latest_prices(&prepared)?;

        info!(
            open,
            cash = holdings.cash,
            shares = holdings.shares,
            experiences = buffer.len(),
            "starting trading decision"
        );

        let builder = self.state_builder();
        let state = build_state(&builder, &prepared, holdings, open);
        let evaluation = self.model.evaluate_one(&state)?;
        let decision = self
            .config
            .live_policy
            .decide(evaluation.action, buffer.len(), &mut self.rng);

        let mut env = PortfolioEnvironment::new(holdings);
        let (reward, trade) = env.execute_action(decision.action, open, close);
        let next_state = build_state(&builder, &prepared, env.holdings(), close);

        buffer.add(Transition {
            state,
            action: decision.action,
            reward,
            next_state,
            done: false,
        });

        let training = train_from_buffer(
            &mut self.model,
            &mut buffer,
            &self.config.training,
            &mut self.rng,
        )?;
        buffer.save(&self.config.paths.buffer_file)?;

        let after = env.holdings();
        portfolio.save(&PortfolioSnapshot::new(after, close, CycleStatus::Traded))?;
        *committed = true;
        sessions.record(today, decision.action, reward, trade.portfolio_value)?;

        info!(
            action = decision.action,
            kind = %trade.kind,
            shares_traded = trade.shares_traded,
            close,
            reward,
            risk_bonus = trade.risk_bonus,
            portfolio_value = trade.portfolio_value,
            experiences = buffer.len(),
            "trading session recorded"
        );

        self.write_decision_snapshot(SnapshotInput {
            ticker: &self.config.symbol,
            status: CycleStatus::Traded,
            action: decision.action,
            reward,
            holdings: after,
            price: close,
            initial_cash: self.config.portfolio.initial_cash,
            message: format!("{} {} shares", trade.kind, trade.shares_traded),
        });

        Ok(CycleOutcome {
            status: CycleStatus::Traded,
            portfolio_value: trade.portfolio_value,
            reward,
            holdings: after,
            decision: Some(decision),
            trade: Some(trade),
            training,
            buffer,
        })
    }

    fn already_traded(&self, market: &MarketData, today: NaiveDate) -> Result<CycleOutcome> {
        let holdings = self.portfolio_store().load()?;
        let price = market
            .bars
            .last()
            .map(|bar| bar.close)
            .ok_or(TraderError::InsufficientData {
                required: self.config.min_history_points,
                available: 0,
            })?;

        let snapshot = PortfolioSnapshot::new(holdings, price, CycleStatus::NoTradeAlreadyCompleted);
        self.portfolio_store().save(&snapshot)?;

        let buffer = self.open_buffer().unwrap_or_else(|err| {
            warn!(%err, "could not read replay buffer for reporting");
            ExperienceReplayBuffer::new(self.config.buffer_capacity, self.config.shape)
        });

        warn!(
            date = %today,
            experiences = buffer.len(),
            portfolio_value = snapshot.total_value,
            "already traded today, skipping to prevent duplicate experiences"
        );

        Ok(CycleOutcome {
            status: CycleStatus::NoTradeAlreadyCompleted,
            portfolio_value: snapshot.total_value,
            reward: 0.,
            holdings,
            decision: None,
            trade: None,
            training: None,
            buffer,
        })
    }

    fn persist_failure(&self, market: &MarketData, err: &TraderError) {
        let store = self.portfolio_store();
        let holdings = match store.load() {
            Ok(holdings) => holdings,
            Err(load_err) => {
                warn!(%load_err, "leaving portfolio file untouched after failure");
                return;
            }
        };
        let price = market.bars.last().map_or(0., |bar| bar.close);

        if let Err(save_err) = store.save(&PortfolioSnapshot::failed(holdings, price, err)) {
            warn!(%save_err, "could not record failed cycle");
        }
    }

    pub(super) fn write_decision_snapshot(&self, input: SnapshotInput) {
        let path = self.config.snapshot_path();
        if let Err(err) = write_snapshot(&path, input) {
            warn!(%err, path = %path.display(), "could not write decision snapshot");
        }
    }
}

pub(super) fn latest_prices(prepared: &PreparedHistory) -> Result<(f64, f64)> {
    match (prepared.latest_open(), prepared.latest_close()) {
        (Some(open), Some(close)) => Ok((open, close)),
        _ => Err(TraderError::InsufficientData {
            required: 1,
            available: 0,
        }),
    }
}

pub(super) fn build_state(builder: &StateBuilder, prepared: &PreparedHistory, holdings: Holdings, price: f64) -> State {
    builder.build(
        prepared.features.view(),
        &prepared.mask,
        &prepared.fundamentals,
        &prepared.news,
        holdings.cash,
        holdings.shares,
        price,
    )
}

#[cfg(test)]
#[path = "cycle_tests.rs"]
mod tests;
