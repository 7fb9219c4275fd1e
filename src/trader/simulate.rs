use enum_map::EnumMap;
use ndarray::s;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    agent::{train_from_buffer, PolicyModel},
    data::{MarketData, NewsItem},
    error::{Result, TraderError},
    gym::{PortfolioEnvironment, TradeAction, Transition},
    types::Holdings,
};

use super::cycle::DailyTrader;

/// Summary of a replay over the whole history
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub days: usize,
    pub initial_value: f64,
    pub final_value: f64,
    /// Percent, against the starting holdings valued at the last close
    pub total_return: f64,
    pub holdings: Holdings,
    pub action_counts: EnumMap<TradeAction, usize>,
    pub total_reward: f64,
    pub experiences: usize,
    pub trainings: usize,
}

impl<M: PolicyModel, R: Rng> DailyTrader<M, R> {
    /// Replays every bar as a trading day, starting from the configured initial holdings.
    ///
    /// Exploration decays with the day index under the simulation policy. Each day is traded
    /// at its open and scored at its close; the next state is the following day at its open
    /// and the last day is terminal. The buffer and model learn along the way, the
    /// portfolio and session files are not touched.
    pub fn simulate(&mut self, market: &MarketData) -> Result<SimulationReport> {
        market.ensure_sufficient(self.config.min_history_points)?;

        let full = market.prepare_full();
        let days = full.len();
        let last_close = full.latest_close().ok_or(TraderError::InsufficientData {
            required: self.config.min_history_points,
            available: 0,
        })?;

        let mut buffer = self.open_buffer()?;
        let builder = self.state_builder();
        let policy = self.config.simulation_policy;

        let start = Holdings::new(self.config.portfolio.initial_cash, self.config.portfolio.initial_shares);
        let mut env = PortfolioEnvironment::new(start);
        let mut action_counts = EnumMap::<TradeAction, usize>::default();
        let mut total_reward = 0.;
        let mut trainings = 0;

        info!(days, experiences = buffer.len(), "starting simulation");

        for day in 0..days {
            let open = full.opens[day];
            let close = full.closes[day];
            let done = day + 1 == days;

            let news = news_as_of(&full.news, days - 1 - day);
            let state = builder.build(
                full.features.slice(s![..=day, ..]),
                &full.mask[..=day],
                &full.fundamentals,
                &news,
                env.cash,
                env.shares,
                open,
            );

            let evaluation = self.model.evaluate_one(&state)?;
            let decision = policy.decide(evaluation.action, day, &mut self.rng);
            let (reward, trade) = env.execute_action(decision.action, open, close);
            action_counts[trade.kind] += 1;
            total_reward += reward;

            let next_day = (day + 1).min(days - 1);
            let next_news = news_as_of(&full.news, days - 1 - next_day);
            let next_state = builder.build(
                full.features.slice(s![..=next_day, ..]),
                &full.mask[..=next_day],
                &full.fundamentals,
                &next_news,
                env.cash,
                env.shares,
                full.opens[next_day],
            );

            buffer.add(Transition {
                state,
                action: decision.action,
                reward,
                next_state,
                done,
            });

            if train_from_buffer(&mut self.model, &mut buffer, &self.config.training, &mut self.rng)?.is_some() {
                trainings += 1;
            }

            debug!(
                day,
                action = decision.action,
                kind = %trade.kind,
                reward,
                value = trade.portfolio_value,
                "simulated day"
            );
        }

        buffer.save(&self.config.paths.buffer_file)?;

        let initial_value = start.value_with_price(last_close);
        let final_value = env.portfolio_value(last_close);
        let total_return = if initial_value > 0. {
            (final_value - initial_value) / initial_value * 100.
        } else {
            0.
        };

        let report = SimulationReport {
            days,
            initial_value,
            final_value,
            total_return,
            holdings: env.holdings(),
            action_counts,
            total_reward,
            experiences: buffer.len(),
            trainings,
        };
        info!(
            days,
            final_value,
            total_return,
            buys = report.action_counts[TradeAction::Buy],
            sells = report.action_counts[TradeAction::Sell],
            holds = report.action_counts[TradeAction::Hold],
            trainings,
            "simulation finished"
        );

        Ok(report)
    }
}

/// News re-dated to a day `offset` days before the newest bar. Items after that day are dropped.
fn news_as_of(news: &[NewsItem], offset: usize) -> Vec<NewsItem> {
    let offset = offset as i64;
    news.iter()
        .filter(|item| item.days_ago >= offset)
        .map(|item| NewsItem {
            days_ago: item.days_ago - offset,
            ..*item
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn news_is_redated_to_the_simulated_day() {
        let item = |days_ago| NewsItem {
            days_ago,
            overall_sentiment_score: 0.1,
            ticker_relevance_score: 0.2,
            ticker_sentiment_score: 0.3,
        };
        let news = vec![item(0), item(2), item(5)];

        let shifted = news_as_of(&news, 2);

        assert_eq!(
            shifted.iter().map(|n| n.days_ago).collect::<Vec<_>>(),
            vec![0, 3]
        );
        assert_eq!(news_as_of(&news, 0), news);
    }
}
