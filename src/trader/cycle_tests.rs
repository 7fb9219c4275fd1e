use std::{fs, path::Path};

use chrono::NaiveDate;
use rand::{rngs::StdRng, SeedableRng};

use super::*;
use crate::{
    config::PathsConfig,
    gym::TradeAction,
    test_support::{rising_market, small_shape, transition, FixedRng, StubModel},
    trader::read_snapshot,
};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()
}

fn config(dir: &Path) -> EngineConfig {
    EngineConfig {
        shape: small_shape(),
        paths: PathsConfig::rooted_at(dir),
        ..EngineConfig::default()
    }
}

fn seed_buffer(config: &EngineConfig, count: usize) {
    let mut buffer = ExperienceReplayBuffer::new(config.buffer_capacity, config.shape);
    for i in 0..count {
        buffer.add(transition(&config.shape, i as f32, false));
    }
    buffer.save(&config.paths.buffer_file).unwrap();
}

fn trader(config: EngineConfig, model: StubModel) -> DailyTrader<StubModel, FixedRng> {
    DailyTrader::new(config, model, FixedRng(u64::MAX))
}

fn stored_status(config: &EngineConfig) -> serde_json::Value {
    let raw = fs::read(&config.paths.portfolio_file).unwrap();
    serde_json::from_slice::<serde_json::Value>(&raw).unwrap()["status"].clone()
}

#[test]
fn first_run_of_the_day_trades_learns_and_records() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    seed_buffer(&config, 12);
    let mut trader = trader(config.clone(), StubModel::constant(0.6, 0.));

    let outcome = trader.run(&rising_market(80), today()).unwrap();

    // open 179, close 181: floor(0.6 * floor(1500 / 179)) = 4 shares
    let trade = outcome.trade.unwrap();
    assert_eq!(outcome.status, CycleStatus::Traded);
    assert_eq!(trade.kind, TradeAction::Buy);
    assert_eq!(trade.shares_traded, 4);
    assert_eq!(outcome.holdings, Holdings::new(1_500. - 4. * 179., 4));
    assert!((outcome.reward - (4. * 2. / 1_500. * 100. + 0.3)).abs() < 1e-9);
    assert_eq!(outcome.portfolio_value, 1_508.);
    assert_eq!(outcome.buffer.len(), 13);

    // 13 < 30 experiences gets the boosted schedule
    let training = outcome.training.unwrap();
    assert_eq!(training.samples, 13);
    assert_eq!(training.epochs, 30);
    assert_eq!(trader.model().updates.len(), 1);

    let sessions = SessionStore::open(&config.paths.sessions_file).unwrap();
    let session = sessions.get(today()).unwrap();
    assert_eq!(session.action, 0.6);
    assert_eq!(session.portfolio_value, 1_508.);

    assert_eq!(stored_status(&config), "traded");
    let (stored, _) = ExperienceReplayBuffer::open(&config.paths.buffer_file, 50, config.shape).unwrap();
    assert_eq!(stored.len(), 13);
    assert!(!stored.last().unwrap().done);

    let snapshot = read_snapshot(&config.snapshot_path()).unwrap().unwrap();
    assert_eq!(snapshot.total_capital, 1_508.);
    assert_eq!(snapshot.values_last30, vec![1_508.]);
}

#[test]
fn second_run_on_the_same_day_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    seed_buffer(&config, 12);
    let market = rising_market(80);
    let mut trader = trader(config.clone(), StubModel::constant(0.6, 0.));

    trader.run(&market, today()).unwrap();
    let again = trader.run(&market, today()).unwrap();

    assert_eq!(again.status, CycleStatus::NoTradeAlreadyCompleted);
    assert_eq!(again.reward, 0.);
    assert!(again.decision.is_none());
    assert_eq!(again.buffer.len(), 13);
    assert_eq!(again.holdings, Holdings::new(784., 4));
    assert_eq!(trader.model().updates.len(), 1);
    assert_eq!(stored_status(&config), "no_trade_today_already_completed");

    let next_day = today().succ_opt().unwrap();
    let tomorrow = trader.run(&market, next_day).unwrap();
    assert_eq!(tomorrow.status, CycleStatus::Traded);
    assert_eq!(tomorrow.buffer.len(), 14);
}

#[test]
fn short_history_fails_without_recording() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut trader = trader(config.clone(), StubModel::constant(0.6, 0.));

    let err = trader.run(&rising_market(49), today()).unwrap_err();

    assert!(matches!(
        err,
        TraderError::InsufficientData {
            required: 50,
            available: 49
        }
    ));
    assert!(!config.paths.sessions_file.exists());
    assert!(!config.paths.buffer_file.exists());
    assert_eq!(stored_status(&config), "failed");
}

#[test]
fn model_failure_keeps_the_prior_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    seed_buffer(&config, 12);
    let before = fs::read(&config.paths.buffer_file).unwrap();
    let mut trader = trader(config.clone(), StubModel::failing());

    let err = trader.run(&rising_market(80), today()).unwrap_err();

    assert!(matches!(err, TraderError::ModelEvaluation(_)));
    assert_eq!(fs::read(&config.paths.buffer_file).unwrap(), before);
    assert!(!SessionStore::open(&config.paths.sessions_file).unwrap().has_traded(today()));

    let failed = trader.portfolio_store().read_snapshot().unwrap().unwrap();
    assert_eq!(failed.status, CycleStatus::Failed);
    assert_eq!(failed.holdings(), Holdings::new(1_500., 0));
    assert!(failed.error.unwrap().contains("stub refused"));
}

#[test]
fn training_failure_keeps_the_prior_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    seed_buffer(&config, 12);
    let before = fs::read(&config.paths.buffer_file).unwrap();
    let model = StubModel {
        fail_update: true,
        ..StubModel::constant(0.6, 0.)
    };
    let mut trader = trader(config.clone(), model);

    let err = trader.run(&rising_market(80), today()).unwrap_err();

    assert!(matches!(err, TraderError::ModelTraining(_)));
    assert_eq!(fs::read(&config.paths.buffer_file).unwrap(), before);
    assert!(!SessionStore::open(&config.paths.sessions_file).unwrap().has_traded(today()));

    let failed = trader.portfolio_store().read_snapshot().unwrap().unwrap();
    assert_eq!(failed.status, CycleStatus::Failed);
    assert_eq!(failed.holdings(), Holdings::new(1_500., 0));
}

#[test]
fn session_write_failure_after_commit_keeps_the_traded_portfolio() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    // Missing while the sessions are read, unwritable once the buffer file exists
    config.paths.sessions_file = config.paths.buffer_file.join("sessions.json");
    let mut trader = trader(config.clone(), StubModel::constant(0.6, 0.));

    let err = trader.run(&rising_market(80), today()).unwrap_err();

    assert!(matches!(err, TraderError::Io { .. }));
    let stored = trader.portfolio_store().read_snapshot().unwrap().unwrap();
    assert_eq!(stored.status, CycleStatus::Traded);
    assert!(stored.holdings().shares > 0);
    assert!(stored.error.is_none());

    let (buffer, _) = ExperienceReplayBuffer::open(&config.paths.buffer_file, 50, config.shape).unwrap();
    assert_eq!(buffer.len(), 1);
}

#[test]
fn corrupt_session_file_aborts_the_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    fs::write(&config.paths.sessions_file, "{").unwrap();
    let mut trader = trader(config, StubModel::constant(0.6, 0.));

    let err = trader.run(&rising_market(80), today()).unwrap_err();

    assert!(matches!(err, TraderError::CorruptStore { .. }));
}

#[test]
fn simulation_replays_every_day_without_touching_the_portfolio() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut trader = DailyTrader::new(config.clone(), StubModel::constant(0.6, 0.), StdRng::seed_from_u64(3));

    let report = trader.simulate(&rising_market(60)).unwrap();

    assert_eq!(report.days, 60);
    // 0.7 * 0.6 + 0.3 * noise never leaves the buy side
    assert_eq!(report.action_counts[TradeAction::Buy], 60);
    assert_eq!(report.experiences, 50);
    // training starts once 10 experiences are stored
    assert_eq!(report.trainings, 51);
    assert_eq!(report.initial_value, 1_500.);
    assert!(report.total_return > 0.);

    let (stored, _) = ExperienceReplayBuffer::open(&config.paths.buffer_file, 50, config.shape).unwrap();
    assert_eq!(stored.len(), 50);
    assert!(stored.last().unwrap().done);
    assert_eq!(stored.iter().filter(|t| t.done).count(), 1);

    assert!(!config.paths.portfolio_file.exists());
    assert!(!config.paths.sessions_file.exists());
}

#[test]
fn advisory_publishes_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut trader = trader(config.clone(), StubModel::constant(3.0, 2.5));

    let advice = trader.advise(&rising_market(80)).unwrap();

    assert_eq!(advice.action, 1.);
    assert_eq!(advice.kind, TradeAction::Buy);
    // floor(1500 / 181) at the latest close
    assert_eq!(advice.shares, 8);
    assert_eq!(advice.price, 181.);
    assert!(trader.model().updates.is_empty());

    let snapshot = advice.snapshot.unwrap();
    assert_eq!(snapshot.status, CycleStatus::Advisory);
    assert_eq!(snapshot.last_reward, 0.);
    assert_eq!(snapshot.values_last30, vec![1_500.]);

    assert!(!config.paths.buffer_file.exists());
    assert!(!config.paths.sessions_file.exists());
    assert!(!config.paths.portfolio_file.exists());
}
