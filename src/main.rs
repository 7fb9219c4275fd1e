use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

use daily_rl_trader::{
    agent::LinearPolicy,
    constants::api::BIND_ADDRESS,
    data::MarketData,
    gym::{ExperienceReplayBuffer, TradeAction},
    history::{CycleStatus, SessionStore},
    server,
    status::StatusReport,
    trader::DailyTrader,
    utils::remove_if_exists,
    EngineConfig,
};

#[derive(Parser)]
#[command(name = "daily_rl_trader")]
#[command(about = "Once-a-day reinforcement learning trader for a single symbol", long_about = None)]
struct Cli {
    /// TOML config, every key optional
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the market data files
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run today's decision cycle
    Trade,
    /// Greedy recommendation at the latest close, nothing is traded
    Advise,
    /// Replay the whole history to warm up the buffer and model
    Simulate,
    Buffer {
        #[command(subcommand)]
        command: BufferCommand,
    },
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    Status,
    /// Serve decision snapshots over HTTP
    Serve {
        #[arg(short, long, default_value = BIND_ADDRESS)]
        bind: String,

        /// Defaults to the configured results directory
        #[arg(short, long)]
        root: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum BufferCommand {
    Info,
    Clear,
}

#[derive(Subcommand)]
enum SessionsCommand {
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    Today,
    Clear,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("daily_rl_trader=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = EngineConfig::load_or_default(cli.config.as_deref())
        .with_context(|| format!("failed to load config {:?}", cli.config))?;
    if let Some(data_dir) = cli.data_dir {
        config.paths.data_dir = data_dir;
    }
    let rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match cli.command {
        Commands::Trade => trade(config, rng),
        Commands::Advise => advise(config, rng),
        Commands::Simulate => simulate(config, rng),
        Commands::Buffer { command } => buffer(&config, command),
        Commands::Sessions { command } => sessions(&config, command),
        Commands::Status => {
            let report = StatusReport::collect(&config, Local::now())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Serve { bind, root } => {
            let root = root.unwrap_or_else(|| config.paths.results_dir.clone());
            server::serve(&bind, root).context("results server stopped")
        }
    }
}

fn trader(config: EngineConfig, rng: StdRng) -> Result<(DailyTrader<LinearPolicy, StdRng>, MarketData)> {
    let market = MarketData::load(&config.paths.data_dir)
        .with_context(|| format!("failed to load market data from {}", config.paths.data_dir.display()))?;
    let model = LinearPolicy::load_or_new(&config.paths.weights_file, config.shape)?;
    Ok((DailyTrader::new(config, model, rng), market))
}

fn trade(config: EngineConfig, rng: StdRng) -> Result<()> {
    let (mut trader, market) = trader(config, rng)?;
    let today = Local::now().date_naive();

    let outcome = match trader.run(&market, today) {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("{} {err}", "Trading cycle failed:".red());
            return Err(err.into());
        }
    };

    match outcome.status {
        CycleStatus::Traded => {
            trader.model().save(&trader.config.paths.weights_file)?;

            let action = outcome.decision.map_or(0., |d| d.action);
            let reward = format!("{:.4}", outcome.reward);
            println!(
                "{} {} {:.3} ({}), reward {}, portfolio ${:.2}, {} experiences",
                "Traded".green(),
                trader.config.symbol,
                action,
                TradeAction::from_value(action),
                if outcome.reward >= 0. { reward.green() } else { reward.red() },
                outcome.portfolio_value,
                outcome.buffer.len(),
            );
            if let Some(training) = outcome.training {
                println!(
                    "Trained on {} samples for {} epochs, actor loss {:.5}, critic loss {:.5}",
                    training.samples, training.epochs, training.actor_loss, training.critic_loss
                );
            }
        }
        status => println!(
            "{} portfolio ${:.2}, {} experiences",
            format!("{status}:").yellow(),
            outcome.portfolio_value,
            outcome.buffer.len()
        ),
    }

    Ok(())
}

fn advise(config: EngineConfig, rng: StdRng) -> Result<()> {
    let (mut trader, market) = trader(config, rng)?;
    let advice = trader.advise(&market)?;

    println!(
        "{} {} {} shares at ${:.2} (action {:.3}, value {:.4})",
        "Advice:".green(),
        advice.kind,
        advice.shares,
        advice.price,
        advice.action,
        advice.value
    );
    Ok(())
}

fn simulate(config: EngineConfig, rng: StdRng) -> Result<()> {
    let (mut trader, market) = trader(config, rng)?;
    let report = trader.simulate(&market)?;
    trader.model().save(&trader.config.paths.weights_file)?;

    let total_return = format!("{:.2}%", report.total_return);
    println!(
        "{} {} days, final value ${:.2}, return {}",
        "Simulation finished:".green(),
        report.days,
        report.final_value,
        if report.total_return >= 0. { total_return.green() } else { total_return.red() },
    );
    println!(
        "buy {} / sell {} / hold {}, {} experiences, {} training updates",
        report.action_counts[TradeAction::Buy],
        report.action_counts[TradeAction::Sell],
        report.action_counts[TradeAction::Hold],
        report.experiences,
        report.trainings
    );
    Ok(())
}

fn buffer(config: &EngineConfig, command: BufferCommand) -> Result<()> {
    let path = &config.paths.buffer_file;
    match command {
        BufferCommand::Info => {
            let (buffer, load) = ExperienceReplayBuffer::open(path, config.buffer_capacity, config.shape)?;
            println!("{} / {} experiences in {}", buffer.len(), buffer.capacity(), path.display());
            if load.dropped > 0 {
                println!("{}", format!("{} stored experiences no longer fit the state shape", load.dropped).yellow());
            }
            if let Some(last) = buffer.last() {
                println!("last action {:.3}, reward {:.4}", last.action, last.reward);
            }
        }
        BufferCommand::Clear => {
            if remove_if_exists(path)? {
                println!("{} {}", "Removed".green(), path.display());
            } else {
                println!("{}", "No replay buffer to remove".yellow());
            }
        }
    }
    Ok(())
}

fn sessions(config: &EngineConfig, command: SessionsCommand) -> Result<()> {
    let mut store = SessionStore::open(&config.paths.sessions_file)?;
    match command {
        SessionsCommand::History { limit } => {
            let skip = store.len().saturating_sub(limit);
            for session in store.iter().skip(skip) {
                println!(
                    "{}  action {:>6.3}  reward {:>8.4}  value ${:.2}",
                    session.date, session.action, session.reward, session.portfolio_value
                );
            }
            println!("{} sessions total", store.len());
        }
        SessionsCommand::Today => {
            let today = Local::now().date_naive();
            match store.get(today) {
                Some(session) => println!(
                    "{} action {:.3}, reward {:.4}, value ${:.2}",
                    "Already traded today:".yellow(),
                    session.action,
                    session.reward,
                    session.portfolio_value
                ),
                None => println!("{}", "Not traded yet today".green()),
            }
        }
        SessionsCommand::Clear => {
            if store.clear()? {
                println!("{}", "Trading history cleared".green());
            } else {
                println!("{}", "No trading history to clear".yellow());
            }
        }
    }
    Ok(())
}
