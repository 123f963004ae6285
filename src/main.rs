use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;
use trendbot::backtest::{run_batch, BatchReport, MarketScenario, SyntheticDataGenerator};
use trendbot::execution::{CandleWatcher, LiveEngine, LivePosition, ReplayFeed};
use trendbot::strategy::{FilterMode, PullbackParams, RiskProfile, StructureVariant};
use trendbot::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "trendbot", about = "Trend pullback and range re-entry signal engine")]
struct Cli {
    /// TOML configuration file (defaults to ./trendbot.toml when present)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Batch run over a synthetic scenario
    Backtest {
        #[command(flatten)]
        data: DataArgs,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Feed a synthetic scenario bar by bar through the live engine
    Replay {
        #[command(flatten)]
        data: DataArgs,
        /// Poll period of the candle watcher
        #[arg(long, default_value_t = 5)]
        poll_ms: u64,
    },
}

#[derive(clap::Args, Debug)]
struct DataArgs {
    #[arg(long, default_value = "pullbacks")]
    scenario: MarketScenario,
    #[arg(long, default_value_t = 2000)]
    bars: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,
    /// Pullback filter preset (none | light | pro)
    #[arg(long)]
    filter: Option<FilterMode>,
    /// Pullback risk preset (loose | moderate | strict)
    #[arg(long)]
    risk: Option<RiskProfile>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VariantArg {
    Pullback,
    RangeBreak,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Backtest { data, json } => run_backtest(config, data, json),
        Command::Replay { data, poll_ms } => run_replay(config, data, poll_ms).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("trendbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Apply command-line overrides on top of the loaded configuration
fn apply_overrides(mut config: AppConfig, data: &DataArgs) -> anyhow::Result<AppConfig> {
    if let Some(variant) = data.variant {
        config.params.variant = match variant {
            VariantArg::Pullback => StructureVariant::Pullback,
            VariantArg::RangeBreak => StructureVariant::RangeBreak,
        };
    }
    if data.filter.is_some() || data.risk.is_some() {
        config.params.pullback = PullbackParams::preset(
            data.filter.unwrap_or(FilterMode::Light),
            data.risk.unwrap_or(RiskProfile::Moderate),
        );
    }
    config.validate().context("invalid parameters")?;
    Ok(config)
}

fn run_backtest(config: AppConfig, data: DataArgs, json: bool) -> anyhow::Result<()> {
    let config = apply_overrides(config, &data)?;
    let bars = SyntheticDataGenerator::new(data.seed).generate(data.scenario, data.bars, config.live.interval);

    let report = run_batch(&bars, &config.params).context("batch run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&data, &report);
    }
    Ok(())
}

fn print_report(data: &DataArgs, report: &BatchReport) {
    let s = &report.summary;
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║               TRENDBOT BATCH REPORT                   ║");
    println!("╚═══════════════════════════════════════════════════════╝");
    println!("Scenario:        {:?} ({} bars, seed {})", data.scenario, data.bars, data.seed);
    println!("Signals:         {}", report.signals.len());
    println!("Trades:          {}", s.total_trades);
    println!(
        "Outcomes:        {} win / {} loss / {} breakeven / {} timeout",
        s.wins, s.losses, s.breakevens, s.timeouts
    );
    println!("Win rate:        {:.1}%", s.win_rate);
    println!("Expectancy:      {:+.3}R", s.expectancy_r);
    println!("Total:           {:+.2}R", s.total_r);
    println!("Profit factor:   {:.2}", s.profit_factor);
    println!("Max drawdown:    {:.2}R", s.max_drawdown_r);

    if !report.trades.is_empty() {
        println!("\n{:<22} {:>6} {:>10} {:>10} {:>10} {:>8}", "Entry", "Side", "Price", "Exit", "Outcome", "R");
        println!("{}", "─".repeat(72));
        for trade in &report.trades {
            println!(
                "{:<22} {:>6} {:>10.4} {:>10.4} {:>10} {:>+8.2}",
                trade.signal.time.format("%Y-%m-%d %H:%M"),
                trade.signal.side.to_string(),
                trade.signal.entry_price,
                trade.exit_price,
                format!("{:?}", trade.outcome),
                trade.r_multiple
            );
        }
    }
    println!();
}

async fn run_replay(config: AppConfig, data: DataArgs, poll_ms: u64) -> anyhow::Result<()> {
    let config = apply_overrides(config, &data)?;
    let instrument = config.live.instrument.clone();
    let interval = config.live.interval;

    let bars = SyntheticDataGenerator::new(data.seed).generate(data.scenario, data.bars, interval);
    let feed = Arc::new(ReplayFeed::new(instrument.clone(), interval, bars));

    let engine = LiveEngine::new(instrument.clone(), interval, config.params.clone(), feed.clone())?;
    let engine = Arc::new(Mutex::new(engine));

    let watcher = CandleWatcher::new(
        engine.clone(),
        feed.clone(),
        instrument.clone(),
        interval,
        Duration::from_millis(poll_ms.max(1)),
    );
    let stop = watcher.stop_handle();
    let mut task = tokio::spawn(watcher.run());

    tracing::info!("🔄 Replaying {} bars of {} {}", feed.bars().len(), instrument, interval);
    tracing::info!("Press Ctrl+C to stop...");

    let drained = async {
        while feed.remaining() > 0 {
            tokio::time::sleep(Duration::from_millis(poll_ms.max(1))).await;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("⚠️  Received Ctrl+C, shutting down...");
        }
        _ = drained => {
            tracing::info!("Replay feed exhausted");
        }
        result = &mut task => {
            tracing::error!("Candle watcher exited early: {:?}", result);
            return Ok(());
        }
    }

    stop.stop();
    let stats = task.await.context("candle watcher panicked")?;

    let engine = engine
        .lock()
        .map_err(|e| anyhow::anyhow!("live engine lock poisoned: {}", e))?;
    print_positions(engine.closed_positions(), engine.open_position());
    tracing::info!(
        "👋 Replay finished: {} bars delivered, {} duplicates, {} errors",
        stats.delivered,
        stats.duplicates,
        stats.errors
    );
    Ok(())
}

fn print_positions(closed: &[LivePosition], open: Option<&LivePosition>) {
    let total_r: f64 = closed.iter().filter_map(|p| p.r_multiple).sum();

    println!("\n{:<22} {:>6} {:>10} {:>10} {:>12} {:>8}", "Opened", "Side", "Entry", "Close", "Reason", "R");
    println!("{}", "─".repeat(74));
    for position in closed {
        println!(
            "{:<22} {:>6} {:>10.4} {:>10.4} {:>12} {:>+8.2}",
            position.opened_at.format("%Y-%m-%d %H:%M"),
            position.side().to_string(),
            position.entry_price(),
            position.close_price.unwrap_or_default(),
            position.exit_reason.map(|r| format!("{:?}", r)).unwrap_or_default(),
            position.r_multiple.unwrap_or_default()
        );
    }
    if let Some(position) = open {
        println!(
            "{:<22} {:>6} {:>10.4} {:>10} {:>12} {:>8}",
            position.opened_at.format("%Y-%m-%d %H:%M"),
            position.side().to_string(),
            position.entry_price(),
            "-",
            "open",
            "-"
        );
    }
    println!("\nClosed positions: {}  Total: {:+.2}R\n", closed.len(), total_r);
}
