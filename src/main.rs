use anyhow::Context;
use clap::Parser;
use crossbot::api::BinanceFuturesClient;
use crossbot::config::BotConfig;
use crossbot::engine::Engine;
use crossbot::execution::{PaperExchange, Reconciler};
use crossbot::notify::{LogNotifier, Notifier, TelegramNotifier};
use crossbot::strategy::{CrossoverStrategy, SignalStrategy};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "crossbot", about = "EMA crossover signal engine for futures instruments")]
struct Args {
    /// Base config file (default: config/crossbot.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Strategy profile under <config dir>/profiles/
    #[arg(long)]
    profile: Option<String>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let args = Args::parse();
    tracing::info!("🚀 Crossbot starting");

    let config = BotConfig::load(args.config.as_deref(), args.profile.as_deref())
        .context("Failed to load configuration")?;
    log_configuration(&config, args.profile.as_deref());

    let market = BinanceFuturesClient::new(
        config.binance.base_url.clone(),
        config.binance.requests_per_minute,
    )
    .context("Failed to create Binance client")?;
    let gateway = Arc::new(PaperExchange::new(market));
    let notifier = create_notifier(&config)?;

    let strategy = CrossoverStrategy::new(config.signal.clone());
    let reconciler = Reconciler::new(config.order.clone());
    let mut engine = Engine::new(
        gateway,
        notifier,
        Box::new(strategy),
        reconciler,
        &config.instruments,
        config.engine_settings(),
    );

    if args.once {
        let report = engine.run_cycle().await;
        tracing::info!(
            "Single cycle: {} evaluated, {} transitions, {} failed",
            report.evaluated,
            report.transitions,
            report.failures.len()
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("⚠️  Received Ctrl+C, finishing current instrument...");
        }
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("Press Ctrl+C to stop...");
    engine.run(shutdown_rx).await;

    tracing::info!("👋 Crossbot stopped");
    Ok(())
}

// ============================================================================
// Initialization Functions
// ============================================================================

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("crossbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn create_notifier(config: &BotConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.telegram {
        Some(telegram) if !telegram.bot_token.is_empty() && !telegram.chat_id.is_empty() => {
            let notifier =
                TelegramNotifier::new(telegram.bot_token.clone(), telegram.chat_id.clone())
                    .context("Failed to create Telegram notifier")?;
            tracing::info!("Telegram notifications enabled");
            Ok(Arc::new(notifier))
        }
        _ => {
            tracing::info!("Telegram not configured, notifications go to the log");
            Ok(Arc::new(LogNotifier))
        }
    }
}

fn log_configuration(config: &BotConfig, profile: Option<&str>) {
    let strategy = CrossoverStrategy::new(config.signal.clone());

    tracing::info!("📊 Configuration:");
    tracing::info!("  Profile: {}", profile.unwrap_or("(base)"));
    tracing::info!(
        "  EMA {}/{} on {} bars, confirmation window {}",
        config.signal.short_period,
        config.signal.long_period,
        config.interval,
        config.signal.confirmation_window
    );
    tracing::info!("  Closed bars required: {}", strategy.min_bars_required());
    tracing::info!("  Sizing: {:?}", config.order.sizing);
    tracing::info!("  Entries: {:?}, leverage {:?}", config.order.style, config.order.leverage);
    if let Some(secs) = config.flatten_threshold_secs {
        tracing::info!("  Flatten {}s before each {} boundary", secs, config.interval);
    }
    if let Some(pct) = config.signal.min_divergence_pct {
        tracing::info!("  Divergence gate: {}%", pct);
    }
    tracing::info!(
        "  Poll every {}s (backoff {}s)",
        config.poll_interval_secs,
        config.backoff_secs
    );
    tracing::info!("  Instruments: {}", config.instruments.len());
    for instrument in &config.instruments {
        tracing::info!("    - {}", instrument);
    }
}
