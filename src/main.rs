//! ticketrelay CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use std::sync::Arc;

use ticketrelay::analysis::Analyzer;
use ticketrelay::commands::CommandRouter;
use ticketrelay::config::Config;
use ticketrelay::dispatch::Dispatcher;
use ticketrelay::hooks::TracingObserver;
use ticketrelay::llm::LlmManager;
use ticketrelay::messaging::MessagingDyn;
use ticketrelay::messaging::discord::{DiscordFetcher, DiscordHandler, run_discord};
use ticketrelay::messaging::telegram::TelegramAdapter;
use ticketrelay::scheduler::{SchedulerDeps, TriggerScheduler, run_sweep_loop};
use ticketrelay::settings::ConfigStore;

#[derive(Parser)]
#[command(name = "ticketrelay")]
#[command(about = "Summarizes Discord tickets and chat with an LLM and relays them to Telegram")]
struct Cli {
    /// Path to config file (optional)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load().context("failed to load configuration from environment")?,
    };

    let _log_guard = ticketrelay::logging::init_tracing(&config.log_dir, cli.debug)?;
    tracing::info!(data_dir = %config.data_dir.display(), "configuration loaded");

    let store = Arc::new(
        ConfigStore::open(config.state_path())
            .await
            .context("failed to open persisted state")?,
    );

    let llm_manager = Arc::new(LlmManager::new(config.llm.clone()).context("failed to initialize LLM manager")?);
    let analyzer = Arc::new(Analyzer::new(llm_manager).context("failed to load prompt templates")?);

    let telegram = Arc::new(TelegramAdapter::new(&config.telegram_token));
    if let Err(error) = MessagingDyn::health_check(telegram.as_ref()).await {
        tracing::warn!(%error, "telegram health check failed; deliveries may fail");
    }

    let discord_http = Arc::new(serenity::http::Http::new(&config.discord_token));
    let fetcher = Arc::new(DiscordFetcher::new(discord_http));
    if let Err(error) = fetcher.health_check().await {
        tracing::warn!(%error, "discord health check failed; history fetches may fail");
    }

    let scheduler = TriggerScheduler::new(
        SchedulerDeps {
            store: store.clone(),
            fetcher,
            analyzer,
            dispatcher: Dispatcher::new(telegram.clone()),
            observer: Arc::new(TracingObserver),
        },
        config.scheduler,
    );
    let router = Arc::new(CommandRouter::new(
        store.clone(),
        scheduler.clone(),
        config.activation_secret.clone(),
    ));

    let sweep = tokio::spawn(run_sweep_loop(scheduler.clone()));
    let responder = {
        let telegram = telegram.clone();
        tokio::spawn(async move { telegram.run_chat_id_responder().await })
    };

    tracing::info!(
        installation_activated = store.installation_activated(),
        guilds = store.guilds().len(),
        "ticketrelay started"
    );

    let handler = DiscordHandler::new(scheduler.clone(), router);
    tokio::select! {
        result = run_discord(&config.discord_token, handler) => {
            if let Err(error) = result {
                tracing::error!(%error, "discord client exited");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    tracing::info!("shutting down...");
    scheduler.shutdown();
    responder.abort();
    if let Err(error) = sweep.await {
        tracing::warn!(%error, "sweep task ended abnormally");
    }
    if let Err(error) = MessagingDyn::shutdown(telegram.as_ref()).await {
        tracing::warn!(%error, "telegram shutdown failed");
    }

    tracing::info!("ticketrelay stopped");
    Ok(())
}
