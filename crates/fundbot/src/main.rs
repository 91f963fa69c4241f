use anyhow::Result;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::time::sleep;

use fundbot::cli::{Cli, Commands};
use fundbot::telegram::{create_bot, schema, setup_bot_commands, start_notification_dispatcher, HandlerDeps};
use fundcore::core::logging::log_env_configuration;
use fundcore::core::{config, init_logger};
use fundcore::market::SourceMode;
use fundcore::report::{now_report, strip_html};
use fundcore::scheduler::UserJobs;
use fundcore::storage::create_pool;
use fundcore::{Exchange, MarketService};

/// Main entry point for the funding-rate bot
///
/// Parses CLI arguments and dispatches to appropriate subcommand.
///
/// # Errors
/// Returns an error if initialization fails (logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    // .env must be loaded before any config static is read
    let _ = dotenv();

    let cli = Cli::parse_args();

    std::panic::set_hook(Box::new(|panic_info| {
        log::error!("Panic caught: {:?}", panic_info);
        if let Some(location) = panic_info.location() {
            log::error!("Panic at {}:{}:{}", location.file(), location.line(), location.column());
        }
        if let Some(msg) = panic_info.payload().downcast_ref::<&str>() {
            log::error!("Panic message: {}", msg);
        }
    }));

    match cli.command {
        Some(Commands::CheckEnv) => run_check_env(),
        Some(Commands::Snapshot {
            exchanges,
            no_spot_filter,
        }) => run_snapshot(exchanges, !no_spot_filter).await,
        Some(Commands::Run) => {
            init_logger(&config::LOG_FILE_PATH)?;
            run_bot().await
        }
        None => {
            init_logger(&config::LOG_FILE_PATH)?;
            log::info!("No command specified, running bot in default mode");
            run_bot().await
        }
    }
}

/// Prints the state of the deployment variables; fails when one is missing.
fn run_check_env() -> Result<()> {
    let report = config::check_required_env();
    for (name, state) in &report.entries {
        match state {
            config::EnvVarState::Set => println!("✅ {}: set", name),
            config::EnvVarState::Defaulted(value) => println!("⚠️  {}: not set, default {:?}", name, value),
            config::EnvVarState::Missing => println!("❌ {}: NOT SET (required)", name),
        }
    }
    println!("Database: {}", *config::DATABASE_PATH);

    if report.is_ok() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Missing required variables: {}", report.missing().join(", ")))
    }
}

/// One-shot `/now` report on stdout, over REST.
async fn run_snapshot(names: Vec<String>, spot_filter: bool) -> Result<()> {
    let exchanges = if names.is_empty() {
        Exchange::all()
    } else {
        names
            .iter()
            .map(|name| Exchange::parse(name).ok_or_else(|| anyhow::anyhow!("Unknown exchange: {}", name)))
            .collect::<Result<Vec<_>>>()?
    };

    let market = MarketService::with_mode(SourceMode::Rest)?;
    let view = market.get_all_funding_rates(&exchanges, spot_filter).await;
    println!("{}", strip_html(&now_report(&view, spot_filter)));
    Ok(())
}

async fn run_bot() -> Result<()> {
    let bot_init_start = std::time::Instant::now();
    log::info!("Starting bot...");

    let env_report = config::check_required_env();
    log_env_configuration(&env_report);
    if !env_report.is_ok() {
        return Err(anyhow::anyhow!(
            "Missing required variables: {}",
            env_report.missing().join(", ")
        ));
    }

    fundcore::core::metrics::init_metrics();

    if *config::metrics::ENABLED {
        let metrics_port = *config::metrics::PORT;
        log::info!("Starting metrics server on port {}", metrics_port);

        tokio::spawn(async move {
            if let Err(e) = fundcore::core::metrics_server::start_metrics_server(metrics_port).await {
                log::error!("Metrics server error: {}", e);
            }
        });
    }

    let bot = create_bot()?;

    if let Err(e) = setup_bot_commands(&bot).await {
        log::error!("Failed to set bot commands: {}", e);
    } else {
        log::info!("Bot commands registered");
    }

    let db_pool = Arc::new(
        create_pool(&config::DATABASE_PATH).map_err(|e| anyhow::anyhow!("Failed to create database pool: {}", e))?,
    );
    let market = Arc::new(MarketService::from_env()?);

    let (jobs, notifications) = UserJobs::new(Arc::clone(&db_pool), Arc::clone(&market));
    let jobs = Arc::new(jobs);
    match jobs.restore_all() {
        Ok(count) => log::info!("Restored jobs for {} users", count),
        Err(e) => log::error!("Failed to restore jobs: {}", e),
    }

    start_notification_dispatcher(bot.clone(), Arc::clone(&db_pool), Arc::clone(&jobs), notifications);

    let handler = schema(HandlerDeps::new(db_pool, market, jobs));

    log::info!("================================================");
    log::info!("🎉 Bot initialization complete in {:.2}s", bot_init_start.elapsed().as_secs_f64());
    log::info!("📡 Ready to receive updates!");
    log::info!("================================================");

    let mut retry_count = 0;
    let max_retries = config::retry::MAX_DISPATCHER_RETRIES;

    // Run the dispatcher with retry logic
    loop {
        let bot_clone = bot.clone();
        let handler_clone = handler.clone();

        // Separate task so a panic surfaces through the JoinHandle
        let handle = tokio::spawn(async move {
            use teloxide::update_listeners::Polling;

            let listener = Polling::builder(bot_clone.clone()).drop_pending_updates().build();

            Dispatcher::builder(bot_clone, handler_clone)
                .dependencies(DependencyMap::new())
                .enable_ctrlc_handler()
                .build()
                .dispatch_with_listener(
                    listener,
                    LoggingErrorHandler::with_custom_text("An error from the update listener"),
                )
                .await
        });

        match handle.await {
            Ok(()) => {
                log::info!("Dispatcher shutdown gracefully");
                break;
            }
            Err(join_err) if join_err.is_panic() => {
                log::error!("Dispatcher panicked: {}", join_err);

                if retry_count < max_retries {
                    retry_count += 1;
                    log::info!(
                        "Retrying dispatcher connection after panic (attempt {}/{})...",
                        retry_count,
                        max_retries
                    );
                    exponential_backoff(retry_count).await;
                } else {
                    log::error!("Max retries reached after panic. Exiting...");
                    break;
                }
            }
            Err(join_err) => {
                log::warn!("Dispatcher task was cancelled: {}", join_err);
                break;
            }
        }

        sleep(config::retry::dispatcher_delay()).await;
    }

    Ok(())
}

/// Exponential backoff delay for retries
async fn exponential_backoff(retry_count: u32) {
    let delay = Duration::from_secs(config::retry::EXPONENTIAL_BACKOFF_BASE.pow(retry_count));
    sleep(delay).await;
}
