//! Listing sniper
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires sessions, buyers, hunters and the coordinator together, and
//! runs the monitor until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use listing_sniper::config::AppConfig;
use listing_sniper::engine::buyer::PURCHASE_DELAY;
use listing_sniper::engine::{Buyer, Hunter, Monitor, PurchaseCoordinator};
use listing_sniper::notify::telegram::TelegramSink;
use listing_sniper::notify::{LogSink, MessageSink, NotificationChannel, Notifier, QUEUE_PACING};
use listing_sniper::platforms::paper::PaperSession;
use listing_sniper::platforms::AccountSession;
use listing_sniper::status;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    info!(
        config = %config_path,
        hunters = cfg.accounts.hunters.len(),
        buyers = cfg.accounts.buyers.len(),
        criteria = cfg.purchase.criteria.len(),
        "Listing sniper starting up"
    );

    // -- Sessions --------------------------------------------------------

    // One session per distinct account name; hunters and buyers may share.
    let mut sessions: HashMap<String, Arc<dyn AccountSession>> = HashMap::new();
    for name in cfg.accounts.hunters.iter().chain(&cfg.accounts.buyers) {
        sessions.entry(name.clone()).or_insert_with(|| {
            let paper: Arc<dyn AccountSession> = Arc::new(PaperSession::new(
                name.clone(),
                &cfg.accounts.catalogue,
                cfg.accounts.starting_balance,
            ));
            paper
        });
    }

    let session = |name: &str| -> Result<Arc<dyn AccountSession>> {
        sessions
            .get(name)
            .cloned()
            .with_context(|| format!("No session for account {name}"))
    };

    // -- Components ------------------------------------------------------

    let notifier = Notifier::spawn(build_sink(&cfg), QUEUE_PACING);
    let channel: Arc<dyn NotificationChannel> = notifier.clone();

    let mut buyers = Vec::with_capacity(cfg.accounts.buyers.len());
    for (i, name) in cfg.accounts.buyers.iter().enumerate() {
        let buyer = Buyer::new(i, session(name)?, &cfg.accounts.targets, PURCHASE_DELAY)?;
        buyers.push(Arc::new(buyer));
    }

    let mut hunters = Vec::with_capacity(cfg.accounts.hunters.len());
    for (i, name) in cfg.accounts.hunters.iter().enumerate() {
        hunters.push(Arc::new(Hunter::new(i, session(name)?)));
    }

    let coordinator = Arc::new(PurchaseCoordinator::new(
        buyers,
        cfg.coordinator_config()?,
        channel.clone(),
    ));
    let monitor = Monitor::new(hunters, coordinator, channel, cfg.monitor_config());

    monitor.initialize().await?;
    monitor.start().await;

    let status_server = if cfg.status.enabled {
        Some(status::spawn_status_server(monitor.clone(), cfg.status.port).await?)
    } else {
        None
    };

    info!("Monitoring. Press Ctrl+C to stop.");
    wait_for_shutdown().await;
    info!("Shutdown signal received.");

    monitor.stop().await;
    if let Some(server) = status_server {
        server.abort();
    }
    notifier.shutdown();

    let stats = monitor.stats().await;
    info!(
        total_checks = stats.total_checks,
        processed = stats.processed_listings,
        balance = stats.total_balance,
        "Listing sniper shut down cleanly."
    );

    Ok(())
}

/// Telegram when both env vars resolve, the log otherwise.
fn build_sink(cfg: &AppConfig) -> Box<dyn MessageSink> {
    let (Some(token_env), Some(chat_env)) = (
        cfg.alerts.telegram_bot_token_env.as_deref(),
        cfg.alerts.telegram_chat_id_env.as_deref(),
    ) else {
        info!("No Telegram alerts configured, notifications go to the log");
        return Box::new(LogSink);
    };

    match TelegramSink::from_env(token_env, chat_env) {
        Ok(sink) => {
            info!("Telegram notifications enabled");
            Box::new(sink)
        }
        Err(e) => {
            warn!(error = %e, "Telegram unavailable, notifications go to the log");
            Box::new(LogSink)
        }
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("listing_sniper=info"));

    let json_logging = std::env::var("SNIPER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
