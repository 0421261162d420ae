use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use mailgram::chat::commands::{CommandContext, spawn_command_listener};
use mailgram::chat::{ChatSink, TelegramSink};
use mailgram::clock::{Clock, SystemClock};
use mailgram::config::RelayConfig;
use mailgram::dedup::DedupStore;
use mailgram::health::{HealthState, spawn_health_server};
use mailgram::mail::imap::{ImapCredentials, ImapTransport};
use mailgram::pause::PauseController;
use mailgram::relay::{
    Account, AccountPoller, Dispatcher, MessageFormatter, Relay, RenderMode, SourceRef,
    spawn_relay,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().map_err(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID and at least");
        eprintln!("  one MAILGRAM_ACCOUNT_1_NAME / _IMAP_HOST / _USERNAME / _PASSWORD set.");
        anyhow::anyhow!("invalid configuration")
    })?;

    eprintln!("📬 mailgram v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Accounts: {}", config.accounts.len());
    eprintln!("   Poll interval: {}s", config.poll_interval.as_secs());
    eprintln!(
        "   Pause window: {}h",
        config.pause_duration.num_hours()
    );
    eprintln!("   Display TZ: {}", config.display_tz);
    eprintln!("   Health: http://0.0.0.0:{}/healthz\n", config.health_port);

    // ── Transports ───────────────────────────────────────────────────────
    let mut credentials = HashMap::new();
    let mut accounts = Vec::new();
    for acct in &config.accounts {
        credentials.insert(
            acct.name.clone(),
            ImapCredentials {
                host: acct.imap_host.clone(),
                port: acct.imap_port,
                username: acct.username.clone(),
                password: acct.password.clone(),
            },
        );
        accounts.push(Account::new(
            acct.name.clone(),
            SourceRef(acct.name.clone()),
            acct.query.clone(),
        ));
    }
    let transport = Arc::new(ImapTransport::new(credentials));

    let telegram = Arc::new(TelegramSink::new(
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
    ));

    // No chat destination means nowhere to even report failures — abort.
    telegram.health_check().await.map_err(|e| {
        eprintln!("Error: Telegram bot token rejected: {e}");
        anyhow::anyhow!("chat sink unavailable")
    })?;

    let sink: Arc<dyn ChatSink> = telegram;

    // ── Shared state ─────────────────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dedup = Arc::new(DedupStore::new());
    let pause = Arc::new(PauseController::new(config.pause_duration));

    // ── Engine ───────────────────────────────────────────────────────────
    let formatter = MessageFormatter::new(config.display_tz);
    let dispatcher = Dispatcher::new(
        Arc::clone(&sink),
        formatter,
        Arc::clone(&pause),
        Arc::clone(&clock),
    );
    let poller = AccountPoller::new(
        transport,
        Arc::clone(&dedup),
        Arc::clone(&pause),
        dispatcher,
        Arc::clone(&clock),
    );
    let relay = Arc::new(Relay::new(
        poller,
        Arc::clone(&pause),
        Arc::clone(&sink),
        Arc::clone(&clock),
        config.poll_interval,
    ));

    // ── Background tasks ─────────────────────────────────────────────────
    let health_state = Arc::new(HealthState {
        started_at: clock.now(),
        accounts: accounts.len(),
        dedup: Arc::clone(&dedup),
        pause: Arc::clone(&pause),
        clock: Arc::clone(&clock),
    });
    let _health_handle = spawn_health_server(config.health_port, health_state);

    let _listener_handle = spawn_command_listener(CommandContext {
        sink: Arc::clone(&sink),
        pause: Arc::clone(&pause),
        dedup: Arc::clone(&dedup),
        clock: Arc::clone(&clock),
        account_count: accounts.len(),
    });

    let startup = format!(
        "📬 mailgram started — monitoring {} account(s), polling every {}s.",
        accounts.len(),
        config.poll_interval.as_secs()
    );
    if let Err(e) = sink.send_notification(&startup, RenderMode::Plain).await {
        tracing::warn!("Failed to send startup notice: {e}");
    }
    sink.refresh_controls(false).await;

    let (relay_handle, shutdown) = spawn_relay(relay, accounts);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received; shutting down");
    shutdown.store(true, Ordering::Relaxed);
    relay_handle.abort();

    Ok(())
}
