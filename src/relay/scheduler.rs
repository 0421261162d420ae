//! Relay loop — fixed-cadence driver for pause expiry and account polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chat::ChatSink;
use crate::clock::Clock;
use crate::pause::PauseController;
use crate::relay::format::RenderMode;
use crate::relay::message::Account;
use crate::relay::poller::AccountPoller;

/// Status notification emitted when a pause window elapses. Distinct from
/// command acknowledgements and not transient.
const AUTO_RESUME_NOTICE: &str = "⏰ Pause window elapsed — delivery resumed automatically.";

pub struct Relay {
    poller: AccountPoller,
    pause: Arc<PauseController>,
    sink: Arc<dyn ChatSink>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Relay {
    pub fn new(
        poller: AccountPoller,
        pause: Arc<PauseController>,
        sink: Arc<dyn ChatSink>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            poller,
            pause,
            sink,
            clock,
            poll_interval,
        }
    }

    /// One tick: expiry check first, then every account sequentially in
    /// registration order.
    pub async fn run_cycle(&self, accounts: &mut [Account]) {
        if self.pause.check_expired(self.clock.now()) {
            info!("Pause window elapsed; delivery resumed");
            if let Err(e) = self
                .sink
                .send_notification(AUTO_RESUME_NOTICE, RenderMode::Plain)
                .await
            {
                warn!("Failed to send auto-resume notice: {e}");
            }
            self.sink.refresh_controls(false).await;
        }

        for account in accounts.iter_mut() {
            self.poller.poll_account(account).await;
        }
    }
}

/// Spawn the background relay loop.
///
/// Returns a `JoinHandle` and a shutdown flag; set the flag to stop after
/// the current cycle.
pub fn spawn_relay(
    relay: Arc<Relay>,
    mut accounts: Vec<Account>,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            accounts = accounts.len(),
            interval_secs = relay.poll_interval.as_secs(),
            "Relay loop started"
        );

        let mut tick = tokio::time::interval(relay.poll_interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Relay loop shutting down");
                return;
            }

            relay.run_cycle(&mut accounts).await;
        }
    });

    (handle, shutdown_flag)
}
