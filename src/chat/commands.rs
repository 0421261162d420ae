//! Command listener — consumes inbound chat commands and steers the
//! pause/resume state machine.
//!
//! Every command is handled idempotently: pausing an already-paused relay
//! just re-renders the current state. Acknowledgements are transient —
//! a fire-and-forget task deletes them after a short delay.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::{ChatSink, CommandKind, InboundCommand};
use crate::clock::Clock;
use crate::dedup::DedupStore;
use crate::pause::{PauseController, PauseSnapshot};
use crate::relay::format::RenderMode;

/// How long a transient acknowledgement stays in the chat.
const ACK_TTL: StdDuration = StdDuration::from_secs(15);

/// Shared state the command listener operates on.
#[derive(Clone)]
pub struct CommandContext {
    pub sink: Arc<dyn ChatSink>,
    pub pause: Arc<PauseController>,
    pub dedup: Arc<DedupStore>,
    pub clock: Arc<dyn Clock>,
    pub account_count: usize,
}

/// Spawn the long-lived command consumption loop.
pub fn spawn_command_listener(ctx: CommandContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match ctx.sink.command_stream().await {
            Ok(s) => s,
            Err(e) => {
                warn!("Command listener failed to start: {e}");
                return;
            }
        };

        while let Some(cmd) = stream.next().await {
            handle_command(&ctx, cmd).await;
        }

        info!("Command stream ended; listener exiting");
    })
}

/// Handle one inbound command: mutate pause state, move the control
/// affordance, send a transient acknowledgement.
pub async fn handle_command(ctx: &CommandContext, cmd: InboundCommand) {
    let now = ctx.clock.now();

    let ack = match cmd.kind {
        CommandKind::Pause => {
            let changed = ctx.pause.pause(now);
            info!(changed, "Pause command received");
            let remaining = ctx
                .pause
                .remaining(now)
                .map(format_duration)
                .unwrap_or_default();
            pause_ack(changed, &remaining)
        }
        CommandKind::Resume => {
            let changed = ctx.pause.resume();
            info!(changed, "Resume command received");
            resume_ack(changed)
        }
        CommandKind::Status => status_text(
            ctx.pause.snapshot(now),
            ctx.dedup.len(),
            ctx.account_count,
        ),
    };

    // Move the affordance before the ack lands, so the keyboard never sits
    // on a message that is about to be deleted.
    ctx.sink.refresh_controls(!ctx.pause.is_active()).await;

    // Acks are plain text; no user-controlled content, nothing to escape.
    match ctx.sink.send_notification(&ack, RenderMode::Plain).await {
        Ok(message_id) => {
            let sink = Arc::clone(&ctx.sink);
            tokio::spawn(async move {
                tokio::time::sleep(ACK_TTL).await;
                if let Err(e) = sink.delete_message(message_id).await {
                    // Leaving an ack behind is harmless.
                    debug!(message_id, "Failed to expire acknowledgement: {e}");
                }
            });
        }
        Err(e) => warn!("Failed to send command acknowledgement: {e}"),
    }
}

fn pause_ack(changed: bool, remaining: &str) -> String {
    if changed {
        format!("⏸ Delivery paused. Auto-resumes in {remaining}.")
    } else {
        format!("Delivery is already paused — resumes in {remaining}.")
    }
}

fn resume_ack(changed: bool) -> String {
    if changed {
        "▶️ Delivery resumed.".to_string()
    } else {
        "Delivery is already active.".to_string()
    }
}

fn status_text(snapshot: PauseSnapshot, dedup_len: usize, accounts: usize) -> String {
    let state = if snapshot.paused {
        let remaining = snapshot
            .remaining_secs
            .map(|s| format_duration(Duration::seconds(s)))
            .unwrap_or_default();
        format!("paused (resumes in {remaining})")
    } else {
        "active".to_string()
    };
    format!(
        "📡 mailgram status\n\
         Delivery: {state}\n\
         Accounts: {accounts}\n\
         Seen messages: {dedup_len}"
    )
}

/// Compact `11h 59m` style rendering for pause windows.
fn format_duration(d: Duration) -> String {
    let total_mins = d.num_minutes().max(0);
    let hours = total_mins / 60;
    let mins = total_mins % 60;
    if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}
