//! Dispatcher — delivers formatted notifications to the chat sink.
//!
//! Rich render first; a markup rejection triggers exactly one plain-mode
//! retry. Anything after that is logged and dropped (at-most-once delivery).

use std::sync::Arc;

use tracing::{error, warn};

use crate::chat::ChatSink;
use crate::clock::Clock;
use crate::error::SinkError;
use crate::pause::PauseController;
use crate::relay::format::{MessageFormatter, RenderMode};
use crate::relay::message::MessageRecord;

pub struct Dispatcher {
    sink: Arc<dyn ChatSink>,
    formatter: MessageFormatter,
    pause: Arc<PauseController>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        sink: Arc<dyn ChatSink>,
        formatter: MessageFormatter,
        pause: Arc<PauseController>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sink,
            formatter,
            pause,
            clock,
        }
    }

    /// Deliver one message. Returns whether the sink accepted it (either
    /// render); failures are logged here and never propagate to the
    /// scheduler.
    pub async fn send(&self, record: &MessageRecord, account_name: &str) -> bool {
        let now = self.clock.now();
        let rich = self
            .formatter
            .render(record, account_name, now, RenderMode::Rich);

        match self.sink.send_notification(&rich.text, rich.mode).await {
            Ok(_) => {
                self.reattach_controls().await;
                return true;
            }
            Err(SinkError::Rejected { reason }) => {
                warn!(
                    unique_id = %record.unique_id,
                    "Rich render rejected, retrying plain: {reason}"
                );
            }
            Err(e) => {
                error!(unique_id = %record.unique_id, "Delivery failed, dropping: {e}");
                return false;
            }
        }

        let plain = self
            .formatter
            .render(record, account_name, now, RenderMode::Plain);
        match self.sink.send_notification(&plain.text, plain.mode).await {
            Ok(_) => {
                self.reattach_controls().await;
                true
            }
            Err(e) => {
                error!(
                    unique_id = %record.unique_id,
                    "Plain fallback failed, dropping: {e}"
                );
                false
            }
        }
    }

    /// Keep the pause/resume affordance on the newest message.
    async fn reattach_controls(&self) {
        self.sink.refresh_controls(!self.pause.is_active()).await;
    }
}
