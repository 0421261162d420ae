//! Per-account poll cycle: list candidates, dedup, fetch, dispatch.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::dedup::DedupStore;
use crate::mail::MailTransport;
use crate::pause::PauseController;
use crate::relay::dispatch::Dispatcher;
use crate::relay::message::{Account, MessageRecord};

pub struct AccountPoller {
    transport: Arc<dyn MailTransport>,
    dedup: Arc<DedupStore>,
    pause: Arc<PauseController>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
}

impl AccountPoller {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        dedup: Arc<DedupStore>,
        pause: Arc<PauseController>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            dedup,
            pause,
            dispatcher,
            clock,
        }
    }

    /// Run one poll cycle for `account`. Transport errors are logged and
    /// leave the cursor untouched so the next cycle retries; they never
    /// stop other accounts.
    pub async fn poll_account(&self, account: &mut Account) {
        let now = self.clock.now();

        let candidates = match self
            .transport
            .list_candidates(&account.source, &account.query, account.last_check)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                error!(account = %account.name, "Poll failed: {e}");
                return;
            }
        };

        // Initial seeding pass: pre-existing inbox contents are marked seen
        // and never delivered.
        if account.last_check.is_none() {
            let count = candidates.len();
            self.dedup
                .seed(candidates.iter().map(|id| account.unique_id(id)));
            account.last_check = Some(now);
            info!(account = %account.name, seeded = count, "Seeded existing inbox contents");
            return;
        }

        let mut dispatched = 0usize;
        for transport_id in &candidates {
            let unique_id = account.unique_id(transport_id);
            if !self.dedup.mark_seen(&unique_id) {
                continue;
            }

            // While paused the message stays marked seen but is never
            // delivered, also not after resume.
            if !self.pause.is_active() {
                debug!(%unique_id, "Delivery paused; message recorded but not relayed");
                continue;
            }

            let raw = match self
                .transport
                .fetch_content(&account.source, transport_id)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    // Counted as seen above, so a broken message cannot
                    // cause a retry storm.
                    warn!(%unique_id, "Skipping message: {e}");
                    continue;
                }
            };

            let record = MessageRecord {
                unique_id,
                sender: raw.sender,
                recipient: raw.recipient,
                subject: raw.subject,
                body: raw.body,
                received_at: raw.received_at,
            };

            if self.dispatcher.send(&record, &account.name).await {
                dispatched += 1;
            }
        }

        if dispatched > 0 {
            info!(account = %account.name, dispatched, "Relayed new messages");
        }

        // Cursor advances even on an empty cycle.
        account.last_check = Some(now);
    }
}
