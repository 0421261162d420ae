//! End-to-end relay scenarios with fake transport, sink and clock.
//!
//! Each test wires the real poller/dispatcher/scheduler against in-memory
//! fakes and drives cycles by hand — no sleeps, no network.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use mailgram::chat::commands::{CommandContext, handle_command};
use mailgram::chat::{ChatSink, CommandKind, CommandStream, InboundCommand, MessageId};
use mailgram::clock::{Clock, FakeClock};
use mailgram::dedup::DedupStore;
use mailgram::error::{SinkError, TransportError};
use mailgram::mail::{MailTransport, RawMail};
use mailgram::pause::PauseController;
use mailgram::relay::{
    Account, AccountPoller, Dispatcher, MessageBody, MessageFormatter, Relay, RenderMode,
    SourceRef,
};

// ── Fakes ───────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeTransport {
    /// Candidate transport ids per source, in listing order.
    candidates: Mutex<HashMap<String, Vec<String>>>,
    /// Full content per transport id.
    mails: Mutex<HashMap<String, RawMail>>,
    /// Sources whose list call fails.
    failing: Mutex<HashSet<String>>,
}

impl FakeTransport {
    fn add_candidate(&self, source: &str, id: &str, mail: RawMail) {
        self.candidates
            .lock()
            .unwrap()
            .entry(source.to_string())
            .or_default()
            .push(id.to_string());
        self.mails.lock().unwrap().insert(id.to_string(), mail);
    }

    fn set_failing(&self, source: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(source.to_string());
        } else {
            set.remove(source);
        }
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    async fn list_candidates(
        &self,
        source: &SourceRef,
        _query: &str,
        _since: Option<chrono::DateTime<Utc>>,
    ) -> Result<Vec<String>, TransportError> {
        if self.failing.lock().unwrap().contains(&source.0) {
            return Err(TransportError::Connect {
                host: "imap.test".into(),
                reason: "connection refused".into(),
            });
        }
        Ok(self
            .candidates
            .lock()
            .unwrap()
            .get(&source.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_content(
        &self,
        _source: &SourceRef,
        transport_id: &str,
    ) -> Result<RawMail, TransportError> {
        self.mails
            .lock()
            .unwrap()
            .get(transport_id)
            .cloned()
            .ok_or_else(|| TransportError::Extract {
                id: transport_id.to_string(),
                reason: "missing body".into(),
            })
    }
}

#[derive(Default)]
struct RecordingSink {
    /// Every accepted delivery: (text, mode).
    sent: Mutex<Vec<(String, RenderMode)>>,
    /// Every attempt, accepted or not.
    attempts: Mutex<Vec<RenderMode>>,
    deleted: Mutex<Vec<MessageId>>,
    control_refreshes: Mutex<Vec<bool>>,
    reject_rich: Mutex<bool>,
    fail_all: Mutex<bool>,
    next_id: AtomicI64,
}

impl RecordingSink {
    fn sent(&self) -> Vec<(String, RenderMode)> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatSink for RecordingSink {
    async fn send_notification(
        &self,
        text: &str,
        mode: RenderMode,
    ) -> Result<MessageId, SinkError> {
        self.attempts.lock().unwrap().push(mode);
        if *self.fail_all.lock().unwrap() {
            return Err(SinkError::SendFailed {
                reason: "sink down".into(),
            });
        }
        if mode == RenderMode::Rich && *self.reject_rich.lock().unwrap() {
            return Err(SinkError::Rejected {
                reason: "can't parse entities".into(),
            });
        }
        self.sent.lock().unwrap().push((text.to_string(), mode));
        Ok(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn refresh_controls(&self, paused: bool) {
        self.control_refreshes.lock().unwrap().push(paused);
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), SinkError> {
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }

    async fn command_stream(&self) -> Result<CommandStream, SinkError> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    transport: Arc<FakeTransport>,
    sink: Arc<RecordingSink>,
    dedup: Arc<DedupStore>,
    pause: Arc<PauseController>,
    clock: Arc<FakeClock>,
    relay: Relay,
    accounts: Vec<Account>,
}

fn harness(account_names: &[&str]) -> Harness {
    let transport = Arc::new(FakeTransport::default());
    let sink = Arc::new(RecordingSink::default());
    let dedup = Arc::new(DedupStore::new());
    let pause = Arc::new(PauseController::new(Duration::hours(12)));
    let clock = Arc::new(FakeClock::new(Utc::now()));

    let clock_dyn: Arc<dyn Clock> = Arc::clone(&clock) as Arc<dyn Clock>;
    let sink_dyn: Arc<dyn ChatSink> = Arc::clone(&sink) as Arc<dyn ChatSink>;

    let dispatcher = Dispatcher::new(
        Arc::clone(&sink_dyn),
        MessageFormatter::new(chrono_tz::UTC),
        Arc::clone(&pause),
        Arc::clone(&clock_dyn),
    );
    let poller = AccountPoller::new(
        Arc::clone(&transport) as Arc<dyn MailTransport>,
        Arc::clone(&dedup),
        Arc::clone(&pause),
        dispatcher,
        Arc::clone(&clock_dyn),
    );
    let relay = Relay::new(
        poller,
        Arc::clone(&pause),
        sink_dyn,
        clock_dyn,
        std::time::Duration::from_secs(30),
    );

    let accounts = account_names
        .iter()
        .map(|name| Account::new(*name, SourceRef((*name).to_string()), "UNSEEN"))
        .collect();

    Harness {
        transport,
        sink,
        dedup,
        pause,
        clock,
        relay,
        accounts,
    }
}

fn mail(subject: &str, body: &str) -> RawMail {
    RawMail {
        sender: "alice@example.com".into(),
        recipient: "bob@example.com".into(),
        subject: subject.into(),
        body: MessageBody::Plain(body.into()),
        received_at: Utc::now(),
    }
}

// ── Seeding ─────────────────────────────────────────────────────────

#[tokio::test]
async fn first_cycle_seeds_existing_mail_without_dispatch() {
    let mut h = harness(&["work"]);
    h.transport.add_candidate("work", "1", mail("Old news", "already read"));
    h.transport.add_candidate("work", "2", mail("Older news", "also read"));

    h.relay.run_cycle(&mut h.accounts).await;

    assert_eq!(h.sink.sent_count(), 0);
    assert_eq!(h.dedup.len(), 2);
    assert!(h.accounts[0].last_check.is_some());

    // Next cycle with nothing new still dispatches nothing.
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 0);
}

// ── Dedup + dispatch ────────────────────────────────────────────────

#[tokio::test]
async fn new_message_is_dispatched_exactly_once() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await; // seed with empty inbox

    let body = "b".repeat(500);
    h.transport.add_candidate("work", "1", mail("Quarterly report", &body));

    h.relay.run_cycle(&mut h.accounts).await;

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, RenderMode::Rich);
    assert!(sent[0].0.contains("Quarterly report"));
    // Body truncated to 400 chars total.
    assert!(sent[0].0.contains(&format!("{}\\.\\.\\.", "b".repeat(397))));
    assert!(sent[0].0.contains("work"));

    // Same transport id again: zero further dispatches.
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 1);
}

#[tokio::test]
async fn candidates_dispatch_in_listing_order() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await;

    h.transport.add_candidate("work", "1", mail("First", "a"));
    h.transport.add_candidate("work", "2", mail("Second", "b"));
    h.transport.add_candidate("work", "3", mail("Third", "c"));

    h.relay.run_cycle(&mut h.accounts).await;

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].0.contains("First"));
    assert!(sent[1].0.contains("Second"));
    assert!(sent[2].0.contains("Third"));
}

#[tokio::test]
async fn same_transport_id_across_accounts_is_distinct() {
    let mut h = harness(&["work", "personal"]);
    h.relay.run_cycle(&mut h.accounts).await;

    h.transport.add_candidate("work", "1", mail("Work mail", "w"));
    h.transport.add_candidate("personal", "1", mail("Personal mail", "p"));

    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 2);
}

// ── Pause semantics ─────────────────────────────────────────────────

#[tokio::test]
async fn paused_cycles_seed_but_never_dispatch() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await;
    let cursor_after_seed = h.accounts[0].last_check;

    h.pause.pause(h.clock.now());
    h.clock.advance(Duration::minutes(1));

    h.transport.add_candidate("work", "1", mail("While paused", "hidden"));
    h.relay.run_cycle(&mut h.accounts).await;

    assert_eq!(h.sink.sent_count(), 0);
    assert_eq!(h.dedup.len(), 1);
    // Cursor still advances during the pause.
    assert!(h.accounts[0].last_check > cursor_after_seed);

    // Messages seen during the pause are not delivered after resume either.
    h.pause.resume();
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 0);

    // But genuinely new mail after resume flows again.
    h.transport.add_candidate("work", "2", mail("After resume", "visible"));
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 1);
}

#[tokio::test]
async fn pause_auto_expires_with_one_notification() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await;

    h.pause.pause(h.clock.now());
    assert!(!h.pause.is_active());

    // Not yet expired.
    h.clock.advance(Duration::hours(11));
    h.relay.run_cycle(&mut h.accounts).await;
    assert!(!h.pause.is_active());
    assert_eq!(h.sink.sent_count(), 0);

    // Expired: exactly one auto-resume notice, state flips once.
    h.clock.advance(Duration::hours(1));
    h.relay.run_cycle(&mut h.accounts).await;
    assert!(h.pause.is_active());
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("resumed automatically"));

    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 1);
}

// ── Fallback + drop semantics ───────────────────────────────────────

#[tokio::test]
async fn rejected_rich_render_falls_back_to_plain_once() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await;

    *h.sink.reject_rich.lock().unwrap() = true;
    h.transport.add_candidate("work", "1", mail("Weird *markup*", "body _here_"));

    h.relay.run_cycle(&mut h.accounts).await;

    let attempts = h.sink.attempts.lock().unwrap().clone();
    assert_eq!(attempts, vec![RenderMode::Rich, RenderMode::Plain]);

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, RenderMode::Plain);
    // Plain mode leaves the original characters alone.
    assert!(sent[0].0.contains("Weird *markup*"));
    assert!(!sent[0].0.contains('\\'));
}

#[tokio::test]
async fn failed_delivery_drops_message_without_retry() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await;

    *h.sink.fail_all.lock().unwrap() = true;
    h.transport.add_candidate("work", "1", mail("Doomed", "never arrives"));
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 0);

    // Sink recovers, but the dropped message is not retried.
    *h.sink.fail_all.lock().unwrap() = false;
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 0);
}

#[tokio::test]
async fn broken_message_content_is_skipped_and_not_retried() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await;

    // Candidate listed but content missing: fetch fails.
    h.transport
        .candidates
        .lock()
        .unwrap()
        .entry("work".into())
        .or_default()
        .push("ghost".into());

    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 0);
    // Counted as seen so the next cycle does not fetch it again.
    assert_eq!(h.dedup.len(), 1);
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 0);
}

// ── Error isolation ─────────────────────────────────────────────────

#[tokio::test]
async fn failing_account_does_not_block_others() {
    let mut h = harness(&["bad", "good"]);
    h.relay.run_cycle(&mut h.accounts).await; // seed both

    h.transport.set_failing("bad", true);
    h.transport.add_candidate("good", "1", mail("Still flowing", "yes"));

    h.relay.run_cycle(&mut h.accounts).await;

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("Still flowing"));
}

#[tokio::test]
async fn list_failure_leaves_cursor_untouched_and_retries() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await;
    let cursor = h.accounts[0].last_check;

    h.transport.set_failing("work", true);
    h.clock.advance(Duration::minutes(1));
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.accounts[0].last_check, cursor);

    h.transport.set_failing("work", false);
    h.transport.add_candidate("work", "1", mail("Recovered", "hello"));
    h.relay.run_cycle(&mut h.accounts).await;
    assert_eq!(h.sink.sent_count(), 1);
    assert!(h.accounts[0].last_check > cursor);
}

// ── Control affordance ──────────────────────────────────────────────

#[tokio::test]
async fn successful_delivery_reattaches_controls() {
    let mut h = harness(&["work"]);
    h.relay.run_cycle(&mut h.accounts).await;

    h.transport.add_candidate("work", "1", mail("Hi", "there"));
    h.relay.run_cycle(&mut h.accounts).await;

    let refreshes = h.sink.control_refreshes.lock().unwrap().clone();
    assert_eq!(refreshes, vec![false]); // delivery active → pause button
}

// ── Commands ────────────────────────────────────────────────────────

fn command_ctx(h: &Harness) -> CommandContext {
    CommandContext {
        sink: Arc::clone(&h.sink) as Arc<dyn ChatSink>,
        pause: Arc::clone(&h.pause),
        dedup: Arc::clone(&h.dedup),
        clock: Arc::clone(&h.clock) as Arc<dyn Clock>,
        account_count: h.accounts.len(),
    }
}

#[tokio::test(start_paused = true)]
async fn pause_command_pauses_and_acks_transiently() {
    let h = harness(&["work"]);
    let ctx = command_ctx(&h);

    handle_command(
        &ctx,
        InboundCommand {
            kind: CommandKind::Pause,
            chat_id: "42".into(),
        },
    )
    .await;

    assert!(!h.pause.is_active());
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("paused"));
    // Control affordance flipped to the paused rendering.
    assert_eq!(
        h.sink.control_refreshes.lock().unwrap().last(),
        Some(&true)
    );

    // The acknowledgement expires shortly after.
    tokio::time::sleep(std::time::Duration::from_secs(20)).await;
    assert_eq!(h.sink.deleted.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_pause_command_is_an_acked_noop() {
    let h = harness(&["work"]);
    let ctx = command_ctx(&h);
    let cmd = InboundCommand {
        kind: CommandKind::Pause,
        chat_id: "42".into(),
    };

    handle_command(&ctx, cmd.clone()).await;
    handle_command(&ctx, cmd).await;

    assert!(!h.pause.is_active());
    let sent = h.sink.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].0.contains("already paused"));
}

#[tokio::test(start_paused = true)]
async fn resume_command_reactivates_delivery() {
    let h = harness(&["work"]);
    let ctx = command_ctx(&h);
    h.pause.pause(h.clock.now());

    handle_command(
        &ctx,
        InboundCommand {
            kind: CommandKind::Resume,
            chat_id: "42".into(),
        },
    )
    .await;

    assert!(h.pause.is_active());
    assert!(h.sink.sent()[0].0.contains("resumed"));
    assert_eq!(
        h.sink.control_refreshes.lock().unwrap().last(),
        Some(&false)
    );
}

#[tokio::test(start_paused = true)]
async fn status_command_reports_state() {
    let h = harness(&["work", "personal"]);
    let ctx = command_ctx(&h);
    h.dedup.seed(["work_1".to_string()]);

    handle_command(
        &ctx,
        InboundCommand {
            kind: CommandKind::Status,
            chat_id: "42".into(),
        },
    )
    .await;

    let sent = h.sink.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("active"));
    assert!(sent[0].0.contains("Accounts: 2"));
    assert!(sent[0].0.contains("Seen messages: 1"));
}
