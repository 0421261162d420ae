//! Inbox transport abstraction.
//!
//! The relay engine only ever sees this trait: list candidate ids matching
//! an account's filter, then fetch individual messages. The IMAP adapter
//! lives in [`imap`]; tests substitute in-memory fakes.

pub mod imap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use imap::ImapTransport;

use crate::error::TransportError;
use crate::relay::message::{MessageBody, SourceRef};

/// Raw content of one fetched message, before it becomes a
/// [`MessageRecord`](crate::relay::message::MessageRecord).
#[derive(Debug, Clone)]
pub struct RawMail {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: MessageBody,
    pub received_at: DateTime<Utc>,
}

/// Inbox transport. Calls are blocking network round-trips from the
/// caller's perspective; the relay never holds shared locks across them.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// List transport-native ids of messages matching `query`, optionally
    /// narrowed to those arriving after `since`. Order is the transport's
    /// listing order and is preserved through dispatch.
    async fn list_candidates(
        &self,
        source: &SourceRef,
        query: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<String>, TransportError>;

    /// Fetch the full content of one message.
    async fn fetch_content(
        &self,
        source: &SourceRef,
        transport_id: &str,
    ) -> Result<RawMail, TransportError>;
}
