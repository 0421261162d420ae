//! Core relay data model — accounts and message records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque handle the transport resolves to credentials for one account.
/// The relay engine never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef(pub String);

/// One polled inbox source. Created at startup from configuration and kept
/// for the process lifetime; only `last_check` mutates, after each
/// successful poll cycle.
#[derive(Debug, Clone)]
pub struct Account {
    /// Display name used in notifications and logs.
    pub name: String,
    /// Credential handle passed through to the transport.
    pub source: SourceRef,
    /// Transport-native filter query (e.g. IMAP `UNSEEN`).
    pub query: String,
    /// Cursor of the last completed poll cycle. `None` until the initial
    /// seeding pass has run.
    pub last_check: Option<DateTime<Utc>>,
}

impl Account {
    pub fn new(name: impl Into<String>, source: SourceRef, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source,
            query: query.into(),
            last_check: None,
        }
    }

    /// Derive the process-wide unique id for a transport message id.
    /// Stable across polls of the same message, distinct across accounts.
    pub fn unique_id(&self, transport_id: &str) -> String {
        format!("{}_{}", self.name, transport_id)
    }
}

/// Message content as tagged by the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    /// Ready-to-display plain text.
    Plain(String),
    /// Rich markup that must be stripped before display.
    Html(String),
    /// Transport could not classify the content.
    Unknown,
}

/// One fetched message, immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// `{account name}_{transport id}`, see [`Account::unique_id`].
    pub unique_id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: MessageBody,
    pub received_at: DateTime<Utc>,
}
