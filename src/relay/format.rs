//! Message formatting — renders a [`MessageRecord`] into the outbound
//! notification text.
//!
//! Two modes: rich (Telegram MarkdownV2, user-controlled values escaped) and
//! plain (no markup, delivery fallback). Missing fields never fail a render;
//! they fall back to fixed placeholders.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::relay::message::{MessageBody, MessageRecord};

/// Maximum rendered body length, ellipsis included.
pub const BODY_LIMIT: usize = 400;
/// Maximum rendered sender length, ellipsis included.
pub const SENDER_LIMIT: usize = 50;
/// Maximum rendered subject length, ellipsis included.
pub const SUBJECT_LIMIT: usize = 60;

const ELLIPSIS: &str = "...";

const PLACEHOLDER_SUBJECT: &str = "(no subject)";
const PLACEHOLDER_SENDER: &str = "(unknown sender)";
const PLACEHOLDER_BODY: &str = "(no content)";

/// Characters MarkdownV2 treats as markup. Every occurrence in a
/// user-controlled value must be backslash-escaped exactly once.
const MARKDOWN_SPECIALS: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// How a payload is rendered for the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Destination markup with escaping applied.
    Rich,
    /// No markup at all.
    Plain,
}

/// Formatted text ready for dispatch.
#[derive(Debug, Clone)]
pub struct DispatchPayload {
    pub text: String,
    pub mode: RenderMode,
}

/// Renders message records into notification text.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    display_tz: Tz,
}

impl MessageFormatter {
    pub fn new(display_tz: Tz) -> Self {
        Self { display_tz }
    }

    /// Render `record` for delivery. Never fails: absent fields are
    /// replaced by placeholders, rich content is stripped to plain text.
    pub fn render(
        &self,
        record: &MessageRecord,
        account_name: &str,
        now: DateTime<Utc>,
        mode: RenderMode,
    ) -> DispatchPayload {
        let sender = clip(
            &or_placeholder(extract_address(&record.sender), PLACEHOLDER_SENDER),
            SENDER_LIMIT,
        );
        let recipient = or_placeholder(extract_address(&record.recipient), account_name.to_string());
        let subject = clip(
            &or_placeholder(record.subject.trim().to_string(), PLACEHOLDER_SUBJECT),
            SUBJECT_LIMIT,
        );
        let body = clip(&body_text(&record.body), BODY_LIMIT);
        let timestamp = now
            .with_timezone(&self.display_tz)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string();

        let text = match mode {
            RenderMode::Rich => format!(
                "📬 *New mail on {account}*\n\
                 ━━━━━━━━━━━━━━━━━━━━\n\
                 📨 *To:* {to}\n\
                 👤 *From:* {from}\n\
                 📝 *Subject:* {subject}\n\
                 📅 *Received:* {ts}\n\
                 ━━━━━━━━━━━━━━━━━━━━\n\
                 \n\
                 💬 {body}",
                account = escape_markup(account_name),
                to = escape_markup(&recipient),
                from = escape_markup(&sender),
                subject = escape_markup(&subject),
                ts = escape_markup(&timestamp),
                body = escape_markup(&body),
            ),
            RenderMode::Plain => format!(
                "📬 New mail on {account_name}\n\
                 📨 To: {recipient}\n\
                 👤 From: {sender}\n\
                 📝 Subject: {subject}\n\
                 📅 Received: {timestamp}\n\
                 \n\
                 💬 {body}",
            ),
        };

        DispatchPayload { text, mode }
    }
}

/// Convert the tagged body to display text. HTML is stripped to plain text
/// with links and images dropped, then excess blank lines collapsed.
fn body_text(body: &MessageBody) -> String {
    let text = match body {
        MessageBody::Plain(text) => text.trim().to_string(),
        MessageBody::Html(html) => {
            let stripped = nanohtml2text::html2text(html);
            stripped
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        }
        MessageBody::Unknown => String::new(),
    };
    or_placeholder(text, PLACEHOLDER_BODY)
}

fn or_placeholder(value: String, placeholder: impl Into<String>) -> String {
    if value.is_empty() {
        placeholder.into()
    } else {
        value
    }
}

/// Truncate to `limit` chars total, appending an ellipsis when truncated.
fn clip(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let kept: String = value.chars().take(limit - ELLIPSIS.len()).collect();
    format!("{kept}{ELLIPSIS}")
}

/// Reduce `Name <addr@host>` forms to the bare address.
fn extract_address(value: &str) -> String {
    if let (Some(start), Some(end)) = (value.find('<'), value.rfind('>'))
        && start < end
    {
        return value[start + 1..end].trim().to_string();
    }
    value.trim().to_string()
}

/// Backslash-escape every MarkdownV2 control character. Callers must escape
/// exactly once; escaping already-escaped input is out of contract.
fn escape_markup(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if MARKDOWN_SPECIALS.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
