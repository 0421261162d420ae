//! Chat sink abstraction — where notifications go and commands come from.

pub mod commands;
pub mod telegram;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::SinkError;
use crate::relay::format::RenderMode;

pub use commands::spawn_command_listener;
pub use telegram::TelegramSink;

/// Sink-native identifier of a delivered message.
pub type MessageId = i64;

/// An inbound command from the chat destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCommand {
    pub kind: CommandKind,
    pub chat_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Pause,
    Resume,
    Status,
}

/// Stream of inbound commands, long-polled from the sink.
pub type CommandStream = Pin<Box<dyn Stream<Item = InboundCommand> + Send>>;

/// Chat delivery transport.
///
/// Implementations must not hold relay locks across these calls; every
/// method is a blocking network round-trip from the caller's perspective.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Deliver one notification. Markup rejections surface as
    /// [`SinkError::Rejected`] so the dispatcher can fall back to plain.
    async fn send_notification(
        &self,
        text: &str,
        mode: RenderMode,
    ) -> Result<MessageId, SinkError>;

    /// Move the pause/resume control affordance to the most recent
    /// message. Best-effort: failures are logged by the implementation.
    async fn refresh_controls(&self, paused: bool);

    /// Delete a previously delivered message (used to expire transient
    /// acknowledgements).
    async fn delete_message(&self, id: MessageId) -> Result<(), SinkError>;

    /// Start consuming inbound commands.
    async fn command_stream(&self) -> Result<CommandStream, SinkError>;
}
