//! Telegram sink — Bot API over reqwest.
//!
//! Notifications go out via `sendMessage` (MarkdownV2 for rich renders,
//! no parse mode for plain). Inbound `/pause`, `/resume` and `/start`
//! commands plus the inline pause/resume button arrive via `getUpdates`
//! long-polling.

use std::sync::Mutex;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::chat::{ChatSink, CommandKind, CommandStream, InboundCommand, MessageId};
use crate::error::SinkError;
use crate::relay::format::RenderMode;

/// Telegram chat sink bound to a single destination chat.
pub struct TelegramSink {
    bot_token: SecretString,
    chat_id: String,
    client: reqwest::Client,
    /// Most recently delivered message.
    last_message: Mutex<Option<MessageId>>,
    /// Message currently carrying the inline keyboard.
    control_message: Mutex<Option<MessageId>>,
}

impl TelegramSink {
    pub fn new(bot_token: SecretString, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            client: reqwest::Client::new(),
            last_message: Mutex::new(None),
            control_message: Mutex::new(None),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Verify the token by calling `getMe`.
    pub async fn health_check(&self) -> Result<(), SinkError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| SinkError::SendFailed {
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(SinkError::Http {
                status: resp.status().as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }

    async fn post_json(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, SinkError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| SinkError::SendFailed {
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(classify_api_error(status.as_u16(), &text));
        }

        serde_json::from_str(&text).map_err(|e| SinkError::SendFailed {
            reason: format!("invalid API response: {e}"),
        })
    }

    fn keyboard(paused: bool) -> serde_json::Value {
        let button = if paused {
            serde_json::json!({ "text": "▶️ Resume delivery", "callback_data": "resume" })
        } else {
            serde_json::json!({ "text": "⏸ Pause delivery", "callback_data": "pause" })
        };
        serde_json::json!({ "inline_keyboard": [[button]] })
    }

    async fn edit_reply_markup(&self, message_id: MessageId, markup: serde_json::Value) {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "message_id": message_id,
            "reply_markup": markup,
        });
        if let Err(e) = self.post_json("editMessageReplyMarkup", &body).await {
            tracing::debug!(message_id, "editMessageReplyMarkup failed: {e}");
        }
    }
}

#[async_trait]
impl ChatSink for TelegramSink {
    async fn send_notification(
        &self,
        text: &str,
        mode: RenderMode,
    ) -> Result<MessageId, SinkError> {
        let mut body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        if mode == RenderMode::Rich {
            body["parse_mode"] = serde_json::Value::String("MarkdownV2".into());
        }

        let resp = self.post_json("sendMessage", &body).await?;
        let message_id = resp
            .pointer("/result/message_id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| SinkError::SendFailed {
                reason: "sendMessage response missing message_id".into(),
            })?;

        *self.last_message.lock().unwrap() = Some(message_id);
        Ok(message_id)
    }

    async fn refresh_controls(&self, paused: bool) {
        let Some(target) = *self.last_message.lock().unwrap() else {
            return;
        };
        let previous = self.control_message.lock().unwrap().take();

        // Strip the keyboard off the message that carried it before.
        if let Some(prev) = previous
            && prev != target
        {
            self.edit_reply_markup(prev, serde_json::json!({ "inline_keyboard": [] }))
                .await;
        }

        self.edit_reply_markup(target, Self::keyboard(paused)).await;
        *self.control_message.lock().unwrap() = Some(target);
    }

    async fn delete_message(&self, id: MessageId) -> Result<(), SinkError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "message_id": id,
        });
        self.post_json("deleteMessage", &body).await.map(|_| ())
    }

    async fn command_stream(&self) -> Result<CommandStream, SinkError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let client = self.client.clone();
        let token = self.bot_token.expose_secret().to_string();
        let chat_id = self.chat_id.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram command listener polling for updates");

            loop {
                let url = format!("https://api.telegram.org/bot{token}/getUpdates");
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"],
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(serde_json::Value::as_array)
                else {
                    continue;
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let Some((command, origin_chat)) = extract_command(update) else {
                        continue;
                    };

                    // Only the configured destination chat may steer the relay.
                    if origin_chat != chat_id {
                        tracing::warn!(
                            %origin_chat,
                            "Ignoring command from non-destination chat"
                        );
                        continue;
                    }

                    // Acknowledge button presses so the client stops spinning.
                    if let Some(cb_id) = update
                        .pointer("/callback_query/id")
                        .and_then(serde_json::Value::as_str)
                    {
                        let ack_url =
                            format!("https://api.telegram.org/bot{token}/answerCallbackQuery");
                        let _ = client
                            .post(&ack_url)
                            .json(&serde_json::json!({ "callback_query_id": cb_id }))
                            .send()
                            .await;
                    }

                    let inbound = InboundCommand {
                        kind: command,
                        chat_id: origin_chat,
                    };
                    if tx.send(inbound).is_err() {
                        tracing::info!("Telegram command listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|cmd| (cmd, rx))
        });

        Ok(Box::pin(stream))
    }
}

/// Map an HTTP error response to a sink error. Telegram reports broken
/// markup as 400 "Bad Request: can't parse entities ..." — that is the
/// rejection the dispatcher retries in plain mode.
fn classify_api_error(status: u16, body: &str) -> SinkError {
    if status == 400 && body.to_lowercase().contains("parse") {
        SinkError::Rejected {
            reason: body.to_string(),
        }
    } else {
        SinkError::Http {
            status,
            body: body.to_string(),
        }
    }
}

/// Pull a relay command out of one `getUpdates` entry, along with the chat
/// it came from. Unknown texts and update kinds yield `None`.
fn extract_command(update: &serde_json::Value) -> Option<(CommandKind, String)> {
    if let Some(data) = update
        .pointer("/callback_query/data")
        .and_then(serde_json::Value::as_str)
    {
        let chat = update
            .pointer("/callback_query/message/chat/id")
            .and_then(serde_json::Value::as_i64)?;
        let kind = match data {
            "pause" => CommandKind::Pause,
            "resume" => CommandKind::Resume,
            _ => return None,
        };
        return Some((kind, chat.to_string()));
    }

    let text = update
        .pointer("/message/text")
        .and_then(serde_json::Value::as_str)?;
    let chat = update
        .pointer("/message/chat/id")
        .and_then(serde_json::Value::as_i64)?;
    parse_command(text).map(|kind| (kind, chat.to_string()))
}

/// Parse a slash command, tolerating the `@botname` suffix.
fn parse_command(text: &str) -> Option<CommandKind> {
    let first = text.split_whitespace().next()?;
    let bare = first.split('@').next().unwrap_or(first);
    match bare {
        "/pause" => Some(CommandKind::Pause),
        "/resume" => Some(CommandKind::Resume),
        "/start" | "/status" => Some(CommandKind::Status),
        _ => None,
    }
}
