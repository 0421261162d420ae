//! mailgram — relays new mail from polled IMAP accounts to a Telegram chat.

pub mod chat;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod health;
pub mod mail;
pub mod pause;
pub mod relay;
