//! Notification relay engine — polling orchestration, dedup filtering,
//! formatting and dispatch.

pub mod dispatch;
pub mod format;
pub mod message;
pub mod poller;
pub mod scheduler;

pub use dispatch::Dispatcher;
pub use format::{DispatchPayload, MessageFormatter, RenderMode};
pub use message::{Account, MessageBody, MessageRecord, SourceRef};
pub use poller::AccountPoller;
pub use scheduler::{Relay, spawn_relay};
