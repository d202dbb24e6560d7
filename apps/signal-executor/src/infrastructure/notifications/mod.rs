//! Notification Adapters
//!
//! Implementations of `NotifierPort`: a log-only sink, the Telegram Bot
//! API, and a recorder for tests.

mod log_notifier;
mod recording;
mod telegram;

pub use log_notifier::LogNotifier;
pub use recording::RecordingNotifier;
pub use telegram::{TelegramConfig, TelegramNotifier};
