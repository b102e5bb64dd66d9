//! Bot layer - Telegram side of the service.
//!
//! Payment fulfillment talks to Telegram through a small Bot API client;
//! the state machine sees only the [`FulfillmentNotifier`] trait.

/// Fulfillment trait and the Telegram notifier
pub mod notifier;
/// Telegram Bot API client
pub mod telegram;

pub use notifier::{AccessGrant, FulfillmentNotifier, TelegramNotifier};
pub use telegram::TelegramClient;
