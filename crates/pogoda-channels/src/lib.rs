//! # Pogoda Channels
//! Delivery gateways that carry rendered notifications to subscribers.

pub mod telegram;

pub use telegram::TelegramChannel;
