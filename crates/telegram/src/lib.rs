//! Telegram Bot API calls made while onboarding.
//!
//! Only two methods are used: `getMe` to verify the bot token and
//! `getUpdates` to turn an `@username` into a numeric chat id. Both must run
//! before the gateway starts, since the gateway's own long-poller would
//! otherwise consume the updates.

pub mod client;
pub mod error;
pub mod resolve;

pub use {
    client::{BotApi, BotUser, TELEGRAM_API_BASE},
    error::{Error, Result},
    resolve::{ContactTarget, ResolvedContact, resolve_contact},
};
