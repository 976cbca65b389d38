//! Outbound delivery: Twilio transport and the weekly send loop.

pub mod twilio;
pub mod weekly;

pub use twilio::{SmsSender, TwilioSender};
pub use weekly::{BatchOutcome, WeeklySender, spawn_cron_ticker};
