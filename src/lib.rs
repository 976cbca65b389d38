//! Cold & Flu Tracker — SMS-based longitudinal health survey.

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod export;
pub mod model;
pub mod outbound;
pub mod store;
pub mod webhook;
