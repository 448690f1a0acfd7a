//! Core logic for the temporary voice channel bot.
//!
//! Nothing in here talks to Discord directly. The gateway, REST calls and the
//! cache live behind the traits in [`ports`], implemented by the adapter crate.

pub mod audit;
pub mod commands;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod housekeeping;
pub mod logging;
pub mod naming;
pub mod ports;
pub mod security;
pub mod settings;
pub mod store;
pub mod voice;

pub use errors::{Error, Result};
