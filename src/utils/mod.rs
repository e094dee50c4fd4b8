//! Utility functions and helpers.
//!
//! Environment variable handling, id generation and clock helpers.

pub mod env;

pub use env::{get_env_list, get_env_parsed, get_env_with_prefix};

use chrono::{DateTime, Utc};

/// Generate a new record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
