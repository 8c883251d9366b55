//! Core data types for the bot fleet monitor.
//!
//! Everything here is pure: upstream payload sanitizing, the trade metadata
//! normalizer, status text parsing and the shared configuration types.

pub mod balance;
pub mod config;
pub mod contract;
pub mod diff;
pub mod props;
pub mod status;
pub mod trade;
pub mod value;

pub use balance::*;
pub use config::*;
pub use contract::*;
pub use diff::*;
pub use props::*;
pub use status::*;
pub use trade::*;
pub use value::*;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
