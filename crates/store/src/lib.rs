//! Per-server persistent store.
//!
//! Every configured bot server gets its own SQLite database. Nothing here
//! crosses server boundaries: the engine opens one [`ServerStore`] per
//! server and keeps it for the life of the process.

mod db;
mod diffs;
mod notifications;
mod series;
mod trades;

pub use db::{iso_timestamp, ServerStore, StoreError};
pub use notifications::{NotificationLogEntry, MAX_LOG_DETAILS_CHARS, MAX_LOG_MESSAGE_CHARS};
pub use series::{ContractTxStats, StoredQuote};
pub use trades::{PairProfit, TradeRow};
