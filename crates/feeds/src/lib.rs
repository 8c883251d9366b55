//! Upstream data sources for the fleet monitor.
//!
//! - `upstream` - the monitored bot servers' HTTP endpoints
//! - `throttle` - single FIFO queue for rate-limited public APIs
//! - `explorer` - block explorer transaction lists, routed through `throttle`
//! - `prices` - native coin USD prices with a refresh interval

pub mod error;
pub mod explorer;
pub mod prices;
pub mod throttle;
pub mod upstream;

pub use error::*;
pub use explorer::*;
pub use prices::*;
pub use throttle::*;
pub use upstream::*;
