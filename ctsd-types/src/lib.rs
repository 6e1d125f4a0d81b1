//! # ctsd-types
//!
//! Record types shared between the ctsd server core and anything that
//! consumes its output: limits events, packet snapshots, server messages,
//! connection and background-task status rows.
//!
//! ## Features
//!
//! - `serde`: Serialize/Deserialize derives for every record, used by the
//!   log writers and by subscribers that forward records over the wire
//!
//! ## Example
//!
//! ```rust
//! use ctsd_types::{LimitState, OverallState};
//!
//! let worst = [LimitState::Green, LimitState::YellowHigh, LimitState::GreenLow]
//!     .iter()
//!     .filter_map(|s| s.severity())
//!     .max()
//!     .unwrap_or(OverallState::Green);
//!
//! assert_eq!(worst, OverallState::Yellow);
//! ```

mod event;
mod limits;
mod link;
mod task;

pub use event::*;
pub use limits::*;
pub use link::*;
pub use task::*;

/// Get current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
