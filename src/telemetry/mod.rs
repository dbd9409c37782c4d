//! Unified telemetry model shared by all wheel protocols
//!
//! Every decoder, whatever its wire format, reduces a decoded frame to the
//! same immutable [`WheelState`] snapshot plus optional per-pack
//! [`SmartBms`] records.

pub mod bms;
pub mod state;

pub use bms::SmartBms;
pub use state::WheelState;
