//! Dashboard update channel.
//!
//! The sweep executor's only channel back to the interactive dashboard
//! is a single named event per flush carrying the newly appended
//! manifest items plus the current meta — never the whole manifest,
//! which would be O(N) per flush and collapse under large sessions.
//! Consumers load the manifest once and apply deltas.

pub mod bus;

pub use bus::{DashboardUpdate, EventBus, DASHBOARD_UPDATE_EVENT};
