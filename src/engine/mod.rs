//! Core engine: discover, evaluate, buy.
//!
//! Hunters poll sessions for new limited listings, the coordinator
//! decides what to buy, buyers execute purchases, and the monitor
//! drives the whole task tree.

pub mod buyer;
pub mod coordinator;
pub mod hunter;
pub mod interval;
pub mod monitor;
pub mod processed;
pub mod stats;

pub use buyer::Buyer;
pub use coordinator::{CoordinatorConfig, PurchaseCoordinator};
pub use hunter::{CheckOutcome, Hunter};
pub use monitor::{Monitor, MonitorConfig};
pub use stats::StatsTracker;
