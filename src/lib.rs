//! Listing sniper. Watches account sessions for new limited listings
//! and buys them the moment they appear.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod platforms;
pub mod engine;
pub mod notify;
pub mod status;
