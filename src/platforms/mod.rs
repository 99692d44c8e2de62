//! Account session seam.
//!
//! Defines the `AccountSession` trait consumed by hunters and buyers.
//! Live sessions (authenticated platform accounts) are created outside
//! this crate and handed in as trait objects; the crate itself ships:
//! - `paper`: a catalogue-backed simulated account for dry runs

pub mod paper;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::types::{ListingId, ListingSnapshot, SessionError};

/// Abstraction over one authenticated platform account.
///
/// Implementors fetch the current listing catalogue, report the spendable
/// balance, and execute single-unit purchases. Expected platform outcomes
/// (rate limits, sold out, insufficient funds) are reported as
/// [`SessionError`] variants, not panics.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AccountSession: Send + Sync {
    /// Fetch every listing currently offered, in the platform's raw shape.
    async fn fetch_available_listings(&self) -> Result<Vec<ListingSnapshot>, SessionError>;

    /// Current spendable balance in platform currency units.
    async fn fetch_balance(&self) -> Result<u64, SessionError>;

    /// Buy one unit of `listing_id` and deliver it to `destination`.
    async fn execute_purchase(
        &self,
        destination: &str,
        listing_id: ListingId,
        hide_identity: bool,
    ) -> Result<(), SessionError>;

    /// Account name for logging and identification.
    fn name(&self) -> &str;
}
