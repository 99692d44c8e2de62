//! Purchase executor for one funded account.
//!
//! Buys units one at a time, spreading them round-robin across the
//! configured destinations, and keeps a cached balance that is refreshed
//! from the session after every `buy` call.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::platforms::AccountSession;
use crate::types::{ListingId, PurchaseError, PurchaseReport, SessionError, SniperError};

/// Pause between consecutive successful units.
pub const PURCHASE_DELAY: Duration = Duration::from_millis(300);

pub struct Buyer {
    buyer_id: usize,
    session: Arc<dyn AccountSession>,
    destinations: Vec<String>,
    cursor: AtomicUsize,
    balance: AtomicU64,
    purchase_delay: Duration,
}

impl Buyer {
    /// Destinations may be given as `@handle`; the prefix is stripped.
    pub fn new(
        buyer_id: usize,
        session: Arc<dyn AccountSession>,
        destinations: &[String],
        purchase_delay: Duration,
    ) -> Result<Self, SniperError> {
        let destinations: Vec<String> = destinations
            .iter()
            .map(|d| d.trim().trim_start_matches('@').to_string())
            .filter(|d| !d.is_empty())
            .collect();
        if destinations.is_empty() {
            return Err(SniperError::Config(format!(
                "buyer {buyer_id} has no purchase destinations"
            )));
        }

        Ok(Self {
            buyer_id,
            session,
            destinations,
            cursor: AtomicUsize::new(0),
            balance: AtomicU64::new(0),
            purchase_delay,
        })
    }

    pub fn id(&self) -> usize {
        self.buyer_id
    }

    pub fn session(&self) -> &Arc<dyn AccountSession> {
        &self.session
    }

    /// Cached balance; may lag the platform until the next refresh.
    pub fn balance(&self) -> u64 {
        self.balance.load(Ordering::Relaxed)
    }

    /// Load the starting balance.
    pub async fn initialize(&self) -> Result<u64, SessionError> {
        let balance = self.session.fetch_balance().await?;
        self.balance.store(balance, Ordering::Relaxed);
        info!(
            buyer_id = self.buyer_id,
            account = %self.session.name(),
            destinations = ?self.destinations,
            balance,
            "Buyer initialised"
        );
        Ok(balance)
    }

    /// Refresh the cached balance. On failure the cached value is kept
    /// and `None` is returned.
    pub async fn refresh_balance(&self) -> Option<u64> {
        match self.session.fetch_balance().await {
            Ok(balance) => {
                self.balance.store(balance, Ordering::Relaxed);
                Some(balance)
            }
            Err(e) => {
                error!(buyer_id = self.buyer_id, error = %e, "Balance refresh failed");
                None
            }
        }
    }

    /// Optimistically subtract `amount` from the cached balance.
    pub fn debit(&self, amount: u64) {
        // fetch_update only fails when the closure returns None.
        let _ = self
            .balance
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |b| {
                Some(b.saturating_sub(amount))
            });
    }

    /// Refreshes the balance, then checks it covers `price * quantity`.
    pub async fn can_afford(&self, price: u64, quantity: u32) -> bool {
        self.refresh_balance().await;
        self.balance() >= price.saturating_mul(u64::from(quantity))
    }

    /// Buy up to `quantity` units of `listing_id`.
    ///
    /// - Rate limited: wait the mandated time, retry that unit once, move on.
    /// - Sold out: stop, keeping whatever was bought.
    /// - Insufficient balance: abort and return the error.
    /// - Anything else: remember it as `last_error` and continue.
    pub async fn buy(
        &self,
        listing_id: ListingId,
        quantity: u32,
    ) -> Result<PurchaseReport, PurchaseError> {
        let mut bought = 0u32;
        let mut last_error = None;

        for unit in 0..quantity {
            let destination = self.next_destination();

            let mut result = self
                .session
                .execute_purchase(destination, listing_id, true)
                .await;

            if let Err(SessionError::RateLimited { wait_secs }) = result {
                warn!(
                    buyer_id = self.buyer_id,
                    listing_id,
                    wait_secs,
                    "Rate limited during purchase, retrying unit once"
                );
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                result = self
                    .session
                    .execute_purchase(destination, listing_id, true)
                    .await;
            }

            match result {
                Ok(()) => {
                    bought += 1;
                    info!(
                        buyer_id = self.buyer_id,
                        listing_id,
                        destination,
                        unit = unit + 1,
                        quantity,
                        "Purchased"
                    );
                    if unit + 1 < quantity {
                        tokio::time::sleep(self.purchase_delay).await;
                    }
                }
                Err(SessionError::InsufficientBalance) => {
                    error!(buyer_id = self.buyer_id, listing_id, bought, "Insufficient balance");
                    self.refresh_balance().await;
                    return Err(PurchaseError::InsufficientBalance {
                        bought,
                        balance: self.balance(),
                    });
                }
                Err(SessionError::SoldOut) => {
                    warn!(buyer_id = self.buyer_id, listing_id, bought, "Listing sold out");
                    last_error = Some(SessionError::SoldOut.to_string());
                    break;
                }
                Err(e) => {
                    error!(buyer_id = self.buyer_id, listing_id, error = %e, "Purchase failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        let balance_synced = self.refresh_balance().await.is_some();

        Ok(PurchaseReport {
            listing_id,
            requested: quantity,
            bought,
            last_error,
            balance_synced,
        })
    }

    fn next_destination(&self) -> &str {
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.destinations.len();
        &self.destinations[slot]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
