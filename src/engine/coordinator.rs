//! Purchase coordinator.
//!
//! Every listing a hunter discovers funnels through here. The coordinator
//! claims the listing id exactly once, evaluates it against the ordered
//! criteria, and fans the purchase out across every buyer that can afford
//! at least one unit.
//!
//! Pipeline per listing:
//! 1. Claim the id in the processed set (double-checked under the lock)
//! 2. Evaluate against criteria and the combined cached balance
//! 3. Fall back to a default quantity when enabled and nothing matched
//! 4. Buy concurrently, aggregate and notify once

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::engine::buyer::Buyer;
use crate::engine::processed::ProcessedSet;
use crate::notify::{messages, NotificationChannel};
use crate::types::{
    Criterion, Decision, Listing, ListingId, ProcessOutcome, PurchaseError, PurchaseSummary,
};

/// Quantity used by fallback purchases when no criteria are configured.
pub const FALLBACK_QUANTITY: u32 = 9999;

/// The processed set hard cap is this multiple of `max_processed`, so
/// ids only get evicted early if cleanup falls far behind.
const PROCESSED_CAP_FACTOR: usize = 2;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Ordered; the first matching criterion wins.
    pub criteria: Vec<Criterion>,
    pub purchase_non_limited: bool,
    /// Buy listings that match no criterion when funds allow.
    pub fallback_purchase: bool,
    /// Processed ids retained by `cleanup`.
    pub max_processed: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            criteria: Vec::new(),
            purchase_non_limited: false,
            fallback_purchase: false,
            max_processed: 1000,
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct PurchaseCoordinator {
    buyers: Vec<Arc<Buyer>>,
    config: CoordinatorConfig,
    processed: RwLock<ProcessedSet>,
    notifier: Arc<dyn NotificationChannel>,
}

impl PurchaseCoordinator {
    pub fn new(
        buyers: Vec<Arc<Buyer>>,
        config: CoordinatorConfig,
        notifier: Arc<dyn NotificationChannel>,
    ) -> Self {
        let cap = config.max_processed.max(1).saturating_mul(PROCESSED_CAP_FACTOR);
        Self {
            buyers,
            config,
            processed: RwLock::new(ProcessedSet::with_capacity(cap)),
            notifier,
        }
    }

    pub fn buyers(&self) -> &[Arc<Buyer>] {
        &self.buyers
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Sum of every buyer's cached balance.
    pub fn total_balance(&self) -> u64 {
        self.buyers
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.balance()))
    }

    pub async fn processed_count(&self) -> usize {
        self.processed.read().await.len()
    }

    /// Decide whether and how much to buy. Pure: no side effects.
    pub fn evaluate(&self, listing: &Listing, balance: u64) -> Decision {
        if listing.is_sold_out {
            return Decision::reject("sold out");
        }
        if !listing.is_limited && !self.config.purchase_non_limited {
            return Decision::reject("not a limited listing");
        }

        let Some(criterion) = self.matching_criterion(listing) else {
            return Decision::reject("no matching criterion");
        };

        let quantity = clamp_to_affordable(criterion.quantity, listing, balance);
        if quantity == 0 {
            return Decision::reject("insufficient balance");
        }

        Decision::buy(
            quantity,
            Some(*criterion),
            format!("matched criterion ({criterion})"),
        )
    }

    /// Fallback decision for an eligible listing that matched no criterion.
    fn fallback(&self, listing: &Listing, balance: u64) -> Option<Decision> {
        if !self.config.fallback_purchase
            || listing.is_sold_out
            || (!listing.is_limited && !self.config.purchase_non_limited)
            || self.matching_criterion(listing).is_some()
        {
            return None;
        }

        let wanted = self
            .config
            .criteria
            .first()
            .map_or(FALLBACK_QUANTITY, |c| c.quantity);
        let quantity = clamp_to_affordable(wanted, listing, balance);
        (quantity > 0).then(|| Decision::buy(quantity, None, "fallback purchase"))
    }

    fn matching_criterion(&self, listing: &Listing) -> Option<&Criterion> {
        self.config
            .criteria
            .iter()
            .find(|c| c.matches(listing.total_amount, listing.price))
    }

    /// Claim `id` for evaluation. Returns `false` if another producer
    /// already did.
    async fn claim(&self, id: ListingId) -> bool {
        if self.processed.read().await.contains(id) {
            return false;
        }
        let mut processed = self.processed.write().await;
        processed.insert(id)
    }

    /// Process one discovered listing end to end.
    pub async fn process(&self, listing: &Listing) -> ProcessOutcome {
        if !self.claim(listing.id).await {
            debug!(listing_id = listing.id, "Listing already processed");
            return ProcessOutcome::Duplicate;
        }

        self.notifier
            .enqueue(messages::listing_found(listing), false);

        let balance = self.total_balance();
        let mut decision = self.evaluate(listing, balance);
        if !decision.should_buy {
            match self.fallback(listing, balance) {
                Some(fallback) => decision = fallback,
                None => {
                    info!(
                        listing_id = listing.id,
                        reason = %decision.reason,
                        "Listing rejected"
                    );
                    return ProcessOutcome::Rejected(decision);
                }
            }
        }

        info!(
            listing_id = listing.id,
            quantity = decision.quantity,
            price = listing.price,
            supply = listing.total_amount,
            reason = %decision.reason,
            "Buying listing"
        );

        let assignments = self.assign(listing, decision.quantity);
        if assignments.is_empty() {
            info!(
                listing_id = listing.id,
                price = listing.price,
                "No single buyer can afford a unit"
            );
            return ProcessOutcome::Rejected(Decision::reject("insufficient balance"));
        }

        let summary = self.fan_out(listing, &assignments).await;
        ProcessOutcome::Attempted(summary)
    }

    /// Process a batch, rarest (lowest supply) first.
    pub async fn process_batch(&self, mut listings: Vec<Listing>) -> Vec<ProcessOutcome> {
        listings.sort_by_key(|l| l.total_amount);
        let mut outcomes = Vec::with_capacity(listings.len());
        for listing in &listings {
            outcomes.push(self.process(listing).await);
        }
        outcomes
    }

    /// Trim the processed set to the `keep_last` newest ids.
    pub async fn cleanup(&self, keep_last: usize) -> usize {
        let mut processed = self.processed.write().await;
        let dropped = processed.retain_recent(keep_last);
        if dropped > 0 {
            info!(dropped, remaining = processed.len(), "Processed set trimmed");
        }
        dropped
    }

    /// Each buyer's share of `quantity`, capped by its own cached balance.
    /// Buyers that cannot afford one unit are left out.
    fn assign(&self, listing: &Listing, quantity: u32) -> Vec<(&Arc<Buyer>, u32)> {
        self.buyers
            .iter()
            .filter_map(|buyer| {
                let own = clamp_to_affordable(quantity, listing, buyer.balance());
                (own > 0).then_some((buyer, own))
            })
            .collect()
    }

    async fn fan_out(
        &self,
        listing: &Listing,
        assignments: &[(&Arc<Buyer>, u32)],
    ) -> PurchaseSummary {
        let mut summary = PurchaseSummary {
            listing_id: listing.id,
            ..Default::default()
        };

        let results = join_all(
            assignments
                .iter()
                .map(|(buyer, qty)| async move { buyer.buy(listing.id, *qty).await }),
        )
        .await;

        for ((buyer, qty), result) in assignments.iter().zip(results) {
            match result {
                Ok(report) => {
                    let spent = u64::from(report.bought).saturating_mul(listing.price);
                    summary.bought += u64::from(report.bought);
                    summary.spent = summary.spent.saturating_add(spent);
                    if report.bought > 0 && !report.balance_synced {
                        buyer.debit(spent);
                    }
                    if !report.is_success() {
                        summary
                            .errors
                            .push(format!("buyer {}: {}", buyer.id(), report.message()));
                    }
                }
                Err(e) => {
                    let PurchaseError::InsufficientBalance { bought, balance } = e;
                    summary.bought += u64::from(bought);
                    summary.spent = summary
                        .spent
                        .saturating_add(u64::from(bought).saturating_mul(listing.price));
                    let required = listing.price.saturating_mul(u64::from(*qty));
                    warn!(
                        buyer_id = buyer.id(),
                        listing_id = listing.id,
                        balance,
                        required,
                        "Buyer ran out of funds"
                    );
                    self.notifier
                        .enqueue(messages::low_balance(balance, required), true);
                    summary.errors.push(format!("buyer {}: {e}", buyer.id()));
                }
            }
        }

        info!(
            listing_id = listing.id,
            bought = summary.bought,
            spent = summary.spent,
            buyers = assignments.len(),
            "Purchase round complete"
        );
        self.notify_result(listing, &summary);
        summary
    }

    fn notify_result(&self, listing: &Listing, summary: &PurchaseSummary) {
        let text = if summary.bought > 0 {
            messages::purchase_success(listing.id, summary.bought, summary.spent)
        } else if summary.errors.is_empty() {
            messages::purchase_failure(listing.id, "no units purchased")
        } else {
            messages::purchase_failure(listing.id, &summary.errors.join("; "))
        };
        self.notifier.enqueue(text, true);
    }
}

/// `wanted` capped to what `balance` covers at the listing's price.
fn clamp_to_affordable(wanted: u32, listing: &Listing, balance: u64) -> u32 {
    let affordable = listing.affordable(balance);
    u32::try_from(affordable.min(u64::from(wanted))).unwrap_or(wanted)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
