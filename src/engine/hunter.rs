//! Listing hunter.
//!
//! Polls one account session for the listing catalogue and reports
//! limited listings it has not seen before. The known-id set is pruned
//! every cycle to the ids still listed as limited, so it never grows
//! beyond the live catalogue.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::platforms::AccountSession;
use crate::types::{HunterStats, Listing, ListingId, ListingSnapshot, SessionError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Upper bound on a single catalogue fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause before the single retry after a network failure.
pub const NETWORK_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Known-set capacity is released every this many cycles.
const SHRINK_EVERY: u64 = 50;

// ---------------------------------------------------------------------------
// Check outcome
// ---------------------------------------------------------------------------

/// Result of one hunter cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Fetch succeeded; listings not seen before (possibly none).
    Fresh(Vec<Listing>),
    /// The platform demanded a cooldown, which has already been waited out.
    RateLimited(Duration),
    /// Fetch failed; logged and swallowed.
    Failed(String),
}

// ---------------------------------------------------------------------------
// Hunter
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HunterState {
    last_check: Option<DateTime<Utc>>,
    check_count: u64,
    known: HashSet<ListingId>,
}

pub struct Hunter {
    hunter_id: usize,
    session: Arc<dyn AccountSession>,
    fetch_timeout: Duration,
    retry_delay: Duration,
    state: Mutex<HunterState>,
}

impl Hunter {
    pub fn new(hunter_id: usize, session: Arc<dyn AccountSession>) -> Self {
        Self::with_timeouts(hunter_id, session, FETCH_TIMEOUT, NETWORK_RETRY_DELAY)
    }

    pub fn with_timeouts(
        hunter_id: usize,
        session: Arc<dyn AccountSession>,
        fetch_timeout: Duration,
        retry_delay: Duration,
    ) -> Self {
        Self {
            hunter_id,
            session,
            fetch_timeout,
            retry_delay,
            state: Mutex::new(HunterState::default()),
        }
    }

    pub fn id(&self) -> usize {
        self.hunter_id
    }

    pub fn session(&self) -> &Arc<dyn AccountSession> {
        &self.session
    }

    /// Run one poll cycle. Never returns an error: failures are logged
    /// and reported through [`CheckOutcome`].
    pub async fn check(&self) -> CheckOutcome {
        let cycle = {
            let mut state = self.state.lock().await;
            state.last_check = Some(Utc::now());
            state.check_count += 1;
            state.check_count
        };
        debug!(hunter_id = self.hunter_id, cycle, "Checking listings");

        let snapshots = match self.fetch_with_retry().await {
            Ok(snapshots) => snapshots,
            Err(SessionError::RateLimited { wait_secs }) => {
                let wait = Duration::from_secs(wait_secs);
                warn!(hunter_id = self.hunter_id, wait_secs, "Rate limited, waiting");
                tokio::time::sleep(wait).await;
                return CheckOutcome::RateLimited(wait);
            }
            Err(e) if e.is_transient() => {
                warn!(hunter_id = self.hunter_id, error = %e, "Network failure after retry");
                return CheckOutcome::Failed(e.to_string());
            }
            Err(e) => {
                error!(hunter_id = self.hunter_id, error = %e, "Listing check failed");
                return CheckOutcome::Failed(e.to_string());
            }
        };

        let fresh = self.diff(snapshots, cycle).await;
        CheckOutcome::Fresh(fresh)
    }

    pub async fn stats(&self) -> HunterStats {
        let state = self.state.lock().await;
        HunterStats {
            hunter_id: self.hunter_id,
            last_check: state.last_check,
            check_count: state.check_count,
            known_listings: state.known.len(),
        }
    }

    /// One fetch under the timeout; a network failure or timeout gets a
    /// single retry after `retry_delay`.
    async fn fetch_with_retry(&self) -> Result<Vec<ListingSnapshot>, SessionError> {
        match self.fetch_once().await {
            Err(e) if e.is_transient() => {
                warn!(hunter_id = self.hunter_id, error = %e, "Network error, retrying");
                tokio::time::sleep(self.retry_delay).await;
                self.fetch_once().await
            }
            other => other,
        }
    }

    async fn fetch_once(&self) -> Result<Vec<ListingSnapshot>, SessionError> {
        match tokio::time::timeout(self.fetch_timeout, self.session.fetch_available_listings())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SessionError::Network(format!(
                "fetch timed out after {:?}",
                self.fetch_timeout
            ))),
        }
    }

    async fn diff(&self, snapshots: Vec<ListingSnapshot>, cycle: u64) -> Vec<Listing> {
        let mut state = self.state.lock().await;
        let mut current_limited = HashSet::new();
        let mut fresh = Vec::new();

        for snapshot in snapshots {
            let listing = match Listing::try_from(snapshot) {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(hunter_id = self.hunter_id, error = %e, "Skipping malformed listing");
                    continue;
                }
            };
            if !listing.is_limited {
                continue;
            }

            current_limited.insert(listing.id);

            if !listing.is_sold_out && state.known.insert(listing.id) {
                info!(
                    hunter_id = self.hunter_id,
                    listing_id = listing.id,
                    price = listing.price,
                    supply = listing.total_amount,
                    "New limited listing"
                );
                fresh.push(listing);
            }
        }

        state.known.retain(|id| current_limited.contains(id));

        if cycle % SHRINK_EVERY == 0 {
            state.known.shrink_to_fit();
        }

        fresh
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::MockAccountSession;
    use mockall::Sequence;

    fn limited(id: u64, sold_out: bool) -> ListingSnapshot {
        ListingSnapshot {
            id: Some(id),
            price: Some(25),
            total_amount: Some(1000),
            available_amount: Some(if sold_out { 0 } else { 500 }),
            is_limited: Some(true),
            is_sold_out: Some(sold_out),
            can_upgrade: Some(false),
        }
    }

    fn regular(id: u64) -> ListingSnapshot {
        ListingSnapshot {
            id: Some(id),
            price: Some(15),
            is_limited: Some(false),
            ..Default::default()
        }
    }

    fn ids(outcome: CheckOutcome) -> Vec<u64> {
        match outcome {
            CheckOutcome::Fresh(listings) => listings.into_iter().map(|l| l.id).collect(),
            _ => Vec::new(),
        }
    }

    /// Mock returning the given catalogues in order.
    fn scripted(catalogues: Vec<Vec<ListingSnapshot>>) -> Hunter {
        let mut mock = MockAccountSession::new();
        let mut seq = Sequence::new();
        for catalogue in catalogues {
            mock.expect_fetch_available_listings()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move || Ok(catalogue.clone()));
        }
        Hunter::new(0, Arc::new(mock))
    }

    #[tokio::test]
    async fn test_reports_only_new_unsold_limited() {
        let hunter = scripted(vec![vec![limited(1, false), limited(2, true), regular(3)]]);
        assert_eq!(ids(hunter.check().await), vec![1]);

        let stats = hunter.stats().await;
        assert_eq!(stats.check_count, 1);
        assert_eq!(stats.known_listings, 1);
        assert!(stats.last_check.is_some());
    }

    #[tokio::test]
    async fn test_known_listing_not_reported_twice() {
        let hunter = scripted(vec![
            vec![limited(1, false)],
            vec![limited(1, false), limited(2, false)],
        ]);
        assert_eq!(ids(hunter.check().await), vec![1]);
        assert_eq!(ids(hunter.check().await), vec![2]);
    }

    #[tokio::test]
    async fn test_known_set_pruned_to_current_catalogue() {
        let hunter = scripted(vec![
            vec![limited(1, false), limited(2, false)],
            vec![limited(2, false)],
            vec![limited(1, false), limited(2, false)],
        ]);
        hunter.check().await;
        hunter.check().await;
        assert_eq!(hunter.stats().await.known_listings, 1);

        // Relisted after being pruned: reported again.
        assert_eq!(ids(hunter.check().await), vec![1]);
    }

    #[tokio::test]
    async fn test_sold_out_then_restocked_is_reported() {
        let hunter = scripted(vec![vec![limited(1, true)], vec![limited(1, false)]]);
        assert!(ids(hunter.check().await).is_empty());
        assert_eq!(ids(hunter.check().await), vec![1]);
    }

    #[tokio::test]
    async fn test_malformed_snapshot_skipped() {
        let broken = ListingSnapshot {
            price: None,
            ..limited(9, false)
        };
        let hunter = scripted(vec![vec![broken, limited(1, false)]]);
        assert_eq!(ids(hunter.check().await), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_retried_once() {
        let mut mock = MockAccountSession::new();
        let mut seq = Sequence::new();
        mock.expect_fetch_available_listings()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(SessionError::Network("connection reset".into())));
        mock.expect_fetch_available_listings()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(vec![limited(1, false)]));
        let hunter = Hunter::new(0, Arc::new(mock));

        assert_eq!(ids(hunter.check().await), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_network_error_fails_cycle() {
        let mut mock = MockAccountSession::new();
        mock.expect_fetch_available_listings()
            .times(2)
            .returning(|| Err(SessionError::Network("connection reset".into())));
        let hunter = Hunter::new(0, Arc::new(mock));

        assert!(matches!(hunter.check().await, CheckOutcome::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_and_returns_empty() {
        let mut mock = MockAccountSession::new();
        mock.expect_fetch_available_listings()
            .times(1)
            .returning(|| Err(SessionError::RateLimited { wait_secs: 7 }));
        let hunter = Hunter::new(0, Arc::new(mock));

        let started = tokio::time::Instant::now();
        let outcome = hunter.check().await;
        assert_eq!(outcome, CheckOutcome::RateLimited(Duration::from_secs(7)));
        assert!(started.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test]
    async fn test_unexpected_error_swallowed() {
        let mut mock = MockAccountSession::new();
        mock.expect_fetch_available_listings()
            .times(1)
            .returning(|| Err(SessionError::Unexpected("bad payload".into())));
        let hunter = Hunter::new(0, Arc::new(mock));

        assert!(matches!(hunter.check().await, CheckOutcome::Failed(_)));
        assert_eq!(hunter.stats().await.check_count, 1);
    }
}
