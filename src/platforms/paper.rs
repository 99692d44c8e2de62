//! Paper-trading account session.
//!
//! Simulates a funded account against a local JSON catalogue so the
//! whole pipeline can run without a live platform login. The catalogue
//! file is re-read on every fetch, so listings can be dropped into it
//! while the sniper is running.
//!
//! Catalogue shape:
//! ```json
//! { "listings": [ { "id": 1, "price": 25, "is_limited": true, "total_amount": 500 } ] }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::AccountSession;
use crate::types::{ListingId, ListingSnapshot, SessionError};

#[derive(Debug, Deserialize)]
struct Catalogue {
    #[serde(default)]
    listings: Vec<ListingSnapshot>,
}

#[derive(Debug, Default)]
struct Ledger {
    balance: u64,
    /// Units bought per listing, applied on top of the catalogue.
    sold: HashMap<ListingId, u64>,
}

/// A simulated account: catalogue from disk, balance and purchases in memory.
pub struct PaperSession {
    name: String,
    catalogue_path: PathBuf,
    ledger: Mutex<Ledger>,
}

impl PaperSession {
    pub fn new(name: impl Into<String>, catalogue_path: impl Into<PathBuf>, balance: u64) -> Self {
        Self {
            name: name.into(),
            catalogue_path: catalogue_path.into(),
            ledger: Mutex::new(Ledger {
                balance,
                sold: HashMap::new(),
            }),
        }
    }

    async fn load_catalogue(&self) -> Result<Vec<ListingSnapshot>, SessionError> {
        let raw = tokio::fs::read_to_string(&self.catalogue_path)
            .await
            .map_err(|e| {
                SessionError::Unexpected(format!(
                    "failed to read catalogue {}: {e}",
                    self.catalogue_path.display()
                ))
            })?;
        let catalogue: Catalogue = serde_json::from_str(&raw).map_err(|e| {
            SessionError::Unexpected(format!(
                "failed to parse catalogue {}: {e}",
                self.catalogue_path.display()
            ))
        })?;
        Ok(catalogue.listings)
    }

    /// Remaining units after paper purchases.
    fn remaining(snapshot: &ListingSnapshot, sold: u64) -> u64 {
        snapshot
            .available_amount
            .or(snapshot.total_amount)
            .unwrap_or(u64::MAX)
            .saturating_sub(sold)
    }
}

#[async_trait]
impl AccountSession for PaperSession {
    async fn fetch_available_listings(&self) -> Result<Vec<ListingSnapshot>, SessionError> {
        let mut listings = self.load_catalogue().await?;
        let ledger = self.ledger.lock().await;

        for listing in &mut listings {
            let Some(id) = listing.id else { continue };
            let sold = ledger.sold.get(&id).copied().unwrap_or(0);
            if sold == 0 {
                continue;
            }
            let remaining = Self::remaining(listing, sold);
            listing.available_amount = Some(remaining);
            if remaining == 0 {
                listing.is_sold_out = Some(true);
            }
        }

        debug!(account = %self.name, count = listings.len(), "Paper catalogue loaded");
        Ok(listings)
    }

    async fn fetch_balance(&self) -> Result<u64, SessionError> {
        Ok(self.ledger.lock().await.balance)
    }

    async fn execute_purchase(
        &self,
        destination: &str,
        listing_id: ListingId,
        _hide_identity: bool,
    ) -> Result<(), SessionError> {
        let listings = self.load_catalogue().await?;
        let snapshot = listings
            .iter()
            .find(|l| l.id == Some(listing_id))
            .ok_or_else(|| SessionError::Unexpected(format!("listing {listing_id} not found")))?;
        let price = snapshot
            .price
            .ok_or_else(|| SessionError::Unexpected(format!("listing {listing_id} has no price")))?;

        let mut ledger = self.ledger.lock().await;
        let sold = ledger.sold.get(&listing_id).copied().unwrap_or(0);
        if snapshot.is_sold_out == Some(true) || Self::remaining(snapshot, sold) == 0 {
            return Err(SessionError::SoldOut);
        }
        if ledger.balance < price {
            return Err(SessionError::InsufficientBalance);
        }

        ledger.balance -= price;
        *ledger.sold.entry(listing_id).or_insert(0) += 1;

        info!(
            account = %self.name,
            listing_id,
            destination,
            price,
            balance = ledger.balance,
            "[PAPER] Purchase executed"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_catalogue(body: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("sniper_test_catalogue_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&p, body).unwrap();
        p
    }

    const CATALOGUE: &str = r#"{
        "listings": [
            { "id": 1, "price": 10, "is_limited": true, "total_amount": 2, "available_amount": 2 },
            { "id": 2, "price": 500, "is_limited": false }
        ]
    }"#;

    #[tokio::test]
    async fn test_paper_fetch_listings() {
        let path = temp_catalogue(CATALOGUE);
        let session = PaperSession::new("paper", &path, 100);

        let listings = session.fetch_available_listings().await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].id, Some(1));
        assert_eq!(session.name(), "paper");

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_paper_purchase_debits_and_sells_out() {
        let path = temp_catalogue(CATALOGUE);
        let session = PaperSession::new("paper", &path, 100);

        session.execute_purchase("alice", 1, true).await.unwrap();
        session.execute_purchase("alice", 1, true).await.unwrap();
        assert_eq!(session.fetch_balance().await.unwrap(), 80);

        let third = session.execute_purchase("alice", 1, true).await;
        assert_eq!(third, Err(SessionError::SoldOut));

        let listings = session.fetch_available_listings().await.unwrap();
        assert_eq!(listings[0].available_amount, Some(0));
        assert_eq!(listings[0].is_sold_out, Some(true));

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_paper_insufficient_balance() {
        let path = temp_catalogue(CATALOGUE);
        let session = PaperSession::new("paper", &path, 100);

        let result = session.execute_purchase("alice", 2, true).await;
        assert_eq!(result, Err(SessionError::InsufficientBalance));
        assert_eq!(session.fetch_balance().await.unwrap(), 100);

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_paper_missing_catalogue_is_unexpected() {
        let session = PaperSession::new("paper", "/tmp/sniper_no_such_catalogue_xyz.json", 100);
        let result = session.fetch_available_listings().await;
        assert!(matches!(result, Err(SessionError::Unexpected(_))));
    }
}
