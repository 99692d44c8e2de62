//! Shared fixtures for integration tests.
//!
//! `MockSession` is a deterministic in-memory `AccountSession`: the
//! catalogue, balance and failure modes are all controllable from test
//! code, and purchases charge the listing price and consume supply.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use listing_sniper::notify::NotificationChannel;
use listing_sniper::platforms::AccountSession;
use listing_sniper::types::{ListingId, ListingSnapshot, SessionError};

pub struct MockSession {
    name: String,
    listings: Mutex<Vec<ListingSnapshot>>,
    balance: Mutex<u64>,
    purchases: Mutex<Vec<(String, ListingId)>>,
    /// If set, every purchase returns this error.
    purchase_error: Mutex<Option<SessionError>>,
    /// If set, every catalogue fetch returns this error.
    fetch_error: Mutex<Option<SessionError>>,
    fetches: AtomicU64,
}

impl MockSession {
    pub fn new(name: &str, balance: u64) -> Self {
        Self::with_listings(name, balance, Vec::new())
    }

    pub fn with_listings(name: &str, balance: u64, listings: Vec<ListingSnapshot>) -> Self {
        Self {
            name: name.to_string(),
            listings: Mutex::new(listings),
            balance: Mutex::new(balance),
            purchases: Mutex::new(Vec::new()),
            purchase_error: Mutex::new(None),
            fetch_error: Mutex::new(None),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn set_listings(&self, listings: Vec<ListingSnapshot>) {
        *self.listings.lock().unwrap() = listings;
    }

    pub fn set_purchase_error(&self, error: Option<SessionError>) {
        *self.purchase_error.lock().unwrap() = error;
    }

    pub fn set_fetch_error(&self, error: Option<SessionError>) {
        *self.fetch_error.lock().unwrap() = error;
    }

    pub fn purchases(&self) -> Vec<(String, ListingId)> {
        self.purchases.lock().unwrap().clone()
    }

    pub fn purchase_count(&self) -> usize {
        self.purchases.lock().unwrap().len()
    }

    pub fn balance(&self) -> u64 {
        *self.balance.lock().unwrap()
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountSession for MockSession {
    async fn fetch_available_listings(&self) -> Result<Vec<ListingSnapshot>, SessionError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.fetch_error.lock().unwrap().clone() {
            return Err(e);
        }
        Ok(self.listings.lock().unwrap().clone())
    }

    async fn fetch_balance(&self) -> Result<u64, SessionError> {
        Ok(self.balance())
    }

    async fn execute_purchase(
        &self,
        destination: &str,
        listing_id: ListingId,
        _hide_identity: bool,
    ) -> Result<(), SessionError> {
        if let Some(e) = self.purchase_error.lock().unwrap().clone() {
            return Err(e);
        }

        let mut listings = self.listings.lock().unwrap();
        let listing = listings
            .iter_mut()
            .find(|l| l.id == Some(listing_id))
            .ok_or_else(|| SessionError::Unexpected(format!("unknown listing {listing_id}")))?;

        let available = listing.available_amount.unwrap_or(0);
        if listing.is_sold_out == Some(true) || available == 0 {
            return Err(SessionError::SoldOut);
        }

        let price = listing.price.unwrap_or(0);
        let mut balance = self.balance.lock().unwrap();
        if *balance < price {
            return Err(SessionError::InsufficientBalance);
        }

        *balance -= price;
        listing.available_amount = Some(available - 1);
        if available == 1 {
            listing.is_sold_out = Some(true);
        }
        self.purchases
            .lock()
            .unwrap()
            .push((destination.to_string(), listing_id));
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Limited, unsold listing with `supply` units available.
pub fn limited(id: ListingId, price: u64, supply: u64) -> ListingSnapshot {
    ListingSnapshot {
        id: Some(id),
        price: Some(price),
        total_amount: Some(supply),
        available_amount: Some(supply),
        is_limited: Some(true),
        is_sold_out: Some(false),
        can_upgrade: Some(false),
    }
}

/// Notification channel that records every message.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, bool)>>,
}

impl RecordingChannel {
    pub fn messages(&self) -> Vec<(String, bool)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(text, _)| text.contains(needle))
            .count()
    }
}

impl NotificationChannel for RecordingChannel {
    fn enqueue(&self, text: String, priority: bool) {
        self.sent.lock().unwrap().push((text, priority));
    }
}
