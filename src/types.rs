//! Shared types for the sniper.
//!
//! These types form the data model used across all modules. Listings
//! arrive from sessions as loosely-shaped [`ListingSnapshot`]s and are
//! validated into [`Listing`] values at the boundary; everything past
//! the hunter works with the validated form only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform-unique listing identifier.
pub type ListingId = u64;

// ---------------------------------------------------------------------------
// Criterion
// ---------------------------------------------------------------------------

/// A configured acceptance rule: supply range, price range, and how many
/// units to buy when a listing falls inside both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Criterion {
    pub min_supply: u64,
    pub max_supply: u64,
    pub min_price: u64,
    pub max_price: u64,
    pub quantity: u32,
}

impl Criterion {
    pub fn new(
        min_supply: u64,
        max_supply: u64,
        min_price: u64,
        max_price: u64,
        quantity: u32,
    ) -> Result<Self, SniperError> {
        if max_supply < min_supply {
            return Err(SniperError::InvalidCriterion(format!(
                "supply range {min_supply}..={max_supply} is empty"
            )));
        }
        if max_price < min_price {
            return Err(SniperError::InvalidCriterion(format!(
                "price range {min_price}..={max_price} is empty"
            )));
        }
        if quantity == 0 {
            return Err(SniperError::InvalidCriterion(
                "quantity must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            min_supply,
            max_supply,
            min_price,
            max_price,
            quantity,
        })
    }

    /// Inclusive range check on both supply and price.
    pub fn matches(&self, supply: u64, price: u64) -> bool {
        (self.min_supply..=self.max_supply).contains(&supply)
            && (self.min_price..=self.max_price).contains(&price)
    }
}

/// Config tuples are `[min_supply, max_supply, min_price, max_price, quantity]`.
impl TryFrom<[u64; 5]> for Criterion {
    type Error = SniperError;

    fn try_from(raw: [u64; 5]) -> Result<Self, Self::Error> {
        let [min_supply, max_supply, min_price, max_price, quantity] = raw;
        let quantity = u32::try_from(quantity).map_err(|_| {
            SniperError::InvalidCriterion(format!("quantity {quantity} is too large"))
        })?;
        Self::new(min_supply, max_supply, min_price, max_price, quantity)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "supply {}-{}, price {}-{}, qty {}",
            self.min_supply, self.max_supply, self.min_price, self.max_price, self.quantity
        )
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Raw listing as reported by a session. Every field is optional because
/// the remote shape is not trusted; see `Listing::try_from`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub id: Option<ListingId>,
    pub price: Option<u64>,
    pub total_amount: Option<u64>,
    pub available_amount: Option<u64>,
    pub is_limited: Option<bool>,
    pub is_sold_out: Option<bool>,
    pub can_upgrade: Option<bool>,
}

/// A validated, immutable listing snapshot for one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub id: ListingId,
    pub price: u64,
    /// Total supply.
    pub total_amount: u64,
    pub available_amount: u64,
    pub is_limited: bool,
    pub is_sold_out: bool,
    pub can_upgrade: bool,
}

impl Listing {
    /// How many units `balance` covers at this listing's price.
    pub fn affordable(&self, balance: u64) -> u64 {
        balance.checked_div(self.price).unwrap_or(0)
    }
}

impl TryFrom<ListingSnapshot> for Listing {
    type Error = SniperError;

    fn try_from(raw: ListingSnapshot) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .ok_or_else(|| SniperError::MalformedListing("missing id".to_string()))?;
        let price = raw
            .price
            .ok_or_else(|| SniperError::MalformedListing(format!("listing {id}: missing price")))?;
        if price == 0 {
            return Err(SniperError::MalformedListing(format!(
                "listing {id}: zero price"
            )));
        }
        let is_limited = raw.is_limited.ok_or_else(|| {
            SniperError::MalformedListing(format!("listing {id}: missing is_limited"))
        })?;
        let total_amount = match (is_limited, raw.total_amount) {
            (_, Some(total)) => total,
            (false, None) => 0,
            (true, None) => {
                return Err(SniperError::MalformedListing(format!(
                    "listing {id}: limited listing without total_amount"
                )))
            }
        };

        Ok(Self {
            id,
            price,
            total_amount,
            available_amount: raw.available_amount.unwrap_or(0),
            is_limited,
            is_sold_out: raw
                .is_sold_out
                .unwrap_or(is_limited && raw.available_amount == Some(0)),
            can_upgrade: raw.can_upgrade.unwrap_or(false),
        })
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} (price: {} | supply: {} | available: {}{})",
            self.id,
            self.price,
            self.total_amount,
            self.available_amount,
            if self.is_sold_out { " | SOLD OUT" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of evaluating one listing against the criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub should_buy: bool,
    pub quantity: u32,
    pub matched: Option<Criterion>,
    /// Diagnostic only.
    pub reason: String,
}

impl Decision {
    pub fn buy(quantity: u32, matched: Option<Criterion>, reason: impl Into<String>) -> Self {
        Self {
            should_buy: true,
            quantity,
            matched,
            reason: reason.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            should_buy: false,
            quantity: 0,
            matched: None,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Purchase results
// ---------------------------------------------------------------------------

/// Result of one buyer's `buy` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseReport {
    pub listing_id: ListingId,
    pub requested: u32,
    pub bought: u32,
    pub last_error: Option<String>,
    /// Whether the post-purchase balance refresh reached the session.
    pub balance_synced: bool,
}

impl PurchaseReport {
    pub fn is_success(&self) -> bool {
        self.bought > 0
    }

    pub fn message(&self) -> String {
        if self.is_success() {
            format!("bought {}/{}", self.bought, self.requested)
        } else {
            self.last_error
                .clone()
                .unwrap_or_else(|| "no purchase attempted".to_string())
        }
    }
}

/// Aggregate of a fan-out purchase across all buyers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseSummary {
    pub listing_id: ListingId,
    pub bought: u64,
    pub spent: u64,
    pub errors: Vec<String>,
}

/// What `PurchaseCoordinator::process` did with a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Another producer already claimed this id.
    Duplicate,
    Rejected(Decision),
    Attempted(PurchaseSummary),
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HunterStats {
    pub hunter_id: usize,
    pub last_check: Option<DateTime<Utc>>,
    pub check_count: u64,
    pub known_listings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStats {
    pub running: bool,
    pub processed_listings: usize,
    pub total_balance: u64,
    pub total_checks: u64,
    pub hunters: Vec<HunterStats>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures reported by an [`AccountSession`](crate::platforms::AccountSession).
///
/// Most of these are expected, frequent outcomes rather than faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: retry after {wait_secs}s")]
    RateLimited { wait_secs: u64 },

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Listing sold out")]
    SoldOut,

    #[error("Unexpected session error: {0}")]
    Unexpected(String),
}

impl SessionError {
    /// Worth one immediate retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::Network(_))
    }
}

/// The one condition `Buyer::buy` propagates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PurchaseError {
    #[error("Insufficient balance after {bought} purchase(s): {balance} left")]
    InsufficientBalance { bought: u32, balance: u64 },
}

/// Domain-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum SniperError {
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Malformed listing snapshot: {0}")]
    MalformedListing(String),

    #[error("Invalid criterion: {0}")]
    InvalidCriterion(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
