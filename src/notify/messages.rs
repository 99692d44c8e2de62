//! Notification message builders.
//!
//! Texts are Telegram legacy Markdown. Free text from sessions goes
//! through `escape_markdown` so an unbalanced `_` or `*` cannot get the
//! whole message rejected.

use chrono::Utc;

use crate::types::{Listing, ListingId};

pub fn startup(accounts: usize, hunters: usize, buyers: usize, balance: u64) -> String {
    format!(
        "🚀 *Sniper started*\n\n\
         Accounts: {accounts} ({hunters} hunters, {buyers} buyers)\n\
         Balance: {balance}\n\
         Time: {}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

pub fn listing_found(listing: &Listing) -> String {
    format!(
        "🎁 *New limited listing*\n\n\
         ID: `{}`\n\
         Price: {}\n\
         Supply: {}\n\
         Upgradable: {}",
        listing.id,
        listing.price,
        listing.total_amount,
        if listing.can_upgrade { "yes" } else { "no" }
    )
}

pub fn purchase_success(listing_id: ListingId, quantity: u64, spent: u64) -> String {
    format!(
        "✅ *Purchase complete*\n\n\
         Listing: `{listing_id}`\n\
         Bought: {quantity}\n\
         Spent: {spent}"
    )
}

pub fn purchase_failure(listing_id: ListingId, error: &str) -> String {
    format!(
        "❌ *Purchase failed*\n\n\
         Listing: `{listing_id}`\n\
         Error: {}",
        escape_markdown(error)
    )
}

pub fn low_balance(current: u64, required: u64) -> String {
    format!(
        "⚠️ *Low balance*\n\n\
         Current: {current}\n\
         Required: {required}\n\
         Top up to keep purchasing."
    )
}

/// Backslash-escape the legacy Markdown entity characters.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_key_figures() {
        assert!(purchase_success(42, 3, 60).contains("Bought: 3"));
        assert!(purchase_failure(42, "sold out").contains("sold out"));
        assert!(low_balance(40, 100).contains("Required: 100"));
        assert!(startup(3, 2, 1, 500).contains("Balance: 500"));
    }

    #[test]
    fn test_failure_text_is_escaped() {
        let text = purchase_failure(1, "USER_BANNED");
        assert!(text.contains(r"Error: USER\_BANNED"));
        assert!(!text.contains("USER_BANNED"));
        // Formatting of the template itself is untouched.
        assert!(text.contains("*Purchase failed*"));
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("plain text"), "plain text");
        assert_eq!(escape_markdown("a*b`c[d_e"), r"a\*b\`c\[d\_e");
    }

    #[test]
    fn test_listing_found() {
        let listing = Listing {
            id: 7,
            price: 25,
            total_amount: 500,
            available_amount: 500,
            is_limited: true,
            is_sold_out: false,
            can_upgrade: true,
        };
        let text = listing_found(&listing);
        assert!(text.contains("`7`"));
        assert!(text.contains("Supply: 500"));
        assert!(text.contains("Upgradable: yes"));
    }
}
