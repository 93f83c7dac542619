//! Field normalization and validation.
//!
//! Validation runs before an event reaches the queue. Lenient fields are
//! normalized to defaults; malformed ones reject the event.

use crate::{error::Result, Error, PurchaseEvent, Timestamp};
use serde::{Deserialize, Serialize};

/// Currency used when the store reports none.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Category used when the product has none.
pub const DEFAULT_CATEGORY: &str = "defaultProductCategory";

/// Longest accepted product category, in characters.
pub const MAX_CATEGORY_CHARS: usize = 64;

/// Micro-units per smallest currency unit.
pub const MICROS_PER_CENT: i64 = 10_000;

/// Cart identifier attached to every purchase.
pub const DEFAULT_CART_ID: &str = "defaultCart";

/// Store name attached to every purchase.
pub const STORE_NAME: &str = "google_play";

/// Raw purchase data as reported by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseInput {
    /// Currency code, may be absent or blank
    pub currency: Option<String>,
    /// Product category, may be absent, blank or too long
    pub category: Option<String>,
    /// Price in micro-units of the currency
    pub price_micros: i64,
    pub product_id: String,
    /// Raw purchase payload (receipt)
    pub purchase_data: String,
    pub signature: String,
}

impl PurchaseInput {
    /// Validate and normalize into a purchase event.
    pub fn validate(self, timestamp: Timestamp) -> Result<PurchaseEvent> {
        if is_blank(&self.product_id) {
            return Err(Error::MissingField("productId"));
        }

        let currency = normalize_currency(self.currency.as_deref());
        let category = normalize_category(self.category.as_deref());
        let amount_cents = micros_to_cents(self.price_micros)?;
        let event_id = format!("{}:{}", category, self.product_id);

        Ok(PurchaseEvent {
            currency,
            category,
            amount_cents,
            product_id: self.product_id,
            cart_id: DEFAULT_CART_ID.to_string(),
            receipt: self.purchase_data,
            store: STORE_NAME.to_string(),
            signature: self.signature,
            event_id,
            timestamp,
        })
    }
}

/// Whether a field is absent in practice (empty or whitespace only).
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Substitute the default currency for a missing or blank one.
///
/// No ISO-4217 check is made; any non-blank code is passed through.
pub fn normalize_currency(currency: Option<&str>) -> String {
    match currency {
        Some(c) if !is_blank(c) => c.to_string(),
        _ => DEFAULT_CURRENCY.to_string(),
    }
}

/// Substitute the default category for a missing or blank one and truncate
/// long ones to [`MAX_CATEGORY_CHARS`] characters.
///
/// Truncation counts `char`s, so a multi-byte character is never split.
pub fn normalize_category(category: Option<&str>) -> String {
    match category {
        Some(c) if !is_blank(c) => match c.char_indices().nth(MAX_CATEGORY_CHARS) {
            Some((cut, _)) => c[..cut].to_string(),
            None => c.to_string(),
        },
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

/// Convert a micro-unit price to the smallest currency unit.
///
/// Fractional cents are discarded (truncation, not rounding).
pub fn micros_to_cents(micros: i64) -> Result<i64> {
    if micros < 0 {
        return Err(Error::InvalidPrice(micros));
    }
    Ok(micros / MICROS_PER_CENT)
}

/// Parse a 64-bit integer command argument.
pub fn parse_i64(field: &'static str, value: &str) -> Result<i64> {
    value.trim().parse().map_err(|_| Error::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Parse a 32-bit integer command argument.
pub fn parse_i32(field: &'static str, value: &str) -> Result<i32> {
    value.trim().parse().map_err(|_| Error::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
