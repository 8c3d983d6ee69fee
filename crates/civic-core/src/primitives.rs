//! # Primitives
//!
//! Bounds shared by validation, storage and the API layer.

/// Maximum length of a name field (entries, categories, documents...).
pub const MAX_NAME_LENGTH: usize = 250;

/// Maximum length of a generated or supplied slug.
pub const MAX_SLUG_LENGTH: usize = 255;

/// Maximum length of a single attribute value.
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 250;

/// Maximum length of free text (descriptions, refusal reasons, plain text values).
pub const MAX_TEXT_LENGTH: usize = 10_000;

/// Maximum length of a file URL.
pub const MAX_URL_LENGTH: usize = 2_048;

/// Maximum number of items in a single investment.
pub const MAX_INVESTMENT_ITEMS: usize = 500;

/// Default number of days before expiration at which a document counts as expiring.
pub const DEFAULT_EXPIRY_WARNING_DAYS: i64 = 15;

/// Largest accepted expiry warning window, in days.
pub const MAX_EXPIRY_WARNING_DAYS: i64 = 3_650;

/// Maximum number of records returned by a single listing.
pub const MAX_PAGE_SIZE: usize = 500;

/// Default page size when a caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Load type of documents that are only ever uploaded by hand.
pub const MANUAL_LOAD_TYPE: &str = "manual";

/// Clamp a requested page size to the allowed range.
#[must_use]
pub fn page_size(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}
