//! Utility functions for the tracker.
//!
//! - [`conversion`] - Raw integer/decimal string conversions, rounding, lenient serde
//! - [`format`] - Currency and percentage display formatting
//! - [`pool_key`] - Stable pool key derivation for the history file

mod conversion;
mod format;
mod pool_key;

// ============================================
// Common Constants
// ============================================

/// Seconds in a (non-leap) year, used to annualise per-second reward rates.
pub const SECONDS_PER_YEAR: f64 = 365.0 * 86_400.0;

/// Timestamp format used in every persisted file (UTC, second precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ============================================
// Re-exports
// ============================================

pub use conversion::{
    de_f64_lenient, de_null_default, de_opt_f64_lenient, de_string_lenient, parse_f64_or_zero, round_pct,
    round_to, round_usd, str_to_f64_with_decimals,
};

pub use format::{format_currency, format_pct, join_truncated};

pub use pool_key::{pool_key, slugify};
