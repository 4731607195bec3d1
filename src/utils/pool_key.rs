//! Pool key utilities.
//!
//! The pool key is the stable identity of a pool across runs. It is derived
//! from the chain and display name only, so an address migration keeps the
//! same history series.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALNUM_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex is valid"));

/// Slugify a display name: lowercase, every run of non `[a-z0-9]` characters
/// becomes one underscore, leading/trailing underscores are stripped.
pub fn slugify(name: &str) -> String {
    let lower = name.to_lowercase();
    NON_ALNUM_RUN
        .replace_all(&lower, "_")
        .trim_matches('_')
        .to_string()
}

/// Compute the history key for a pool.
///
/// Format: `"{chain}_{slug}"` with the chain lowercased.
///
/// # Example
/// ```ignore
/// assert_eq!(pool_key("Ethereum", "Wrapped  ETH / USDC!!"), "ethereum_wrapped_eth_usdc");
/// ```
pub fn pool_key(chain: &str, name: &str) -> String {
    format!("{}_{}", chain.to_lowercase(), slugify(name))
}
