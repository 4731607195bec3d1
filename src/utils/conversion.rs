//! Numeric conversion utilities.
//!
//! Functions for turning raw on-chain integer strings and loosely typed API
//! numbers into `f64` values with proper decimal handling.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer};
use std::str::FromStr;

// ============================================
// String to f64 Conversions
// ============================================

/// Parse a string representation of a large number to f64 with decimal adjustment.
///
/// Uses BigDecimal for precise conversion. Reward rates and staked amounts are
/// reported as raw integers (wei-style) that overflow `f64` precision long
/// before they overflow the decimal representation.
///
/// # Arguments
/// * `value_str` - The string representation of the number
/// * `decimals` - The number of decimal places to adjust by
///
/// # Returns
/// * `Some(f64)` if parsing succeeds and value is valid, `None` otherwise
pub fn str_to_f64_with_decimals(value_str: &str, decimals: u8) -> Option<f64> {
    let big_value = BigDecimal::from_str(value_str.trim()).ok()?;

    let adjusted = big_value / big_pow10(decimals);

    let result = adjusted.to_f64()?;

    if result.is_finite() && result >= 0.0 {
        Some(result)
    } else {
        None
    }
}

/// Parse a decimal string (e.g. `"1234.56"`) to f64, treating garbage as zero.
pub fn parse_f64_or_zero(value_str: &str) -> f64 {
    value_str
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

// ============================================
// Rounding
// ============================================

/// Round to a fixed number of decimal places.
///
/// Non-finite inputs collapse to 0.0 so they can never reach a JSON file.
pub fn round_to(value: f64, places: u32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10_f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Money values (USD) are stored with 2 decimals.
#[inline]
pub fn round_usd(value: f64) -> f64 {
    round_to(value, 2)
}

/// Percentages are stored with 4 decimals.
#[inline]
pub fn round_pct(value: f64) -> f64 {
    round_to(value, 4)
}

// ============================================
// Lenient serde helpers
// ============================================

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

/// Deserialize a field that may be a JSON number, a decimal string, or null.
///
/// GraphQL APIs are inconsistent about this (`BigDecimal` scalars arrive as
/// strings, `Float` as numbers). Anything unparseable becomes 0.0.
pub fn de_f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberOrString> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(NumberOrString::Number(n)) if n.is_finite() => n,
        Some(NumberOrString::String(s)) => parse_f64_or_zero(&s),
        _ => 0.0,
    })
}

/// Like [`de_f64_lenient`] but keeps absence (null / missing / unparseable) distinct.
pub fn de_opt_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberOrString> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(NumberOrString::Number(n)) if n.is_finite() => Some(n),
        Some(NumberOrString::String(s)) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    })
}

/// Deserialize a raw integer that may arrive as a number or a string (subgraph `BigInt`).
pub fn de_string_lenient<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    })
}

/// Deserialize a field where an explicit `null` means "use the default".
pub fn de_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}
