//! Display formatting helpers shared by the snapshot file and the CLI table.

/// Format a USD amount with a B/M/K suffix.
///
/// Thresholds are inclusive: exactly 1e6 renders as `$1.00M`.
pub fn format_currency(amount: f64) -> String {
    if amount >= 1_000_000_000.0 {
        format!("${:.2}B", amount / 1_000_000_000.0)
    } else if amount >= 1_000_000.0 {
        format!("${:.2}M", amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("${:.2}K", amount / 1_000.0)
    } else {
        format!("${amount:.2}")
    }
}

/// Format a percentage with two decimals.
pub fn format_pct(value: f64) -> String {
    format!("{value:.2}%")
}

/// Join the first `limit` items with `sep`, appending `...` when truncated.
pub fn join_truncated(items: &[String], limit: usize, sep: &str) -> String {
    let mut joined = items
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(sep);
    if items.len() > limit {
        joined.push_str("...");
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency_thresholds() {
        assert_eq!(format_currency(999.994), "$999.99");
        assert_eq!(format_currency(1_000.0), "$1.00K");
        assert_eq!(format_currency(1_500_000.0), "$1.50M");
        assert_eq!(format_currency(2_340_000_000.0), "$2.34B");
    }

    #[test]
    fn test_join_truncated() {
        let coins = vec!["BAL".to_string(), "WETH".to_string(), "USDC".to_string()];
        assert_eq!(join_truncated(&coins, 3, "/"), "BAL/WETH/USDC");
        assert_eq!(join_truncated(&coins, 2, "/"), "BAL/WETH...");
    }
}
