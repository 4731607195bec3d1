//! Console table of tracked pools.

use comfy_table::{presets, Attribute, Cell, Table};

use crate::{
    db::models::{PoolRecord, RewardRange},
    utils::{format_currency, format_pct, join_truncated},
};

const NAME_WIDTH: usize = 35;
const MAX_COINS: usize = 3;
const MAX_OTHER_REWARDS: usize = 2;

/// Render `records` as a table. Overlay columns appear only when some record has one.
pub fn results_table(records: &[PoolRecord]) -> Table {
    let with_aura = records.iter().any(PoolRecord::has_aura);

    let mut headers = vec![
        "Pool Name",
        "Chain",
        "Coins",
        "TVL",
        "Base APY",
        "BAL Rewards",
        "Other Rewards",
        "Min APY",
    ];
    if with_aura {
        headers.extend(["Aura APY", "Aura TVL"]);
    }

    let mut table = Table::new();
    table
        .load_preset(presets::ASCII_FULL)
        .set_header(
            headers
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

    for record in records {
        let mut row = vec![
            truncate_name(&record.name),
            title_case(&record.chain),
            join_truncated(&record.coins, MAX_COINS, "/"),
            format_currency(record.tvl),
            format_pct(record.base_apy),
            reward_range(&record.bal_rewards_apy),
            other_rewards(record),
            format_pct(record.total_apy),
        ];

        if with_aura {
            match &record.aura {
                Some(aura) => {
                    row.push(format_pct(aura.apy));
                    row.push(if aura.tvl > 0.0 {
                        format_currency(aura.tvl)
                    } else {
                        "-".to_string()
                    });
                },
                None => row.extend(["-".to_string(), "-".to_string()]),
            }
        }

        table.add_row(row);
    }

    table
}

/// Print the table and a pool count to stdout.
pub fn print_results(records: &[PoolRecord]) {
    if records.is_empty() {
        println!("No pool data found.");
        return;
    }

    println!("\n{}", results_table(records));
    println!("\nTotal pools: {}", records.len());
}

fn truncate_name(name: &str) -> String {
    if name.chars().count() > NAME_WIDTH {
        format!("{}...", name.chars().take(NAME_WIDTH).collect::<String>())
    } else {
        name.to_string()
    }
}

fn title_case(chain: &str) -> String {
    let mut chars = chain.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn reward_range(range: &RewardRange) -> String {
    if range.min() == range.max() {
        format_pct(range.min())
    } else {
        format!("{:.2}-{:.2}%", range.min(), range.max())
    }
}

fn other_rewards(record: &PoolRecord) -> String {
    if record.other_rewards.is_empty() {
        return "-".to_string();
    }
    let labels: Vec<String> = record
        .other_rewards
        .iter()
        .map(|r| format!("{}: {:.2}%", r.token, r.apy))
        .collect();
    join_truncated(&labels, MAX_OTHER_REWARDS, ", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AuraOverlay, OtherReward, PoolComposition, PoolIdentity};

    fn record(name: &str, aura: Option<AuraOverlay>) -> PoolRecord {
        PoolRecord::new(
            PoolIdentity {
                name: name.to_string(),
                chain: "ethereum".to_string(),
                ..Default::default()
            },
            1_500_000.0,
            5.0,
            RewardRange::from_boost(2.0, 3.0),
            vec![
                OtherReward {
                    token: "Merkl".to_string(),
                    apy: 1.0,
                },
                OtherReward {
                    token: "wstETH APR".to_string(),
                    apy: 0.5,
                },
                OtherReward {
                    token: "Points".to_string(),
                    apy: 0.1,
                },
            ],
            PoolComposition {
                coins: vec!["A".into(), "B".into(), "C".into(), "D".into()],
                ..Default::default()
            },
            aura,
        )
    }

    #[test]
    fn test_table_without_overlay_columns() {
        let rendered = results_table(&[record("GHO/USDC", None)]).to_string();

        assert!(rendered.contains("Ethereum"));
        assert!(rendered.contains("A/B/C..."));
        assert!(rendered.contains("$1.50M"));
        assert!(rendered.contains("2.00-5.00%"));
        assert!(rendered.contains("Merkl: 1.00%, wstETH APR: 0.50%..."));
        assert!(!rendered.contains("Aura APY"));
    }

    #[test]
    fn test_table_with_overlay_columns() {
        let aura = AuraOverlay {
            apy: 12.3456,
            tvl: 2_000.0,
            boost: 2.5,
            staking_contract: "0xr".to_string(),
        };
        let rendered = results_table(&[record("a", Some(aura)), record("b", None)]).to_string();

        assert!(rendered.contains("Aura APY"));
        assert!(rendered.contains("12.35%"));
        assert!(rendered.contains("$2.00K"));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(truncate_name(&"x".repeat(40)), format!("{}...", "x".repeat(35)));
        assert_eq!(truncate_name("short"), "short");
        assert_eq!(title_case("arbitrum"), "Arbitrum");
        assert_eq!(reward_range(&RewardRange::from_boost(1.0, 0.0)), "1.00%");
    }
}
