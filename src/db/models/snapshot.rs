use serde::{Deserialize, Serialize};

use super::{AuraOverlay, OtherReward, PoolComposition, PoolIdentity, PoolRecord, RewardRange};
use crate::utils::{format_currency, round_pct, round_to, round_usd};

/// Envelope version written to every store file.
pub const STORE_VERSION: &str = "1.0";

/// Value of `metadata.source`.
pub const SOURCE_NAME: &str = "BalancerTracker";

/// Current-state snapshot file.
///
/// ```text
/// { version, metadata: {..}, pools: [SnapshotPool] }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotFile {
    pub version: String,
    pub metadata: SnapshotMetadata,
    pub pools: Vec<SnapshotPool>,
}

/// Shape used when reading a snapshot back: metadata and pools stay untyped so
/// that one bad field does not take the whole file down.
#[derive(Debug, Deserialize)]
pub struct RawSnapshotFile {
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub pools: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub total_pools: usize,
    #[serde(default)]
    pub chains: Vec<String>,
    /// Absent in dated archives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_aura: Option<bool>,
}

impl SnapshotMetadata {
    /// Summarise a batch: count, sorted distinct chains and overlay presence.
    pub fn summarize(records: &[PoolRecord], generated_at: String, with_aura_flag: bool) -> Self {
        let mut chains: Vec<String> = records.iter().map(|r| r.chain.clone()).collect();
        chains.sort();
        chains.dedup();

        Self {
            generated_at,
            source: SOURCE_NAME.to_string(),
            total_pools: records.len(),
            chains,
            has_aura: with_aura_flag.then(|| records.iter().any(PoolRecord::has_aura)),
        }
    }
}

/// One pool as persisted in the snapshot file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPool {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_chain")]
    pub chain: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub pool_id: String,
    #[serde(default)]
    pub data: SnapshotPoolData,
    #[serde(default)]
    pub tokens: SnapshotTokens,
    #[serde(default)]
    pub aura: Option<SnapshotAura>,
}

fn default_name() -> String {
    "Unknown".to_string()
}

fn default_chain() -> String {
    "ethereum".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPoolData {
    #[serde(default)]
    pub tvl: f64,
    #[serde(default)]
    pub tvl_formatted: String,
    #[serde(default)]
    pub base_apy: f64,
    #[serde(default)]
    pub bal_rewards: SnapshotRewardRange,
    #[serde(default)]
    pub other_rewards: Vec<OtherReward>,
    #[serde(default)]
    pub total_apy: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRewardRange {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTokens {
    #[serde(default)]
    pub coins: Vec<String>,
    #[serde(default)]
    pub ratios: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<f64>,
    #[serde(default)]
    pub prices: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotAura {
    #[serde(default)]
    pub apy: Option<f64>,
    #[serde(default)]
    pub tvl: Option<f64>,
    #[serde(default)]
    pub boost: Option<f64>,
    #[serde(default)]
    pub staking_contract: Option<String>,
}

impl SnapshotPool {
    /// Serialize a record with storage rounding (money 2dp, percentages 4dp,
    /// token amounts 6dp, token prices 4dp).
    pub fn from_record(record: &PoolRecord) -> Self {
        Self {
            id: record.key(),
            name: record.name.clone(),
            chain: record.chain.clone(),
            address: record.address.clone(),
            pool_id: record.pool_id.clone(),
            data: SnapshotPoolData {
                tvl: round_usd(record.tvl),
                tvl_formatted: format_currency(record.tvl),
                base_apy: round_pct(record.base_apy),
                bal_rewards: SnapshotRewardRange {
                    min: round_pct(record.bal_rewards_apy.min()),
                    max: round_pct(record.bal_rewards_apy.max()),
                },
                other_rewards: record.other_rewards.clone(),
                total_apy: round_pct(record.total_apy),
            },
            tokens: SnapshotTokens {
                coins: record.coins.clone(),
                ratios: record.coin_ratios.clone(),
                amounts: record.coin_amounts.iter().map(|a| round_to(*a, 6)).collect(),
                prices: record.coin_prices.iter().map(|p| round_to(*p, 4)).collect(),
            },
            aura: record.aura.as_ref().map(|aura| SnapshotAura {
                apy: Some(round_pct(aura.apy)),
                tvl: Some(round_usd(aura.tvl)),
                boost: Some(round_usd(aura.boost)),
                staking_contract: Some(aura.staking_contract.clone()),
            }),
        }
    }

    /// Rebuild the record. The overlay is restored only when its APY is present.
    pub fn into_record(self) -> PoolRecord {
        let aura = self.aura.and_then(|aura| {
            aura.apy.map(|apy| AuraOverlay {
                apy,
                tvl: aura.tvl.unwrap_or(0.0),
                boost: aura.boost.unwrap_or(0.0),
                staking_contract: aura.staking_contract.unwrap_or_default(),
            })
        });

        PoolRecord::with_total(
            PoolIdentity {
                name: self.name,
                chain: self.chain,
                address: self.address,
                pool_id: self.pool_id,
            },
            self.data.tvl,
            self.data.base_apy,
            RewardRange::new(self.data.bal_rewards.min, self.data.bal_rewards.max),
            self.data.other_rewards,
            self.data.total_apy,
            PoolComposition {
                coins: self.tokens.coins,
                coin_ratios: self.tokens.ratios,
                coin_amounts: self.tokens.amounts,
                coin_prices: self.tokens.prices,
            },
            aura,
        )
    }
}
