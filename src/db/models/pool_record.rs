use serde::{Deserialize, Serialize};

/// Reward APY range of the primary reward token: unboosted floor and fully boosted ceiling.
///
/// The ceiling is built as `min + boost` with a non-negative boost, so
/// `min <= max` holds for every value of this type.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RewardRange {
    min: f64,
    max: f64,
}

impl RewardRange {
    /// Build from the unboosted emission APY and the extra APY granted by a full boost.
    pub fn from_boost(min: f64, boost: f64) -> Self {
        Self {
            min,
            max: min + boost.max(0.0),
        }
    }

    /// Build from stored bounds. A ceiling below the floor is lifted to the floor.
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

/// A miscellaneous reward stream (anything that is not swap fees or the primary emissions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtherReward {
    /// Display label from the source, e.g. "Merkl rewards" or "wstETH APR".
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub apy: f64,
}

/// Second-protocol (Aura) overlay for a pool.
///
/// One composite value instead of four optionals: a pool either has the
/// whole overlay or none of it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuraOverlay {
    /// Overlaid APY: base + overlay APR total + other rewards.
    pub apy: f64,
    /// USD value of pool shares staked through the overlay protocol.
    pub tvl: f64,
    /// Boost multiplier applied to depositors.
    pub boost: f64,
    /// Reward pool (staking) contract address.
    pub staking_contract: String,
}

/// Metrics of one pool at one point in time.
///
/// Built fresh on every fetch cycle and never mutated afterwards; consumed by
/// the snapshot store (full overwrite) and the history store (one entry per run).
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRecord {
    // Identity
    pub name: String,
    /// Lowercase chain identifier.
    pub chain: String,
    pub address: String,
    /// Protocol-specific pool id (may differ from the address).
    pub pool_id: String,

    // Value metrics
    pub tvl: f64,
    /// Swap-fee APY (percent).
    pub base_apy: f64,
    pub bal_rewards_apy: RewardRange,
    /// Source order, not sorted.
    pub other_rewards: Vec<OtherReward>,
    /// base + unboosted rewards + other rewards.
    pub total_apy: f64,

    // Composition (parallel arrays, same order as `coins`)
    pub coins: Vec<String>,
    pub coin_ratios: Vec<String>,
    pub coin_amounts: Vec<f64>,
    pub coin_prices: Vec<f64>,

    pub aura: Option<AuraOverlay>,
}

/// Identity of a pool as reported by the source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoolIdentity {
    pub name: String,
    pub chain: String,
    pub address: String,
    pub pool_id: String,
}

/// Token composition of a pool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoolComposition {
    pub coins: Vec<String>,
    pub coin_ratios: Vec<String>,
    pub coin_amounts: Vec<f64>,
    pub coin_prices: Vec<f64>,
}

impl PoolRecord {
    /// Assemble a record, deriving `total_apy` from its parts.
    pub fn new(
        identity: PoolIdentity,
        tvl: f64,
        base_apy: f64,
        bal_rewards_apy: RewardRange,
        other_rewards: Vec<OtherReward>,
        composition: PoolComposition,
        aura: Option<AuraOverlay>,
    ) -> Self {
        let total_apy = base_apy + bal_rewards_apy.min() + sum_other(&other_rewards);

        Self::with_total(
            identity,
            tvl,
            base_apy,
            bal_rewards_apy,
            other_rewards,
            total_apy,
            composition,
            aura,
        )
    }

    /// Assemble a record with an already known total (e.g. read back from disk).
    #[allow(clippy::too_many_arguments)]
    pub fn with_total(
        identity: PoolIdentity,
        tvl: f64,
        base_apy: f64,
        bal_rewards_apy: RewardRange,
        other_rewards: Vec<OtherReward>,
        total_apy: f64,
        composition: PoolComposition,
        aura: Option<AuraOverlay>,
    ) -> Self {
        Self {
            name: identity.name,
            chain: identity.chain.to_lowercase(),
            address: identity.address,
            pool_id: identity.pool_id,
            tvl: tvl.max(0.0),
            base_apy,
            bal_rewards_apy,
            other_rewards,
            total_apy,
            coins: composition.coins,
            coin_ratios: composition.coin_ratios,
            coin_amounts: composition.coin_amounts,
            coin_prices: composition.coin_prices,
            aura,
        }
    }

    /// Stable history key, see [`crate::utils::pool_key`].
    pub fn key(&self) -> String {
        crate::utils::pool_key(&self.chain, &self.name)
    }

    /// Sum of the miscellaneous reward APYs.
    pub fn other_rewards_apy(&self) -> f64 {
        sum_other(&self.other_rewards)
    }

    pub fn has_aura(&self) -> bool {
        self.aura.is_some()
    }
}

fn sum_other(rewards: &[OtherReward]) -> f64 {
    rewards.iter().map(|r| r.apy).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str, chain: &str) -> PoolIdentity {
        PoolIdentity {
            name: name.to_string(),
            chain: chain.to_string(),
            address: "0xabc".to_string(),
            pool_id: "0xabc0001".to_string(),
        }
    }

    #[test]
    fn test_reward_range_boost_never_subtracts() {
        let range = RewardRange::from_boost(2.0, -1.0);
        assert_eq!(range.min(), 2.0);
        assert_eq!(range.max(), 2.0);

        let range = RewardRange::new(3.0, 1.0);
        assert!(range.min() <= range.max());
    }

    #[test]
    fn test_total_uses_unboosted_rewards() {
        let record = PoolRecord::new(
            identity("80BAL-20WETH", "Ethereum"),
            1_000_000.0,
            5.0,
            RewardRange::from_boost(2.0, 3.0),
            vec![OtherReward {
                token: "wstETH APR".to_string(),
                apy: 1.5,
            }],
            PoolComposition::default(),
            None,
        );

        assert_eq!(record.total_apy, 8.5);
        assert_eq!(record.chain, "ethereum");
        assert_eq!(record.key(), "ethereum_80bal_20weth");
        assert!(!record.has_aura());
    }
}
