//! APY decomposition.
//!
//! Source A reports yield as a list of typed APR items (fractions). These are
//! normalized into swap-fee APY, the primary reward range and miscellaneous
//! rewards. Source B reports raw per-second reward rates, which are priced
//! and annualised into the overlay APR.

use log::debug;

use super::price_cache::PriceLookup;
use crate::{
    api::{AprItem, AuraPool},
    db::models::{OtherReward, RewardRange},
    utils::{parse_f64_or_zero, str_to_f64_with_decimals, SECONDS_PER_YEAR},
};

/// Staked LP shares always carry 18 decimals.
const LP_SHARE_DECIMALS: u8 = 18;

/// Semantic type of a source A APR item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardKind {
    /// Trading fees earned by liquidity providers
    SwapFee,
    /// Primary token emissions at no boost
    BaseEmission,
    /// Extra primary emissions unlocked by a full boost
    BoostEmission,
    Other,
}

impl RewardKind {
    pub fn from_api_type(item_type: &str) -> Self {
        match item_type {
            "SWAP_FEE_24H" => RewardKind::SwapFee,
            "VEBAL_EMISSIONS" => RewardKind::BaseEmission,
            "STAKING_BOOST" => RewardKind::BoostEmission,
            _ => RewardKind::Other,
        }
    }
}

/// Normalized source A yield, all values in percent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decomposition {
    pub base_apy: f64,
    pub bal: RewardRange,
    pub other: Vec<OtherReward>,
}

impl Decomposition {
    pub fn other_apy(&self) -> f64 {
        self.other.iter().map(|r| r.apy).sum()
    }

    /// Unboosted total: swap fees, reward floor and miscellaneous rewards.
    pub fn total_apy(&self) -> f64 {
        self.base_apy + self.bal.min() + self.other_apy()
    }
}

/// Split APR items into base, primary reward range and other rewards.
///
/// Items with a non-positive value are ignored whatever their kind. Several
/// items of the same kind add up.
pub fn decompose(items: &[AprItem]) -> Decomposition {
    let mut base_apy = 0.0;
    let mut bal_min = 0.0;
    let mut bal_boost = 0.0;
    let mut other = Vec::new();

    for item in items {
        let apy = item.apr * 100.0;
        if !apy.is_finite() || apy <= 0.0 {
            continue;
        }

        match RewardKind::from_api_type(&item.item_type) {
            RewardKind::SwapFee => base_apy += apy,
            RewardKind::BaseEmission => bal_min += apy,
            RewardKind::BoostEmission => bal_boost += apy,
            RewardKind::Other => other.push(OtherReward {
                token: item.title.clone(),
                apy,
            }),
        }
    }

    Decomposition {
        base_apy,
        bal: RewardRange::from_boost(bal_min, bal_boost),
        other,
    }
}

/// Which reward symbols count as the primary and secondary overlay currencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardRoles {
    pub primary: String,
    pub secondary: String,
}

impl Default for RewardRoles {
    fn default() -> Self {
        Self {
            primary: "BAL".to_string(),
            secondary: "AURA".to_string(),
        }
    }
}

/// Overlay APR split by role, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OverlayApr {
    pub total: f64,
    pub bal: f64,
    pub aura: f64,
    pub extra: f64,
}

/// Annualised APR of one reward stream.
fn reward_apr(rate_per_second: f64, decimals: u8, usd_price: f64, tvl: f64) -> f64 {
    let tokens_per_year = rate_per_second / 10_f64.powi(decimals as i32) * SECONDS_PER_YEAR;
    tokens_per_year * usd_price / tvl * 100.0
}

/// APR earned by staking through the overlay protocol.
///
/// Returns `None` when `tvl` is not positive. An unpriced primary token
/// contributes `bal_max` instead of zero; other unpriced tokens contribute
/// nothing.
pub fn overlay_apr(
    pool: &AuraPool,
    tvl: f64,
    bal_max: f64,
    prices: &impl PriceLookup,
    roles: &RewardRoles,
) -> Option<OverlayApr> {
    if tvl <= 0.0 {
        return None;
    }

    let mut apr = OverlayApr::default();

    for reward in &pool.reward_data {
        let rate = parse_f64_or_zero(&reward.reward_rate);
        if rate <= 0.0 {
            continue;
        }

        let symbol = reward.token.symbol.as_str();
        let contribution = match prices.price(symbol) {
            Some(price) => reward_apr(rate, reward.token.decimals(), price, tvl),
            None if symbol == roles.primary => bal_max,
            None => {
                debug!("No price for {}, dropping its overlay reward", symbol);
                continue;
            },
        };

        if symbol == roles.primary {
            apr.bal += contribution;
        } else if symbol == roles.secondary {
            apr.aura += contribution;
        } else {
            apr.extra += contribution;
        }
    }

    apr.total = apr.bal + apr.aura + apr.extra;
    Some(apr)
}

/// USD value of LP shares staked through the overlay.
///
/// Shares are priced at `tvl / total_shares`, or 1.0 when the share count is unknown.
pub fn overlay_tvl(staked_raw: &str, tvl: f64, total_shares: f64) -> f64 {
    let staked = str_to_f64_with_decimals(staked_raw, LP_SHARE_DECIMALS).unwrap_or(0.0);
    let share_price = if total_shares > 0.0 {
        tvl / total_shares
    } else {
        1.0
    };
    staked * share_price
}
