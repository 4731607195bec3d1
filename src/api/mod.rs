//! Remote data sources.
//!
//! - [`balancer`] - Pool metrics from the Balancer v3 GraphQL API (source A)
//! - [`aura`] - Staking overlay data from the Aura Finance subgraphs (source B)
//! - [`coingecko`] - USD spot prices for reward tokens
//!
//! The tracker only talks to these through the traits below so tests can
//! swap in in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use thiserror::Error;

pub mod aura;
pub mod balancer;
pub mod coingecko;
mod graphql;

pub use aura::{AuraApi, AuraPool, LpToken, RewardData, RewardToken};
pub use balancer::{chain_to_api_enum, AprItem, ApiPool, BalancerApi, DynamicData, PoolToken};
pub use coingecko::CoinGeckoApi;

/// Hex length (without `0x`) above which an identifier is a full pool id.
///
/// An address is 40 hex characters and a v2 pool id 64, so anything in
/// between is treated as an address.
const FULL_ID_MIN_HEX_LEN: usize = 42;

/// Whether `identifier` is a full pool id rather than a contract address.
pub fn is_full_pool_id(identifier: &str) -> bool {
    identifier.trim_start_matches("0x").len() > FULL_ID_MIN_HEX_LEN
}

/// Pool metrics source (source A).
///
/// Implementations never fail: transport and decode problems are logged and
/// surface as "no pool" / an empty list.
#[async_trait]
pub trait PoolSource: Send + Sync {
    async fn get_pool_by_id(&self, pool_id: &str, chain: &str) -> Option<ApiPool>;

    /// Pools whose address matches one of `addresses` (case-insensitive), from
    /// the first page of pools on `chain` ordered by TVL.
    async fn get_pools_by_address(&self, addresses: &[String], chain: &str) -> Vec<ApiPool>;

    /// Largest pools on `chain` with at least `min_tvl` USD, ordered by TVL.
    async fn get_top_pools(&self, chain: &str, limit: usize, min_tvl: f64) -> Vec<ApiPool>;

    /// Resolve an identifier that may be either a pool id or an address.
    async fn find_pool(&self, identifier: &str, chain: &str) -> Option<ApiPool> {
        if is_full_pool_id(identifier) {
            return self.get_pool_by_id(identifier, chain).await;
        }

        self.get_pools_by_address(&[identifier.to_string()], chain)
            .await
            .into_iter()
            .next()
    }
}

/// Staking overlay source (source B).
#[async_trait]
pub trait StakingSource: Send + Sync {
    /// All staking pools on `chain`, keyed by lowercase LP token address.
    ///
    /// Fetched once per chain and memoized; an unsupported chain or a failed
    /// request yields an empty index.
    async fn get_pools(&self, chain: &str) -> Arc<FxHashMap<String, AuraPool>>;

    async fn find_pool_by_lp_address(&self, lp_address: &str, chain: &str) -> Option<AuraPool> {
        self.get_pools(chain)
            .await
            .get(&lp_address.to_lowercase())
            .cloned()
    }
}

/// Failure modes of a price request.
#[derive(Error, Debug)]
pub enum PriceFetchError {
    /// The oracle asked us to slow down; worth retrying after a pause.
    #[error("rate limited by price oracle")]
    RateLimited,

    #[error("price request failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// USD spot price source.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Price every oracle id in one request. Ids without a price are omitted.
    async fn fetch_prices(&self, ids: &[String]) -> Result<FxHashMap<String, f64>, PriceFetchError>;
}
