use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{graphql::GraphQlClient, PoolSource};
use crate::{
    config::BalancerSettings,
    utils::{de_f64_lenient, de_null_default, de_opt_f64_lenient},
};

/// Page size used when resolving pools by address.
const ADDRESS_LOOKUP_PAGE: usize = 1000;

macro_rules! pool_fields {
    () => {
        "id
        address
        name
        symbol
        type
        version
        dynamicData {
            totalLiquidity
            totalShares
            fees24h
            volume24h
            aprItems {
                title
                type
                apr
                rewardTokenSymbol
            }
        }
        poolTokens {
            address
            symbol
            decimals
            balance
            weight
            priceRate
        }"
    };
}

const GET_POOL_QUERY: &str = concat!(
    "query GetPool($poolId: String!, $chain: GqlChain!) {
        poolGetPool(id: $poolId, chain: $chain) {",
    pool_fields!(),
    "}
    }"
);

const GET_POOLS_QUERY: &str = concat!(
    "query GetPools($chain: [GqlChain!], $minTvl: Float, $first: Int) {
        poolGetPools(
            where: {chainIn: $chain, minTvl: $minTvl}
            first: $first
            orderBy: totalLiquidity
            orderDirection: desc
        ) {",
    pool_fields!(),
    "}
    }"
);

// ============================================
// Response types
// ============================================

/// A pool as returned by the Balancer API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPool {
    #[serde(default, deserialize_with = "de_null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "de_null_default")]
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(rename = "type", default)]
    pub pool_type: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub dynamic_data: DynamicData,
    #[serde(default, deserialize_with = "de_null_default")]
    pub pool_tokens: Vec<PoolToken>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicData {
    /// Pool TVL in USD
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub total_liquidity: f64,
    /// Outstanding pool shares (18 decimals already applied)
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub total_shares: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub fees24h: f64,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub volume24h: f64,
    #[serde(default, deserialize_with = "de_null_default")]
    pub apr_items: Vec<AprItem>,
}

/// One yield component. `apr` is a fraction (0.05 = 5%).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AprItem {
    #[serde(default, deserialize_with = "de_null_default")]
    pub title: String,
    #[serde(rename = "type", default, deserialize_with = "de_null_default")]
    pub item_type: String,
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub apr: f64,
    #[serde(default)]
    pub reward_token_symbol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolToken {
    #[serde(default, deserialize_with = "de_null_default")]
    pub address: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    /// Human-readable balance (decimals already applied)
    #[serde(default, deserialize_with = "de_f64_lenient")]
    pub balance: f64,
    /// Normalized weight for weighted pools, absent otherwise
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64_lenient")]
    pub price_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PoolGetPoolData {
    #[serde(rename = "poolGetPool", default)]
    pool: Option<ApiPool>,
}

#[derive(Debug, Deserialize)]
struct PoolGetPoolsData {
    #[serde(rename = "poolGetPools", default, deserialize_with = "de_null_default")]
    pools: Vec<ApiPool>,
}

/// Map a chain name to the API's `GqlChain` enum. Unknown chains map to mainnet.
pub fn chain_to_api_enum(chain: &str) -> &'static str {
    match chain.to_lowercase().as_str() {
        "ethereum" | "mainnet" => "MAINNET",
        "arbitrum" => "ARBITRUM",
        "polygon" => "POLYGON",
        "optimism" => "OPTIMISM",
        "base" => "BASE",
        "gnosis" => "GNOSIS",
        "avalanche" => "AVALANCHE",
        "zkevm" => "ZKEVM",
        "fraxtal" => "FRAXTAL",
        "mode" => "MODE",
        "sonic" => "SONIC",
        _ => "MAINNET",
    }
}

/// Balancer v3 GraphQL API client.
#[derive(Debug, Clone)]
pub struct BalancerApi {
    client: GraphQlClient,
    endpoint: Url,
}

impl BalancerApi {
    pub fn new(settings: &BalancerSettings) -> Result<Self> {
        let endpoint = Url::parse(&settings.api_url)?;
        let client = GraphQlClient::new("Balancer API", settings.timeout_secs, &settings.user_agent)?;

        info!("Balancer API endpoint: {}", endpoint);

        Ok(Self { client, endpoint })
    }

    async fn fetch_pools(&self, chain: &str, first: usize, min_tvl: f64) -> Vec<ApiPool> {
        let variables = json!({
            "chain": [chain_to_api_enum(chain)],
            "minTvl": min_tvl,
            "first": first,
        });

        self.client
            .query::<PoolGetPoolsData>(&self.endpoint, GET_POOLS_QUERY, Some(variables))
            .await
            .map(|data| data.pools)
            .unwrap_or_default()
    }
}

#[async_trait]
impl PoolSource for BalancerApi {
    async fn get_pool_by_id(&self, pool_id: &str, chain: &str) -> Option<ApiPool> {
        let variables = json!({
            "poolId": pool_id,
            "chain": chain_to_api_enum(chain),
        });

        self.client
            .query::<PoolGetPoolData>(&self.endpoint, GET_POOL_QUERY, Some(variables))
            .await
            .and_then(|data| data.pool)
    }

    async fn get_pools_by_address(&self, addresses: &[String], chain: &str) -> Vec<ApiPool> {
        let wanted: Vec<String> = addresses.iter().map(|a| a.to_lowercase()).collect();

        let pools = self.fetch_pools(chain, ADDRESS_LOOKUP_PAGE, 0.0).await;
        debug!("Fetched {} {} pools for address lookup", pools.len(), chain);

        filter_by_address(pools, &wanted)
    }

    async fn get_top_pools(&self, chain: &str, limit: usize, min_tvl: f64) -> Vec<ApiPool> {
        self.fetch_pools(chain, limit, min_tvl).await
    }
}

/// Keep pools whose address is in `wanted` (already lowercased), in source order.
fn filter_by_address(pools: Vec<ApiPool>, wanted: &[String]) -> Vec<ApiPool> {
    pools
        .into_iter()
        .filter(|pool| wanted.contains(&pool.address.to_lowercase()))
        .collect()
}
