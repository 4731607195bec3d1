use std::{collections::BTreeMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{
    graphql::{parse_endpoint, GraphQlClient},
    StakingSource,
};
use crate::{
    config::AuraSettings,
    utils::{de_null_default, de_string_lenient},
};

const STAKING_POOLS_QUERY: &str = "{
    pools(first: 500) {
        id
        lpToken { id symbol }
        totalStaked
        rewardPool
        rewardData {
            token { symbol decimals }
            rewardRate
        }
    }
}";

/// Reward tokens are assumed to have 18 decimals unless the subgraph says otherwise.
const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// A staking pool from the Aura subgraph.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuraPool {
    #[serde(default, deserialize_with = "de_null_default")]
    pub id: String,
    #[serde(default)]
    pub lp_token: Option<LpToken>,
    /// Raw staked LP shares (18 decimals)
    #[serde(default, deserialize_with = "de_string_lenient")]
    pub total_staked: String,
    /// Reward (staking) contract; this is where users deposit
    #[serde(default)]
    pub reward_pool: Option<String>,
    #[serde(default, deserialize_with = "de_null_default")]
    pub reward_data: Vec<RewardData>,
}

impl AuraPool {
    /// Lowercase LP token address, if any.
    pub fn lp_address(&self) -> Option<String> {
        self.lp_token
            .as_ref()
            .map(|token| token.id.to_lowercase())
            .filter(|id| !id.is_empty())
    }

    /// Reward contract address, if the subgraph reported a non-empty one.
    pub fn staking_contract(&self) -> Option<&str> {
        self.reward_pool.as_deref().filter(|addr| !addr.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LpToken {
    #[serde(default, deserialize_with = "de_null_default")]
    pub id: String,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// One reward stream of a staking pool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardData {
    #[serde(default, deserialize_with = "de_null_default")]
    pub token: RewardToken,
    /// Raw tokens emitted per second
    #[serde(default, deserialize_with = "de_string_lenient")]
    pub reward_rate: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RewardToken {
    #[serde(default, deserialize_with = "de_null_default")]
    pub symbol: String,
    #[serde(default)]
    pub decimals: Option<u8>,
}

impl RewardToken {
    /// Declared decimals, with missing or zero treated as 18.
    pub fn decimals(&self) -> u8 {
        self.decimals
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_TOKEN_DECIMALS)
    }
}

#[derive(Debug, Deserialize)]
struct PoolsData {
    #[serde(default, deserialize_with = "de_null_default")]
    pools: Vec<AuraPool>,
}

type PoolIndex = Arc<FxHashMap<String, AuraPool>>;

/// Aura Finance subgraph client.
///
/// Each chain's pool list is fetched at most once per client; failures are
/// memoized as an empty index too.
pub struct AuraApi {
    client: GraphQlClient,
    subgraph_urls: BTreeMap<String, String>,
    pools_cache: Mutex<FxHashMap<String, PoolIndex>>,
}

impl AuraApi {
    pub fn new(settings: &AuraSettings, user_agent: &str) -> Result<Self> {
        let client = GraphQlClient::new("Aura subgraph", settings.timeout_secs, user_agent)?;

        info!(
            "Aura overlay enabled for chains: {}",
            settings.subgraph_urls.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            client,
            subgraph_urls: settings
                .subgraph_urls
                .iter()
                .map(|(chain, url)| (chain.to_lowercase(), url.clone()))
                .collect(),
            pools_cache: Mutex::new(FxHashMap::default()),
        })
    }

    async fn fetch_index(&self, chain: &str) -> FxHashMap<String, AuraPool> {
        let Some(raw_url) = self.subgraph_urls.get(chain) else {
            debug!("No Aura subgraph configured for {}", chain);
            return FxHashMap::default();
        };
        let Some(endpoint) = parse_endpoint("Aura subgraph", raw_url) else {
            return FxHashMap::default();
        };

        let pools = self
            .client
            .query::<PoolsData>(&endpoint, STAKING_POOLS_QUERY, None)
            .await
            .map(|data| data.pools)
            .unwrap_or_default();

        let index = index_by_lp_address(pools);
        info!("Loaded {} Aura pools on {}", index.len(), chain);
        index
    }
}

#[async_trait]
impl StakingSource for AuraApi {
    async fn get_pools(&self, chain: &str) -> PoolIndex {
        let chain = chain.to_lowercase();

        // Held across the fetch so concurrent callers for one chain share a request.
        let mut cache = self.pools_cache.lock().await;
        if let Some(index) = cache.get(&chain) {
            return index.clone();
        }

        let index = Arc::new(self.fetch_index(&chain).await);
        cache.insert(chain, index.clone());
        index
    }
}

/// Index pools by lowercase LP token address, dropping pools without one.
fn index_by_lp_address(pools: Vec<AuraPool>) -> FxHashMap<String, AuraPool> {
    pools
        .into_iter()
        .filter_map(|pool| pool.lp_address().map(|lp| (lp, pool)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_and_index() {
        let raw = r#"{
            "pools": [
                {
                    "id": "1",
                    "lpToken": {"id": "0xABCdef", "symbol": "B-80BAL-20WETH"},
                    "totalStaked": "2000000000000000000000",
                    "rewardPool": "0xreward",
                    "rewardData": [
                        {"token": {"symbol": "BAL", "decimals": 18}, "rewardRate": "1000000000000000"},
                        {"token": {"symbol": "AURA", "decimals": null}, "rewardRate": 5}
                    ]
                },
                {"id": "2", "lpToken": null, "totalStaked": null},
                {"id": "3", "lpToken": {"id": ""}}
            ]
        }"#;

        let data: PoolsData = serde_json::from_str(raw).unwrap();
        let index = index_by_lp_address(data.pools);

        assert_eq!(index.len(), 1);
        let pool = &index["0xabcdef"];
        assert_eq!(pool.staking_contract(), Some("0xreward"));
        assert_eq!(pool.reward_data[1].reward_rate, "5");
        assert_eq!(pool.reward_data[1].token.decimals(), 18);
    }

    #[test]
    fn test_reward_token_decimals_default() {
        let token = RewardToken {
            symbol: "USDC".to_string(),
            decimals: Some(6),
        };
        assert_eq!(token.decimals(), 6);
        assert_eq!(RewardToken::default().decimals(), 18);
        assert_eq!(
            RewardToken {
                decimals: Some(0),
                ..Default::default()
            }
            .decimals(),
            18
        );
    }

    #[test]
    fn test_empty_reward_pool_is_absent() {
        let pool = AuraPool {
            reward_pool: Some(String::new()),
            ..Default::default()
        };
        assert!(pool.staking_contract().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_chain_yields_empty_index() {
        let settings = AuraSettings {
            subgraph_urls: BTreeMap::new(),
            ..Default::default()
        };
        let api = AuraApi::new(&settings, "test").unwrap();

        assert!(api.get_pools("ethereum").await.is_empty());
        assert!(api.find_pool_by_lp_address("0xabc", "ethereum").await.is_none());
    }
}
