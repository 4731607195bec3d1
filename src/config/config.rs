use std::collections::BTreeMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Source A (Balancer GraphQL API) configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct BalancerSettings {
    #[serde(default = "default_balancer_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Minimum TVL (USD) for the top-pools listing.
    #[serde(default = "default_top_min_tvl")]
    pub top_min_tvl: f64,
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            api_url: default_balancer_api_url(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
            top_min_tvl: default_top_min_tvl(),
        }
    }
}

fn default_balancer_api_url() -> String {
    "https://api-v3.balancer.fi/".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    "BalancerTracker/1.0".to_string()
}

fn default_top_min_tvl() -> f64 {
    100_000.0
}

/// Source B (Aura Finance subgraphs) configuration.
///
/// Aura restakes Balancer pool shares and passes the maximum veBAL boost
/// to every depositor, plus AURA rewards on top.
#[derive(Debug, Deserialize, Clone)]
pub struct AuraSettings {
    /// Enable the overlay for every tracked pool (pools can also opt in individually)
    #[serde(default)]
    pub enabled: bool,
    /// Boost multiplier granted by Aura (max veBAL boost)
    #[serde(default = "default_aura_boost")]
    pub boost: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Chain name → subgraph endpoint
    #[serde(default = "default_aura_subgraph_urls")]
    pub subgraph_urls: BTreeMap<String, String>,
}

impl Default for AuraSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            boost: default_aura_boost(),
            timeout_secs: default_timeout_secs(),
            subgraph_urls: default_aura_subgraph_urls(),
        }
    }
}

fn default_aura_boost() -> f64 {
    2.5
}

const AURA_SUBGRAPH_BASE: &str =
    "https://api.subgraph.ormilabs.com/api/public/396b336b-4ed7-469f-a8f4-468e1e26e9a8/subgraphs";

fn default_aura_subgraph_urls() -> BTreeMap<String, String> {
    [
        ("ethereum", "mainnet"),
        ("mainnet", "mainnet"),
        ("arbitrum", "arbitrum"),
        ("optimism", "optimism"),
        ("base", "base"),
        ("polygon", "polygon"),
        ("avalanche", "avalanche"),
    ]
    .into_iter()
    .map(|(chain, network)| {
        (
            chain.to_string(),
            format!("{AURA_SUBGRAPH_BASE}/aura-finance-{network}/v0.0.1/"),
        )
    })
    .collect()
}

/// Spot price oracle (CoinGecko) configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct PriceSettings {
    #[serde(default = "default_price_api_url")]
    pub api_url: String,
    #[serde(default = "default_price_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempts on rate limiting before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff base; attempt n waits base * 2^n
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,
    /// Tracked symbol → oracle id. Several symbols may share one id.
    #[serde(default = "default_oracle_ids")]
    pub oracle_ids: BTreeMap<String, String>,
    /// Symbol whose APR falls back to the boosted source-A figure when unpriced
    #[serde(default = "default_primary_symbol")]
    pub primary_symbol: String,
    #[serde(default = "default_secondary_symbol")]
    pub secondary_symbol: String,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            api_url: default_price_api_url(),
            timeout_secs: default_price_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
            oracle_ids: default_oracle_ids(),
            primary_symbol: default_primary_symbol(),
            secondary_symbol: default_secondary_symbol(),
        }
    }
}

fn default_price_api_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price".to_string()
}

fn default_price_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> u64 {
    2
}

fn default_oracle_ids() -> BTreeMap<String, String> {
    [
        ("AURA", "aura-finance"),
        ("BAL", "balancer"),
        ("GHO", "gho"),
        ("USDC", "usd-coin"),
        ("OP", "optimism"),
        ("axlOP", "optimism"),
    ]
    .into_iter()
    .map(|(symbol, id)| (symbol.to_string(), id.to_string()))
    .collect()
}

fn default_primary_symbol() -> String {
    "BAL".to_string()
}

fn default_secondary_symbol() -> String {
    "AURA".to_string()
}

/// History retention.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HistorySettings {
    /// Keep at most this many entries per pool (unbounded when absent)
    #[serde(default)]
    pub max_snapshots: Option<usize>,
}

/// Root application configuration.
///
/// Loaded from an optional `config.{yaml,toml,json}` file and `BALTRACK__*`
/// environment variables. Every field has a default.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_pools_file")]
    pub pools_file: String,
    #[serde(default)]
    pub balancer: BalancerSettings,
    #[serde(default)]
    pub aura: AuraSettings,
    #[serde(default)]
    pub prices: PriceSettings,
    #[serde(default)]
    pub history: HistorySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pools_file: default_pools_file(),
            balancer: BalancerSettings::default(),
            aura: AuraSettings::default(),
            prices: PriceSettings::default(),
            history: HistorySettings::default(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_pools_file() -> String {
    "pools.json".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("config")
    }

    pub fn from_file(name: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(name).required(false))
            .add_source(Environment::with_prefix("BALTRACK").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
