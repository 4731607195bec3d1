use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use log::{info, warn};

use super::{
    price_cache::PriceCache,
    rewards::{decompose, overlay_apr, overlay_tvl, Decomposition, RewardRoles},
};
use crate::{
    api::{
        is_full_pool_id, ApiPool, AuraApi, BalancerApi, CoinGeckoApi, PoolSource, PoolToken,
        PriceSource, StakingSource,
    },
    config::{PoolConfig, PriceSettings, Settings},
    db::{
        models::{AuraOverlay, PoolComposition, PoolIdentity, PoolRecord},
        Database, PersistOutcome,
    },
};

const UNKNOWN_NAME: &str = "Unknown";

/// Builds [`PoolRecord`]s from the remote sources.
///
/// Holds the long-lived clients; each public entry point creates its own
/// [`PriceCache`], so prices are fetched at most once per run.
pub struct Tracker {
    pools: Arc<dyn PoolSource>,
    staking: Option<Arc<dyn StakingSource>>,
    prices: Arc<dyn PriceSource>,
    price_settings: PriceSettings,
    roles: RewardRoles,
    aura_boost: f64,
    top_min_tvl: f64,
}

impl Tracker {
    pub fn new(
        pools: Arc<dyn PoolSource>,
        staking: Option<Arc<dyn StakingSource>>,
        prices: Arc<dyn PriceSource>,
        settings: &Settings,
    ) -> Self {
        Self {
            pools,
            staking,
            prices,
            price_settings: settings.prices.clone(),
            roles: RewardRoles {
                primary: settings.prices.primary_symbol.clone(),
                secondary: settings.prices.secondary_symbol.clone(),
            },
            aura_boost: settings.aura.boost,
            top_min_tvl: settings.balancer.top_min_tvl,
        }
    }

    /// Build the production clients. The staking source is only created when
    /// `with_overlay` is set.
    pub fn from_settings(settings: &Settings, with_overlay: bool) -> Result<Self> {
        let user_agent = settings.balancer.user_agent.as_str();

        let pools: Arc<dyn PoolSource> = Arc::new(BalancerApi::new(&settings.balancer)?);
        let staking: Option<Arc<dyn StakingSource>> = if with_overlay {
            Some(Arc::new(AuraApi::new(&settings.aura, user_agent)?))
        } else {
            None
        };
        let prices: Arc<dyn PriceSource> = Arc::new(CoinGeckoApi::new(&settings.prices, user_agent)?);

        Ok(Self::new(pools, staking, prices, settings))
    }

    pub fn has_overlay_source(&self) -> bool {
        self.staking.is_some()
    }

    /// Fresh price memo for one run.
    pub fn price_cache(&self) -> PriceCache {
        PriceCache::new(self.prices.clone(), &self.price_settings)
    }

    /// Turn a source A pool into a record, attaching the overlay when asked to.
    pub async fn parse_pool(
        &self,
        raw: &ApiPool,
        chain: &str,
        overlay_enabled: bool,
        prices: &mut PriceCache,
    ) -> PoolRecord {
        let dynamic = &raw.dynamic_data;
        let tvl = dynamic.total_liquidity;
        let decomposition = decompose(&dynamic.apr_items);

        let aura = if overlay_enabled {
            self.overlay_for(raw, chain, &decomposition, prices).await
        } else {
            None
        };

        let identity = PoolIdentity {
            name: raw
                .name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            chain: chain.to_string(),
            address: raw.address.clone(),
            pool_id: raw.id.clone(),
        };

        PoolRecord::new(
            identity,
            tvl,
            decomposition.base_apy,
            decomposition.bal,
            decomposition.other,
            composition(&raw.pool_tokens),
            aura,
        )
    }

    /// The overlay for one pool, or `None` unless every part of it is known.
    async fn overlay_for(
        &self,
        raw: &ApiPool,
        chain: &str,
        decomposition: &Decomposition,
        prices: &mut PriceCache,
    ) -> Option<AuraOverlay> {
        let staking = self.staking.as_ref()?;
        let tvl = raw.dynamic_data.total_liquidity;

        let index = staking.get_pools(chain).await;
        let staking_pool = index.get(&raw.address.to_lowercase())?;

        prices.ensure_loaded().await;
        let apr = overlay_apr(staking_pool, tvl, decomposition.bal.max(), &*prices, &self.roles)?;

        let Some(staking_contract) = staking_pool.staking_contract() else {
            warn!("Staking pool for {} has no reward contract, skipping overlay", raw.address);
            return None;
        };

        Some(AuraOverlay {
            apy: decomposition.base_apy + apr.total + decomposition.other_apy(),
            tvl: overlay_tvl(
                &staking_pool.total_staked,
                tvl,
                raw.dynamic_data.total_shares,
            ),
            boost: self.aura_boost,
            staking_contract: staking_contract.to_string(),
        })
    }

    /// Look up one pool by address or pool id.
    pub async fn get_pool(
        &self,
        chain: &str,
        identifier: &str,
        overlay_enabled: bool,
    ) -> Option<PoolRecord> {
        let raw = self.pools.find_pool(identifier, chain).await?;
        let mut prices = self.price_cache();
        Some(self.parse_pool(&raw, chain, overlay_enabled, &mut prices).await)
    }

    /// Largest pools on a chain by TVL. Never carries the overlay.
    pub async fn top_pools(&self, chain: &str, limit: usize) -> Vec<PoolRecord> {
        let raw_pools = self.pools.get_top_pools(chain, limit, self.top_min_tvl).await;
        let mut prices = self.price_cache();

        let mut records = Vec::with_capacity(raw_pools.len());
        for raw in &raw_pools {
            records.push(self.parse_pool(raw, chain, false, &mut prices).await);
        }
        records
    }

    /// Fetch every configured pool.
    ///
    /// Pools are grouped by chain in first-seen order. Addresses on a chain
    /// are resolved with one batch lookup; full pool ids are fetched one by
    /// one. A pool gets the overlay when its entry enables it or
    /// `overlay_default` is set.
    pub async fn track_pools(&self, configs: &[PoolConfig], overlay_default: bool) -> Vec<PoolRecord> {
        let groups = group_by_chain(configs);
        let mut prices = self.price_cache();

        self.prefetch_staking(&groups, overlay_default).await;

        let mut records = Vec::new();
        for (chain, chain_configs) in &groups {
            info!("Fetching {} pools from {}...", chain_configs.len(), chain);

            let (full_ids, addresses): (Vec<&PoolConfig>, Vec<&PoolConfig>) = chain_configs
                .iter()
                .copied()
                .partition(|cfg| is_full_pool_id(&cfg.pool));

            if !addresses.is_empty() {
                let wanted: Vec<String> = addresses.iter().map(|cfg| cfg.pool.clone()).collect();
                let raw_pools = self.pools.get_pools_by_address(&wanted, chain).await;

                if raw_pools.len() < wanted.len() {
                    warn!(
                        "Found {} of {} requested pools on {}",
                        raw_pools.len(),
                        wanted.len(),
                        chain
                    );
                }

                for raw in &raw_pools {
                    let overlay = overlay_default
                        || addresses
                            .iter()
                            .find(|cfg| cfg.pool.eq_ignore_ascii_case(&raw.address))
                            .is_some_and(|cfg| cfg.aura_enabled);
                    records.push(self.parse_pool(raw, chain, overlay, &mut prices).await);
                }
            }

            for cfg in full_ids {
                let Some(raw) = self.pools.get_pool_by_id(&cfg.pool, chain).await else {
                    warn!("Pool {} not found on {}", cfg.pool, chain);
                    continue;
                };
                let overlay = overlay_default || cfg.aura_enabled;
                records.push(self.parse_pool(&raw, chain, overlay, &mut prices).await);
            }
        }

        info!("Tracked {} pools across {} chains", records.len(), groups.len());
        records
    }

    /// Warm the staking index of every chain that will need it, concurrently.
    async fn prefetch_staking(&self, groups: &[(String, Vec<&PoolConfig>)], overlay_default: bool) {
        let Some(staking) = self.staking.as_ref() else {
            return;
        };

        let chains: Vec<&str> = groups
            .iter()
            .filter(|(_, cfgs)| overlay_default || cfgs.iter().any(|cfg| cfg.aura_enabled))
            .map(|(chain, _)| chain.as_str())
            .collect();

        join_all(chains.into_iter().map(|chain| staking.get_pools(chain))).await;
    }

    /// Track every configured pool and persist the batch.
    ///
    /// Nothing is written when no pool could be fetched.
    pub async fn fetch_and_save(
        &self,
        db: &Database,
        configs: &[PoolConfig],
        overlay_default: bool,
    ) -> Result<(Vec<PoolRecord>, Option<PersistOutcome>)> {
        let records = self.track_pools(configs, overlay_default).await;
        if records.is_empty() {
            warn!("No pool data fetched, nothing saved");
            return Ok((records, None));
        }

        let outcome = db.persist(&records)?;
        Ok((records, Some(outcome)))
    }
}

/// Group configs by lowercase chain, keeping the first-seen order of chains.
fn group_by_chain(configs: &[PoolConfig]) -> Vec<(String, Vec<&PoolConfig>)> {
    let mut groups: Vec<(String, Vec<&PoolConfig>)> = Vec::new();
    for cfg in configs {
        let chain = cfg.chain.to_lowercase();
        match groups.iter_mut().find(|(c, _)| *c == chain) {
            Some((_, cfgs)) => cfgs.push(cfg),
            None => groups.push((chain, vec![cfg])),
        }
    }
    groups
}

/// Token composition in pool order.
///
/// Tokens without a weight (stable and composable pools) are shown as an equal split.
fn composition(tokens: &[PoolToken]) -> PoolComposition {
    let equal_share = 100.0 / tokens.len().max(1) as f64;
    let mut composition = PoolComposition::default();

    for token in tokens {
        let symbol = token
            .symbol
            .clone()
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        let pct = token
            .weight
            .filter(|w| *w != 0.0)
            .map(|w| w * 100.0)
            .unwrap_or(equal_share);

        composition.coin_ratios.push(format!("{symbol}: {pct:.1}%"));
        composition.coin_amounts.push(token.balance);
        // No per-token price source yet.
        composition.coin_prices.push(0.0);
        composition.coins.push(symbol);
    }

    composition
}
