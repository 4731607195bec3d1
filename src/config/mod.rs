#[allow(clippy::module_inception)]
mod config;
mod pools;

pub use config::{AuraSettings, BalancerSettings, HistorySettings, PriceSettings, Settings};
pub use pools::{load_pools_config, PoolConfig, PoolsFile};
