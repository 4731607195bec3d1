pub mod price_cache;
pub mod rewards;
pub mod tracker;

pub use price_cache::{PriceCache, PriceLookup, PriceStatus};
pub use rewards::{
    decompose, overlay_apr, overlay_tvl, Decomposition, OverlayApr, RewardKind, RewardRoles,
};
pub use tracker::Tracker;
