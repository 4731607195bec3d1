pub mod history;
pub mod pool_record;
pub mod snapshot;

pub use history::{HistoryEntry, HistoryFile, PoolHistory, PoolHistoryMetadata};
pub use pool_record::{
    AuraOverlay, OtherReward, PoolComposition, PoolIdentity, PoolRecord, RewardRange,
};
pub use snapshot::{
    RawSnapshotFile, SnapshotAura, SnapshotFile, SnapshotMetadata, SnapshotPool, SOURCE_NAME,
    STORE_VERSION,
};
