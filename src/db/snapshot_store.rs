use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};

use super::{
    json::{read_json, write_json},
    models::{
        PoolRecord, RawSnapshotFile, SnapshotFile, SnapshotMetadata, SnapshotPool, STORE_VERSION,
    },
};
use crate::utils::TIMESTAMP_FORMAT;

pub const LATEST_FILE_NAME: &str = "balancer_pools_latest.json";

/// Current-state store: one JSON file fully replaced on every save.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_dir: PathBuf,
    latest_file: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            latest_file: data_dir.join(LATEST_FILE_NAME),
            data_dir,
        }
    }

    pub fn path(&self) -> &Path {
        &self.latest_file
    }

    /// Replace the snapshot with `records`.
    ///
    /// Returns `Ok(None)` without touching the file when `records` is empty.
    pub fn save(&self, records: &[PoolRecord]) -> Result<Option<PathBuf>> {
        self.save_at(records, Utc::now())
    }

    pub fn save_at(&self, records: &[PoolRecord], now: DateTime<Utc>) -> Result<Option<PathBuf>> {
        if records.is_empty() {
            warn!("No pool data to save");
            return Ok(None);
        }

        let file = build_snapshot(records, now, true);
        write_json(&self.latest_file, &file)?;

        info!("Saved {} pools to {}", records.len(), self.latest_file.display());
        Ok(Some(self.latest_file.clone()))
    }

    /// Load the last saved records. Missing or malformed files yield an empty list.
    pub fn load(&self) -> Vec<PoolRecord> {
        let Some(raw) = read_json::<RawSnapshotFile>(&self.latest_file) else {
            return Vec::new();
        };

        let pools: Vec<PoolRecord> = raw
            .pools
            .into_iter()
            .enumerate()
            .filter_map(|(idx, value)| match serde_json::from_value::<SnapshotPool>(value) {
                Ok(pool) => Some(pool.into_record()),
                Err(e) => {
                    warn!("Error parsing pool #{} in {}: {}", idx, self.latest_file.display(), e);
                    None
                },
            })
            .collect();

        info!("Loaded {} pools from {}", pools.len(), self.latest_file.display());
        pools
    }

    /// Read only the metadata block of the current snapshot.
    pub fn get_metadata(&self) -> Option<SnapshotMetadata> {
        let metadata = read_json::<RawSnapshotFile>(&self.latest_file)?.metadata?;

        match serde_json::from_value(metadata) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Error parsing metadata in {}: {}", self.latest_file.display(), e);
                None
            },
        }
    }

    /// Write a dated copy (`balancer_pools_YYYYMMDD.json`) next to the latest file.
    pub fn save_archive(&self, records: &[PoolRecord]) -> Result<Option<PathBuf>> {
        self.save_archive_at(records, Utc::now())
    }

    pub fn save_archive_at(
        &self,
        records: &[PoolRecord],
        now: DateTime<Utc>,
    ) -> Result<Option<PathBuf>> {
        if records.is_empty() {
            return Ok(None);
        }

        let archive_file = self
            .data_dir
            .join(format!("balancer_pools_{}.json", now.format("%Y%m%d")));

        let file = build_snapshot(records, now, false);
        write_json(&archive_file, &file)?;

        info!("Archive saved to {}", archive_file.display());
        Ok(Some(archive_file))
    }
}

fn build_snapshot(records: &[PoolRecord], now: DateTime<Utc>, with_aura_flag: bool) -> SnapshotFile {
    SnapshotFile {
        version: STORE_VERSION.to_string(),
        metadata: SnapshotMetadata::summarize(
            records,
            now.format(TIMESTAMP_FORMAT).to_string(),
            with_aura_flag,
        ),
        pools: records.iter().map(SnapshotPool::from_record).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{AuraOverlay, OtherReward, PoolComposition, PoolIdentity, RewardRange};
    use chrono::TimeZone;

    fn record(name: &str, chain: &str, aura: bool) -> PoolRecord {
        PoolRecord::new(
            PoolIdentity {
                name: name.to_string(),
                chain: chain.to_string(),
                address: "0xAbC".to_string(),
                pool_id: "0xabc000".to_string(),
            },
            1_234_567.891,
            1.234567,
            RewardRange::from_boost(2.000049, 3.33333),
            vec![OtherReward {
                token: "Merkl".to_string(),
                apy: 0.5,
            }],
            PoolComposition {
                coins: vec!["BAL".to_string(), "WETH".to_string()],
                coin_ratios: vec!["BAL: 80.0%".to_string(), "WETH: 20.0%".to_string()],
                coin_amounts: vec![1.1234567, 2.0],
                coin_prices: vec![0.0, 0.0],
            },
            aura.then(|| AuraOverlay {
                apy: 9.87654,
                tvl: 1000.005,
                boost: 2.5,
                staking_contract: "0xreward".to_string(),
            }),
        )
    }

    #[test]
    fn test_save_then_load_round_trips_rounded_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let records = vec![record("80BAL-20WETH", "ethereum", true), record("Stable", "arbitrum", false)];

        store.save(&records).unwrap();
        let loaded = store.load();

        assert_eq!(loaded.len(), 2);
        let first = &loaded[0];
        assert_eq!(first.tvl, 1_234_567.89);
        assert_eq!(first.base_apy, 1.2346);
        assert_eq!(first.bal_rewards_apy.min(), 2.0);
        assert_eq!(first.bal_rewards_apy.max(), 5.3334);
        assert_eq!(first.total_apy, 3.7346);
        assert_eq!(first.coin_amounts, vec![1.123457, 2.0]);
        let aura = first.aura.as_ref().unwrap();
        assert_eq!(aura.apy, 9.8765);
        assert_eq!(aura.staking_contract, "0xreward");
        assert!(loaded[1].aura.is_none());

        // Loading the saved records and saving again is stable.
        store.save(&loaded).unwrap();
        assert_eq!(store.load(), loaded);
    }

    #[test]
    fn test_metadata_summary() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();
        let records = vec![
            record("a", "polygon", false),
            record("b", "arbitrum", true),
            record("c", "polygon", false),
        ];

        store.save_at(&records, now).unwrap();
        let metadata = store.get_metadata().unwrap();

        assert_eq!(metadata.generated_at, "2025-03-04T05:06:07Z");
        assert_eq!(metadata.total_pools, 3);
        assert_eq!(metadata.chains, vec!["arbitrum", "polygon"]);
        assert_eq!(metadata.has_aura, Some(true));
        assert_eq!(metadata.source, "BalancerTracker");
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store.save(&[record("Wrapped ETH / USDC", "base", false)]).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["version"], "1.0");
        let pool = &raw["pools"][0];
        assert_eq!(pool["id"], "base_wrapped_eth_usdc");
        assert_eq!(pool["data"]["tvl_formatted"], "$1.23M");
        assert_eq!(pool["data"]["bal_rewards"]["max"], 5.3334);
        assert_eq!(pool["tokens"]["ratios"][0], "BAL: 80.0%");
        assert!(pool["aura"].is_null());
    }

    #[test]
    fn test_save_empty_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert_eq!(store.save(&[]).unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_load_tolerates_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        assert!(store.load().is_empty());
        assert!(store.get_metadata().is_none());

        std::fs::write(store.path(), b"{ not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_skips_undecodable_pools() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(
            store.path(),
            br#"{"version": "1.0", "pools": [{"name": "ok"}, {"name": 12}]}"#,
        )
        .unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "ok");
    }

    #[test]
    fn test_bad_metadata_does_not_hide_pools() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        std::fs::write(
            store.path(),
            br#"{"metadata": {"total_pools": "1"}, "pools": [{"name": "ok"}]}"#,
        )
        .unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "ok");
        assert!(store.get_metadata().is_none());
    }

    #[test]
    fn test_save_archive_has_no_aura_flag() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();

        let path = store
            .save_archive_at(&[record("a", "ethereum", true)], now)
            .unwrap()
            .unwrap();

        assert!(path.ends_with("balancer_pools_20250102.json"));
        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert!(raw["metadata"].get("has_aura").is_none());
    }

    #[test]
    fn test_write_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();
        let store = SnapshotStore::new(&blocker);

        assert!(store.save(&[record("a", "ethereum", false)]).is_err());
    }
}
