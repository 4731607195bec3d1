use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::config::Settings;

mod history_store;
mod json;
pub mod models;
mod snapshot_store;

pub use history_store::{AppendSummary, HistoryStore, HistoryView, HISTORY_FILE_NAME};
pub use models::PoolRecord;
pub use snapshot_store::{SnapshotStore, LATEST_FILE_NAME};

/// Combined JSON store managing the current snapshot and the history series.
///
/// The snapshot file holds the latest full batch (replaced on every save).
/// The history file holds one keyed series per pool (appended on every run).
///
/// One process is assumed to own both files for the duration of a run.
#[derive(Debug, Clone)]
pub struct Database {
    pub snapshots: SnapshotStore,
    pub history: HistoryStore,
    pub max_snapshots: Option<usize>,
    data_dir: PathBuf,
}

/// Locations written by [`Database::persist`].
#[derive(Debug, Clone, PartialEq)]
pub struct PersistOutcome {
    pub snapshot: Option<PathBuf>,
    pub history: Option<AppendSummary>,
}

impl Database {
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::open(&settings.data_dir, settings.history.max_snapshots)
    }

    pub fn open(data_dir: impl AsRef<Path>, max_snapshots: Option<usize>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        info!("Using data directory {}", data_dir.display());

        Ok(Self {
            snapshots: SnapshotStore::new(&data_dir),
            history: HistoryStore::new(&data_dir),
            max_snapshots,
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Save the snapshot and append history for the same batch.
    ///
    /// A failed snapshot write aborts before history is touched.
    pub fn persist(&self, records: &[PoolRecord]) -> Result<PersistOutcome> {
        let snapshot = self.snapshots.save(records)?;
        let history = self.history.append(records, self.max_snapshots)?;
        Ok(PersistOutcome { snapshot, history })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{PoolComposition, PoolIdentity, RewardRange};

    #[test]
    fn test_persist_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("nested"), Some(10)).unwrap();
        let record = PoolRecord::new(
            PoolIdentity {
                name: "GHO/USDC".to_string(),
                chain: "ethereum".to_string(),
                ..Default::default()
            },
            10.0,
            0.0,
            RewardRange::default(),
            Vec::new(),
            PoolComposition::default(),
            None,
        );

        let outcome = db.persist(&[record]).unwrap();

        assert_eq!(outcome.snapshot.as_deref(), Some(db.snapshots.path()));
        assert_eq!(outcome.history.unwrap().total_entries, 1);
        assert_eq!(db.snapshots.load().len(), 1);
    }
}
