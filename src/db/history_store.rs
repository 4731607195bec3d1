use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::info;

use super::{
    json::{read_json, write_json},
    models::{HistoryEntry, HistoryFile, PoolHistory, PoolRecord},
};
use crate::utils::TIMESTAMP_FORMAT;

pub const HISTORY_FILE_NAME: &str = "balancer_pools_history.json";

/// Result of a history query.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryView {
    /// No key requested: the whole envelope (series filtered when `days` is set).
    All(HistoryFile),
    /// One pool's slot, `None` when the key is unknown.
    Pool(Option<PoolHistory>),
}

/// Outcome of an append.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendSummary {
    pub path: PathBuf,
    pub pools_appended: usize,
    pub total_entries: usize,
}

/// Append-only time series store keyed by pool key.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    history_file: PathBuf,
}

impl HistoryStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            history_file: data_dir.as_ref().join(HISTORY_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.history_file
    }

    /// Append one entry per record, stamped with the current time.
    ///
    /// `max_snapshots` caps every series touched by this call; `None` or 0 keeps all.
    pub fn append(
        &self,
        records: &[PoolRecord],
        max_snapshots: Option<usize>,
    ) -> Result<Option<AppendSummary>> {
        self.append_at(records, max_snapshots, Utc::now())
    }

    pub fn append_at(
        &self,
        records: &[PoolRecord],
        max_snapshots: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Option<AppendSummary>> {
        if records.is_empty() {
            return Ok(None);
        }

        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();

        let mut history = self.read().unwrap_or_else(|| HistoryFile::empty(&timestamp));
        history.last_updated = timestamp.clone();

        for record in records {
            let series = history
                .pools
                .entry(record.key())
                .or_insert_with(|| PoolHistory::for_record(record));

            series.snapshots.push(HistoryEntry::from_record(record, &timestamp));

            if let Some(max) = max_snapshots.filter(|max| *max > 0) {
                series.trim(max);
            }
        }

        write_json(&self.history_file, &history)?;

        let total_entries = history.total_entries();
        info!(
            "History updated: {} pools, {} total snapshots",
            records.len(),
            total_entries
        );

        Ok(Some(AppendSummary {
            path: self.history_file.clone(),
            pools_appended: records.len(),
            total_entries,
        }))
    }

    /// Query history.
    ///
    /// Without a key the whole envelope is returned; with a key only that
    /// pool's slot. `days` keeps entries no older than `now - days`.
    pub fn get(&self, key: Option<&str>, days: Option<u32>) -> HistoryView {
        self.get_at(key, days, Utc::now())
    }

    pub fn get_at(&self, key: Option<&str>, days: Option<u32>, now: DateTime<Utc>) -> HistoryView {
        let history = self.read().unwrap_or_default().readable();
        let cutoff = days
            .filter(|d| *d > 0)
            .map(|d| now - Duration::days(i64::from(d)));

        match key {
            Some(key) => HistoryView::Pool(history.pools.get(key).map(|series| match cutoff {
                Some(cutoff) => series.since(cutoff),
                None => series.clone(),
            })),
            None => {
                let mut history = history;
                if let Some(cutoff) = cutoff {
                    for series in history.pools.values_mut() {
                        *series = series.since(cutoff);
                    }
                }
                HistoryView::All(history)
            },
        }
    }

    fn read(&self) -> Option<HistoryFile> {
        read_json::<HistoryFile>(&self.history_file).map(|mut history| {
            history.migrate();
            history
        })
    }
}
