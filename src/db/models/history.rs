use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{info, warn};
use serde::{
    de::{self, Deserializer},
    ser::{SerializeStruct, Serializer},
    Deserialize, Serialize,
};
use serde_json::{Map, Value};

use super::{PoolRecord, STORE_VERSION};
use crate::utils::{round_pct, round_usd, TIMESTAMP_FORMAT};

/// Append-only history file.
///
/// ```text
/// { version, last_updated, pools: { <pool_key>: { metadata, snapshots: [..] } } }
/// ```
///
/// Decoding is per item: a slot or entry that does not fit the current layout
/// is kept as raw JSON so a rewrite leaves it in place, but it is never
/// returned from queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryFile {
    pub version: String,
    pub last_updated: String,
    pub pools: BTreeMap<String, PoolHistory>,
    /// Slots that are not JSON objects, written back verbatim.
    unreadable_pools: BTreeMap<String, Value>,
}

impl HistoryFile {
    pub fn empty(now: &str) -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            last_updated: now.to_string(),
            ..Default::default()
        }
    }

    /// Decode a history document item by item. Only a non-object root is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut root) = value else {
            return None;
        };

        let mut file = Self {
            version: take_string(&mut root, "version"),
            last_updated: take_string(&mut root, "last_updated"),
            ..Default::default()
        };

        match root.remove("pools") {
            Some(Value::Object(pools)) => {
                for (key, slot) in pools {
                    match PoolHistory::from_value(&key, slot) {
                        Ok(series) => {
                            file.pools.insert(key, series);
                        },
                        Err(raw) => {
                            warn!("History slot {} is not an object, skipping it", key);
                            file.unreadable_pools.insert(key, raw);
                        },
                    }
                }
            },
            None | Some(Value::Null) => {},
            Some(_) => warn!("History `pools` is not an object, starting an empty set"),
        }

        Some(file)
    }

    /// Bring a file read from disk up to the current layout.
    pub fn migrate(&mut self) {
        if self.version != STORE_VERSION {
            info!(
                "Migrating history file from version {:?} to {}",
                self.version, STORE_VERSION
            );
            self.version = STORE_VERSION.to_string();
        }
    }

    /// Total number of stored entries across all series, unreadable ones included.
    pub fn total_entries(&self) -> usize {
        self.pools.values().map(PoolHistory::len).sum()
    }

    /// Copy holding only decoded slots and entries.
    pub fn readable(&self) -> Self {
        Self {
            version: self.version.clone(),
            last_updated: self.last_updated.clone(),
            pools: self
                .pools
                .iter()
                .map(|(key, series)| (key.clone(), series.readable()))
                .collect(),
            unreadable_pools: BTreeMap::new(),
        }
    }
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> String {
    match object.remove(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum StoredSlot<'a> {
    Series(&'a PoolHistory),
    Raw(&'a Value),
}

struct StoredPools<'a>(&'a HistoryFile);

impl Serialize for StoredPools<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let file = self.0;
        let merged: BTreeMap<&String, StoredSlot<'_>> = file
            .unreadable_pools
            .iter()
            .map(|(key, raw)| (key, StoredSlot::Raw(raw)))
            .chain(file.pools.iter().map(|(key, series)| (key, StoredSlot::Series(series))))
            .collect();
        serializer.collect_map(merged)
    }
}

impl Serialize for HistoryFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("HistoryFile", 3)?;
        state.serialize_field("version", &self.version)?;
        state.serialize_field("last_updated", &self.last_updated)?;
        state.serialize_field("pools", &StoredPools(self))?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for HistoryFile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        HistoryFile::from_value(value)
            .ok_or_else(|| de::Error::custom("history file must be a JSON object"))
    }
}

/// One pool's slot in the history file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolHistory {
    pub metadata: PoolHistoryMetadata,
    pub snapshots: Vec<HistoryEntry>,
    /// Metadata that failed to decode, written back in place of `metadata`.
    raw_metadata: Option<Value>,
    /// Entries that failed to decode. They predate every readable entry
    /// appended by this version, so they are written first and trimmed first.
    unreadable: Vec<Value>,
}

impl PoolHistory {
    pub fn for_record(record: &PoolRecord) -> Self {
        Self {
            metadata: PoolHistoryMetadata {
                name: record.name.clone(),
                chain: record.chain.clone(),
                address: record.address.clone(),
                pool_id: record.pool_id.clone(),
                extra: Map::new(),
            },
            ..Default::default()
        }
    }

    /// Decode a slot, returning the raw value when it is not an object.
    fn from_value(key: &str, value: Value) -> Result<Self, Value> {
        let mut slot = match value {
            Value::Object(slot) => slot,
            other => return Err(other),
        };

        let mut series = Self::default();

        match slot.remove("metadata") {
            None | Some(Value::Null) => {},
            Some(raw) => match PoolHistoryMetadata::deserialize(&raw) {
                Ok(metadata) => series.metadata = metadata,
                Err(e) => {
                    warn!("Unreadable metadata for {}: {}", key, e);
                    series.raw_metadata = Some(raw);
                },
            },
        }

        match slot.remove("snapshots") {
            Some(Value::Array(entries)) => {
                for (idx, raw) in entries.into_iter().enumerate() {
                    match HistoryEntry::deserialize(&raw) {
                        Ok(entry) => series.snapshots.push(entry),
                        Err(e) => {
                            warn!("Skipping history entry #{} of {}: {}", idx, key, e);
                            series.unreadable.push(raw);
                        },
                    }
                }
            },
            None | Some(Value::Null) => {},
            Some(raw) => {
                warn!("Snapshots of {} are not a list, keeping them as one entry", key);
                series.unreadable.push(raw);
            },
        }

        Ok(series)
    }

    /// Number of stored entries, unreadable ones included.
    pub fn len(&self) -> usize {
        self.unreadable.len() + self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep only the most recent `max` entries.
    pub fn trim(&mut self, max: usize) {
        let mut excess = self.len().saturating_sub(max);

        let raw_dropped = excess.min(self.unreadable.len());
        self.unreadable.drain(..raw_dropped);
        excess -= raw_dropped;

        self.snapshots.drain(..excess);
    }

    /// Copy without the entries that failed to decode.
    pub fn readable(&self) -> Self {
        Self {
            metadata: self.metadata.clone(),
            snapshots: self.snapshots.clone(),
            raw_metadata: None,
            unreadable: Vec::new(),
        }
    }

    /// Copy of this slot keeping only entries at or after `cutoff`.
    /// Entries with unparseable timestamps are dropped.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Self {
        Self {
            snapshots: self
                .snapshots
                .iter()
                .filter(|entry| entry.parsed_timestamp().is_some_and(|ts| ts >= cutoff))
                .cloned()
                .collect(),
            ..self.readable()
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum StoredEntry<'a> {
    Entry(&'a HistoryEntry),
    Raw(&'a Value),
}

struct StoredEntries<'a>(&'a PoolHistory);

impl Serialize for StoredEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let series = self.0;
        serializer.collect_seq(
            series
                .unreadable
                .iter()
                .map(StoredEntry::Raw)
                .chain(series.snapshots.iter().map(StoredEntry::Entry)),
        )
    }
}

impl Serialize for PoolHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PoolHistory", 2)?;
        match &self.raw_metadata {
            Some(raw) => state.serialize_field("metadata", raw)?,
            None => state.serialize_field("metadata", &self.metadata)?,
        }
        state.serialize_field("snapshots", &StoredEntries(self))?;
        state.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolHistoryMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub chain: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub pool_id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single time-stamped metric sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `%Y-%m-%dT%H:%M:%SZ`; kept as text so malformed values survive a rewrite.
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub tvl: f64,
    #[serde(default)]
    pub base_apy: f64,
    #[serde(default)]
    pub bal_rewards_min: f64,
    #[serde(default)]
    pub bal_rewards_max: f64,
    #[serde(default)]
    pub total_apy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aura_apy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aura_tvl: Option<f64>,
    /// Fields this version does not know about, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HistoryEntry {
    pub fn from_record(record: &PoolRecord, timestamp: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            tvl: round_usd(record.tvl),
            base_apy: round_pct(record.base_apy),
            bal_rewards_min: round_pct(record.bal_rewards_apy.min()),
            bal_rewards_max: round_pct(record.bal_rewards_apy.max()),
            total_apy: round_pct(record.total_apy),
            aura_apy: record.aura.as_ref().map(|a| round_pct(a.apy)),
            aura_tvl: record.aura.as_ref().map(|a| round_usd(a.tvl)),
            extra: Map::new(),
        }
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_old_entry_without_aura_fields_loads() {
        let entry: HistoryEntry = serde_json::from_str(
            r#"{"timestamp": "2025-01-01T00:00:00Z", "tvl": 10, "base_apy": 1.5}"#,
        )
        .unwrap();
        assert_eq!(entry.tvl, 10.0);
        assert_eq!(entry.total_apy, 0.0);
        assert!(entry.aura_apy.is_none());
        assert!(entry.parsed_timestamp().is_some());
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let raw = r#"{"timestamp": "2025-01-01T00:00:00Z", "tvl": 1.0, "base_apy": 0.0,
            "bal_rewards_min": 0.0, "bal_rewards_max": 0.0, "total_apy": 0.0, "volume_24h": 42.0}"#;
        let entry: HistoryEntry = serde_json::from_str(raw).unwrap();
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["volume_24h"], 42.0);
        assert!(json.get("aura_apy").is_none());
    }

    #[test]
    fn test_trim_drops_oldest() {
        let mut history = PoolHistory::default();
        for i in 0..5 {
            history.snapshots.push(HistoryEntry {
                tvl: i as f64,
                ..Default::default()
            });
        }
        history.trim(2);
        let tvls: Vec<f64> = history.snapshots.iter().map(|e| e.tvl).collect();
        assert_eq!(tvls, vec![3.0, 4.0]);
    }

    #[test]
    fn test_migrate_sets_version() {
        let mut file: HistoryFile = serde_json::from_str(r#"{"pools": {}}"#).unwrap();
        file.migrate();
        assert_eq!(file.version, STORE_VERSION);
    }

    #[test]
    fn test_bad_entry_is_kept_raw_but_not_readable() {
        let raw = json!({
            "version": "1.0",
            "pools": {
                "ethereum_keep": {
                    "metadata": {"name": "Keep"},
                    "snapshots": [
                        {"timestamp": "2025-01-01T00:00:00Z", "tvl": 1.0},
                        {"timestamp": 1735689600, "tvl": null},
                        {"timestamp": "2025-01-02T00:00:00Z", "tvl": 2.0}
                    ]
                },
                "ethereum_broken": 7
            }
        });

        let file = HistoryFile::from_value(raw).unwrap();
        let keep = &file.pools["ethereum_keep"];
        assert_eq!(keep.snapshots.len(), 2);
        assert_eq!(keep.len(), 3);
        assert!(!file.pools.contains_key("ethereum_broken"));
        assert_eq!(file.total_entries(), 3);

        let readable = file.readable();
        assert_eq!(readable.pools["ethereum_keep"].len(), 2);

        let written = serde_json::to_value(&file).unwrap();
        assert_eq!(written["pools"]["ethereum_broken"], 7);
        let entries = written["pools"]["ethereum_keep"]["snapshots"].as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["timestamp"], 1735689600);
        assert!(entries[0]["tvl"].is_null());
    }

    #[test]
    fn test_bad_metadata_is_written_back_verbatim() {
        let raw = json!({"pools": {"a": {"metadata": {"name": 5}, "snapshots": []}}});

        let file = HistoryFile::from_value(raw).unwrap();
        assert_eq!(file.pools["a"].metadata, PoolHistoryMetadata::default());

        let written = serde_json::to_value(&file).unwrap();
        assert_eq!(written["pools"]["a"]["metadata"]["name"], 5);
    }

    #[test]
    fn test_trim_drops_unreadable_entries_first() {
        let raw = json!({"pools": {"a": {"snapshots": [
            {"tvl": "oops"},
            {"timestamp": "2025-01-01T00:00:00Z", "tvl": 1.0},
            {"timestamp": "2025-01-02T00:00:00Z", "tvl": 2.0}
        ]}}});

        let mut file = HistoryFile::from_value(raw).unwrap();
        let series = file.pools.get_mut("a").unwrap();
        series.trim(2);
        assert_eq!(series.len(), 2);
        assert_eq!(series.snapshots.len(), 2);

        series.trim(1);
        assert_eq!(series.snapshots[0].tvl, 2.0);
    }

    #[test]
    fn test_non_object_root_is_rejected() {
        assert!(HistoryFile::from_value(json!([1, 2])).is_none());
        assert!(serde_json::from_str::<HistoryFile>("[]").is_err());
    }
}
