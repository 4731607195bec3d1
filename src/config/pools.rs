use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

/// One tracked pool from the pools file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PoolConfig {
    #[serde(default = "default_chain")]
    pub chain: String,
    /// Pool contract address or full pool id
    pub pool: String,
    #[serde(default)]
    pub aura_enabled: bool,
    /// Free-form grouping label (e.g. "ETH", "STABLE")
    #[serde(default)]
    pub asset_type: Option<String>,
}

fn default_chain() -> String {
    "ethereum".to_string()
}

/// Accepted layouts of the pools file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PoolsFile {
    List(Vec<PoolConfig>),
    Object {
        #[serde(default)]
        settings: PoolsFileSettings,
        #[serde(default)]
        pools: Vec<PoolConfig>,
    },
}

#[derive(Debug, Deserialize, Default)]
pub struct PoolsFileSettings {
    #[serde(default)]
    pub aura_enabled: bool,
}

/// Load the pools file.
///
/// Returns the pool list and the file-wide overlay switch. A missing or
/// malformed file yields an empty list.
pub fn load_pools_config(path: impl AsRef<Path>) -> (Vec<PoolConfig>, bool) {
    let path = path.as_ref();

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            info!("No pools file loaded from {}: {}", path.display(), e);
            return (Vec::new(), false);
        },
    };

    match serde_json::from_str::<PoolsFile>(&contents) {
        Ok(PoolsFile::List(pools)) => (pools, false),
        Ok(PoolsFile::Object { settings, pools }) => (pools, settings.aura_enabled),
        Err(e) => {
            warn!("Error parsing {}: {}", path.display(), e);
            (Vec::new(), false)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_object_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pools.json");
        std::fs::write(
            &path,
            r#"{"settings": {"aura_enabled": true},
                "pools": [{"chain": "arbitrum", "pool": "0xabc", "asset_type": "ETH"}, {"pool": "0xdef"}]}"#,
        )
        .unwrap();

        let (pools, aura) = load_pools_config(&path);
        assert!(aura);
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].asset_type.as_deref(), Some("ETH"));
        assert_eq!(pools[1].chain, "ethereum");
        assert!(!pools[1].aura_enabled);
    }

    #[test]
    fn test_load_list_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pools.json");
        std::fs::write(&path, r#"[{"chain": "base", "pool": "0x1", "aura_enabled": true}]"#).unwrap();

        let (pools, aura) = load_pools_config(&path);
        assert!(!aura);
        assert!(pools[0].aura_enabled);
    }

    #[test]
    fn test_missing_or_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pools.json");
        assert_eq!(load_pools_config(&path), (Vec::new(), false));

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(load_pools_config(&path), (Vec::new(), false));
    }
}
