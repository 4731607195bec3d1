//! Whole-file JSON read/write shared by the snapshot and history stores.
//!
//! Reads never fail: a missing or malformed file is logged and reported as
//! `None`. Writes propagate their error so callers know persistence failed.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{de::DeserializeOwned, Serialize};

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No data file found at {}", path.display());
            return None;
        },
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        },
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Error reading JSON from {}: {}", path.display(), e);
            None
        },
    }
}

/// Serialize `value` (2-space indented) and replace the file contents.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}
