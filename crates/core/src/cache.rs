//! JSON files persisted between runs: identity cache, section snapshot and
//! anomaly report.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::identity::IdentityCacheEntry;
use crate::models::section::Section;

/// Person id to cached identity lookups.
pub type IdentityMap = BTreeMap<String, IdentityCacheEntry>;

const IDENTITY_DESCRIPTION: &str =
    "A dump of the identity cache from the last time a sync completed.";
const ANOMALY_DESCRIPTION: &str = "Users with possible error states.";

#[derive(Debug, Serialize, Deserialize)]
struct IdentityCacheFile {
    #[serde(default)]
    description: String,
    cache: IdentityMap,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnomalyReportFile {
    description: String,
    users: IdentityMap,
}

/// Load the identity cache. A missing file yields an empty cache.
pub fn load_identity_cache(path: &Path) -> Result<IdentityMap> {
    if !path.exists() {
        info!(path = %path.display(), "no identity cache on disk, starting empty");
        return Ok(IdentityMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    let file: IdentityCacheFile = serde_json::from_str(&content)?;
    debug!(entries = file.cache.len(), "loaded identity cache");
    Ok(file.cache)
}

/// Overwrite the identity cache file.
pub fn save_identity_cache(path: &Path, cache: &IdentityMap) -> Result<()> {
    let file = IdentityCacheFile {
        description: IDENTITY_DESCRIPTION.into(),
        cache: cache.clone(),
    };
    write_json(path, &file)?;
    debug!(entries = cache.len(), path = %path.display(), "saved identity cache");
    Ok(())
}

/// Load the section snapshot written by a previous roster query.
pub fn load_section_snapshot(path: &Path) -> Result<Vec<Section>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Overwrite the section snapshot.
pub fn save_section_snapshot(path: &Path, sections: &[Section]) -> Result<()> {
    write_json(path, &sections)
}

/// Overwrite the anomaly report.
pub fn save_anomaly_report(path: &Path, users: &IdentityMap) -> Result<()> {
    let file = AnomalyReportFile {
        description: ANOMALY_DESCRIPTION.into(),
        users: users.clone(),
    };
    write_json(path, &file)
}

/// Read back an anomaly report, e.g. for status output.
pub fn load_anomaly_report(path: &Path) -> Result<IdentityMap> {
    let content = std::fs::read_to_string(path)?;
    let file: AnomalyReportFile = serde_json::from_str(&content)?;
    Ok(file.users)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}
