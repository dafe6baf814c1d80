//! People whose identity lookups did not fully resolve.

use std::path::Path;

use rollcall_core::cache::{self, IdentityMap};
use rollcall_core::error::Result;

/// Identity cache entries that are incomplete or carry a null lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnomalyReport {
    users: IdentityMap,
}

impl AnomalyReport {
    pub fn from_cache(cache: &IdentityMap) -> Self {
        let users = cache
            .iter()
            .filter(|(_, entry)| !entry.is_complete() || entry.has_null())
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        Self { users }
    }

    pub fn users(&self) -> &IdentityMap {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Overwrite the report file.
    pub fn save(&self, path: &Path) -> Result<()> {
        cache::save_anomaly_report(path, &self.users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::models::identity::IdentityCacheEntry;

    fn entry(upn: Option<Option<&str>>, id: Option<Option<&str>>) -> IdentityCacheEntry {
        IdentityCacheEntry {
            principal_name: upn.map(|v| v.map(String::from)),
            account_id: id.map(|v| v.map(String::from)),
        }
    }

    #[test]
    fn only_unresolved_people_are_reported() {
        let mut cache = IdentityMap::new();
        cache.insert("ok".into(), entry(Some(Some("a@s.edu")), Some(Some("u-1"))));
        cache.insert("no-upn".into(), entry(Some(None), None));
        cache.insert("no-account".into(), entry(Some(Some("b@s.edu")), Some(None)));
        cache.insert("pending".into(), entry(Some(Some("c@s.edu")), None));

        let report = AnomalyReport::from_cache(&cache);
        let ids: Vec<&str> = report.users().keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["no-account", "no-upn", "pending"]);
    }

    #[test]
    fn save_writes_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error_users.json");

        let mut cache = IdentityMap::new();
        cache.insert("P1".into(), entry(Some(None), None));
        let report = AnomalyReport::from_cache(&cache);
        report.save(&path).unwrap();

        let loaded = cache::load_anomaly_report(&path).unwrap();
        assert_eq!(&loaded, report.users());
        assert_eq!(report.len(), 1);
    }
}
