//! Person id to directory account id, memoized in the identity cache.

use rollcall_core::cache::IdentityMap;
use rollcall_core::error::Result;
use rollcall_core::roster::RosterSource;
use tracing::{debug, info};

use crate::directory::{Directory, Outcome};

/// Resolves roster person ids to directory account ids.
///
/// Every lookup result, including "nothing found", is stored in the cache so a
/// person costs at most one round of remote calls per run, and none when the
/// cache was loaded from a previous run.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    cache: IdentityMap,
    lookups: usize,
}

impl IdentityResolver {
    pub fn new(cache: IdentityMap) -> Self {
        Self { cache, lookups: 0 }
    }

    pub fn cache(&self) -> &IdentityMap {
        &self.cache
    }

    /// Remote lookups (roster or directory) made so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    pub async fn resolve(
        &mut self,
        person_id: &str,
        roster: &dyn RosterSource,
        directory: &dyn Directory,
    ) -> Result<Option<String>> {
        let mut entry = self.cache.get(person_id).cloned().unwrap_or_default();

        if entry.principal_name.is_none() {
            self.lookups += 1;
            let principal_name = roster.principal_name(person_id).await?;
            if principal_name.is_none() {
                info!(person_id, "no principal name in roster");
            }
            entry.principal_name = Some(principal_name);
        }

        if entry.account_id.is_none() {
            if let Some(Some(principal_name)) = &entry.principal_name {
                self.lookups += 1;
                entry.account_id = Some(self.lookup_account(principal_name, directory).await?);
            }
        }

        let account = entry.resolved_account().map(String::from);
        self.cache.insert(person_id.to_string(), entry);
        Ok(account)
    }

    async fn lookup_account(
        &self,
        principal_name: &str,
        directory: &dyn Directory,
    ) -> Result<Option<String>> {
        let account_id = match directory.find_account(principal_name).await? {
            Outcome::Applied(id) => id,
            // Unlicensed or not yet migrated
            _ => {
                debug!(principal_name, "no directory account");
                return Ok(None);
            }
        };

        if !directory.has_license(&account_id).await? {
            debug!(principal_name, account_id = %account_id, "account has no license");
            return Ok(None);
        }

        Ok(Some(account_id))
    }
}
