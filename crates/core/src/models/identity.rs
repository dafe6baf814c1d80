use serde::{Deserialize, Deserializer, Serialize};

/// Cached identity lookups for one person.
///
/// Each field is tri-state: `None` means the lookup has not been attempted,
/// `Some(None)` means it was attempted and found nothing, `Some(Some(v))` is a
/// resolved value. On disk an attempted-but-empty lookup is `null` and an
/// unattempted one is an absent key.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IdentityCacheEntry {
    #[serde(
        default,
        alias = "userPrincipalName",
        deserialize_with = "attempted",
        skip_serializing_if = "Option::is_none"
    )]
    pub principal_name: Option<Option<String>>,
    #[serde(
        default,
        alias = "userId",
        deserialize_with = "attempted",
        skip_serializing_if = "Option::is_none"
    )]
    pub account_id: Option<Option<String>>,
}

impl IdentityCacheEntry {
    /// Both lookups have been attempted.
    pub fn is_complete(&self) -> bool {
        self.principal_name.is_some() && self.account_id.is_some()
    }

    /// Any attempted lookup came back empty.
    pub fn has_null(&self) -> bool {
        matches!(self.principal_name, Some(None)) || matches!(self.account_id, Some(None))
    }

    /// The resolved account id, if any.
    pub fn resolved_account(&self) -> Option<&str> {
        self.account_id.as_ref().and_then(|id| id.as_deref())
    }
}

// A present key (even `null`) marks the lookup as attempted.
fn attempted<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
