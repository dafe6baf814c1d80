//! Microsoft Graph request/response structs.

use rollcall_core::models::section::{Section, Term};
use serde::{Deserialize, Serialize};

/// One page of an OData collection response.
#[derive(Debug, Clone, Deserialize)]
pub struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// An education class as listed by `/education/classes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationClass {
    pub id: String,
    #[serde(default)]
    pub class_code: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A user, group or service principal in a membership listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryObject {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

/// The `isArchived` projection of a team.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamArchiveState {
    #[serde(default)]
    pub is_archived: Option<bool>,
}

/// A user looked up by principal name.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUser {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// License assignments of a user.
#[derive(Debug, Clone, Deserialize)]
pub struct LicenseDetails {
    #[serde(default)]
    pub value: Option<Vec<LicenseDetail>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseDetail {
    #[serde(default)]
    pub sku_id: Option<String>,
    #[serde(default)]
    pub sku_part_number: Option<String>,
}

/// Body of `POST /education/classes`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEducationClass {
    pub description: String,
    pub class_code: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub external_name: String,
    pub external_source: &'static str,
    pub mail_nickname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term: Option<Term>,
}

impl NewEducationClass {
    pub fn from_section(section: &Section) -> Self {
        Self {
            description: section.class_code.clone(),
            class_code: section.class_code.clone(),
            display_name: section.display_name.clone(),
            external_id: section.external_id.clone(),
            external_name: section.display_name.clone(),
            external_source: "sis",
            mail_nickname: section
                .mail_nickname
                .clone()
                .unwrap_or_else(|| mail_nickname_for(&section.class_code)),
            term: section.primary_term().cloned(),
        }
    }
}

// Mail nicknames only allow ASCII letters, digits and a few separators.
fn mail_nickname_for(class_code: &str) -> String {
    class_code
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// Body of a `$ref` POST adding a member or teacher.
#[derive(Debug, Clone, Serialize)]
pub struct ODataRef {
    #[serde(rename = "@odata.id")]
    pub id: String,
}
