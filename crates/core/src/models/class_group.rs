use serde::{Deserialize, Serialize};

/// A class as it currently exists in the directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    /// Directory object id of the class (also the team id).
    pub id: String,
    pub class_code: String,
    /// `None` when the directory could not report the flag, typically for
    /// classes that are still provisioning.
    #[serde(default)]
    pub archived: Option<bool>,
}

impl ClassGroup {
    pub fn new(id: impl Into<String>, class_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            class_code: class_code.into(),
            archived: Some(false),
        }
    }

    /// True only when the directory positively reported the class as archived.
    pub fn is_archived(&self) -> bool {
        self.archived == Some(true)
    }
}
