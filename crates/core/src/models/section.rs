use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, RollcallError};

/// A class section as reported by the student-information system.
///
/// Field names follow the column aliases of the sections query so that the
/// section snapshot file is exactly the normalized query output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    #[serde(rename = "classCode")]
    pub class_code: String,
    #[serde(rename = "EVENT_LONG_NAME")]
    pub display_name: String,
    #[serde(
        rename = "SectionId",
        default,
        deserialize_with = "opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub external_id: Option<String>,
    #[serde(
        rename = "mailNickname",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mail_nickname: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub term: Vec<Term>,
    /// Person ids of the section's teachers.
    #[serde(rename = "SECTIONPER", default, deserialize_with = "id_list")]
    pub teachers: Vec<String>,
    /// Person ids of the section's enrolled students.
    #[serde(rename = "TRANSCRIPTDETAIL", default, deserialize_with = "id_list")]
    pub students: Vec<String>,
}

/// Academic term attached to a class on creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl Section {
    /// Build a section from one normalized roster row.
    ///
    /// `classCode` and `EVENT_LONG_NAME` are required; an empty class code is
    /// rejected because it is the join key against the directory.
    pub fn from_row(row: Value) -> Result<Self> {
        let obj = row
            .as_object()
            .ok_or_else(|| RollcallError::MalformedRoster(format!("row is not an object: {row}")))?;

        match obj.get("classCode") {
            Some(Value::String(code)) if !code.trim().is_empty() => {}
            Some(other) => {
                return Err(RollcallError::MalformedRoster(format!(
                    "invalid classCode {other}"
                )))
            }
            None => {
                return Err(RollcallError::MalformedRoster(
                    "row is missing classCode".into(),
                ))
            }
        }

        serde_json::from_value(row)
            .map_err(|e| RollcallError::MalformedRoster(format!("invalid section row: {e}")))
    }

    /// The term sent with a class creation request.
    pub fn primary_term(&self) -> Option<&Term> {
        self.term.first()
    }
}

fn id_value(value: Value) -> std::result::Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(format!("expected identifier, got {other}")),
    }
}

fn opt_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    id_value(value).map_err(serde::de::Error::custom)
}

fn id_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    let mut ids = Vec::new();
    for value in values.unwrap_or_default() {
        if let Some(id) = id_value(value).map_err(serde::de::Error::custom)? {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
