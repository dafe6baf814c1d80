//! The directory operations the reconciliation engine depends on.

use std::fmt;

use async_trait::async_trait;
use rollcall_core::error::Result;
use rollcall_core::models::class_group::ClassGroup;
use rollcall_core::models::section::Section;

/// Result of a directory operation that did not fail fatally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation ran and produced a value.
    Applied(T),
    /// An expected absence: not provisioned yet, unlicensed, already archived.
    NotApplicable(String),
    /// Dry run; the mutation was not sent.
    Simulated,
}

impl<T> Outcome<T> {
    pub fn applied(self) -> Option<T> {
        match self {
            Outcome::Applied(value) => Some(value),
            _ => None,
        }
    }

    /// Applied or simulated, i.e. the change counts as made for this run.
    pub fn took_effect(&self) -> bool {
        !matches!(self, Outcome::NotApplicable(_))
    }
}

/// A membership list that can be read and edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberList<'a> {
    ClassTeachers(&'a str),
    /// Teachers and students together; the listing does not separate them.
    ClassMembers(&'a str),
    GroupMembers(&'a str),
}

impl fmt::Display for MemberList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberList::ClassTeachers(id) => write!(f, "class {id} teachers"),
            MemberList::ClassMembers(id) => write!(f, "class {id} members"),
            MemberList::GroupMembers(id) => write!(f, "group {id} members"),
        }
    }
}

/// Directory reads and writes used by a sync run.
///
/// Listing calls return every page. Mutations honour dry run by returning
/// [`Outcome::Simulated`].
#[async_trait]
pub trait Directory: Send + Sync {
    /// Active classes that carry a class code and are not archived.
    async fn list_classes(&self) -> Result<Vec<ClassGroup>>;

    /// Archived flag of a class's team.
    async fn class_archived(&self, class_id: &str) -> Result<Outcome<bool>>;

    /// Create a class for a section, returning the new class id.
    async fn create_class(&self, section: &Section) -> Result<Outcome<String>>;

    /// Archive the team behind a class.
    async fn archive_team(&self, team_id: &str) -> Result<Outcome<()>>;

    /// Account ids on a membership list.
    async fn list_members(&self, list: MemberList<'_>) -> Result<Vec<String>>;

    /// Account ids of a group's owners.
    async fn list_group_owners(&self, group_id: &str) -> Result<Vec<String>>;

    async fn add_member(&self, list: MemberList<'_>, account_id: &str) -> Result<Outcome<()>>;

    async fn remove_member(&self, list: MemberList<'_>, account_id: &str)
        -> Result<Outcome<()>>;

    /// Account id for a principal name.
    async fn find_account(&self, principal_name: &str) -> Result<Outcome<String>>;

    /// Whether the account holds at least one license.
    async fn has_license(&self, account_id: &str) -> Result<bool>;
}
