//! Set differences driving class and membership reconciliation.

use std::collections::{BTreeMap, BTreeSet};

use rollcall_core::models::class_group::ClassGroup;
use rollcall_core::models::section::Section;

/// Drop unresolved ids and collapse duplicates.
pub fn present<I>(ids: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    ids.into_iter().flatten().collect()
}

/// Membership changes needed to turn `actual` into `desired`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub to_add: BTreeSet<String>,
    pub to_remove: BTreeSet<String>,
}

impl MembershipDiff {
    /// `protected` members are never removed even when not desired.
    pub fn compute(
        desired: &BTreeSet<String>,
        actual: &BTreeSet<String>,
        protected: &BTreeSet<String>,
    ) -> Self {
        let to_add = desired.difference(actual).cloned().collect();
        let to_remove = actual
            .iter()
            .filter(|id| !protected.contains(*id) && !desired.contains(*id))
            .cloned()
            .collect();
        Self { to_add, to_remove }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// What to do with each class, matched to sections by class code.
#[derive(Debug, Default)]
pub struct ClassPlan<'a> {
    /// Sections with no class yet.
    pub create: Vec<&'a Section>,
    /// Classes whose section is gone.
    pub archive: Vec<ClassGroup>,
    /// Classes that stay and get their membership synced.
    pub keep: Vec<(ClassGroup, &'a Section)>,
}

pub fn plan_classes(sections: &[Section], classes: Vec<ClassGroup>) -> ClassPlan<'_> {
    let by_code: BTreeMap<&str, &Section> = sections
        .iter()
        .map(|s| (s.class_code.as_str(), s))
        .collect();
    let existing: BTreeSet<String> = classes.iter().map(|c| c.class_code.clone()).collect();

    let mut plan = ClassPlan {
        create: sections
            .iter()
            .filter(|s| !existing.contains(&s.class_code))
            .collect(),
        ..Default::default()
    };

    for class in classes {
        match by_code.get(class.class_code.as_str()) {
            Some(section) => plan.keep.push((class, *section)),
            None => plan.archive.push(class),
        }
    }
    plan
}
