//! Reconciliation engine: makes directory classes and groups mirror the roster.
//!
//! A run loads the desired sections, lists the directory's active classes,
//! creates and archives classes by class code, syncs teachers then students of
//! every class that already existed, and finally syncs the faculty and student
//! groups. The identity cache is saved after class membership and again at the
//! end. Any error aborts the run.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use rollcall_core::cache::{self, IdentityMap};
use rollcall_core::config::RollcallConfig;
use rollcall_core::error::Result;
use rollcall_core::models::class_group::ClassGroup;
use rollcall_core::models::section::Section;
use rollcall_core::roster::{self, RosterSource};
use tracing::{debug, info, warn};

use crate::anomaly::AnomalyReport;
use crate::diff::{plan_classes, MembershipDiff};
use crate::directory::{Directory, MemberList, Outcome};
use crate::identity::IdentityResolver;

/// Settings for one run, taken from configuration plus CLI overrides.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub dry_run: bool,
    /// Query the roster instead of reading the section snapshot.
    pub refresh_sections: bool,
    pub apply_faculty_group: bool,
    pub faculty_group: String,
    pub student_group: String,
    /// Account ids added as teachers to every class.
    pub registrars: Vec<String>,
    pub identity_cache: PathBuf,
    pub section_snapshot: PathBuf,
    pub anomaly_report: PathBuf,
}

impl SyncOptions {
    pub fn from_config(config: &RollcallConfig) -> Self {
        Self {
            dry_run: config.sync.dry_run,
            refresh_sections: config.sync.refresh_sections,
            apply_faculty_group: config.sync.apply_faculty_group,
            faculty_group: config.graph.faculty_team.clone(),
            student_group: config.graph.student_team.clone(),
            registrars: config.graph.registrars.clone(),
            identity_cache: PathBuf::from(&config.cache.identity_cache),
            section_snapshot: PathBuf::from(&config.cache.section_snapshot),
            anomaly_report: PathBuf::from(&config.cache.anomaly_report),
        }
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub classes_created: usize,
    pub classes_archived: usize,
    pub classes_synced: usize,
    pub members_added: usize,
    pub members_removed: usize,
    /// Membership changes the directory answered as not applicable.
    pub members_skipped: usize,
    pub unresolved_identities: usize,
    pub dry_run: bool,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Dry run, no changes were sent.")?;
        }
        writeln!(f, "Classes created:       {}", self.classes_created)?;
        writeln!(f, "Classes archived:      {}", self.classes_archived)?;
        writeln!(f, "Classes synced:        {}", self.classes_synced)?;
        writeln!(f, "Members added:         {}", self.members_added)?;
        writeln!(f, "Members removed:       {}", self.members_removed)?;
        writeln!(f, "Members skipped:       {}", self.members_skipped)?;
        write!(f, "Unresolved identities: {}", self.unresolved_identities)
    }
}

/// Everything a run reads and mutates, owned in one place.
pub struct RunContext<D: Directory, S: RosterSource> {
    directory: D,
    roster: S,
    identities: IdentityResolver,
}

impl<D: Directory, S: RosterSource> RunContext<D, S> {
    pub fn new(directory: D, roster: S, identity_cache: IdentityMap) -> Self {
        Self {
            directory,
            roster,
            identities: IdentityResolver::new(identity_cache),
        }
    }

    /// Resolve person ids to account ids, dropping anyone unresolved.
    pub async fn resolve_all(&mut self, person_ids: &[String]) -> Result<BTreeSet<String>> {
        let mut accounts = BTreeSet::new();
        for person_id in person_ids {
            if let Some(account) = self
                .identities
                .resolve(person_id, &self.roster, &self.directory)
                .await?
            {
                accounts.insert(account);
            }
        }
        Ok(accounts)
    }
}

pub struct ReconcileEngine<D: Directory, S: RosterSource> {
    ctx: RunContext<D, S>,
    options: SyncOptions,
}

impl<D: Directory, S: RosterSource> ReconcileEngine<D, S> {
    pub fn new(ctx: RunContext<D, S>, options: SyncOptions) -> Self {
        Self { ctx, options }
    }

    pub async fn run(&mut self) -> Result<RunSummary> {
        let dry_run = self.options.dry_run;
        info!(dry_run, "starting class sync");

        let sections = self.load_desired().await?;
        let classes = self.ctx.directory.list_classes().await?;
        info!(
            sections = sections.len(),
            classes = classes.len(),
            "loaded desired and actual classes"
        );

        let mut summary = RunSummary {
            dry_run,
            ..Default::default()
        };

        let plan = plan_classes(&sections, classes);
        for section in &plan.create {
            info!(class_code = %section.class_code, "creating class");
            if self.ctx.directory.create_class(section).await?.took_effect() {
                summary.classes_created += 1;
            }
        }
        for class in &plan.archive {
            info!(class_code = %class.class_code, class_id = %class.id, "archiving class");
            if self.ctx.directory.archive_team(&class.id).await?.took_effect() {
                summary.classes_archived += 1;
            }
        }

        let total = plan.keep.len();
        for (idx, (class, section)) in plan.keep.iter().enumerate() {
            info!(
                position = idx + 1,
                total,
                class_code = %class.class_code,
                "syncing class membership"
            );
            self.sync_class(class, section, &mut summary).await?;
            summary.classes_synced += 1;
        }
        self.save_identities()?;

        self.sync_fixed_groups(&sections, &mut summary).await?;
        self.save_identities()?;

        let report = AnomalyReport::from_cache(self.ctx.identities.cache());
        summary.unresolved_identities = report.len();
        report.save(&self.options.anomaly_report)?;
        if !report.is_empty() {
            info!(
                count = report.len(),
                path = %self.options.anomaly_report.display(),
                "wrote identity anomaly report"
            );
        }

        info!(
            classes_created = summary.classes_created,
            classes_archived = summary.classes_archived,
            classes_synced = summary.classes_synced,
            members_added = summary.members_added,
            members_removed = summary.members_removed,
            members_skipped = summary.members_skipped,
            unresolved_identities = summary.unresolved_identities,
            lookups = self.ctx.identities.lookups(),
            dry_run,
            "class sync completed"
        );
        Ok(summary)
    }

    async fn load_desired(&self) -> Result<Vec<Section>> {
        let path = &self.options.section_snapshot;
        if !self.options.refresh_sections {
            info!(path = %path.display(), "using section snapshot");
            let sections = cache::load_section_snapshot(path)?;
            roster::check_unique_class_codes(&sections)?;
            return Ok(sections);
        }

        let rows = self.ctx.roster.fetch_section_rows().await?;
        let sections = roster::load_sections(rows)?;
        cache::save_section_snapshot(path, &sections)?;
        debug!(path = %path.display(), "saved section snapshot");
        Ok(sections)
    }

    async fn sync_class(
        &mut self,
        class: &ClassGroup,
        section: &Section,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut desired_teachers = self.ctx.resolve_all(&section.teachers).await?;
        desired_teachers.extend(self.options.registrars.iter().cloned());

        let teachers = MemberList::ClassTeachers(&class.id);
        let actual_teachers = self.list(teachers).await?;
        let diff = MembershipDiff::compute(&desired_teachers, &actual_teachers, &BTreeSet::new());
        self.apply(teachers, &diff, summary).await?;

        // The member listing includes teachers; never treat them as stray students.
        let desired_students = self.ctx.resolve_all(&section.students).await?;
        let members = MemberList::ClassMembers(&class.id);
        let actual_members = self.list(members).await?;
        let protected: BTreeSet<String> =
            actual_teachers.union(&desired_teachers).cloned().collect();
        let diff = MembershipDiff::compute(&desired_students, &actual_members, &protected);
        self.apply(members, &diff, summary).await
    }

    async fn sync_fixed_groups(
        &mut self,
        sections: &[Section],
        summary: &mut RunSummary,
    ) -> Result<()> {
        let teachers: Vec<String> = sections
            .iter()
            .flat_map(|s| s.teachers.iter().cloned())
            .collect();
        let students: Vec<String> = sections
            .iter()
            .flat_map(|s| s.students.iter().cloned())
            .collect();

        let faculty = self.ctx.resolve_all(&teachers).await?;
        let enrolled = self.ctx.resolve_all(&students).await?;

        let faculty_group = self.options.faculty_group.clone();
        let student_group = self.options.student_group.clone();
        let groups = [
            (faculty_group.as_str(), faculty, self.options.apply_faculty_group),
            (student_group.as_str(), enrolled, true),
        ];

        for (group_id, desired, apply) in groups {
            let list = MemberList::GroupMembers(group_id);
            info!(%list, desired = desired.len(), "syncing group membership");

            let actual = self.list(list).await?;
            let owners: BTreeSet<String> = self
                .ctx
                .directory
                .list_group_owners(group_id)
                .await?
                .into_iter()
                .collect();
            let diff = MembershipDiff::compute(&desired, &actual, &owners);

            if apply {
                self.apply(list, &diff, summary).await?;
            } else {
                info!(
                    %list,
                    to_add = diff.to_add.len(),
                    to_remove = diff.to_remove.len(),
                    "group changes computed but not applied"
                );
                debug!(%list, to_add = ?diff.to_add, to_remove = ?diff.to_remove, "unapplied group diff");
            }
        }
        Ok(())
    }

    async fn list(&self, list: MemberList<'_>) -> Result<BTreeSet<String>> {
        Ok(self
            .ctx
            .directory
            .list_members(list)
            .await?
            .into_iter()
            .collect())
    }

    async fn apply(
        &self,
        list: MemberList<'_>,
        diff: &MembershipDiff,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if diff.is_empty() {
            debug!(%list, "membership up to date");
            return Ok(());
        }

        for account_id in &diff.to_add {
            info!(%list, account_id = %account_id, "adding member");
            match self.ctx.directory.add_member(list, account_id).await? {
                Outcome::NotApplicable(reason) => {
                    warn!(%list, account_id = %account_id, reason = %reason, "member not added");
                    summary.members_skipped += 1;
                }
                _ => summary.members_added += 1,
            }
        }
        for account_id in &diff.to_remove {
            info!(%list, account_id = %account_id, "removing member");
            match self.ctx.directory.remove_member(list, account_id).await? {
                Outcome::NotApplicable(reason) => {
                    warn!(%list, account_id = %account_id, reason = %reason, "member not removed");
                    summary.members_skipped += 1;
                }
                _ => summary.members_removed += 1,
            }
        }
        Ok(())
    }

    fn save_identities(&self) -> Result<()> {
        cache::save_identity_cache(&self.options.identity_cache, self.ctx.identities.cache())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rollcall_core::error::RollcallError;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    const FACULTY: &str = "g-faculty";
    const STUDENTS: &str = "g-students";

    #[derive(Default)]
    struct State {
        classes: Vec<ClassGroup>,
        teachers: BTreeMap<String, BTreeSet<String>>,
        students: BTreeMap<String, BTreeSet<String>>,
        groups: BTreeMap<String, BTreeSet<String>>,
        owners: BTreeMap<String, Vec<String>>,
        /// Every call except account lookups, in order.
        calls: Vec<String>,
        next_id: usize,
    }

    /// In-memory directory. Accounts exist for `<person>@school.edu` with id
    /// `u-<person>`, except people listed in `missing`.
    #[derive(Clone, Default)]
    struct FakeDirectory {
        state: Arc<Mutex<State>>,
        missing: Vec<String>,
        /// Account or team ids the directory answers with not-applicable.
        rejected: Vec<String>,
        dry_run: bool,
        fail_listing: bool,
    }

    impl FakeDirectory {
        fn with_class(self, id: &str, code: &str, teachers: &[&str], students: &[&str]) -> Self {
            {
                let mut state = self.state.lock().unwrap();
                state.classes.push(ClassGroup::new(id, code));
                state.teachers.insert(id.into(), ids(teachers));
                state.students.insert(id.into(), ids(students));
            }
            self
        }

        fn with_group(self, id: &str, members: &[&str], owners: &[&str]) -> Self {
            {
                let mut state = self.state.lock().unwrap();
                state.groups.insert(id.into(), ids(members));
                state.owners.insert(id.into(), owners.iter().map(|s| s.to_string()).collect());
            }
            self
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        fn teachers(&self, class_id: &str) -> BTreeSet<String> {
            self.state.lock().unwrap().teachers[class_id].clone()
        }

        fn students(&self, class_id: &str) -> BTreeSet<String> {
            self.state.lock().unwrap().students[class_id].clone()
        }

        fn group(&self, id: &str) -> BTreeSet<String> {
            self.state.lock().unwrap().groups[id].clone()
        }

        fn record(&self, call: String) -> std::sync::MutexGuard<'_, State> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            state
        }
    }

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn mutation<T>(dry_run: bool, apply: impl FnOnce() -> T) -> Outcome<T> {
        if dry_run {
            Outcome::Simulated
        } else {
            Outcome::Applied(apply())
        }
    }

    #[async_trait]
    impl Directory for FakeDirectory {
        async fn list_classes(&self) -> Result<Vec<ClassGroup>> {
            if self.fail_listing {
                return Err(RollcallError::Graph("list classes failed (403)".into()));
            }
            let state = self.record("list classes".into());
            Ok(state
                .classes
                .iter()
                .filter(|c| !c.is_archived())
                .cloned()
                .collect())
        }

        async fn class_archived(&self, class_id: &str) -> Result<Outcome<bool>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .classes
                .iter()
                .find(|c| c.id == class_id)
                .map(|c| Outcome::Applied(c.is_archived()))
                .unwrap_or_else(|| Outcome::NotApplicable("404".into())))
        }

        async fn create_class(&self, section: &Section) -> Result<Outcome<String>> {
            let mut state = self.record(format!("create {}", section.class_code));
            Ok(mutation(self.dry_run, || {
                state.next_id += 1;
                let id = format!("c-new-{}", state.next_id);
                let mut class = ClassGroup::new(id.clone(), section.class_code.clone());
                class.archived = None;
                state.classes.push(class);
                state.teachers.insert(id.clone(), BTreeSet::new());
                state.students.insert(id.clone(), BTreeSet::new());
                id
            }))
        }

        async fn archive_team(&self, team_id: &str) -> Result<Outcome<()>> {
            let mut state = self.record(format!("archive {team_id}"));
            if self.rejected.iter().any(|r| r == team_id) {
                return Ok(Outcome::NotApplicable("team not found".into()));
            }
            Ok(mutation(self.dry_run, || {
                if let Some(class) = state.classes.iter_mut().find(|c| c.id == team_id) {
                    class.archived = Some(true);
                }
            }))
        }

        async fn list_members(&self, list: MemberList<'_>) -> Result<Vec<String>> {
            let state = self.record(format!("list {list}"));
            let members = match list {
                MemberList::ClassTeachers(id) => state.teachers[id].clone(),
                MemberList::ClassMembers(id) => {
                    state.teachers[id].union(&state.students[id]).cloned().collect()
                }
                MemberList::GroupMembers(id) => state.groups[id].clone(),
            };
            Ok(members.into_iter().collect())
        }

        async fn list_group_owners(&self, group_id: &str) -> Result<Vec<String>> {
            Ok(self.state.lock().unwrap().owners[group_id].clone())
        }

        async fn add_member(&self, list: MemberList<'_>, account_id: &str) -> Result<Outcome<()>> {
            let mut state = self.record(format!("add {account_id} to {list}"));
            if self.rejected.iter().any(|r| r == account_id) {
                return Ok(Outcome::NotApplicable("account not found".into()));
            }
            Ok(mutation(self.dry_run, || {
                let set = match list {
                    MemberList::ClassTeachers(id) => state.teachers.get_mut(id),
                    MemberList::ClassMembers(id) => state.students.get_mut(id),
                    MemberList::GroupMembers(id) => state.groups.get_mut(id),
                };
                if let Some(set) = set {
                    set.insert(account_id.to_string());
                }
            }))
        }

        async fn remove_member(
            &self,
            list: MemberList<'_>,
            account_id: &str,
        ) -> Result<Outcome<()>> {
            let mut state = self.record(format!("remove {account_id} from {list}"));
            Ok(mutation(self.dry_run, || {
                let set = match list {
                    MemberList::ClassTeachers(id) => state.teachers.get_mut(id),
                    MemberList::ClassMembers(id) => state.students.get_mut(id),
                    MemberList::GroupMembers(id) => state.groups.get_mut(id),
                };
                if let Some(set) = set {
                    set.remove(account_id);
                }
            }))
        }

        async fn find_account(&self, principal_name: &str) -> Result<Outcome<String>> {
            let person = principal_name.trim_end_matches("@school.edu");
            if self.missing.iter().any(|m| m == person) {
                return Ok(Outcome::NotApplicable("404".into()));
            }
            Ok(Outcome::Applied(format!("u-{person}")))
        }

        async fn has_license(&self, _account_id: &str) -> Result<bool> {
            Ok(true)
        }
    }

    /// Roster whose principal names are `<person>@school.edu`, except people
    /// listed in `unknown`.
    struct FakeRoster {
        rows: Vec<Value>,
        unknown: Vec<String>,
    }

    #[async_trait]
    impl RosterSource for FakeRoster {
        async fn fetch_section_rows(&self) -> Result<Vec<Value>> {
            Ok(self.rows.clone())
        }

        async fn principal_name(&self, person_id: &str) -> Result<Option<String>> {
            if self.unknown.iter().any(|u| u == person_id) {
                return Ok(None);
            }
            Ok(Some(format!("{person_id}@school.edu")))
        }
    }

    /// A roster row as the sections query emits it; empty lists are omitted.
    fn row(code: &str, teachers: &[&str], students: &[&str]) -> Value {
        let mut row = json!({
            "classCode": code,
            "EVENT_LONG_NAME": format!("{code} section"),
            "SectionId": 100,
        });
        for (key, people) in [("SECTIONPER", teachers), ("TRANSCRIPTDETAIL", students)] {
            if !people.is_empty() {
                row[key] = people
                    .iter()
                    .map(|p| json!({ "PEOPLE_CODE_ID": p }))
                    .collect();
            }
        }
        row
    }

    fn roster(rows: Vec<Value>) -> FakeRoster {
        FakeRoster {
            rows,
            unknown: vec![],
        }
    }

    fn options(dir: &Path) -> SyncOptions {
        SyncOptions {
            dry_run: false,
            refresh_sections: true,
            apply_faculty_group: false,
            faculty_group: FACULTY.into(),
            student_group: STUDENTS.into(),
            registrars: vec![],
            identity_cache: dir.join("cached_users.json"),
            section_snapshot: dir.join("cached_sections.json"),
            anomaly_report: dir.join("error_users.json"),
        }
    }

    fn directory() -> FakeDirectory {
        FakeDirectory::default()
            .with_group(FACULTY, &[], &[])
            .with_group(STUDENTS, &[], &[])
    }

    async fn run(
        directory: &FakeDirectory,
        roster: FakeRoster,
        options: SyncOptions,
    ) -> Result<RunSummary> {
        let ctx = RunContext::new(directory.clone(), roster, IdentityMap::new());
        ReconcileEngine::new(ctx, options).run().await
    }

    #[tokio::test]
    async fn new_section_creates_class_without_membership_sync() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory();
        let rows = vec![row("BIO101", &["T1"], &["S1", "S2"])];

        let summary = run(&directory, roster(rows), options(dir.path())).await.unwrap();

        assert_eq!(summary.classes_created, 1);
        assert_eq!(summary.classes_synced, 0);
        let calls = directory.calls();
        assert!(calls.contains(&"create BIO101".to_string()));
        assert!(!calls.iter().any(|c| c.contains(" class ")));
    }

    #[tokio::test]
    async fn class_without_section_is_archived_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory()
            .with_class("c-bio", "BIO101", &[], &[])
            .with_class("c-chem", "CHEM201", &["u-T9"], &["u-S9"]);
        let rows = vec![row("BIO101", &[], &[])];

        let summary = run(&directory, roster(rows), options(dir.path())).await.unwrap();

        assert_eq!(summary.classes_archived, 1);
        assert_eq!(summary.classes_synced, 1);
        let calls = directory.calls();
        assert!(calls.contains(&"archive c-chem".to_string()));
        assert!(!calls.iter().any(|c| c.contains("c-chem") && c != "archive c-chem"));
        assert_eq!(directory.teachers("c-chem"), ids(&["u-T9"]));
    }

    #[tokio::test]
    async fn teachers_include_registrars() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory().with_class("c-bio", "BIO101", &["u-T1", "u-T2"], &[]);
        let rows = vec![row("BIO101", &["T1", "T3"], &[])];
        let mut opts = options(dir.path());
        opts.registrars = vec!["u-R".into()];

        let summary = run(&directory, roster(rows), opts).await.unwrap();

        assert_eq!(directory.teachers("c-bio"), ids(&["u-R", "u-T1", "u-T3"]));
        let calls = directory.calls();
        assert!(calls.contains(&"add u-T3 to class c-bio teachers".to_string()));
        assert!(calls.contains(&"add u-R to class c-bio teachers".to_string()));
        assert!(calls.contains(&"remove u-T2 from class c-bio teachers".to_string()));
        assert_eq!(summary.members_removed, 1);
    }

    #[tokio::test]
    async fn teachers_are_never_removed_as_students() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory().with_class("c-bio", "BIO101", &["u-T1"], &["u-S1", "u-S3"]);
        let rows = vec![row("BIO101", &["T1", "T2"], &["S1", "S2"])];

        run(&directory, roster(rows), options(dir.path())).await.unwrap();

        assert_eq!(directory.students("c-bio"), ids(&["u-S1", "u-S2"]));
        let calls = directory.calls();
        assert!(!calls.iter().any(|c| c.starts_with("remove u-T")));
        assert!(calls.contains(&"remove u-S3 from class c-bio members".to_string()));
    }

    #[tokio::test]
    async fn unresolved_person_is_cached_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory().with_class("c-bio", "BIO101", &[], &[]);
        let roster = FakeRoster {
            rows: vec![row("BIO101", &["P"], &["S1"])],
            unknown: vec!["P".into()],
        };
        let opts = options(dir.path());

        let summary = run(&directory, roster, opts.clone()).await.unwrap();

        assert_eq!(summary.unresolved_identities, 1);
        assert!(directory.teachers("c-bio").is_empty());

        let cache = cache::load_identity_cache(&opts.identity_cache).unwrap();
        assert_eq!(cache["P"].principal_name, Some(None));
        assert_eq!(cache["P"].account_id, None);

        let report = cache::load_anomaly_report(&opts.anomaly_report).unwrap();
        assert!(report.contains_key("P"));
        assert!(!report.contains_key("S1"));
    }

    #[tokio::test]
    async fn missing_account_is_invisible_to_diffs() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FakeDirectory {
            missing: vec!["S2".into()],
            ..directory()
        }
        .with_class("c-bio", "BIO101", &[], &[]);
        let rows = vec![row("BIO101", &[], &["S1", "S2"])];

        let summary = run(&directory, roster(rows), options(dir.path())).await.unwrap();

        assert_eq!(directory.students("c-bio"), ids(&["u-S1"]));
        assert_eq!(summary.unresolved_identities, 1);
    }

    #[tokio::test]
    async fn second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory()
            .with_class("c-bio", "BIO101", &["u-T2"], &["u-S9"])
            .with_class("c-old", "OLD100", &[], &[]);
        let rows = vec![
            row("BIO101", &["T1"], &["S1", "S2"]),
            row("CHEM201", &["T1"], &["S3"]),
        ];

        let first = run(&directory, roster(rows.clone()), options(dir.path()))
            .await
            .unwrap();
        assert_eq!(first.classes_created, 1);
        assert_eq!(first.classes_archived, 1);

        // The created class now exists and gets its members this time
        let second = run(&directory, roster(rows.clone()), options(dir.path()))
            .await
            .unwrap();
        assert_eq!(second.classes_created, 0);
        assert_eq!(second.classes_archived, 0);
        assert_eq!(second.classes_synced, 2);

        let third = run(&directory, roster(rows), options(dir.path())).await.unwrap();
        assert_eq!(
            third,
            RunSummary {
                classes_synced: 2,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn student_group_is_synced_and_owners_kept() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FakeDirectory::default()
            .with_group(FACULTY, &["u-X"], &[])
            .with_group(STUDENTS, &["u-owner", "u-gone"], &["u-owner"]);
        let rows = vec![row("BIO101", &["T1"], &["S1"])];

        run(&directory, roster(rows), options(dir.path())).await.unwrap();

        assert_eq!(directory.group(STUDENTS), ids(&["u-S1", "u-owner"]));
        // Faculty changes are computed only
        assert_eq!(directory.group(FACULTY), ids(&["u-X"]));
    }

    #[tokio::test]
    async fn faculty_group_applied_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FakeDirectory::default()
            .with_group(FACULTY, &["u-X", "u-dean"], &["u-dean"])
            .with_group(STUDENTS, &[], &[]);
        let rows = vec![row("BIO101", &["T1"], &[])];
        let mut opts = options(dir.path());
        opts.apply_faculty_group = true;

        run(&directory, roster(rows), opts).await.unwrap();

        assert_eq!(directory.group(FACULTY), ids(&["u-T1", "u-dean"]));
    }

    #[tokio::test]
    async fn dry_run_leaves_directory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FakeDirectory {
            dry_run: true,
            ..directory()
        }
        .with_class("c-bio", "BIO101", &["u-T2"], &[])
        .with_class("c-chem", "CHEM201", &[], &[]);
        let rows = vec![row("BIO101", &["T1"], &["S1"]), row("MATH200", &[], &[])];
        let mut opts = options(dir.path());
        opts.dry_run = true;

        let summary = run(&directory, roster(rows), opts.clone()).await.unwrap();

        assert!(summary.dry_run);
        assert_eq!(summary.classes_created, 1);
        assert_eq!(summary.classes_archived, 1);
        assert_eq!(directory.teachers("c-bio"), ids(&["u-T2"]));
        assert!(directory.students("c-bio").is_empty());
        assert_eq!(directory.state.lock().unwrap().classes.len(), 2);
        // Caches are still written
        assert!(opts.identity_cache.exists());
        assert!(opts.anomaly_report.exists());
    }

    #[tokio::test]
    async fn snapshot_replaces_roster_query() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory().with_class("c-bio", "BIO101", &[], &[]);

        let opts = options(dir.path());
        run(&directory, roster(vec![row("BIO101", &["T1"], &[])]), opts.clone())
            .await
            .unwrap();
        assert!(opts.section_snapshot.exists());

        // An empty roster would archive everything if it were queried
        let mut snapshot_opts = opts;
        snapshot_opts.refresh_sections = false;
        let summary = run(&directory, roster(vec![]), snapshot_opts).await.unwrap();
        assert_eq!(summary.classes_archived, 0);
        assert_eq!(summary.classes_synced, 1);
    }

    #[tokio::test]
    async fn duplicate_class_codes_in_snapshot_abort_run() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory();
        let mut opts = options(dir.path());
        opts.refresh_sections = false;

        let section = Section::from_row(row("BIO101", &["T1"], &[])).unwrap();
        cache::save_section_snapshot(&opts.section_snapshot, &[section.clone(), section])
            .unwrap();

        let err = run(&directory, roster(vec![]), opts).await.unwrap_err();

        assert!(matches!(err, RollcallError::MalformedRoster(_)));
        assert!(err.to_string().contains("duplicate classCode BIO101"));
        assert!(directory.calls().is_empty());
    }

    #[tokio::test]
    async fn not_applicable_changes_are_skipped_and_run_continues() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FakeDirectory {
            rejected: vec!["u-S2".into(), "c-chem".into()],
            ..directory()
        }
        .with_class("c-bio", "BIO101", &["u-T1"], &["u-S9"])
        .with_class("c-chem", "CHEM201", &[], &["u-S8"]);
        let rows = vec![row("BIO101", &["T1"], &["S1", "S2", "S3"])];

        let summary = run(&directory, roster(rows), options(dir.path())).await.unwrap();

        // u-S2 is refused by the class and by the student group
        assert_eq!(summary.members_skipped, 2);
        assert_eq!(directory.students("c-bio"), ids(&["u-S1", "u-S3"]));
        assert_eq!(directory.group(STUDENTS), ids(&["u-S1", "u-S3"]));
        let calls = directory.calls();
        assert!(calls.contains(&"remove u-S9 from class c-bio members".to_string()));

        // The archive was refused, yet the class is still left alone
        assert_eq!(summary.classes_archived, 0);
        assert_eq!(summary.classes_synced, 1);
        assert!(!calls.iter().any(|c| c.contains("c-chem") && c != "archive c-chem"));
        assert_eq!(directory.students("c-chem"), ids(&["u-S8"]));
    }

    #[tokio::test]
    async fn malformed_roster_aborts_before_directory_calls() {
        let dir = tempfile::tempdir().unwrap();
        let directory = directory();
        let rows = vec![json!({"classCode": "BIO101", "EVENT_LONG_NAME": "x", "SECTIONPER": []})];

        let err = run(&directory, roster(rows), options(dir.path()))
            .await
            .unwrap_err();

        assert!(matches!(err, RollcallError::MalformedRoster(_)));
        assert!(directory.calls().is_empty());
    }

    #[tokio::test]
    async fn fatal_directory_error_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let directory = FakeDirectory {
            fail_listing: true,
            ..directory()
        };
        let opts = options(dir.path());

        let result = run(&directory, roster(vec![row("BIO101", &[], &[])]), opts.clone()).await;

        assert!(result.is_err());
        assert!(!opts.identity_cache.exists());
        assert!(!opts.anomaly_report.exists());
    }

    #[test]
    fn summary_display() {
        let summary = RunSummary {
            classes_created: 2,
            dry_run: true,
            ..Default::default()
        };
        let text = summary.to_string();
        assert!(text.starts_with("Dry run"));
        assert!(text.contains("Classes created:       2"));
    }

    #[test]
    fn options_from_default_config() {
        let config = RollcallConfig::generate_default();
        let opts = SyncOptions::from_config(&config);
        assert_eq!(opts.refresh_sections, config.sync.refresh_sections);
        assert_eq!(opts.faculty_group, config.graph.faculty_team);
        assert!(!opts.apply_faculty_group);
    }
}
