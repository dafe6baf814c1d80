//! Microsoft Graph implementation of [`Directory`].
//!
//! Every request goes through the retry policy. Listings follow
//! `@odata.nextLink` to the end. Mutations are skipped in dry run. A handful of
//! statuses are expected on specific operations and come back as
//! [`Outcome::NotApplicable`]:
//!
//! | operation            | expected statuses |
//! |----------------------|-------------------|
//! | team archived flag   | 404, 500          |
//! | add member / teacher | 404               |
//! | archive team         | 404               |
//! | user by principal    | 404               |
//!
//! Any other non-2xx status is an error.

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use rollcall_core::error::Result;
use rollcall_core::models::class_group::ClassGroup;
use rollcall_core::models::section::Section;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::client::GraphClient;
use crate::directory::{Directory, MemberList, Outcome};
use crate::models::{
    DirectoryObject, EducationClass, GraphUser, LicenseDetails, NewEducationClass, ODataPage,
    ODataRef, TeamArchiveState,
};
use crate::retry::RetryPolicy;

const MEMBER_SELECT: &str = "$select=id,displayName,mail,userType,userPrincipalName";

/// Resilient Graph access used by the sync engine.
pub struct DirectoryGateway {
    client: GraphClient,
    retry: RetryPolicy,
    dry_run: bool,
}

impl DirectoryGateway {
    pub fn new(client: GraphClient, retry: RetryPolicy, dry_run: bool) -> Self {
        Self {
            client,
            retry,
            dry_run,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn execute(
        &self,
        operation: &str,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response> {
        let client = &self.client;
        self.retry
            .run(operation, move || client.send(method.clone(), url, body))
            .await
    }

    async fn get_all<T: DeserializeOwned>(&self, operation: &str, url: String) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;
        while let Some(url) = next {
            let resp = self.execute(operation, Method::GET, &url, None).await?;
            let page: ODataPage<T> = GraphClient::json(resp, operation).await?;
            pages += 1;
            items.extend(page.value);
            next = page.next_link;
        }
        debug!(operation, pages, count = items.len(), "listing complete");
        Ok(items)
    }

    async fn list_ids(&self, operation: &str, url: String) -> Result<Vec<String>> {
        let objects: Vec<DirectoryObject> = self.get_all(operation, url).await?;
        Ok(objects.into_iter().filter_map(|o| o.id).collect())
    }

    fn simulated<T>(&self, action: &str) -> Option<Outcome<T>> {
        if self.dry_run {
            info!(action, "dry run, not sent");
            Some(Outcome::Simulated)
        } else {
            None
        }
    }

    fn list_path(list: MemberList<'_>) -> String {
        match list {
            MemberList::ClassTeachers(id) => format!("/education/classes/{id}/teachers"),
            MemberList::ClassMembers(id) => format!("/education/classes/{id}/members"),
            MemberList::GroupMembers(id) => format!("/groups/{id}/members"),
        }
    }

    fn member_ref(&self, list: MemberList<'_>, account_id: &str) -> ODataRef {
        let id = match list {
            MemberList::ClassTeachers(_) | MemberList::ClassMembers(_) => {
                self.client.url(&format!("/education/users/{account_id}"))
            }
            MemberList::GroupMembers(_) => {
                self.client.url(&format!("/directoryObjects/{account_id}"))
            }
        };
        ODataRef { id }
    }
}

async fn body_text(resp: Response) -> String {
    resp.text().await.unwrap_or_default()
}

#[async_trait]
impl Directory for DirectoryGateway {
    async fn list_classes(&self) -> Result<Vec<ClassGroup>> {
        let classes: Vec<EducationClass> = self
            .get_all("list classes", self.client.url("/education/classes"))
            .await?;

        let total = classes.len();
        let mut active = Vec::new();
        for (idx, class) in classes.into_iter().enumerate() {
            let Some(class_code) = class.class_code.filter(|c| !c.is_empty()) else {
                debug!(class_id = %class.id, "ignoring class without classCode");
                continue;
            };

            info!(position = idx + 1, total, class_code = %class_code, "checking class archive state");
            let archived = self.class_archived(&class.id).await?.applied();
            if archived == Some(true) {
                debug!(class_code = %class_code, "ignoring archived class");
                continue;
            }

            active.push(ClassGroup {
                id: class.id,
                class_code,
                archived,
            });
        }

        info!(total, active = active.len(), "loaded directory classes");
        Ok(active)
    }

    async fn class_archived(&self, class_id: &str) -> Result<Outcome<bool>> {
        let operation = "get team archive state";
        let url = self.client.url(&format!("/teams/{class_id}?$select=isArchived"));
        let resp = self.execute(operation, Method::GET, &url, None).await?;

        match resp.status() {
            // Newly created classes have no team yet
            StatusCode::NOT_FOUND | StatusCode::INTERNAL_SERVER_ERROR => {
                let status = resp.status();
                let body = body_text(resp).await;
                debug!(class_id, %status, body = %body, "team not available");
                Ok(Outcome::NotApplicable(format!("team not available ({status})")))
            }
            _ => {
                let state: TeamArchiveState = GraphClient::json(resp, operation).await?;
                Ok(Outcome::Applied(state.is_archived.unwrap_or(false)))
            }
        }
    }

    async fn create_class(&self, section: &Section) -> Result<Outcome<String>> {
        if let Some(simulated) = self.simulated(&format!("create class {}", section.class_code)) {
            return Ok(simulated);
        }

        let operation = "create class";
        let body = serde_json::to_value(NewEducationClass::from_section(section))?;
        debug!(body = %body, "new class request");
        let url = self.client.url("/education/classes");
        let resp = self.execute(operation, Method::POST, &url, Some(&body)).await?;
        let created: EducationClass = GraphClient::json(resp, operation).await?;
        Ok(Outcome::Applied(created.id))
    }

    async fn archive_team(&self, team_id: &str) -> Result<Outcome<()>> {
        if let Some(simulated) = self.simulated(&format!("archive team {team_id}")) {
            return Ok(simulated);
        }

        let operation = "archive team";
        let url = self.client.url(&format!("/teams/{team_id}/archive"));
        let resp = self.execute(operation, Method::POST, &url, None).await?;

        // Archiving often 404s while the backend settles; the team is going away regardless
        if resp.status() == StatusCode::NOT_FOUND {
            let body = body_text(resp).await;
            warn!(team_id, body = %body, "error archiving team, continuing");
            return Ok(Outcome::NotApplicable("team not found".into()));
        }

        GraphClient::ensure_success(resp, operation).await?;
        Ok(Outcome::Applied(()))
    }

    async fn list_members(&self, list: MemberList<'_>) -> Result<Vec<String>> {
        let url = self
            .client
            .url(&format!("{}?{MEMBER_SELECT}", Self::list_path(list)));
        self.list_ids(&format!("list {list}"), url).await
    }

    async fn list_group_owners(&self, group_id: &str) -> Result<Vec<String>> {
        let url = self
            .client
            .url(&format!("/groups/{group_id}/owners?{MEMBER_SELECT}"));
        self.list_ids(&format!("list group {group_id} owners"), url)
            .await
    }

    async fn add_member(&self, list: MemberList<'_>, account_id: &str) -> Result<Outcome<()>> {
        let operation = format!("add {account_id} to {list}");
        if let Some(simulated) = self.simulated(&operation) {
            return Ok(simulated);
        }

        let body = serde_json::to_value(self.member_ref(list, account_id))?;
        let url = self.client.url(&format!("{}/$ref", Self::list_path(list)));
        let resp = self
            .execute(&operation, Method::POST, &url, Some(&body))
            .await?;

        // Seen for unlicensed or not yet provisioned users
        if resp.status() == StatusCode::NOT_FOUND {
            let body = body_text(resp).await;
            warn!(%list, account_id, body = %body, "member add returned 404, skipping");
            return Ok(Outcome::NotApplicable("account not found".into()));
        }

        GraphClient::ensure_success(resp, &operation).await?;
        Ok(Outcome::Applied(()))
    }

    async fn remove_member(
        &self,
        list: MemberList<'_>,
        account_id: &str,
    ) -> Result<Outcome<()>> {
        let operation = format!("remove {account_id} from {list}");
        if let Some(simulated) = self.simulated(&operation) {
            return Ok(simulated);
        }

        let url = self
            .client
            .url(&format!("{}/{account_id}/$ref", Self::list_path(list)));
        let resp = self.execute(&operation, Method::DELETE, &url, None).await?;
        GraphClient::ensure_success(resp, &operation).await?;
        Ok(Outcome::Applied(()))
    }

    async fn find_account(&self, principal_name: &str) -> Result<Outcome<String>> {
        let operation = "get user by principal name";
        let url = self.client.url(&format!(
            "/users/{}?$select=displayName,id",
            urlencoding::encode(principal_name)
        ));
        let resp = self.execute(operation, Method::GET, &url, None).await?;

        if resp.status() == StatusCode::NOT_FOUND {
            let body = body_text(resp).await;
            debug!(principal_name, body = %body, "no directory account");
            return Ok(Outcome::NotApplicable("no account for principal name".into()));
        }

        let user: GraphUser = GraphClient::json(resp, operation).await?;
        debug!(principal_name, account_id = %user.id, "found directory account");
        Ok(Outcome::Applied(user.id))
    }

    async fn has_license(&self, account_id: &str) -> Result<bool> {
        let operation = "get license details";
        let url = self
            .client
            .url(&format!("/users/{account_id}/licenseDetails"));
        let resp = self.execute(operation, Method::GET, &url, None).await?;
        let details: LicenseDetails = GraphClient::json(resp, operation).await?;
        Ok(details.value.is_some_and(|licenses| !licenses.is_empty()))
    }
}
