//! TOML-based configuration system for Rollcall.

use crate::error::{Result, RollcallError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level Rollcall configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollcallConfig {
    pub graph: GraphConfig,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Microsoft Graph tenant, credentials and the fixed groups to reconcile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_endpoint")]
    pub endpoint: String,
    /// Token authority, e.g. `https://login.microsoftonline.com/<tenant-id>`.
    pub authority: String,
    pub application_id: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Group id of the faculty team.
    pub faculty_team: String,
    /// Group id of the student team.
    pub student_team: String,
    /// Account ids added as teachers to every class. Empty to disable.
    #[serde(default)]
    pub registrars: Vec<String>,
}

fn default_graph_endpoint() -> String {
    "https://graph.microsoft.com/v1.0".into()
}

fn default_scopes() -> Vec<String> {
    vec!["https://graph.microsoft.com/.default".into()]
}

/// Student-information database connection and query files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RosterConfig {
    /// sqlx connection URL (`sqlite:`, `postgres:`).
    #[serde(default)]
    pub database_url: Option<String>,
    /// SQL returning current sections as JSON text, possibly split over rows.
    #[serde(default)]
    pub sections_query: Option<String>,
    /// SQL taking one person id parameter and returning the principal name.
    #[serde(default)]
    pub principal_name_query: Option<String>,
}

/// Run behaviour switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// Query the roster source instead of reading the section snapshot.
    #[serde(default = "default_true")]
    pub refresh_sections: bool,
    /// Start with an empty identity cache.
    #[serde(default)]
    pub clear_identity_cache: bool,
    /// Apply computed faculty-group changes. When false they are only logged.
    #[serde(default)]
    pub apply_faculty_group: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debug: false,
            dry_run: false,
            refresh_sections: true,
            clear_identity_cache: false,
            apply_faculty_group: false,
            max_retries: default_max_retries(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    10
}

/// Locations of the files persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_identity_cache")]
    pub identity_cache: String,
    #[serde(default = "default_section_snapshot")]
    pub section_snapshot: String,
    #[serde(default = "default_anomaly_report")]
    pub anomaly_report: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            identity_cache: default_identity_cache(),
            section_snapshot: default_section_snapshot(),
            anomaly_report: default_anomaly_report(),
        }
    }
}

fn default_identity_cache() -> String {
    "cached_users.json".into()
}

fn default_section_snapshot() -> String {
    "cached_sections.json".into()
}

fn default_anomaly_report() -> String {
    "error_users.json".into()
}

impl RollcallConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RollcallError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Validate the Graph and cache settings, skipping roster access checks.
    pub fn validate_offline(&self) -> Result<()> {
        if !self.graph.endpoint.starts_with("http://")
            && !self.graph.endpoint.starts_with("https://")
        {
            return Err(RollcallError::Config(format!(
                "graph.endpoint must be an http(s) URL, got {:?}",
                self.graph.endpoint
            )));
        }

        for (name, value) in [
            ("graph.authority", &self.graph.authority),
            ("graph.application_id", &self.graph.application_id),
            ("graph.faculty_team", &self.graph.faculty_team),
            ("graph.student_team", &self.graph.student_team),
            ("cache.identity_cache", &self.cache.identity_cache),
            ("cache.section_snapshot", &self.cache.section_snapshot),
            ("cache.anomaly_report", &self.cache.anomaly_report),
        ] {
            if value.is_empty() {
                return Err(RollcallError::Config(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }

    /// Check everything [`validate_offline`](Self::validate_offline) does, plus
    /// roster access when the snapshot is being refreshed.
    pub fn validate(&self) -> Result<()> {
        self.validate_offline()?;

        if self.sync.refresh_sections {
            if self.roster.database_url.is_none() {
                return Err(RollcallError::Config(
                    "roster.database_url is required when sync.refresh_sections is true".into(),
                ));
            }
            for (name, path) in [
                ("roster.sections_query", &self.roster.sections_query),
                ("roster.principal_name_query", &self.roster.principal_name_query),
            ] {
                let path = path.as_deref().ok_or_else(|| {
                    RollcallError::Config(format!(
                        "{name} is required when sync.refresh_sections is true"
                    ))
                })?;
                if !Path::new(path).exists() {
                    return Err(RollcallError::Config(format!(
                        "{name} file does not exist: {path}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Generate a default configuration that reads sections from the snapshot file.
    pub fn generate_default() -> Self {
        Self {
            graph: GraphConfig {
                endpoint: default_graph_endpoint(),
                authority: "https://login.microsoftonline.com/your-tenant-id".into(),
                application_id: "00000000-0000-0000-0000-000000000000".into(),
                secret: String::new(),
                scopes: default_scopes(),
                faculty_team: "faculty-group-id".into(),
                student_team: "student-group-id".into(),
                registrars: Vec::new(),
            },
            roster: RosterConfig::default(),
            sync: SyncConfig {
                refresh_sections: false,
                ..SyncConfig::default()
            },
            cache: CacheConfig::default(),
        }
    }
}
