use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rollcall_core::cache::{self, IdentityMap};
use rollcall_core::config::RollcallConfig;
use rollcall_core::roster::{OfflineRoster, RosterSource, SqlRosterSource};
use rollcall_teams::auth::ClientCredentialsAuth;
use rollcall_teams::client::GraphClient;
use rollcall_teams::gateway::DirectoryGateway;
use rollcall_teams::retry::RetryPolicy;
use rollcall_teams::sync::{ReconcileEngine, RunContext, SyncOptions};
use tracing::{info, warn};

/// Command-line settings that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dry_run: bool,
    pub debug: bool,
    /// `Some` when `--refresh-sections` or `--use-snapshot` was given.
    pub refresh_sections: Option<bool>,
    pub clear_identity_cache: bool,
}

impl Overrides {
    fn apply(&self, config: &mut RollcallConfig) {
        config.sync.dry_run |= self.dry_run;
        config.sync.debug |= self.debug;
        config.sync.clear_identity_cache |= self.clear_identity_cache;
        if let Some(refresh) = self.refresh_sections {
            config.sync.refresh_sections = refresh;
        }
    }
}

/// Run the `sync` command: one full reconciliation against Microsoft Graph.
pub async fn run(config_path: &str, overrides: Overrides) -> anyhow::Result<()> {
    let mut config = RollcallConfig::load(Path::new(config_path))?;
    overrides.apply(&mut config);
    config.validate()?;

    info!("Loaded configuration from {}", config_path);

    let identities = if config.sync.clear_identity_cache {
        info!("Identity cache cleared for this run");
        IdentityMap::new()
    } else {
        cache::load_identity_cache(Path::new(&config.cache.identity_cache))?
    };

    let auth = ClientCredentialsAuth::from_config(&config.graph);
    let client = GraphClient::new(Arc::new(auth)).with_base_url(&config.graph.endpoint);
    let gateway = DirectoryGateway::new(
        client,
        RetryPolicy::new(config.sync.max_retries),
        config.sync.dry_run,
    );

    if config.sync.dry_run {
        println!("Dry run mode - no changes will be sent to Microsoft Graph");
    }

    let roster = &config.roster;
    match (
        roster.database_url.as_deref(),
        roster.sections_query.as_deref(),
        roster.principal_name_query.as_deref(),
    ) {
        (Some(url), Some(sections), Some(principal_names)) => {
            let source =
                SqlRosterSource::connect(url, Path::new(sections), Path::new(principal_names))
                    .await?;
            info!("Connected to roster database");
            reconcile(&config, gateway, source, identities).await
        }
        _ => {
            warn!("No roster database configured; only cached identities can be resolved");
            reconcile(&config, gateway, OfflineRoster, identities).await
        }
    }
}

async fn reconcile<S: RosterSource>(
    config: &RollcallConfig,
    gateway: DirectoryGateway,
    roster: S,
    identities: IdentityMap,
) -> anyhow::Result<()> {
    println!("Starting class sync...");
    let start = Instant::now();

    let ctx = RunContext::new(gateway, roster, identities);
    let mut engine = ReconcileEngine::new(ctx, SyncOptions::from_config(config));
    let summary = engine.run().await?;

    println!();
    println!("{summary}");
    println!("Duration:              {:.1}s", start.elapsed().as_secs_f64());
    if summary.unresolved_identities > 0 {
        println!(
            "See {} for people who could not be resolved.",
            config.cache.anomaly_report
        );
    }

    Ok(())
}
