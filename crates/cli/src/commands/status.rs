use std::path::Path;

use rollcall_core::cache;
use rollcall_core::config::RollcallConfig;
use tracing::info;

/// Identity cache figures shown by `status`.
#[derive(Debug, Default, PartialEq, Eq)]
struct IdentityStats {
    entries: usize,
    resolved: usize,
    unresolved: usize,
    pending: usize,
}

fn identity_stats(identities: &cache::IdentityMap) -> IdentityStats {
    let mut stats = IdentityStats {
        entries: identities.len(),
        ..Default::default()
    };
    for entry in identities.values() {
        if entry.resolved_account().is_some() {
            stats.resolved += 1;
        } else if entry.has_null() {
            stats.unresolved += 1;
        } else {
            stats.pending += 1;
        }
    }
    stats
}

/// Run the `status` command: summarize the files left by previous runs.
pub fn run(config_path: &str) -> anyhow::Result<()> {
    let config = RollcallConfig::load(Path::new(config_path))?;
    // Only local files are read, so roster settings are not required
    config.validate_offline()?;

    info!("Loaded configuration from {}", config_path);

    println!("Rollcall Status");
    println!("===============");
    println!("Graph endpoint: {}", config.graph.endpoint);
    println!(
        "Sections from:  {}",
        if config.sync.refresh_sections {
            "roster database"
        } else {
            "snapshot"
        }
    );
    println!();

    let identity_path = Path::new(&config.cache.identity_cache);
    let stats = identity_stats(&cache::load_identity_cache(identity_path)?);
    println!("Identity Cache");
    println!("--------------");
    println!("File:       {}", identity_path.display());
    println!("Entries:    {}", stats.entries);
    println!("Resolved:   {}", stats.resolved);
    println!("Unresolved: {}", stats.unresolved);
    println!("Pending:    {}", stats.pending);
    println!();

    let snapshot_path = Path::new(&config.cache.section_snapshot);
    println!("Section Snapshot");
    println!("----------------");
    if snapshot_path.exists() {
        let sections = cache::load_section_snapshot(snapshot_path)?;
        let enrollments: usize = sections.iter().map(|s| s.students.len()).sum();
        println!("Sections:    {}", sections.len());
        println!("Enrollments: {}", enrollments);
    } else {
        println!("No snapshot at {}", snapshot_path.display());
    }
    println!();

    let report_path = Path::new(&config.cache.anomaly_report);
    println!("Anomalies");
    println!("---------");
    if report_path.exists() {
        let users = cache::load_anomaly_report(report_path)?;
        println!("People with unresolved identities: {}", users.len());
    } else {
        println!("No anomaly report at {}", report_path.display());
    }

    Ok(())
}
