use std::path::Path;

use rollcall_core::config::RollcallConfig;
use tracing::info;

/// Run the `init` command: write a default configuration file.
pub fn run(config_path: &str) -> anyhow::Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        anyhow::bail!("{config_path} already exists, refusing to overwrite it");
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
            info!("Created directory: {}", parent.display());
        }
    }

    let config = RollcallConfig::generate_default();
    let toml_str = toml::to_string_pretty(&config)?;
    std::fs::write(path, &toml_str)?;
    info!("Wrote configuration to {}", path.display());

    println!("Rollcall configuration written to {config_path}");
    println!();
    println!("Next steps:");
    println!("  1. Fill in [graph] authority, application_id, secret and the group ids");
    println!("  2. Point [roster] at the SIS database and the two query files");
    println!("  3. Set sync.refresh_sections = true once the roster is configured");
    println!("  4. Run `rollcall sync --dry-run` and review the log");
    println!("  5. Run `rollcall sync` to apply the changes");

    Ok(())
}
