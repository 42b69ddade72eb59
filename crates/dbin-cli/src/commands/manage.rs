//! Management commands: list, cleanup, config

use anyhow::{bail, Context, Result};
use dbin_config::{Catalog, ClientKind, GlobalConfig};
use dbin_core::purge_managed;
use dbin_provider::ContainerProvider;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::io::Write;

/// Print every database in the catalog
pub fn list(catalog: &Catalog, out: &mut impl Write) -> Result<()> {
    let width = catalog.list().map(|s| s.name.len()).max().unwrap_or(0);

    for spec in catalog.list() {
        let mut notes = Vec::new();
        if spec.is_clustered() {
            let roles: Vec<_> = spec.roles.iter().map(|r| r.name.as_str()).collect();
            notes.push(roles.join(" + "));
        }
        if matches!(spec.client.kind, ClientKind::Web { .. }) {
            notes.push("web".to_string());
        }

        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" [{}]", notes.join(", "))
        };
        writeln!(out, "{:<width$}  {}{}", spec.name, spec.description, notes, width = width)?;
    }
    Ok(())
}

/// Remove every dbin-managed container and network
pub async fn cleanup(provider: &dyn ContainerProvider, yes: bool, stop_timeout: u32) -> Result<()> {
    let containers: Vec<_> = provider
        .list(true)
        .await?
        .into_iter()
        .filter(|c| c.is_dbin_managed())
        .collect();
    let networks = provider.list_networks().await?;

    if containers.is_empty() && networks.is_empty() {
        println!("Nothing to clean up");
        return Ok(());
    }

    println!(
        "Found {} container(s) and {} network(s) managed by dbin:",
        containers.len(),
        networks.len()
    );
    for container in &containers {
        println!("  {} ({}, {})", container.name, container.image, container.status);
    }
    for network in &networks {
        println!("  {} (network)", network.name);
    }

    if !yes {
        if !std::io::IsTerminal::is_terminal(&std::io::stdin()) {
            bail!("Refusing to remove resources without confirmation; pass --yes");
        }
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Remove them?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    let report = purge_managed(provider, stop_timeout).await?;
    println!("Removed {} container(s)", report.removed_containers.len());
    for warning in &report.warnings {
        eprintln!(
            "Warning: could not {} {}: {}",
            warning.action, warning.resource, warning.message
        );
    }
    if !report.is_clean() {
        bail!("{} resource(s) could not be removed", report.warnings.len());
    }
    Ok(())
}

/// Show or edit configuration
pub async fn config(edit: bool) -> Result<()> {
    let config_path = GlobalConfig::config_path()?;

    if edit {
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

        // Create config file with defaults if it doesn't exist
        if !config_path.exists() {
            GlobalConfig::default().save()?;
            println!("Created default config at {:?}", config_path);
        }

        std::process::Command::new(&editor)
            .arg(&config_path)
            .status()
            .context(format!("Failed to open editor: {}", editor))?;
    } else if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("# Config file: {:?}\n", config_path);
        println!("{}", content);
    } else {
        println!("# Config file: {:?} (not created yet)\n", config_path);
        println!("# Default configuration:");
        let content = toml::to_string_pretty(&GlobalConfig::default())?;
        println!("{}", content);
        println!("\n# Run 'dbin config --edit' to create and edit the config file.");
    }

    Ok(())
}
