//! Init command - create the data directory, settings and database

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::json;

use ledgerlink_core::config::Config;
use ledgerlink_core::LedgerlinkContext;

use super::{get_context, get_data_dir};
use crate::output;

pub fn run(json: bool) -> Result<()> {
    let data_dir = get_data_dir();
    let ctx = get_context()?;

    // Tunable sections from the file only, env overrides are not persisted
    let settings_path = Config::from_file(&data_dir)
        .and_then(|config| config.save(&data_dir))
        .context("Failed to write settings")?;
    let database_path = LedgerlinkContext::database_path(&data_dir);
    let providers: Vec<String> = ctx.providers.providers().iter().map(|p| p.to_string()).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "dataDir": data_dir,
                "settings": settings_path,
                "database": database_path,
                "environment": ctx.config.environment.to_string(),
                "providers": providers,
                "notifier": ctx.notifier.name(),
            }))?
        );
        return Ok(());
    }

    output::success(&format!("Initialized {}", data_dir.display()));
    println!("  Settings:    {}", settings_path.display());
    println!("  Database:    {}", database_path.display());
    println!("  Environment: {}", ctx.config.environment);
    println!("  Notifier:    {}", ctx.notifier.name());
    if providers.is_empty() {
        println!(
            "  Providers:   {}",
            "none (set PLAID_CLIENT_ID and PLAID_SECRET)".yellow()
        );
    } else {
        println!("  Providers:   {}", providers.join(", "));
    }
    Ok(())
}
