//! Connections command - list, register and disable bank connections

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::{Confirm, Password};
use serde::Serialize;
use uuid::Uuid;

use ledgerlink_core::ports::ConnectionStore;
use ledgerlink_core::{BankConnection, ConnectionStatus, Provider};

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum ConnectionsCommands {
    /// List bank connections
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Register a connection from a provider access token
    Add {
        /// Provider (plaid, teller, gocardless, stripe)
        #[arg(long, default_value = "plaid")]
        provider: String,
        /// Access token from the provider's link flow (prompted if omitted)
        #[arg(long, env = "LEDGERLINK_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,
        /// Refresh token, for providers that issue one
        #[arg(long)]
        refresh_token: Option<String>,
        /// Owning user (a new ID is generated if omitted)
        #[arg(long)]
        user_id: Option<Uuid>,
        /// Institution display name
        #[arg(long)]
        institution: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stop syncing a connection
    Disable {
        /// Connection ID
        connection_id: Uuid,
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Connection fields safe to print (no tokens)
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionSummary {
    id: Uuid,
    user_id: Uuid,
    provider: Provider,
    institution_name: Option<String>,
    status: ConnectionStatus,
    disabled: bool,
    accounts: usize,
    error_message: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    last_accessed_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl ConnectionSummary {
    fn new(connection: &BankConnection, accounts: usize) -> Self {
        Self {
            id: connection.id,
            user_id: connection.user_id,
            provider: connection.provider,
            institution_name: connection.institution_name.clone(),
            status: connection.status,
            disabled: connection.disabled,
            accounts,
            error_message: connection.error_message.clone(),
            last_synced_at: connection.last_synced_at,
            last_accessed_at: connection.last_accessed_at,
            expires_at: connection.expires_at,
        }
    }
}

pub async fn run(command: ConnectionsCommands) -> Result<()> {
    match command {
        ConnectionsCommands::List { json } => list(json).await,
        ConnectionsCommands::Add {
            provider,
            access_token,
            refresh_token,
            user_id,
            institution,
            json,
        } => {
            add(
                &provider,
                access_token,
                refresh_token,
                user_id,
                institution,
                json,
            )
            .await
        }
        ConnectionsCommands::Disable {
            connection_id,
            force,
            json,
        } => disable(connection_id, force, json).await,
    }
}

async fn list(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let mut summaries = Vec::new();
    for connection in ctx.store.list_connections().await? {
        let accounts = ctx.store.list_accounts(connection.id).await?.len();
        summaries.push(ConnectionSummary::new(&connection, accounts));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!(
            "{}",
            "No connections. Use 'ledgerlink connections add' to register one.".yellow()
        );
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "ID",
        "Institution",
        "Provider",
        "Status",
        "Accounts",
        "Last synced",
    ]);
    for s in &summaries {
        let status = if s.disabled {
            format!("{} {}", output::status_label(s.status), "(disabled)".dimmed())
        } else {
            output::status_label(s.status)
        };
        table.add_row(vec![
            s.id.to_string(),
            s.institution_name.clone().unwrap_or_default(),
            s.provider.to_string(),
            status,
            s.accounts.to_string(),
            output::format_time(s.last_synced_at),
        ]);
    }
    println!("{}", table);

    for s in summaries.iter().filter(|s| s.error_message.is_some()) {
        println!(
            "  {} {}",
            s.id.to_string().dimmed(),
            s.error_message.as_deref().unwrap_or_default().red()
        );
    }
    Ok(())
}

async fn add(
    provider: &str,
    access_token: Option<String>,
    refresh_token: Option<String>,
    user_id: Option<Uuid>,
    institution: Option<String>,
    json: bool,
) -> Result<()> {
    let provider: Provider = provider.parse()?;
    let access_token = match access_token {
        Some(token) => token,
        None => Password::new()
            .with_prompt("Access token")
            .interact()
            .context("Failed to read access token")?,
    };

    let ctx = get_context()?;
    let (connection, accounts) = ctx
        .setup()
        .register_connection(
            provider,
            &access_token,
            refresh_token,
            user_id.unwrap_or_else(Uuid::new_v4),
            institution,
        )
        .await
        .context("Failed to register connection")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&ConnectionSummary::new(&connection, accounts.len()))?
        );
        return Ok(());
    }

    output::success(&format!(
        "Connected {} ({} account{})",
        connection.display_name(),
        accounts.len(),
        if accounts.len() == 1 { "" } else { "s" }
    ));
    println!("  Connection ID: {}", connection.id);
    for account in &accounts {
        println!(
            "  • {} {}",
            account.name,
            account
                .mask
                .as_deref()
                .map(|m| format!("(…{})", m))
                .unwrap_or_default()
                .dimmed()
        );
    }
    Ok(())
}

async fn disable(connection_id: Uuid, force: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;

    if !force && !json {
        println!(
            "\n{}",
            "Scheduled syncs and sweeps will skip this connection.".yellow()
        );
        println!("{}\n", "Synced transactions stay in the database.".dimmed());

        if !Confirm::new()
            .with_prompt(format!("Disable connection {}?", connection_id))
            .default(false)
            .interact()?
        {
            println!("{}", "Cancelled".dimmed());
            return Ok(());
        }
    }

    let connection = ctx.setup().disable_connection(connection_id).await?;
    if json {
        println!("{}", serde_json::json!({ "id": connection.id, "disabled": true }));
    } else {
        output::success(&format!("Disabled {}", connection.display_name()));
    }
    Ok(())
}
