// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `toolgate admin` — maintenance operations an operator runs out of band:
//! sweeping expired leases and revoking a standing scoped elevation early.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use toolgate_core::ToolGate;

#[derive(Subcommand)]
pub enum AdminCommand {
    /// Sweep leases whose TTL already elapsed
    PurgeLeases,
    /// Revoke a client's lease for a tool
    RevokeLease { client_id: String, tool: String },
    /// Revoke a standing scoped elevation for (tool, context, session)
    RevokeElevation {
        tool: String,
        context_key: String,
        session_id: String,
    },
}

pub async fn handle_command(command: AdminCommand, registry_path: PathBuf) -> Result<()> {
    let gate = ToolGate::connect(&registry_path)
        .await
        .context("failed to connect to the gateway")?;

    match command {
        AdminCommand::PurgeLeases => {
            let purged = gate.purge_expired_leases().await;
            println!("{}", format!("purged {purged} expired lease(s)").green());
        }
        AdminCommand::RevokeLease { client_id, tool } => {
            let revoked = gate.revoke_lease(&client_id, &tool).await;
            println!("{}", if revoked { "revoked".green() } else { "nothing to revoke".dimmed() });
        }
        AdminCommand::RevokeElevation { tool, context_key, session_id } => {
            let revoked = gate.revoke_elevation(&tool, &context_key, &session_id).await;
            println!("{}", if revoked { "revoked".green() } else { "nothing to revoke".dimmed() });
        }
    }
    Ok(())
}
