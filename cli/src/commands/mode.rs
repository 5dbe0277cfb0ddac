// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Governance mode inspection and changes.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;

use toolgate_core::domain::policy::GovernanceMode;
use toolgate_core::ToolGate;

#[derive(Subcommand)]
pub enum ModeCommand {
    /// Print the current governance mode
    Show,
    /// Switch the running gateway to a new governance mode
    Set {
        /// One of: read_only, permission, bypass
        mode: String,
    },
}

pub async fn handle_command(command: ModeCommand, registry_path: PathBuf) -> Result<()> {
    let gate = ToolGate::connect(&registry_path)
        .await
        .context("failed to connect to the gateway")?;

    match command {
        ModeCommand::Show => {
            let mode = gate.current_mode().await;
            println!("{}", mode.as_str().bold());
        }
        ModeCommand::Set { mode } => {
            let Some(parsed) = GovernanceMode::parse(&mode.to_lowercase()) else {
                bail!("unrecognized mode '{mode}'; expected read_only, permission, or bypass");
            };
            if gate.set_mode(parsed).await {
                println!("{}", format!("mode set to {}", parsed.as_str()).green());
            } else {
                bail!("failed to persist the new governance mode");
            }
        }
    }
    Ok(())
}
