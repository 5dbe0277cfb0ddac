// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `toolgate schema` — progressive schema exposure, mirroring the
//! `get_tool_schema`/`expand_tool_schema` bootstrap tools.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use toolgate_core::ToolGate;

#[derive(Subcommand)]
pub enum SchemaCommand {
    /// Grant a lease and print the minimal schema for a tool
    Get {
        tool: String,
        #[arg(long, default_value = "cli-client")]
        client_id: String,
    },
    /// Print the full schema for a tool the caller already has a lease for
    Expand {
        tool: String,
        #[arg(long, default_value = "cli-client")]
        client_id: String,
    },
}

pub async fn handle_command(command: SchemaCommand, registry_path: PathBuf) -> Result<()> {
    let gate = ToolGate::connect(&registry_path)
        .await
        .context("failed to connect to the gateway")?;

    match command {
        SchemaCommand::Get { tool, client_id } => {
            let result = gate
                .get_tool_schema(&client_id, &tool)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&result.schema)?);
            eprintln!(
                "lease expires_at={} calls_remaining={}",
                result.expires_at, result.calls_remaining
            );
        }
        SchemaCommand::Expand { tool, client_id } => {
            let schema = gate
                .expand_tool_schema(&client_id, &tool)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }
    Ok(())
}
