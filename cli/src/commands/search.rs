// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `toolgate search` — semantic tool discovery over the registry.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use toolgate_core::ToolGate;

pub async fn handle_command(
    query: String,
    top_k: Option<usize>,
    registry_path: PathBuf,
) -> Result<()> {
    let gate = ToolGate::connect(&registry_path)
        .await
        .context("failed to connect to the gateway")?;

    let result = gate.search_tools(&query, top_k).await;
    if result.candidates.is_empty() {
        println!("{}", "no matching tools".dimmed());
        return Ok(());
    }

    for candidate in result.candidates {
        println!(
            "{:<28} {:>6.3}  {:<18} {}",
            candidate.tool_id.bold(),
            candidate.relevance_score,
            format!("{:?}", candidate.allowed_in_mode),
            candidate.description_1line.dimmed(),
        );
    }
    Ok(())
}
