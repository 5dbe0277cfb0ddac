// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `toolgate tools` — lists what a client currently sees: bootstrap tools
//! plus anything it holds a live lease for.

use std::path::PathBuf;

use anyhow::{Context, Result};

use toolgate_core::ToolGate;

pub async fn handle_command(client_id: String, registry_path: PathBuf) -> Result<()> {
    let gate = ToolGate::connect(&registry_path)
        .await
        .context("failed to connect to the gateway")?;

    for tool in gate.visible_tools(&client_id).await {
        println!("{tool}");
    }
    Ok(())
}
