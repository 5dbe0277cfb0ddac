// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # toolgate CLI
//!
//! Thin operator front-end over [`toolgate_core::ToolGate`]: inspect and
//! change the governance mode, search the tool registry, walk the
//! progressive schema-exposure flow, and run maintenance sweeps. The
//! actual MCP transport and tool-server forwarding live outside this
//! crate; this binary talks to the same Redis-backed stores a running
//! gateway process uses.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;

use commands::{admin, mode, schema, search, tools};
use commands::{AdminCommand, ModeCommand, SchemaCommand};

/// toolgate - governance gateway for MCP tool calls
#[derive(Parser)]
#[command(name = "toolgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the tool registry YAML file
    #[arg(long, global = true, env = "REGISTRY_PATH", default_value = "./registry.yaml")]
    registry: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TOOLGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or change the governance mode
    Mode {
        #[command(subcommand)]
        command: ModeCommand,
    },
    /// Search the tool registry
    Search {
        query: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Progressive schema exposure
    Schema {
        #[command(subcommand)]
        command: SchemaCommand,
    },
    /// List tools currently visible to a client
    Tools {
        #[arg(long, default_value = "cli-client")]
        client_id: String,
    },
    /// Maintenance operations
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Mode { command } => mode::handle_command(command, cli.registry).await,
        Commands::Search { query, top_k } => search::handle_command(query, top_k, cli.registry).await,
        Commands::Schema { command } => schema::handle_command(command, cli.registry).await,
        Commands::Tools { client_id } => tools::handle_command(client_id, cli.registry).await,
        Commands::Admin { command } => admin::handle_command(command, cli.registry).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
