// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # toolgate-core
//!
//! The governance core for a meta-gateway that sits between an LLM client
//! and a pool of downstream MCP tool servers: a searchable tool registry,
//! a tri-state policy engine, Redis-backed leases and scoped elevation,
//! HMAC capability tokens, an approval elicitation pipeline, and an
//! append-only audit log.
//!
//! ## Layer structure
//!
//! ```text
//! gateway.rs      ← ToolGate facade, wires everything below together
//!     ↓
//! application/    ← search, approval pipeline, governance middleware, discovery
//!     ↓
//! domain/         ← tool/lease/policy/token/approval/audit value types, no I/O
//!     ↓
//! infrastructure/ ← Redis stores, YAML registry loader, audit log, artifacts, config
//! ```

pub mod application;
pub mod domain;
pub mod gateway;
pub mod infrastructure;

pub use gateway::{GatewayError, ToolGate};
