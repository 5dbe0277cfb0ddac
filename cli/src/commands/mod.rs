// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the toolgate CLI.

pub mod admin;
pub mod mode;
pub mod schema;
pub mod search;
pub mod tools;

pub use self::admin::AdminCommand;
pub use self::mode::ModeCommand;
pub use self::schema::SchemaCommand;
