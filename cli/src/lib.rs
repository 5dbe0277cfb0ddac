// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! toolgate CLI library — exposes the command modules for testing.

pub mod commands;
