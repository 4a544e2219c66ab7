// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Helios language client.
//!
//! Locates the `helios-ls` executable, starts it in language-server mode and
//! supervises the session through a lifecycle state machine. The editor side
//! is abstracted behind [`host::Host`], so the same lifecycle runs in a
//! terminal, an editor plugin, or a test.

/// Terminal output formatting.
pub mod cli;
/// User-invocable commands and version querying.
pub mod commands;
/// Client settings.
pub mod config;
/// The session lifecycle state machine.
pub mod controller;
/// Ordered release of epoch resources.
pub mod disposable;
/// Error taxonomy and failure classification.
pub mod error;
/// Capabilities consumed from the host editor.
pub mod host;
/// LSP client implementation.
pub mod lsp;
/// Locating the server executable.
pub mod resolver;
/// One running client/server pairing.
pub mod session;
/// The status indicator.
pub mod status;
/// A host that runs in a terminal.
pub mod terminal;
