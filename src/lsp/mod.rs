// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Low-level LSP client for communicating with a server process.
pub mod client;
/// LSP message protocol definitions.
pub mod protocol;
/// Document scoping for a session.
pub mod selector;

pub use client::LspClient;
pub use selector::{DocumentFilter, DocumentSelector, HELIOS_LANGUAGE_ID};
