// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! User-invocable commands.

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;

use crate::status::DISPLAY_NAME;

/// Commands exposed to the host once a session is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandId {
    /// Show the syntax tree of the current file.
    ShowSyntaxTree,
    /// Show the version of the language server.
    ShowVersion,
    /// Tear the session down and activate again.
    RestartServer,
}

impl CommandId {
    /// Every command, in registration order.
    pub const ALL: [Self; 3] = [Self::ShowSyntaxTree, Self::ShowVersion, Self::RestartServer];

    /// The identifier the host registers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShowSyntaxTree => "helios.showSyntaxTree",
            Self::ShowVersion => "helios.version",
            Self::RestartServer => "helios.restartServer",
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == s)
            .ok_or_else(|| anyhow!("Unknown command '{s}'"))
    }
}

static VERSION_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^helios-ls\s+(\S+)").ok());

/// Turns the server's `--version` output into the text shown to the user.
///
/// `helios-ls 1.2.3` becomes `Helios-LS 1.2.3`.
///
/// # Errors
///
/// Returns an error if no line of `output` looks like a version line.
pub fn parse_version(output: &str) -> Result<String> {
    let re = VERSION_LINE
        .as_ref()
        .context("version pattern failed to compile")?;

    output
        .lines()
        .find_map(|line| re.captures(line.trim()))
        .and_then(|caps| caps.get(1))
        .map(|version| format!("{DISPLAY_NAME} {}", version.as_str()))
        .ok_or_else(|| anyhow!("Unrecognised version output: {:?}", output.trim()))
}

/// Runs `<program> --version` and parses its standard output.
///
/// # Errors
///
/// Returns an error if the process cannot be run, exits unsuccessfully, does
/// not finish within `timeout`, or prints something unrecognisable.
pub async fn query_version(program: &Path, timeout: Duration) -> Result<String> {
    let output = tokio::time::timeout(
        timeout,
        Command::new(program).arg("--version").kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| anyhow!("{} --version timed out after {timeout:?}", program.display()))?
    .with_context(|| format!("Failed to run {} --version", program.display()))?;

    if !output.status.success() {
        return Err(anyhow!(
            "{} --version exited with {}",
            program.display(),
            output.status
        ));
    }

    parse_version(&String::from_utf8_lossy(&output.stdout))
}
