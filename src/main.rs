// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Helios language client.
//!
//! Locates `helios-ls`, keeps one language-server session running and lets
//! the user drive it from the terminal.

#![allow(clippy::print_stdout, reason = "CLI tool needs to output to stdout")]
#![allow(clippy::print_stderr, reason = "CLI tool needs to output to stderr")]

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use helios_client::cli::ColorConfig;
use helios_client::commands::{self, CommandId};
use helios_client::config::Settings;
use helios_client::controller::{LifecycleController, SessionState};
use helios_client::resolver::{PathLocator, PathResolver};
use helios_client::terminal::TerminalHost;

/// Command-line arguments for the Helios client.
#[derive(Parser, Debug)]
#[command(name = "helios-client")]
#[command(about = "Language client for the Helios language server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// The subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root announced to the server (default: current directory).
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    nocolor: bool,
}

/// Subcommands supported by the client.
#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Start the language server and read commands from stdin (default).
    Run,

    /// Resolve the server executable and print where it was found.
    Resolve,

    /// Resolve the server executable and print its version.
    Version,
}

/// Entry point.
///
/// # Errors
///
/// Returns an error if the subcommand fails.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("helios_client=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(args.config.clone())?;
    let root = match &args.root {
        Some(root) => root.canonicalize()?,
        None => std::env::current_dir()?,
    };
    let host = TerminalHost::new(
        &settings.namespace,
        Some(root),
        ColorConfig::new(args.nocolor),
    )?;
    let host = Arc::new(host);

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(host, settings).await,
        Command::Resolve => {
            let locator = PathLocator::from_env();
            let location = PathResolver::new(host.as_ref(), &settings, &locator)
                .resolve()
                .await?;
            println!("{}\t{}", location.path().display(), location.provenance());
            Ok(())
        }
        Command::Version => {
            let locator = PathLocator::from_env();
            let location = PathResolver::new(host.as_ref(), &settings, &locator)
                .resolve()
                .await?;
            let version =
                commands::query_version(location.path(), settings.version_timeout()).await?;
            println!("{version}");
            Ok(())
        }
    }
}

/// A line typed at the command prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Command(CommandId),
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    match line {
        "restart" => Some(Input::Command(CommandId::RestartServer)),
        "version" => Some(Input::Command(CommandId::ShowVersion)),
        "syntax-tree" => Some(Input::Command(CommandId::ShowSyntaxTree)),
        "quit" | "exit" => Some(Input::Quit),
        other => other.parse().ok().map(Input::Command),
    }
}

/// Runs one controller until the user quits or stdin closes.
async fn run(host: Arc<TerminalHost>, settings: Settings) -> Result<()> {
    let mut controller = LifecycleController::new(host.clone(), settings);
    let state = controller.activate().await;
    info!("Activation finished: {:?}", state);

    if state == SessionState::Stopped {
        return Ok(());
    }
    eprintln!("Commands: restart, version, syntax-tree, quit");

    loop {
        let mut interrupts = host.subscribe_interrupts();
        let line = tokio::select! {
            line = host.next_line() => line,
            _ = interrupts.recv() => None,
        };
        let Some(line) = line else {
            debug!("Input closed");
            break;
        };
        if line.is_empty() {
            continue;
        }

        match parse_input(&line) {
            Some(Input::Quit) => break,
            Some(Input::Command(command)) if host.is_registered(command) => {
                if let Err(e) = controller.execute(command).await {
                    debug!("{} failed: {:#}", command, e);
                }
            }
            // A failed epoch registers no commands; restarting is always allowed here.
            Some(Input::Command(CommandId::RestartServer)) => {
                controller.restart().await;
            }
            Some(Input::Command(command)) => {
                eprintln!("{command} is not available until Helios-LS is ready");
            }
            None => eprintln!("Unknown command: {line}"),
        }

        if host.take_reload_request() {
            info!("Reloading");
            controller.restart().await;
        }
        if controller.state() == SessionState::Stopped {
            break;
        }
    }

    let last = controller.state();
    controller.deactivate().await;
    if let SessionState::Degraded(kind) = last {
        return Err(anyhow!("Helios-LS is unavailable: {}", kind.status_message()));
    }
    Ok(())
}
