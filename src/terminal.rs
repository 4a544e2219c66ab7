// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A [`Host`] that runs in a terminal.
//!
//! Messages, prompts and the status indicator are rendered on stderr. Stdin
//! is read line by line into one queue shared by prompts and the command
//! loop, so piped input is consumed strictly in order. Ctrl-C cancels a
//! running progress indicator, otherwise it ends the command loop; with
//! neither listening the process exits.

#![allow(clippy::print_stderr, reason = "the terminal host renders its UI on stderr")]

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::cli::{self, ColorConfig};
use crate::commands::CommandId;
use crate::host::{
    ConfigChange, ConfigStore, DisposeFn, Disposable, Host, Message, MessageLevel, Progress,
    ProgressCanceller, StatusItem,
};

/// Settings file holding the namespaced host configuration.
const SETTINGS_FILE: &str = "settings.json";

/// Host configuration persisted as a flat JSON object of `namespace.key` strings.
pub struct JsonConfigStore {
    path: PathBuf,
    namespace: String,
    values: RwLock<BTreeMap<String, String>>,
    changes: broadcast::Sender<ConfigChange>,
}

impl JsonConfigStore {
    /// Loads the store from `path`; a missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not a JSON object of strings.
    pub fn load(path: PathBuf, namespace: &str) -> Result<Self> {
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let (changes, _) = broadcast::channel(16);
        Ok(Self {
            path,
            namespace: namespace.to_string(),
            values: RwLock::new(values),
            changes,
        })
    }

    /// Where the store is persisted.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn qualified(&self, key: &str) -> String {
        format!("{}.{key}", self.namespace)
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(&self.qualified(key)).cloned())
    }

    async fn update(&self, key: &str, value: &str) -> Result<()> {
        let snapshot = {
            let mut values = self
                .values
                .write()
                .map_err(|_| anyhow::anyhow!("configuration lock poisoned"))?;
            values.insert(self.qualified(key), value.to_string());
            values.clone()
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        debug!("{} = {}", self.qualified(key), value);
        // No subscribers is fine.
        let _ = self.changes.send(ConfigChange {
            key: key.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }
}

struct TerminalStatusItem {
    colors: ColorConfig,
    text: Mutex<String>,
    visible: AtomicBool,
}

impl StatusItem for TerminalStatusItem {
    fn set_text(&self, text: &str) {
        if let Ok(mut current) = self.text.lock() {
            *current = text.to_string();
        }
    }

    // The reporter always sets the tooltip after the text, so one line per status.
    fn set_tooltip(&self, tooltip: &str) {
        if !self.visible.load(Ordering::SeqCst) {
            return;
        }
        let text = self.text.lock().map(|t| t.clone()).unwrap_or_default();
        eprintln!(
            "{}",
            cli::status_line(
                &self.colors,
                chrono::Local::now(),
                &text,
                tooltip,
                cli::terminal_width()
            )
        );
    }

    fn show(&self) {
        self.visible.store(true, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.visible.store(false, Ordering::SeqCst);
    }
}

/// Routes Ctrl-C to whoever is waiting for it.
#[derive(Clone)]
struct Interrupts {
    progress: Arc<Mutex<Option<ProgressCanceller>>>,
    wake: broadcast::Sender<()>,
}

impl Interrupts {
    fn new() -> Self {
        let (wake, _) = broadcast::channel(4);
        Self {
            progress: Arc::new(Mutex::new(None)),
            wake,
        }
    }

    /// Cancels the open progress indicator, or wakes the command loop.
    ///
    /// Returns `false` when nobody was listening.
    fn deliver(&self) -> bool {
        let canceller = self.progress.lock().ok().and_then(|mut slot| slot.take());
        if let Some(canceller) = canceller {
            canceller.cancel();
            return true;
        }
        self.wake.send(()).is_ok()
    }

    fn set_progress(&self, canceller: Option<ProgressCanceller>) {
        if let Ok(mut slot) = self.progress.lock() {
            *slot = canceller;
        }
    }
}

/// Terminal implementation of [`Host`].
pub struct TerminalHost {
    config: Arc<JsonConfigStore>,
    colors: ColorConfig,
    storage_dir: PathBuf,
    workspace_root: Option<PathBuf>,
    lines: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    commands: Arc<Mutex<HashSet<CommandId>>>,
    reload_requested: AtomicBool,
    interrupts: Interrupts,
}

impl TerminalHost {
    /// Creates a host using the per-user settings and storage directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be parsed.
    pub fn new(
        namespace: &str,
        workspace_root: Option<PathBuf>,
        colors: ColorConfig,
    ) -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("helios-client");
        let storage_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("helios-client");
        Self::with_dirs(namespace, &config_dir, storage_dir, workspace_root, colors)
    }

    /// Like [`new`](Self::new) with explicit directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be parsed.
    pub fn with_dirs(
        namespace: &str,
        config_dir: &Path,
        storage_dir: PathBuf,
        workspace_root: Option<PathBuf>,
        colors: ColorConfig,
    ) -> Result<Self> {
        let config = JsonConfigStore::load(config_dir.join(SETTINGS_FILE), namespace)?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            debug!("stdin closed");
        });

        // The first `ctrl_c()` replaces the default SIGINT handler for the
        // whole process, so a single listener owns it from here on.
        let interrupts = Interrupts::new();
        let listener = interrupts.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !listener.deliver() {
                    eprintln!("Interrupted");
                    std::process::exit(130);
                }
            }
        });

        Ok(Self {
            config: Arc::new(config),
            colors,
            storage_dir,
            workspace_root,
            lines: tokio::sync::Mutex::new(rx),
            commands: Arc::new(Mutex::new(HashSet::new())),
            reload_requested: AtomicBool::new(false),
            interrupts,
        })
    }

    /// Waits for the next line of input; `None` once stdin is closed.
    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }

    /// Receives one event per Ctrl-C not consumed by a progress indicator.
    ///
    /// Subscribe just before waiting; while no receiver exists Ctrl-C exits.
    pub fn subscribe_interrupts(&self) -> broadcast::Receiver<()> {
        self.interrupts.wake.subscribe()
    }

    /// Whether `command` is currently registered.
    #[must_use]
    pub fn is_registered(&self, command: CommandId) -> bool {
        self.commands
            .lock()
            .is_ok_and(|commands| commands.contains(&command))
    }

    /// Returns and clears a pending reload request.
    pub fn take_reload_request(&self) -> bool {
        self.reload_requested.swap(false, Ordering::SeqCst)
    }

    fn render_message(&self, message: &Message) -> String {
        let label = match message.level {
            MessageLevel::Info => self.colors.dim("info:"),
            MessageLevel::Warning => self.colors.cyan("warning:"),
            MessageLevel::Error => self.colors.red("error:"),
        };
        let mut out = format!("{label} {}", message.text);
        for (i, action) in message.actions.iter().enumerate() {
            let _ = write!(out, "\n  [{}] {}", i + 1, self.colors.cyan(action));
        }
        out
    }
}

/// Maps a typed answer to one of `actions`, by number or by label.
fn pick_action(answer: &str, actions: &[String]) -> Option<String> {
    if let Ok(n) = answer.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| actions.get(i)).cloned();
    }
    actions
        .iter()
        .find(|action| action.eq_ignore_ascii_case(answer))
        .cloned()
}

#[async_trait]
impl Host for TerminalHost {
    fn configuration(&self) -> Arc<dyn ConfigStore> {
        self.config.clone()
    }

    async fn show_message(&self, message: Message) -> Option<String> {
        eprintln!("{}", self.render_message(&message));
        if message.actions.is_empty() {
            return None;
        }

        let answer = self.next_line().await?;
        let picked = pick_action(&answer, &message.actions);
        if picked.is_none() {
            debug!("Prompt dismissed with {:?}", answer);
        }
        picked
    }

    fn begin_progress(&self, title: &str) -> Progress {
        let (canceller, progress) = Progress::channel(title);
        eprintln!("{} {}", title, self.colors.dim("(Ctrl-C to cancel)"));

        self.interrupts.set_progress(Some(canceller));
        let interrupts = self.interrupts.clone();
        progress.on_finish(move || interrupts.set_progress(None))
    }

    fn register_command(&self, command: CommandId) -> Box<dyn Disposable> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.insert(command);
        }
        let commands = self.commands.clone();
        DisposeFn::boxed(move || {
            if let Ok(mut commands) = commands.lock() {
                commands.remove(&command);
            }
            Ok(())
        })
    }

    fn create_status_item(&self) -> Box<dyn StatusItem> {
        Box::new(TerminalStatusItem {
            colors: self.colors.clone(),
            text: Mutex::new(String::new()),
            visible: AtomicBool::new(false),
        })
    }

    fn global_storage_dir(&self) -> PathBuf {
        self.storage_dir.clone()
    }

    fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace_root.clone()
    }

    async fn reload(&self) {
        self.reload_requested.store(true, Ordering::SeqCst);
    }
}
