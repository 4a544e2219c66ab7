// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Shared fixtures: an in-memory host that records everything, test
//! locators, and helpers for putting a `helios-ls` on disk.

#![allow(dead_code, reason = "each test binary uses a different subset")]
#![allow(clippy::unwrap_used, reason = "poisoned test mutexes should fail the test")]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use helios_client::commands::CommandId;
use helios_client::config::Settings;
use helios_client::host::{
    ConfigChange, ConfigStore, DisposeFn, Disposable, Host, Message, Progress, StatusItem,
};
use helios_client::resolver::Locator;

/// Path of the mock server built alongside the tests.
pub const MOCK_SERVER: &str = env!("CARGO_BIN_EXE_mock-helios-ls");

/// Settings with deadlines short enough for tests.
pub fn test_settings() -> Settings {
    Settings {
        search_timeout_ms: 2_000,
        handshake_timeout_secs: 5,
        version_timeout_secs: 5,
        ..Settings::default()
    }
}

/// Links the mock server into `dir` as `helios-ls`.
#[cfg(unix)]
pub fn install_mock(dir: &Path) -> PathBuf {
    let exe = dir.join("helios-ls");
    std::os::unix::fs::symlink(MOCK_SERVER, &exe).unwrap();
    exe
}

/// Writes an executable `helios-ls` shell script into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let exe = dir.join("helios-ls");
    std::fs::write(&exe, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
    exe
}

/// A script that runs the mock server with extra flags.
#[cfg(unix)]
pub fn mock_with_flags(dir: &Path, flags: &str) -> PathBuf {
    write_script(dir, &format!("exec \"{MOCK_SERVER}\" \"$@\" {flags}"))
}

/// Polls `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// In-memory configuration that records writes.
pub struct MemoryConfig {
    values: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    read_only: AtomicBool,
    changes: broadcast::Sender<ConfigChange>,
}

impl MemoryConfig {
    fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            values: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            read_only: AtomicBool::new(false),
            changes,
        }
    }

    /// Seeds a value without notifying anyone.
    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.into());
    }

    /// Makes every later `update` fail.
    pub fn make_read_only(&self) {
        self.read_only.store(true, Ordering::SeqCst);
    }

    /// Every successful `update` so far.
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfig {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    async fn update(&self, key: &str, value: &str) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            anyhow::bail!("settings are read-only");
        }
        self.set(key, value);
        self.writes
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_string()));
        let _ = self.changes.send(ConfigChange {
            key: key.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }
}

/// Everything one status item was told.
#[derive(Default)]
pub struct StatusRecord {
    texts: Mutex<Vec<String>>,
    tooltip: Mutex<String>,
    shown: AtomicBool,
    disposed: AtomicBool,
}

struct RecordingItem(Arc<StatusRecord>);

impl StatusItem for RecordingItem {
    fn set_text(&self, text: &str) {
        self.0.texts.lock().unwrap().push(text.to_string());
    }

    fn set_tooltip(&self, tooltip: &str) {
        *self.0.tooltip.lock().unwrap() = tooltip.to_string();
    }

    fn show(&self) {
        self.0.shown.store(true, Ordering::SeqCst);
    }

    fn dispose(&self) {
        self.0.disposed.store(true, Ordering::SeqCst);
    }
}

/// A host that answers prompts from a script and records what it saw.
pub struct RecordingHost {
    config: Arc<MemoryConfig>,
    storage: PathBuf,
    workspace: Option<PathBuf>,
    choices: Mutex<Vec<String>>,
    messages: Mutex<Vec<Message>>,
    cancel_progress: AtomicBool,
    cancel_progress_delay: Mutex<Option<Duration>>,
    progress_titles: Mutex<Vec<String>>,
    open_progress: Arc<AtomicUsize>,
    status_items: Mutex<Vec<Arc<StatusRecord>>>,
    commands: Arc<Mutex<HashMap<CommandId, usize>>>,
    reloads: AtomicUsize,
}

impl RecordingHost {
    /// A host whose global storage lives in `storage`.
    pub fn new(storage: &Path) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(MemoryConfig::new()),
            storage: storage.to_path_buf(),
            workspace: None,
            choices: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            cancel_progress: AtomicBool::new(false),
            cancel_progress_delay: Mutex::new(None),
            progress_titles: Mutex::new(Vec::new()),
            open_progress: Arc::new(AtomicUsize::new(0)),
            status_items: Mutex::new(Vec::new()),
            commands: Arc::new(Mutex::new(HashMap::new())),
            reloads: AtomicUsize::new(0),
        })
    }

    /// Picks `action` whenever a message offers it.
    pub fn choose(&self, action: &str) {
        self.choices.lock().unwrap().push(action.to_string());
    }

    /// Cancels every progress indicator as soon as it starts.
    pub fn cancel_progress_on_begin(&self) {
        self.cancel_progress.store(true, Ordering::SeqCst);
    }

    /// Cancels every progress indicator `delay` after it starts, even if it
    /// has been dismissed by then.
    pub fn cancel_progress_after(&self, delay: Duration) {
        *self.cancel_progress_delay.lock().unwrap() = Some(delay);
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn message_texts(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.text).collect()
    }

    pub fn clear_messages(&self) {
        self.messages.lock().unwrap().clear();
    }

    pub fn progress_titles(&self) -> Vec<String> {
        self.progress_titles.lock().unwrap().clone()
    }

    /// Progress indicators begun but not yet dismissed.
    pub fn open_progress(&self) -> usize {
        self.open_progress.load(Ordering::SeqCst)
    }

    pub fn status_items_created(&self) -> usize {
        self.status_items.lock().unwrap().len()
    }

    /// Status items shown and not disposed.
    pub fn live_status_items(&self) -> usize {
        self.status_items
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.shown.load(Ordering::SeqCst) && !r.disposed.load(Ordering::SeqCst))
            .count()
    }

    /// Every text the newest status item displayed, oldest first.
    pub fn status_texts(&self) -> Vec<String> {
        self.status_items
            .lock()
            .unwrap()
            .last()
            .map(|r| r.texts.lock().unwrap().clone())
            .unwrap_or_default()
    }

    pub fn status_text(&self) -> Option<String> {
        self.status_texts().pop()
    }

    pub fn status_tooltip(&self) -> Option<String> {
        self.status_items
            .lock()
            .unwrap()
            .last()
            .map(|r| r.tooltip.lock().unwrap().clone())
    }

    /// Registrations currently held, counting duplicates.
    pub fn live_commands(&self) -> usize {
        self.commands.lock().unwrap().values().sum()
    }

    pub fn is_registered(&self, command: CommandId) -> bool {
        self.commands
            .lock()
            .unwrap()
            .get(&command)
            .is_some_and(|n| *n > 0)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Host for RecordingHost {
    fn configuration(&self) -> Arc<dyn ConfigStore> {
        self.config.clone()
    }

    async fn show_message(&self, message: Message) -> Option<String> {
        let choices = self.choices.lock().unwrap().clone();
        let answer = message
            .actions
            .iter()
            .find(|action| choices.contains(action))
            .cloned();
        self.messages.lock().unwrap().push(message);
        answer
    }

    fn begin_progress(&self, title: &str) -> Progress {
        self.progress_titles.lock().unwrap().push(title.to_string());
        self.open_progress.fetch_add(1, Ordering::SeqCst);

        let (canceller, progress) = Progress::channel(title);
        if self.cancel_progress.load(Ordering::SeqCst) {
            canceller.cancel();
        }
        if let Some(delay) = *self.cancel_progress_delay.lock().unwrap() {
            let late = canceller.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                late.cancel();
            });
        }
        let open = self.open_progress.clone();
        progress.on_finish(move || {
            // Keep the canceller alive for as long as the indicator.
            drop(canceller);
            open.fetch_sub(1, Ordering::SeqCst);
        })
    }

    fn register_command(&self, command: CommandId) -> Box<dyn Disposable> {
        *self.commands.lock().unwrap().entry(command).or_insert(0) += 1;
        let commands = self.commands.clone();
        DisposeFn::boxed(move || {
            if let Some(n) = commands.lock().unwrap().get_mut(&command) {
                *n -= 1;
            }
            Ok(())
        })
    }

    fn create_status_item(&self) -> Box<dyn StatusItem> {
        let record = Arc::new(StatusRecord::default());
        self.status_items.lock().unwrap().push(record.clone());
        Box::new(RecordingItem(record))
    }

    fn global_storage_dir(&self) -> PathBuf {
        self.storage.clone()
    }

    fn workspace_root(&self) -> Option<PathBuf> {
        self.workspace.clone()
    }

    async fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// A locator that takes `delay` to answer `result`.
pub struct SlowLocator {
    pub delay: Duration,
    pub result: Option<PathBuf>,
}

#[async_trait]
impl Locator for SlowLocator {
    async fn locate(&self, _name: &str) -> Option<PathBuf> {
        tokio::time::sleep(self.delay).await;
        self.result.clone()
    }
}

/// A locator that must never be consulted.
pub struct UnusedLocator;

#[async_trait]
impl Locator for UnusedLocator {
    async fn locate(&self, _name: &str) -> Option<PathBuf> {
        None
    }
}
