// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Capabilities consumed from the host editor.
//!
//! The controller never talks to a UI directly. Everything it needs from the
//! editor (configuration, prompts, progress, commands, the status indicator,
//! storage) goes through the traits in this module so that a terminal, an
//! editor plugin, or a test double can drive the same lifecycle.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use crate::commands::CommandId;

/// A resource with an explicit release operation.
#[async_trait]
pub trait Disposable: Send {
    /// Releases the resource. Called at most once.
    async fn dispose(self: Box<Self>) -> Result<()>;
}

/// Adapts a synchronous closure into a [`Disposable`].
pub struct DisposeFn<F>(F);

impl<F> DisposeFn<F>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    /// Wraps `f` so it runs on disposal.
    pub fn boxed(f: F) -> Box<dyn Disposable> {
        Box::new(Self(f))
    }
}

#[async_trait]
impl<F> Disposable for DisposeFn<F>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    async fn dispose(self: Box<Self>) -> Result<()> {
        (self.0)()
    }
}

/// A background task owned by an activation epoch.
pub struct TaskDisposable(pub tokio::task::JoinHandle<()>);

#[async_trait]
impl Disposable for TaskDisposable {
    async fn dispose(self: Box<Self>) -> Result<()> {
        self.0.abort();
        Ok(())
    }
}

/// A changed configuration key, without its namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// The key that changed (e.g. `serverPath`).
    pub key: String,
}

/// Namespaced key/value configuration owned by the host.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Reads a string value.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes a value and notifies subscribers.
    async fn update(&self, key: &str, value: &str) -> Result<()>;

    /// Subscribes to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ConfigChange>;
}

/// Severity of a message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    /// Informational.
    Info,
    /// Something went wrong but the user can carry on.
    Warning,
    /// A dead end.
    Error,
}

/// A message, optionally with actions the user can pick from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Severity.
    pub level: MessageLevel,
    /// Text shown to the user.
    pub text: String,
    /// Action labels, in display order.
    pub actions: Vec<String>,
    /// Whether the message blocks until answered.
    pub modal: bool,
}

impl Message {
    fn new(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
            actions: Vec::new(),
            modal: false,
        }
    }

    /// An informational message.
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Info, text)
    }

    /// A warning.
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Warning, text)
    }

    /// An error.
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, text)
    }

    /// Adds action labels.
    #[must_use]
    pub fn with_actions(mut self, actions: &[&str]) -> Self {
        self.actions = actions.iter().map(ToString::to_string).collect();
        self
    }

    /// Marks the message as modal.
    #[must_use]
    pub const fn modal(mut self) -> Self {
        self.modal = true;
        self
    }
}

/// Host side of a progress indicator: lets the user cancel.
#[derive(Debug, Clone)]
pub struct ProgressCanceller {
    tx: Arc<watch::Sender<bool>>,
}

impl ProgressCanceller {
    /// Requests cancellation. Later calls have no effect.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Client side of a cancellable progress indicator.
///
/// The indicator is dismissed when this value is dropped.
pub struct Progress {
    title: String,
    cancel: watch::Receiver<bool>,
    on_finish: Option<Box<dyn FnOnce() + Send>>,
}

impl Progress {
    /// Creates a linked canceller/progress pair.
    #[must_use]
    pub fn channel(title: &str) -> (ProgressCanceller, Self) {
        let (tx, rx) = watch::channel(false);
        (
            ProgressCanceller { tx: Arc::new(tx) },
            Self {
                title: title.to_string(),
                cancel: rx,
                on_finish: None,
            },
        )
    }

    /// Runs `f` when the progress indicator is dismissed.
    #[must_use]
    pub fn on_finish(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(f));
        self
    }

    /// The title shown next to the indicator.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Completes when the user cancels.
    ///
    /// Never completes if the host drops its canceller without cancelling.
    pub async fn cancelled(&mut self) {
        let closed = self.cancel.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        if let Some(f) = self.on_finish.take() {
            f();
        }
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("title", &self.title)
            .field("cancelled", &*self.cancel.borrow())
            .finish_non_exhaustive()
    }
}

/// The single status indicator in the host UI.
pub trait StatusItem: Send + Sync {
    /// Sets the indicator text.
    fn set_text(&self, text: &str);
    /// Sets the indicator tooltip.
    fn set_tooltip(&self, tooltip: &str);
    /// Makes the indicator visible.
    fn show(&self);
    /// Removes the indicator from the UI.
    fn dispose(&self);
}

/// Everything the lifecycle controller needs from the editor.
#[async_trait]
pub trait Host: Send + Sync {
    /// The namespaced configuration store.
    fn configuration(&self) -> Arc<dyn ConfigStore>;

    /// Shows a message and returns the chosen action, if any.
    async fn show_message(&self, message: Message) -> Option<String>;

    /// Starts a cancellable progress indicator.
    fn begin_progress(&self, title: &str) -> Progress;

    /// Makes a command invocable. Disposing unregisters it.
    fn register_command(&self, command: CommandId) -> Box<dyn Disposable>;

    /// Creates a new status indicator.
    fn create_status_item(&self) -> Box<dyn StatusItem>;

    /// Persistent storage private to this client.
    fn global_storage_dir(&self) -> PathBuf;

    /// Root folder to announce to the server, if any.
    fn workspace_root(&self) -> Option<PathBuf>;

    /// Reloads the whole environment.
    async fn reload(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_progress_cancel_wakes_waiter() {
        let (canceller, mut progress) = Progress::channel("Locating");
        let waiter = tokio::spawn(async move { progress.cancelled().await });
        canceller.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_progress_without_canceller_never_completes() {
        let (canceller, mut progress) = Progress::channel("Locating");
        drop(canceller);
        let waited =
            tokio::time::timeout(Duration::from_millis(50), progress.cancelled()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_progress_drop_runs_finish_once() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let (_canceller, progress) = Progress::channel("Locating");
        let progress = progress.on_finish(move || flag.store(true, Ordering::SeqCst));
        assert!(!finished.load(Ordering::SeqCst));
        drop(progress);
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_dispose_fn_runs_closure() -> Result<()> {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let disposable = DisposeFn::boxed(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        disposable.dispose().await?;
        assert!(ran.load(Ordering::SeqCst));
        Ok(())
    }

    #[test]
    fn test_message_builder() {
        let msg = Message::info("Search?")
            .with_actions(&["Quit extension", "Find it for me"])
            .modal();
        assert_eq!(msg.level, MessageLevel::Info);
        assert_eq!(msg.actions, vec!["Quit extension", "Find it for me"]);
        assert!(msg.modal);
    }
}
