// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The session lifecycle state machine.
//!
//! An activation epoch runs `Resolving -> Starting -> Ready`, or ends early in
//! `Degraded`. Everything acquired during an epoch goes into one
//! [`DisposableSet`] that is drained, newest first, whenever the epoch ends.
//! The status indicator outlives epochs so that restarts reuse it instead of
//! stacking new ones.

use anyhow::{Result, anyhow};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, trace, warn};

use crate::commands::{self, CommandId};
use crate::config::{SERVER_PATH_KEY, Settings};
use crate::disposable::DisposableSet;
use crate::error::{ActivationError, FailureKind};
use crate::host::{Disposable, Host, Message, TaskDisposable};
use crate::lsp::DocumentSelector;
use crate::resolver::{Locator, PathLocator, PathResolver};
use crate::session::{Invocation, SessionDisposable, SessionHandle, SessionOptions};
use crate::status::{StatusKind, StatusReporter};

const QUIT_ACTION: &str = "Quit extension";
const RELOAD_ACTION: &str = "Reload";

/// Lifecycle state of the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    /// Never activated.
    Uninitialized,
    /// Looking for the server executable.
    Resolving,
    /// Server spawned, handshake in flight.
    Starting,
    /// Handshake done; commands registered.
    Ready,
    /// The epoch failed. Only a new activation recovers.
    Degraded(FailureKind),
    /// Torn down on request.
    Stopped,
}

impl SessionState {
    /// Whether `next` may directly follow this state.
    #[must_use]
    pub const fn can_transition_to(&self, next: &Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialized | Self::Stopped | Self::Degraded(_), Self::Resolving)
                | (Self::Resolving, Self::Starting)
                | (Self::Starting, Self::Ready)
                | (Self::Resolving | Self::Starting, Self::Degraded(_))
                | (
                    Self::Resolving | Self::Starting | Self::Ready | Self::Degraded(_),
                    Self::Stopped
                )
        )
    }
}

/// Drives activation, restart and teardown against a [`Host`].
pub struct LifecycleController {
    host: Arc<dyn Host>,
    settings: Settings,
    locator: Arc<dyn Locator>,
    invocation: Invocation,
    selector: DocumentSelector,
    state: SessionState,
    epoch: u64,
    status: Option<StatusReporter>,
    disposables: DisposableSet,
    session: Option<Arc<SessionHandle>>,
}

impl LifecycleController {
    /// Creates a controller that searches the process `PATH`.
    #[must_use]
    pub fn new(host: Arc<dyn Host>, settings: Settings) -> Self {
        Self {
            host,
            settings,
            locator: Arc::new(PathLocator::from_env()),
            invocation: Invocation::default(),
            selector: DocumentSelector::helios(),
            state: SessionState::Uninitialized,
            epoch: 0,
            status: None,
            disposables: DisposableSet::new(),
            session: None,
        }
    }

    /// Replaces the executable search strategy.
    #[must_use]
    pub fn with_locator(mut self, locator: Arc<dyn Locator>) -> Self {
        self.locator = locator;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Number of activations so far.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The running session, while the epoch holds one.
    #[must_use]
    pub const fn session(&self) -> Option<&Arc<SessionHandle>> {
        self.session.as_ref()
    }

    /// Resources held by the current epoch.
    #[must_use]
    pub fn live_resources(&self) -> usize {
        self.disposables.len()
    }

    /// The last status reported, if the indicator exists.
    #[must_use]
    pub fn status(&self) -> Option<StatusKind> {
        self.status.as_ref().and_then(StatusReporter::current)
    }

    /// Starts a new epoch and runs it until it is ready or has failed.
    ///
    /// Any live epoch is torn down first. Failures are reported to the user
    /// and reflected in the returned state; they are never returned as errors.
    pub async fn activate(&mut self) -> SessionState {
        if self.state == SessionState::Ready {
            debug!("Activation requested while ready; tearing down epoch {}", self.epoch);
            self.teardown().await;
            self.enter(SessionState::Stopped);
        }

        self.epoch += 1;
        info!("Activating Helios-LS (epoch {})", self.epoch);

        if let Err(err) = self.run_activation().await {
            self.fail(err).await;
        }
        self.state
    }

    async fn run_activation(&mut self) -> Result<(), ActivationError> {
        self.transition(SessionState::Resolving)?;
        self.set_status(StatusKind::Loading, None);

        let location =
            PathResolver::new(self.host.as_ref(), &self.settings, self.locator.as_ref())
                .resolve()
                .await?;

        self.transition(SessionState::Starting)?;
        self.set_status(StatusKind::Loading, Some("Starting..."));

        let session = Arc::new(SessionHandle::start(
            location,
            self.selector.clone(),
            &self.invocation,
            SessionOptions {
                workspace_root: self.host.workspace_root(),
                handshake_timeout: self.settings.handshake_timeout(),
            },
        )?);
        self.disposables
            .push("language server", Box::new(SessionDisposable(session.clone())));
        self.session = Some(session.clone());

        session.when_ready().await?;

        self.transition(SessionState::Ready)?;
        self.set_status(StatusKind::Ready, None);

        for command in CommandId::ALL {
            let registration = self.host.register_command(command);
            self.disposables.push(format!("command {command}"), registration);
        }
        let watcher = self.watch_configuration();
        self.disposables.push("configuration watcher", watcher);

        info!(
            "Helios-LS ready (epoch {}, {} resources)",
            self.epoch,
            self.disposables.len()
        );
        Ok(())
    }

    /// Records a failed epoch, cleans it up and tells the user.
    async fn fail(&mut self, err: ActivationError) {
        let kind = err.kind();
        match &err {
            ActivationError::Resolve(e) => info!("Activation ended: {}", e),
            ActivationError::Session(e) => error!("Language server failed to start: {}", e),
            ActivationError::Unexpected(e) => error!("Activation failed unexpectedly: {:#}", e),
        }

        self.enter(SessionState::Degraded(kind));
        self.set_status(StatusKind::Error, Some(kind.status_message()));
        self.teardown().await;

        let message = match kind {
            FailureKind::Abort | FailureKind::HandshakeFailed => None,
            FailureKind::SearchCanceled(_) => Some(Message::error(
                "Locating the Helios-LS executable took too long or was stopped.",
            )),
            FailureKind::NotFound => Some(Message::error(format!(
                "Failed to find the Helios-LS executable. Install helios-ls or set {} to its location.",
                self.settings.qualified(SERVER_PATH_KEY)
            ))),
            FailureKind::Unexpected => {
                Some(Message::error(format!("An unexpected error occurred: {err}")))
            }
        };

        if let Some(mut message) = message {
            if kind.offers_quit() {
                message = message.with_actions(&[QUIT_ACTION]);
            }
            let answer = self.host.show_message(message).await;
            if answer.as_deref() == Some(QUIT_ACTION) {
                self.deactivate().await;
            }
        }
    }

    /// Tears the current epoch down and activates again.
    pub async fn restart(&mut self) -> SessionState {
        info!("Restarting Helios-LS");
        self.teardown().await;
        if matches!(self.state, SessionState::Ready | SessionState::Degraded(_)) {
            self.enter(SessionState::Stopped);
        }
        self.activate().await
    }

    /// Releases everything, including the status indicator.
    ///
    /// Safe to call at any time, any number of times.
    pub async fn deactivate(&mut self) {
        if self.state == SessionState::Uninitialized {
            debug!("Deactivate before activation; nothing to release");
            return;
        }

        self.teardown().await;
        if let Some(status) = self.status.take() {
            status.dispose();
        }
        if self.state != SessionState::Stopped {
            self.enter(SessionState::Stopped);
            info!("Helios-LS deactivated");
        }
    }

    /// Runs a registered command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not do its work; the user has
    /// already been told.
    pub async fn execute(&mut self, command: CommandId) -> Result<()> {
        debug!("Executing {}", command);
        match command {
            CommandId::ShowSyntaxTree => {
                self.host
                    .show_message(Message::info("Not yet implemented."))
                    .await;
                Ok(())
            }
            CommandId::ShowVersion => self.show_version().await,
            CommandId::RestartServer => {
                self.restart().await;
                Ok(())
            }
        }
    }

    async fn show_version(&mut self) -> Result<()> {
        let path = self
            .session
            .as_ref()
            .map(|session| session.location().path().to_path_buf())
            .ok_or_else(|| anyhow!("Helios-LS is not running"))?;

        self.set_status(StatusKind::Loading, Some("Querying version..."));
        match commands::query_version(&path, self.settings.version_timeout()).await {
            Ok(version) => {
                self.set_status(StatusKind::Ready, None);
                self.host.show_message(Message::info(version)).await;
                Ok(())
            }
            Err(e) => {
                warn!("Version query failed: {:#}", e);
                self.set_status(StatusKind::Error, Some("Version unavailable"));
                self.host
                    .show_message(Message::error(format!(
                        "Failed to get the Helios-LS version: {e:#}"
                    )))
                    .await;
                Err(e)
            }
        }
    }

    /// Disposes every epoch resource, newest first. Idempotent.
    async fn teardown(&mut self) {
        if !self.disposables.is_empty() {
            debug!(
                "Tearing down epoch {} ({} resources)",
                self.epoch,
                self.disposables.len()
            );
        }
        self.disposables.drain().await;
        self.session = None;
    }

    fn watch_configuration(&self) -> Box<dyn Disposable> {
        let mut changes = self.host.configuration().subscribe();
        let host = self.host.clone();
        let settings = self.settings.clone();

        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if settings.requires_reload(&change.key) => {
                        let name = settings.qualified(&change.key);
                        info!("{} changed; reload required", name);
                        let answer = host
                            .show_message(
                                Message::info(format!(
                                    "The {name} setting changed. Reload to apply it?"
                                ))
                                .with_actions(&[RELOAD_ACTION]),
                            )
                            .await;
                        if answer.as_deref() == Some(RELOAD_ACTION) {
                            host.reload().await;
                        }
                    }
                    Ok(change) => trace!("Ignoring change to {}", change.key),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} configuration changes", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Box::new(TaskDisposable(handle))
    }

    fn set_status(&mut self, kind: StatusKind, message: Option<&str>) {
        let host = &self.host;
        self.status
            .get_or_insert_with(|| StatusReporter::new(host.create_status_item()))
            .set_status(kind, message);
    }

    fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(anyhow!(
                "invalid lifecycle transition {:?} -> {:?}",
                self.state,
                next
            ));
        }
        self.enter(next);
        Ok(())
    }

    fn enter(&mut self, next: SessionState) {
        debug!("Epoch {}: {:?} -> {:?}", self.epoch, self.state, next);
        self.state = next;
    }
}
