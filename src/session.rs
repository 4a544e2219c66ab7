// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! One running client/server pairing.
//!
//! A [`SessionHandle`] spawns `helios-ls` with the fixed [`Invocation`],
//! performs the initialize handshake in the background and publishes its
//! outcome once through [`SessionHandle::when_ready`]. Documents are only
//! forwarded when the session's [`DocumentSelector`] accepts them.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    TextDocumentContentChangeEvent, TextDocumentIdentifier, TextDocumentItem, Uri,
    VersionedTextDocumentIdentifier,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::host::Disposable;
use crate::lsp::{DocumentSelector, LspClient};
use crate::resolver::ServerLocation;

/// How long a stopping session waits for the shutdown reply.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Arguments and environment the server is always launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Arguments selecting language-server mode.
    pub args: Vec<String>,
    /// Variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
}

impl Default for Invocation {
    fn default() -> Self {
        Self {
            args: vec!["ide".to_string()],
            env: vec![
                ("RUST_BACKTRACE".to_string(), "1".to_string()),
                ("RUST_LOG".to_string(), "helios_ls=trace".to_string()),
            ],
        }
    }
}

/// Knobs for starting a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Folder announced in `initialize`.
    pub workspace_root: Option<PathBuf>,
    /// How long the handshake may take.
    pub handshake_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

/// Owns one running `helios-ls` process and its LSP connection.
pub struct SessionHandle {
    location: ServerLocation,
    selector: DocumentSelector,
    client: Arc<Mutex<Option<LspClient>>>,
    readiness: watch::Receiver<Readiness>,
    handshake: Mutex<Option<tokio::task::JoinHandle<()>>>,
    open_documents: Mutex<HashSet<String>>,
}

impl SessionHandle {
    /// Spawns the server and begins the handshake.
    ///
    /// Returns as soon as the process is running; await
    /// [`when_ready`](Self::when_ready) for the handshake outcome.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Spawn`] if the process cannot be started.
    pub fn start(
        location: ServerLocation,
        selector: DocumentSelector,
        invocation: &Invocation,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
        let env: Vec<(&str, &str)> = invocation
            .env
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        info!(
            "Starting {} {} ({})",
            location.path().display(),
            args.join(" "),
            location.provenance()
        );
        let client = LspClient::spawn(location.path(), &args, &env)?;
        debug!("helios-ls running as pid {:?}", client.pid());
        let client = Arc::new(Mutex::new(Some(client)));

        let (tx, rx) = watch::channel(Readiness::Pending);
        let handshake = tokio::spawn(Self::handshake(client.clone(), tx, options));

        Ok(Self {
            location,
            selector,
            client,
            readiness: rx,
            handshake: Mutex::new(Some(handshake)),
            open_documents: Mutex::new(HashSet::new()),
        })
    }

    async fn handshake(
        client: Arc<Mutex<Option<LspClient>>>,
        tx: watch::Sender<Readiness>,
        options: SessionOptions,
    ) {
        let guard = client.lock().await;
        let Some(lsp) = guard.as_ref() else {
            tx.send_replace(Readiness::Failed("session stopped before handshake".into()));
            return;
        };

        let outcome = tokio::time::timeout(
            options.handshake_timeout,
            lsp.initialize(options.workspace_root.as_deref()),
        )
        .await;

        let readiness = match outcome {
            Ok(Ok(_)) => Readiness::Ready,
            Ok(Err(e)) => Readiness::Failed(format!("{e:#}")),
            Err(_) => Readiness::Failed(format!(
                "no initialize response within {:?}",
                options.handshake_timeout
            )),
        };
        drop(guard);
        tx.send_replace(readiness);
    }

    /// Completes once the handshake has settled.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::HandshakeFailed`] if the server did not become ready.
    pub async fn when_ready(&self) -> Result<(), SessionError> {
        let mut rx = self.readiness.clone();
        let settled = rx
            .wait_for(|r| *r != Readiness::Pending)
            .await
            .map(|r| r.clone());

        match settled {
            Ok(Readiness::Ready) => {
                debug!("Session for {} is ready", self.location.path().display());
                Ok(())
            }
            Ok(Readiness::Failed(reason)) => {
                error!("Handshake with {} failed: {}", self.location.path().display(), reason);
                Err(SessionError::HandshakeFailed(reason))
            }
            Ok(Readiness::Pending) | Err(_) => Err(SessionError::HandshakeFailed(
                "handshake task ended without a result".to_string(),
            )),
        }
    }

    /// The executable this session runs.
    #[must_use]
    pub const fn location(&self) -> &ServerLocation {
        &self.location
    }

    /// The documents this session applies to.
    #[must_use]
    pub const fn selector(&self) -> &DocumentSelector {
        &self.selector
    }

    /// Whether the server process is still connected.
    pub async fn is_running(&self) -> bool {
        self.client
            .lock()
            .await
            .as_ref()
            .is_some_and(LspClient::is_alive)
    }

    /// Forwards an opened document if the selector accepts it.
    ///
    /// Returns whether the document was forwarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is stopped or the notification fails.
    pub async fn open_document(
        &self,
        uri: Uri,
        language_id: &str,
        version: i32,
        text: String,
    ) -> Result<bool> {
        if !self.selector.matches(&uri, language_id) {
            debug!("Not forwarding {} ({})", uri.as_str(), language_id);
            return Ok(false);
        }

        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(|| anyhow!("Session is stopped"))?;
        client
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri.clone(),
                    language_id: language_id.to_string(),
                    version,
                    text,
                },
            })
            .await?;
        self.open_documents
            .lock()
            .await
            .insert(uri.as_str().to_string());
        Ok(true)
    }

    /// Sends the full new text of a forwarded document.
    ///
    /// Documents that were never forwarded are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is stopped or the notification fails.
    pub async fn change_document(&self, uri: Uri, version: i32, text: String) -> Result<bool> {
        if !self.open_documents.lock().await.contains(uri.as_str()) {
            return Ok(false);
        }

        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(|| anyhow!("Session is stopped"))?;
        client
            .did_change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier { uri, version },
                content_changes: vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text,
                }],
            })
            .await?;
        Ok(true)
    }

    /// Closes a forwarded document.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is stopped or the notification fails.
    pub async fn close_document(&self, uri: Uri) -> Result<bool> {
        if !self.open_documents.lock().await.remove(uri.as_str()) {
            return Ok(false);
        }

        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or_else(|| anyhow!("Session is stopped"))?;
        client
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri },
            })
            .await?;
        Ok(true)
    }

    /// Shuts the server down. Stopping twice, or a session whose handshake
    /// never finished, is a no-op the second time.
    pub async fn stop(&self) {
        if let Some(handshake) = self.handshake.lock().await.take() {
            handshake.abort();
        }

        let Some(client) = self.client.lock().await.take() else {
            return;
        };

        info!("Stopping {}", self.location.path().display());
        if client.is_alive() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, client.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("LSP shutdown failed: {:#}", e),
                Err(_) => warn!("LSP shutdown timed out after {:?}", SHUTDOWN_TIMEOUT),
            }
        }
        client.terminate().await;
        self.open_documents.lock().await.clear();
    }
}

/// Stops a shared session when its epoch ends.
pub struct SessionDisposable(pub Arc<SessionHandle>);

#[async_trait]
impl Disposable for SessionDisposable {
    async fn dispose(self: Box<Self>) -> Result<()> {
        self.0.stop().await;
        Ok(())
    }
}
