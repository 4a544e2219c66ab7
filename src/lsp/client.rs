/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{Context, Result, anyhow};
use bytes::BytesMut;
use lsp_types::{
    ClientCapabilities, ClientInfo, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, InitializeParams, InitializeResult, InitializedParams,
    PublishDiagnosticsParams, Uri, WorkspaceFolder,
};
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, trace, warn};

use super::protocol::{
    self, NotificationMessage, RequestId, RequestMessage, ResponseMessage,
};
use crate::error::SessionError;

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>>;

/// Default timeout for LSP requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `exit` gets before the process is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Manages communication with an LSP server process over its stdio.
pub struct LspClient {
    next_id: AtomicI64,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingMap,
    alive: Arc<AtomicBool>,
    reader_handle: tokio::task::JoinHandle<()>,
    child: Child,
}

impl LspClient {
    /// Spawns the server process and starts the response reader task.
    ///
    /// `env` is layered over the inherited environment.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Spawn`] if the process cannot be started.
    pub fn spawn(program: &Path, args: &[&str], env: &[(&str, &str)]) -> Result<Self, SessionError> {
        let spawn_error = |source| SessionError::Spawn {
            program: program.display().to_string(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .envs(env.iter().copied())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(spawn_error(std::io::Error::other("stdio not captured")));
        };

        let stdin = Arc::new(Mutex::new(stdin));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let reader_handle = tokio::spawn(Self::reader_task(
            stdin.clone(),
            stdout,
            pending.clone(),
            alive.clone(),
        ));

        debug!(
            "Spawned {} {} (pid {:?})",
            program.display(),
            args.join(" "),
            child.id()
        );

        Ok(Self {
            next_id: AtomicI64::new(1),
            stdin,
            pending,
            alive,
            reader_handle,
            child,
        })
    }

    /// Background task that reads LSP messages and routes responses to pending requests.
    async fn reader_task(
        stdin: Arc<Mutex<ChildStdin>>,
        stdout: ChildStdout,
        pending: PendingMap,
        alive: Arc<AtomicBool>,
    ) {
        let mut reader = BufReader::new(stdout);
        let mut buffer = BytesMut::with_capacity(8192);

        loop {
            let mut temp = [0u8; 4096];
            match reader.read(&mut temp).await {
                Ok(0) => {
                    debug!("LSP stdout closed");
                    break;
                }
                Ok(n) => buffer.extend_from_slice(&temp[..n]),
                Err(e) => {
                    error!("Error reading from LSP stdout: {}", e);
                    break;
                }
            }

            loop {
                let message_str = match protocol::try_parse_message(&mut buffer) {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Discarding unparseable LSP input: {:#}", e);
                        buffer.clear();
                        break;
                    }
                };
                trace!("Received LSP message: {}", message_str);

                let value: serde_json::Value = match serde_json::from_str(&message_str) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Failed to parse JSON: {}", e);
                        continue;
                    }
                };

                let method = value.get("method").and_then(|m| m.as_str()).map(str::to_string);
                match (method, value.get("id").cloned()) {
                    (Some(method), Some(id)) => {
                        // Server request: reply so the server is not left waiting
                        debug!("Rejecting server request: {} (id: {})", method, id);
                        let id = serde_json::from_value(id).unwrap_or(RequestId::Number(0));
                        let reply = ResponseMessage::method_not_found(id, &method);
                        if let Err(e) = Self::write_framed(&stdin, &reply).await {
                            warn!("Failed to reject server request {}: {:#}", method, e);
                        }
                    }
                    (Some(_), None) => {
                        if let Ok(notification) =
                            serde_json::from_value::<NotificationMessage>(value)
                        {
                            Self::handle_notification(&notification);
                        }
                    }
                    (None, Some(_)) => {
                        if let Ok(response) = serde_json::from_value::<ResponseMessage>(value)
                            && let Some(id) = &response.id
                        {
                            if let Some(sender) = pending.lock().await.remove(id) {
                                let _ = sender.send(response);
                            } else {
                                warn!("Received response for unknown request id: {:?}", id);
                            }
                        }
                    }
                    (None, None) => warn!("Unknown message format: {}", message_str),
                }
            }
        }

        alive.store(false, Ordering::SeqCst);
        // Dropping the senders fails every outstanding request
        pending.lock().await.clear();
        debug!("LSP reader task exiting");
    }

    /// Logs notifications the client does not act on.
    fn handle_notification(notification: &NotificationMessage) {
        match notification.method.as_str() {
            "textDocument/publishDiagnostics" => {
                if let Ok(params) =
                    serde_json::from_value::<PublishDiagnosticsParams>(notification.params.clone())
                {
                    debug!(
                        "Received {} diagnostics for {}",
                        params.diagnostics.len(),
                        params.uri.as_str()
                    );
                }
            }
            "window/logMessage" | "window/showMessage" => {
                if let Some(message) = notification.params.get("message").and_then(|m| m.as_str())
                {
                    debug!("helios-ls: {}", message);
                }
            }
            other => trace!("Ignoring notification: {}", other),
        }
    }

    async fn write_framed<T: serde::Serialize>(
        stdin: &Mutex<ChildStdin>,
        message: &T,
    ) -> Result<()> {
        let framed = protocol::encode_message(message)?;
        let mut stdin = stdin.lock().await;
        stdin.write_all(&framed).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Sends a request and waits for the response with timeout.
    async fn request<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R> {
        if !self.is_alive() {
            return Err(anyhow!("LSP server is not running"));
        }
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));

        let request = RequestMessage {
            jsonrpc: "2.0".to_string(),
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        trace!("Sending LSP request: {}", method);
        if let Err(e) = Self::write_framed(&self.stdin, &request).await {
            self.pending.lock().await.remove(&id);
            return Err(e.context(format!("Failed to send '{method}'")));
        }

        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(anyhow!("LSP server closed connection")),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(anyhow!(
                    "LSP request '{}' timed out after {:?}",
                    method,
                    REQUEST_TIMEOUT
                ));
            }
        };

        if let Some(error) = response.error {
            return Err(anyhow!("LSP error {}: {}", error.code, error.message));
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).context("Failed to parse LSP response")
    }

    /// Sends a notification (no response expected).
    async fn notify<P: serde::Serialize>(&self, method: &str, params: P) -> Result<()> {
        let notification = NotificationMessage {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        trace!("Sending LSP notification: {}", method);
        Self::write_framed(&self.stdin, &notification).await
    }

    /// Performs the LSP initialize handshake.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn initialize(&self, root: Option<&Path>) -> Result<InitializeResult> {
        let workspace_folders = root
            .map(|root| -> Result<Vec<WorkspaceFolder>> {
                let url = url::Url::from_directory_path(root)
                    .map_err(|()| anyhow!("Workspace root is not absolute: {}", root.display()))?;
                let uri: Uri = url
                    .as_str()
                    .parse()
                    .map_err(|e| anyhow!("Invalid root URI {url}: {e:?}"))?;
                let name = root
                    .file_name()
                    .map_or_else(|| "workspace".to_string(), |s| s.to_string_lossy().to_string());
                Ok(vec![WorkspaceFolder { uri, name }])
            })
            .transpose()?;

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            client_info: Some(ClientInfo {
                name: "helios-client".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ClientCapabilities::default(),
            workspace_folders,
            ..Default::default()
        };

        let result: InitializeResult = self.request("initialize", params).await?;
        if let Some(info) = &result.server_info {
            debug!(
                "Server identified as {} {}",
                info.name,
                info.version.as_deref().unwrap_or("(unknown version)")
            );
        }

        self.notify("initialized", InitializedParams {}).await?;
        Ok(result)
    }

    /// Sends shutdown request and exit notification.
    ///
    /// # Errors
    ///
    /// Returns an error if either message cannot be delivered.
    pub async fn shutdown(&self) -> Result<()> {
        // shutdown response varies by server (null, true, etc.) - ignore result
        let _: serde_json::Value = self.request("shutdown", serde_json::Value::Null).await?;
        self.notify("exit", serde_json::Value::Null).await
    }

    /// Waits briefly for the process to exit, then kills it.
    pub async fn terminate(mut self) {
        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => debug!("LSP server exited with {}", status),
            Ok(Err(e)) => warn!("Failed to wait for LSP server: {}", e),
            Err(_) => {
                warn!("LSP server ignored exit, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill LSP server: {}", e);
                }
            }
        }
        self.reader_handle.abort();
    }

    /// Notifies the LSP server that a document was opened.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be delivered.
    pub async fn did_open(&self, params: DidOpenTextDocumentParams) -> Result<()> {
        self.notify("textDocument/didOpen", params).await
    }

    /// Notifies the LSP server that a document changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be delivered.
    pub async fn did_change(&self, params: DidChangeTextDocumentParams) -> Result<()> {
        self.notify("textDocument/didChange", params).await
    }

    /// Notifies the LSP server that a document was closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be delivered.
    pub async fn did_close(&self, params: DidCloseTextDocumentParams) -> Result<()> {
        self.notify("textDocument/didClose", params).await
    }

    /// Returns true if the LSP server connection is still alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// OS process id of the server, while it runs.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}
