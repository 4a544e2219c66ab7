// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Locating the `helios-ls` executable.
//!
//! Resolution tries, in order: the configured path, a copy in the client's
//! global storage directory, and finally (with the user's consent) a search of
//! `PATH`. The search races the lookup against the user cancelling the
//! progress indicator and a deadline; whichever settles first decides the
//! outcome and the others are dropped unfinished.

use async_trait::async_trait;
use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{SERVER_PATH_KEY, Settings};
use crate::error::{CancelCause, ResolveError};
use crate::host::{ConfigStore, Host, Message, Progress};

/// Base name of the server executable, without platform suffix.
pub const SERVER_EXECUTABLE: &str = "helios-ls";

const QUIT_ACTION: &str = "Quit extension";
const SEARCH_ACTION: &str = "Find it for me";
const PERSIST_YES: &str = "Yes";
const PERSIST_NO: &str = "No";

/// The file name the executable must have on this platform.
#[must_use]
pub fn executable_file_name() -> String {
    format!("{SERVER_EXECUTABLE}{}", std::env::consts::EXE_SUFFIX)
}

/// How a server path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Read from the host configuration.
    Configured,
    /// Found in the client's global storage directory.
    CachedGlobalStorage,
    /// Found by searching `PATH`.
    FoundInPath,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configured => "configured",
            Self::CachedGlobalStorage => "cached-global-storage",
            Self::FoundInPath => "found-in-PATH",
        })
    }
}

/// A validated server executable path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerLocation {
    path: PathBuf,
    provenance: Provenance,
}

impl ServerLocation {
    /// Path to the executable.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the path came from.
    #[must_use]
    pub const fn provenance(&self) -> Provenance {
        self.provenance
    }
}

/// Whether `path` names an existing regular file called `helios-ls`.
///
/// The empty string is never valid.
pub async fn is_valid_server_path(path: &str) -> bool {
    !path.is_empty() && is_valid_path(Path::new(path)).await
}

async fn is_valid_path(path: &Path) -> bool {
    let name_matches = path
        .file_name()
        .is_some_and(|name| name == executable_file_name().as_str());
    name_matches && is_regular_file(path).await
}

async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file())
}

/// Finds an executable by name.
#[async_trait]
pub trait Locator: Send + Sync {
    /// Returns the executable's path, or `None` once the search is exhausted.
    async fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// Searches a `PATH`-style list of directories.
#[derive(Debug, Clone)]
pub struct PathLocator {
    paths: Option<OsString>,
    cwd: PathBuf,
}

impl PathLocator {
    /// Searches the process `PATH`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            paths: std::env::var_os("PATH"),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Searches the given `PATH`-style list instead of the environment.
    #[must_use]
    pub fn with_paths(paths: impl Into<OsString>) -> Self {
        Self {
            paths: Some(paths.into()),
            ..Self::from_env()
        }
    }
}

#[async_trait]
impl Locator for PathLocator {
    async fn locate(&self, name: &str) -> Option<PathBuf> {
        let name = name.to_string();
        let paths = self.paths.clone();
        let cwd = self.cwd.clone();
        // `which` stats every PATH entry; keep that off the async workers.
        tokio::task::spawn_blocking(move || which::which_in(name, paths, cwd).ok())
            .await
            .ok()
            .flatten()
    }
}

/// How a PATH search settled.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SearchOutcome {
    Finished(Option<PathBuf>),
    Stopped(CancelCause),
}

/// An in-flight PATH search racing cancellation and a deadline.
struct PendingSearch<'a> {
    locator: &'a dyn Locator,
    progress: Progress,
    deadline: Duration,
}

impl PendingSearch<'_> {
    /// Waits for the first of the three outcomes.
    ///
    /// Branches are polled in order, so a cancellation or expired deadline
    /// that is already pending beats a result arriving in the same poll. The
    /// losing futures are dropped here, and the progress indicator with them,
    /// so nothing from a losing branch runs after this returns.
    async fn settle(mut self) -> SearchOutcome {
        tokio::select! {
            biased;
            () = self.progress.cancelled() => SearchOutcome::Stopped(CancelCause::User),
            () = tokio::time::sleep(self.deadline) => SearchOutcome::Stopped(CancelCause::Timeout),
            found = self.locator.locate(SERVER_EXECUTABLE) => SearchOutcome::Finished(found),
        }
    }
}

/// Resolves the server executable for one activation.
pub struct PathResolver<'a> {
    host: &'a dyn Host,
    settings: &'a Settings,
    locator: &'a dyn Locator,
}

impl<'a> PathResolver<'a> {
    /// Creates a resolver.
    #[must_use]
    pub fn new(host: &'a dyn Host, settings: &'a Settings, locator: &'a dyn Locator) -> Self {
        Self {
            host,
            settings,
            locator,
        }
    }

    /// Finds a usable server path.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Abort`] if the user declines to search.
    /// - [`ResolveError::SearchCanceled`] if the search is cancelled or times out.
    /// - [`ResolveError::NotFound`] if `PATH` has no usable executable.
    pub async fn resolve(&self) -> Result<ServerLocation, ResolveError> {
        let config = self.host.configuration();
        let configured = config.get(SERVER_PATH_KEY).unwrap_or_default();

        if is_valid_server_path(&configured).await {
            info!("Using configured server path {}", configured);
            return Ok(ServerLocation {
                path: PathBuf::from(configured),
                provenance: Provenance::Configured,
            });
        }

        let cached = self
            .host
            .global_storage_dir()
            .join(executable_file_name());
        if is_regular_file(&cached).await {
            info!("Using cached server at {}", cached.display());
            return Ok(ServerLocation {
                path: cached,
                provenance: Provenance::CachedGlobalStorage,
            });
        }

        let question = if configured.is_empty() {
            format!(
                "The path to the Helios-LS executable is not configured ({}).",
                self.settings.qualified(SERVER_PATH_KEY)
            )
        } else {
            format!("The configured path to the Helios-LS executable is invalid: {configured}")
        };
        let answer = self
            .host
            .show_message(
                Message::info(question)
                    .with_actions(&[QUIT_ACTION, SEARCH_ACTION])
                    .modal(),
            )
            .await;
        if answer.as_deref() != Some(SEARCH_ACTION) {
            debug!("Search declined ({:?})", answer);
            return Err(ResolveError::Abort);
        }

        let path = self.search().await?;
        self.offer_to_persist(config.as_ref(), &path).await;

        Ok(ServerLocation {
            path,
            provenance: Provenance::FoundInPath,
        })
    }

    async fn search(&self) -> Result<PathBuf, ResolveError> {
        let deadline = self.settings.search_timeout();
        debug!("Searching PATH for {} (deadline {:?})", SERVER_EXECUTABLE, deadline);

        let search = PendingSearch {
            locator: self.locator,
            progress: self.host.begin_progress("Locating the Helios-LS executable..."),
            deadline,
        };

        match search.settle().await {
            SearchOutcome::Finished(Some(path)) => {
                if is_valid_path(&path).await {
                    info!("Found {} in PATH", path.display());
                    Ok(path)
                } else {
                    warn!("Ignoring unusable search result {}", path.display());
                    Err(ResolveError::NotFound)
                }
            }
            SearchOutcome::Finished(None) => Err(ResolveError::NotFound),
            SearchOutcome::Stopped(cause) => {
                info!("PATH search stopped: {:?}", cause);
                Err(ResolveError::SearchCanceled(cause))
            }
        }
    }

    /// Asks whether to save `path`; the answer never changes the result.
    async fn offer_to_persist(&self, config: &dyn ConfigStore, path: &Path) {
        let answer = self
            .host
            .show_message(
                Message::info(
                    "Successfully found the Helios-LS executable. \
                     Would you like to update the configuration with its location?",
                )
                .with_actions(&[PERSIST_NO, PERSIST_YES]),
            )
            .await;

        if answer.as_deref() == Some(PERSIST_YES) {
            let value = path.to_string_lossy();
            match config.update(SERVER_PATH_KEY, &value).await {
                Ok(()) => info!("Saved {} = {}", self.settings.qualified(SERVER_PATH_KEY), value),
                Err(e) => {
                    warn!("Failed to save server path: {:#}", e);
                    self.host
                        .show_message(Message::warning(format!(
                            "Could not save {}: {e:#}",
                            self.settings.qualified(SERVER_PATH_KEY)
                        )))
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::fs;

    #[tokio::test]
    async fn test_valid_path_requires_matching_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let exe = dir.path().join(executable_file_name());
        fs::write(&exe, b"")?;
        let other = dir.path().join("koi-ls");
        fs::write(&other, b"")?;
        let subdir = dir.path().join("nested").join(executable_file_name());
        fs::create_dir_all(&subdir)?;

        assert!(is_valid_server_path(&exe.to_string_lossy()).await);
        assert!(!is_valid_server_path("").await);
        assert!(!is_valid_server_path(&other.to_string_lossy()).await);
        assert!(!is_valid_server_path(&subdir.to_string_lossy()).await);
        assert!(
            !is_valid_server_path(&dir.path().join("missing").join(executable_file_name()).to_string_lossy())
                .await
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_settle_prefers_first_outcome() {
        struct Slow;

        #[async_trait]
        impl Locator for Slow {
            async fn locate(&self, _name: &str) -> Option<PathBuf> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Some(PathBuf::from("/late/helios-ls"))
            }
        }

        let (_canceller, progress) = Progress::channel("test");
        let search = PendingSearch {
            locator: &Slow,
            progress,
            deadline: Duration::from_millis(20),
        };
        assert_eq!(
            search.settle().await,
            SearchOutcome::Stopped(CancelCause::Timeout)
        );
    }

    #[tokio::test]
    async fn test_settle_pending_cancel_beats_ready_result() {
        struct Immediate;

        #[async_trait]
        impl Locator for Immediate {
            async fn locate(&self, _name: &str) -> Option<PathBuf> {
                Some(PathBuf::from("/usr/bin/helios-ls"))
            }
        }

        for _ in 0..200 {
            let (canceller, progress) = Progress::channel("test");
            canceller.cancel();
            let search = PendingSearch {
                locator: &Immediate,
                progress,
                deadline: Duration::from_secs(5),
            };
            assert_eq!(
                search.settle().await,
                SearchOutcome::Stopped(CancelCause::User)
            );
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_valid_path_accepts_non_utf8_dirs() -> Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir()?;
        let odd = dir.path().join(OsStr::from_bytes(b"bin-\xff"));
        fs::create_dir_all(&odd)?;
        let exe = odd.join(executable_file_name());
        fs::write(&exe, b"")?;

        assert!(is_valid_path(&exe).await);
        assert!(!is_valid_server_path(&exe.to_string_lossy()).await);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_path_locator_searches_given_dirs() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let exe = dir.path().join(SERVER_EXECUTABLE);
        fs::write(&exe, b"#!/bin/sh\n")?;
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755))?;

        let found = PathLocator::with_paths(dir.path().as_os_str()).locate(SERVER_EXECUTABLE).await;
        assert_eq!(found, Some(exe));

        let empty = tempfile::tempdir()?;
        let missing = PathLocator::with_paths(empty.path().as_os_str())
            .locate(SERVER_EXECUTABLE)
            .await;
        assert_eq!(missing, None);
        Ok(())
    }
}
