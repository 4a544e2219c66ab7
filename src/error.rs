// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Failure classification for activation.
//!
//! Resolver and session failures are closed enums so the controller handles
//! every kind exhaustively. Anything else travels as an `anyhow::Error` and is
//! classified as [`FailureKind::Unexpected`].

use serde::Serialize;
use thiserror::Error;

/// Why a PATH search stopped before finding anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelCause {
    /// The user cancelled the progress indicator.
    User,
    /// The search deadline expired.
    Timeout,
}

/// Failures of server path resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The user declined to search for the executable.
    #[error("the user declined to locate the Helios-LS executable")]
    Abort,

    /// The PATH search was cancelled or exceeded its deadline.
    #[error("locating the Helios-LS executable was stopped ({0:?})")]
    SearchCanceled(CancelCause),

    /// The PATH search completed without finding the executable.
    #[error("the Helios-LS executable was not found in PATH")]
    NotFound,
}

/// Failures of a language server session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server process could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The server never completed the initialize handshake.
    #[error("language server handshake failed: {0}")]
    HandshakeFailed(String),
}

/// Any failure that ends an activation epoch.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// Path resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Session start or handshake failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Anything not covered by the taxonomy above.
    #[error("{0:#}")]
    Unexpected(#[from] anyhow::Error),
}

/// Reason carried by a degraded session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The user declined to locate the executable.
    Abort,
    /// The search was cancelled or timed out.
    SearchCanceled(CancelCause),
    /// Nothing was found in PATH.
    NotFound,
    /// The server failed to become ready.
    HandshakeFailed,
    /// An error outside the taxonomy.
    Unexpected,
}

impl ActivationError {
    /// Classifies this error for the degraded state.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Resolve(ResolveError::Abort) => FailureKind::Abort,
            Self::Resolve(ResolveError::SearchCanceled(cause)) => {
                FailureKind::SearchCanceled(*cause)
            }
            Self::Resolve(ResolveError::NotFound) => FailureKind::NotFound,
            // A server that never spawned never got ready either.
            Self::Session(_) => FailureKind::HandshakeFailed,
            Self::Unexpected(_) => FailureKind::Unexpected,
        }
    }
}

impl FailureKind {
    /// Short label shown in the status indicator.
    #[must_use]
    pub const fn status_message(self) -> &'static str {
        match self {
            Self::Abort => "Disabled",
            Self::SearchCanceled(_) => "Search stopped",
            Self::NotFound => "Executable not found",
            Self::HandshakeFailed => "Failed to start",
            Self::Unexpected => "Unexpected error",
        }
    }

    /// Whether this failure should offer the user a way to quit.
    #[must_use]
    pub const fn offers_quit(self) -> bool {
        matches!(self, Self::SearchCanceled(_) | Self::NotFound)
    }
}
