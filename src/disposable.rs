// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Resources owned by one activation epoch.

use tracing::{debug, warn};

use crate::host::Disposable;

/// An ordered set of acquired resources, released in reverse order.
#[derive(Default)]
pub struct DisposableSet {
    entries: Vec<(String, Box<dyn Disposable>)>,
}

impl DisposableSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a newly acquired resource.
    pub fn push(&mut self, label: impl Into<String>, disposable: Box<dyn Disposable>) {
        self.entries.push((label.into(), disposable));
    }

    /// Number of live resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Disposes everything, newest first.
    ///
    /// Failures are logged and do not stop later disposals. The set is empty
    /// afterwards, so draining twice disposes nothing the second time.
    pub async fn drain(&mut self) {
        while let Some((label, disposable)) = self.entries.pop() {
            debug!("Disposing {}", label);
            if let Err(e) = disposable.dispose().await {
                warn!("Failed to dispose {}: {:#}", label, e);
            }
        }
    }
}

impl Drop for DisposableSet {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            warn!(
                "{} resources dropped without disposal",
                self.entries.len()
            );
        }
    }
}
