// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! The status indicator.

use serde::Serialize;
use tracing::debug;

use crate::host::StatusItem;

/// Name shown in every status text.
pub const DISPLAY_NAME: &str = "Helios-LS";

/// What the indicator is currently reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Work in progress.
    Loading,
    /// The server is ready.
    Ready,
    /// Something failed.
    Error,
}

/// Text and tooltip for one status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    /// Indicator text, including its icon.
    pub text: String,
    /// Indicator tooltip.
    pub tooltip: String,
}

/// Renders a status. Pure: the same input always renders the same view.
#[must_use]
pub fn render(kind: StatusKind, message: Option<&str>) -> StatusView {
    let (icon, default, tooltip) = match kind {
        StatusKind::Ready => ("$(check)", "Ready", "is ready for tasks"),
        StatusKind::Loading => ("$(sync~spin)", "Loading...", "is busy"),
        StatusKind::Error => ("$(error)", "Error", "has encountered an error"),
    };

    StatusView {
        text: format!("{icon} {DISPLAY_NAME}: {}", message.unwrap_or(default)),
        tooltip: format!("{DISPLAY_NAME} {tooltip}"),
    }
}

/// Pushes status transitions into the host's indicator.
pub struct StatusReporter {
    item: Box<dyn StatusItem>,
    current: Option<(StatusKind, Option<String>)>,
}

impl StatusReporter {
    /// Takes ownership of an indicator and shows it.
    #[must_use]
    pub fn new(item: Box<dyn StatusItem>) -> Self {
        item.show();
        Self {
            item,
            current: None,
        }
    }

    /// Replaces whatever the indicator shows.
    pub fn set_status(&mut self, kind: StatusKind, message: Option<&str>) {
        let view = render(kind, message);
        debug!("Status: {}", view.text);
        self.item.set_text(&view.text);
        self.item.set_tooltip(&view.tooltip);
        self.current = Some((kind, message.map(str::to_string)));
    }

    /// The last status set, if any.
    #[must_use]
    pub fn current(&self) -> Option<StatusKind> {
        self.current.as_ref().map(|(kind, _)| *kind)
    }

    /// Removes the indicator from the host UI.
    pub fn dispose(self) {
        self.item.dispose();
    }
}
