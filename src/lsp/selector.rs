// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Which documents a session applies to.

use lsp_types::Uri;
use serde::{Deserialize, Serialize};

/// Language identifier of Helios sources.
pub const HELIOS_LANGUAGE_ID: &str = "helios";

/// Matches documents by URI scheme and language identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// URI scheme, e.g. `file` or `untitled`.
    pub scheme: String,
    /// Language identifier, e.g. `helios`.
    pub language: String,
}

/// A union of [`DocumentFilter`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSelector(pub Vec<DocumentFilter>);

impl DocumentSelector {
    /// Saved and unsaved Helios buffers.
    #[must_use]
    pub fn helios() -> Self {
        Self(
            ["file", "untitled"]
                .into_iter()
                .map(|scheme| DocumentFilter {
                    scheme: scheme.to_string(),
                    language: HELIOS_LANGUAGE_ID.to_string(),
                })
                .collect(),
        )
    }

    /// Whether a document with this URI and language belongs to the session.
    #[must_use]
    pub fn matches(&self, uri: &Uri, language_id: &str) -> bool {
        let Some((scheme, _)) = uri.as_str().split_once(':') else {
            return false;
        };
        self.0.iter().any(|filter| {
            filter.scheme.eq_ignore_ascii_case(scheme) && filter.language == language_id
        })
    }
}

impl Default for DocumentSelector {
    fn default() -> Self {
        Self::helios()
    }
}
