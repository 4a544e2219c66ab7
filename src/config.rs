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

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Key holding the configured server path inside the host namespace.
pub const SERVER_PATH_KEY: &str = "serverPath";

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Host configuration namespace (default: "helios")
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Deadline for the PATH search in milliseconds (default: 5000)
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// Deadline for the initialize handshake in seconds (default: 30)
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,

    /// Deadline for `helios-ls --version` in seconds (default: 10)
    #[serde(default = "default_version_timeout_secs")]
    pub version_timeout_secs: u64,

    /// Keys whose change requires a full reload
    #[serde(default = "default_reload_keys")]
    pub reload_keys: Vec<String>,
}

fn default_namespace() -> String {
    "helios".to_string()
}

const fn default_search_timeout_ms() -> u64 {
    5000
}

const fn default_handshake_timeout_secs() -> u64 {
    30
}

const fn default_version_timeout_secs() -> u64 {
    10
}

fn default_reload_keys() -> Vec<String> {
    vec![SERVER_PATH_KEY.to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            search_timeout_ms: default_search_timeout_ms(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            version_timeout_secs: default_version_timeout_secs(),
            reload_keys: default_reload_keys(),
        }
    }
}

impl Settings {
    /// Load settings from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or deserialized.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("namespace", default_namespace())?
            .set_default("search_timeout_ms", default_search_timeout_ms())?
            .set_default("handshake_timeout_secs", default_handshake_timeout_secs())?
            .set_default("version_timeout_secs", default_version_timeout_secs())?;

        // 2. User config directory (~/.config/helios-client/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("helios-client").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Explicit file
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Environment (HELIOS_CLIENT_SEARCH_TIMEOUT_MS, etc.)
        builder = builder.add_source(config::Environment::with_prefix("HELIOS_CLIENT"));

        let settings = builder
            .build()
            .context("Failed to build configuration")?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Deadline for the PATH search.
    #[must_use]
    pub const fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    /// Deadline for the initialize handshake.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    /// Deadline for the version query.
    #[must_use]
    pub const fn version_timeout(&self) -> Duration {
        Duration::from_secs(self.version_timeout_secs)
    }

    /// Whether a change to `key` requires a full reload.
    #[must_use]
    pub fn requires_reload(&self, key: &str) -> bool {
        self.reload_keys.iter().any(|k| k == key)
    }

    /// Fully qualified name of a key, e.g. `helios.serverPath`.
    #[must_use]
    pub fn qualified(&self, key: &str) -> String {
        format!("{}.{key}", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_file_overrides_defaults() -> Result<()> {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
        writeln!(file, "search_timeout_ms = 250")?;
        writeln!(file, "reload_keys = [\"serverPath\", \"trace\"]")?;

        let settings = Settings::load(Some(file.path().to_path_buf()))?;
        assert_eq!(settings.search_timeout(), Duration::from_millis(250));
        assert_eq!(settings.namespace, "helios");
        assert!(settings.requires_reload("trace"));
        assert!(!settings.requires_reload("theme"));
        Ok(())
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.search_timeout(), Duration::from_millis(5000));
        assert_eq!(settings.handshake_timeout(), Duration::from_secs(30));
        assert!(settings.requires_reload(SERVER_PATH_KEY));
        assert_eq!(settings.qualified(SERVER_PATH_KEY), "helios.serverPath");
    }
}
