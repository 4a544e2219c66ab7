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

//! Terminal formatting for status lines and prompts.

use chrono::{DateTime, Local};
use crossterm::tty::IsTty;
use std::io::stderr;

/// Configuration for color output
#[derive(Debug, Clone)]
pub struct ColorConfig {
    pub enabled: bool,
}

impl ColorConfig {
    /// Create a new ColorConfig, auto-detecting a stderr TTY unless nocolor is true
    pub fn new(nocolor: bool) -> Self {
        Self {
            enabled: !nocolor && stderr().is_tty(),
        }
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.enabled {
            format!("\x1b[{code}m{s}\x1b[0m")
        } else {
            s.to_string()
        }
    }

    /// Green (ready)
    pub fn green(&self, s: &str) -> String {
        self.paint("32", s)
    }

    /// Yellow (busy)
    pub fn yellow(&self, s: &str) -> String {
        self.paint("33", s)
    }

    /// Red (errors)
    pub fn red(&self, s: &str) -> String {
        self.paint("31", s)
    }

    /// Cyan (prompt actions)
    pub fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    /// Dim text
    pub fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }
}

/// Get the terminal width, defaulting to 80 if unable to detect
pub fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
    if max_len <= 3 {
        return ".".repeat(max_len.min(3));
    }
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

/// Replaces `$(name)` icon references with terminal glyphs.
///
/// Unknown icons are dropped.
pub fn render_icons(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find(')') else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push_str(match &after[..end] {
            "check" => "✓",
            "error" => "✗",
            name if name.starts_with("sync") => "↻",
            _ => "",
        });
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// One status line: `HH:MM:SS <text>  <tooltip>`, fit to `width`.
pub fn status_line(
    colors: &ColorConfig,
    at: DateTime<Local>,
    text: &str,
    tooltip: &str,
    width: usize,
) -> String {
    let stamp = at.format("%H:%M:%S").to_string();
    let body = truncate(
        &format!("{}  {}", render_icons(text), tooltip),
        width.saturating_sub(stamp.len() + 1),
    );
    let body = if text.starts_with("$(error)") {
        colors.red(&body)
    } else if text.starts_with("$(check)") {
        colors.green(&body)
    } else {
        colors.yellow(&body)
    };
    format!("{} {}", colors.dim(&stamp), body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("test", 4), "test");
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("✓ Helios-LS: Ready", 8), "✓ Hel...");
        assert_eq!(truncate("hello", 2), "..");
    }

    #[test]
    fn test_color_config_disabled() {
        let config = ColorConfig::new(true);
        assert!(!config.enabled);
        assert_eq!(config.green("test"), "test");
        assert_eq!(config.red("test"), "test");
    }

    #[test]
    fn test_color_config_enabled() {
        let config = ColorConfig { enabled: true };
        assert_eq!(config.yellow("x"), "\x1b[33mx\x1b[0m");
    }

    #[test]
    fn test_render_icons() {
        assert_eq!(render_icons("$(check) Helios-LS: Ready"), "✓ Helios-LS: Ready");
        assert_eq!(render_icons("$(sync~spin) Loading"), "↻ Loading");
        assert_eq!(render_icons("$(bogus)x"), "x");
        assert_eq!(render_icons("cost $(5"), "cost $(5");
    }

    #[test]
    fn test_status_line_plain() -> anyhow::Result<()> {
        let colors = ColorConfig { enabled: false };
        let at = Local
            .with_ymd_and_hms(2026, 3, 1, 9, 5, 7)
            .single()
            .ok_or_else(|| anyhow::anyhow!("ambiguous time"))?;
        let line = status_line(&colors, at, "$(error) Helios-LS: Error", "Disabled", 80);
        assert_eq!(line, "09:05:07 ✗ Helios-LS: Error  Disabled");
        Ok(())
    }
}
