// Persisted client preferences: dream strength and the custom prompt
// text. Loaded once at launch, written back when the user edits them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_DREAM;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Strength on the 0-100 scale the gateway expects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dream: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
}

impl Settings {
    /// Strength to send, falling back to the stock default.
    pub fn strength(&self) -> u8 {
        self.dream.unwrap_or(DEFAULT_DREAM)
    }

    /// Parses the single-line prompt-editor format: `"73:make it blue"`
    /// sets both fields, `"make it blue"` only the custom text, and an
    /// empty entry clears everything.
    pub fn parse_entry(entry: &str) -> Self {
        let entry = entry.trim();
        if entry.is_empty() {
            return Settings::default();
        }
        if let Some((strength, custom)) = entry.split_once(':') {
            if let Ok(dream) = strength.trim().parse::<u8>() {
                if dream <= 100 {
                    return Settings {
                        dream: Some(dream),
                        custom: some_nonempty(custom),
                    };
                }
            }
        }
        Settings {
            dream: None,
            custom: Some(entry.to_string()),
        }
    }

    /// Inverse of `parse_entry`, used to pre-fill the editor.
    pub fn entry(&self) -> String {
        match (&self.dream, &self.custom) {
            (Some(d), Some(c)) => format!("{d}:{c}"),
            (Some(d), None) => format!("{d}:"),
            (None, Some(c)) => c.clone(),
            (None, None) => String::new(),
        }
    }

    /// Missing or unreadable files mean "no preferences yet".
    pub fn load(path: &Path) -> Settings {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dreamlens")
            .join("settings.json")
    }
}

fn some_nonempty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_with_strength_and_custom() {
        let s = Settings::parse_entry("73:make it blue");
        assert_eq!(s.dream, Some(73));
        assert_eq!(s.custom.as_deref(), Some("make it blue"));
        assert_eq!(s.entry(), "73:make it blue");
    }

    #[test]
    fn entry_with_custom_only() {
        let s = Settings::parse_entry("make it blue");
        assert_eq!(s.dream, None);
        assert_eq!(s.custom.as_deref(), Some("make it blue"));
        assert_eq!(s.strength(), DEFAULT_DREAM);
    }

    #[test]
    fn empty_entry_clears_everything() {
        assert_eq!(Settings::parse_entry(""), Settings::default());
        assert_eq!(Settings::parse_entry("  "), Settings::default());
    }

    #[test]
    fn non_numeric_prefix_stays_custom_text() {
        let s = Settings::parse_entry("blue:ish tint");
        assert_eq!(s.dream, None);
        assert_eq!(s.custom.as_deref(), Some("blue:ish tint"));
    }

    #[test]
    fn out_of_range_strength_stays_custom_text() {
        let s = Settings::parse_entry("150:x");
        assert_eq!(s.dream, None);
        assert_eq!(s.custom.as_deref(), Some("150:x"));
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let s = Settings::parse_entry("40:pencil sketch");
        s.store(&path).unwrap();
        assert_eq!(Settings::load(&path), s);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Settings::load(&dir.path().join("nope.json")), Settings::default());
    }
}
