// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistence and loading settings.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file name looked up next to a project
pub const SETTINGS_FILE_NAME: &str = "narrative.settings.ron";

/// Storage encoding of graph documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DocumentFormat {
    /// Rusty Object Notation
    #[default]
    Ron,
    /// JSON
    Json,
}

impl DocumentFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Ron => "ron",
            Self::Json => "json",
        }
    }

    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "ron" => Some(Self::Ron),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// How stored links are treated on load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkPolicy {
    /// Keep every structurally resolvable link
    #[default]
    Trust,
    /// Re-run the connection rules and warn, but keep illegal links
    Report,
    /// Re-run the connection rules and drop illegal links
    Reject,
}

/// Settings shared by persistence and hosts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Settings format version
    pub version: u32,
    /// Format used when the target path has no known extension
    pub format: DocumentFormat,
    /// Pretty-print saved documents
    pub pretty: bool,
    /// Treatment of stored links on load
    pub link_policy: LinkPolicy,
    /// Create new documents with a start node
    pub insert_start_node: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            format: DocumentFormat::Ron,
            pretty: true,
            link_policy: LinkPolicy::Trust,
            insert_start_node: true,
        }
    }
}

impl GraphSettings {
    /// Parse settings from RON
    pub fn from_ron(s: &str) -> Result<Self, SettingsError> {
        let settings: GraphSettings = ron::from_str(s).map_err(|e| SettingsError::Parse(e.to_string()))?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }

        Ok(settings)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Load settings from a file if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        let content = ron::ser::to_string_pretty(self, config).map_err(|e| SettingsError::Serialize(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Error when loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// I/O failure
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File content is not valid settings
    #[error("Invalid settings: {0}")]
    Parse(String),

    /// Settings written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest supported version
        supported: u32,
    },

    /// Serializer failure
    #[error("Settings serialization error: {0}")]
    Serialize(String),
}
