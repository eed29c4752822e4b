//! Configuration loading for a Plume session.
//!
//! Configuration is loaded from TOML. Every key is optional; an empty file
//! yields [`SessionConfig::default`].

use plume_core::{LocalPresence, OutboundPolicy, SessionSettings, RICH_TEXT};
use plume_types::{DocumentKey, Rgb};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for a session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Which document to edit.
    #[serde(default)]
    pub document: DocumentConfig,
    /// Local cursor presentation and remote cursor expiry.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Outbound presence while the transport is not open.
    #[serde(default)]
    pub outbound: OutboundConfig,
}

/// Document configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// Collection the document lives in (default: "docs").
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Document name (default: "hello2").
    #[serde(default = "default_name")]
    pub name: String,
    /// Type to create the document as if missing (default: "rich-text").
    #[serde(default = "default_doc_type")]
    pub doc_type: String,
}

/// Presence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Broadcast the local cursor (default: true).
    #[serde(default = "default_presence_enabled")]
    pub enabled: bool,
    /// Display name shown next to our cursor (default: empty).
    #[serde(default)]
    pub name: String,
    /// Cursor colour, `rgb(r, g, b)` or `#rrggbb` (default: magenta).
    #[serde(default)]
    pub colour: Rgb,
    /// Remote cursors silent this long are removed (default: 10000).
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
    /// How often to look for silent cursors (default: 1000).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

/// What to do with cursor updates while the transport is not open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Hold them and send on reconnect.
    Queue,
    /// Discard them.
    Drop,
}

/// Outbound configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OutboundConfig {
    /// Queue or drop (default: queue).
    #[serde(default = "default_policy")]
    pub policy: PolicyKind,
    /// Queue capacity; oldest updates are discarded beyond it (default: 32).
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

// Default value functions
fn default_collection() -> String {
    "docs".to_string()
}

fn default_name() -> String {
    "hello2".to_string()
}

fn default_doc_type() -> String {
    RICH_TEXT.to_string()
}

fn default_presence_enabled() -> bool {
    true
}

fn default_stale_after_ms() -> u64 {
    10_000 // 10 seconds
}

fn default_sweep_interval_ms() -> u64 {
    1_000
}

fn default_policy() -> PolicyKind {
    PolicyKind::Queue
}

fn default_capacity() -> usize {
    32
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            name: default_name(),
            doc_type: default_doc_type(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_presence_enabled(),
            name: String::new(),
            colour: Rgb::default(),
            stale_after_ms: default_stale_after_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl Default for OutboundConfig {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            capacity: default_capacity(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.document.collection.trim().is_empty() {
            return Err(ConfigError::Invalid("document.collection is empty".into()));
        }
        if self.document.name.trim().is_empty() {
            return Err(ConfigError::Invalid("document.name is empty".into()));
        }
        if self.presence.stale_after_ms == 0 {
            return Err(ConfigError::Invalid("presence.stale_after_ms must be > 0".into()));
        }
        if self.presence.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "presence.sweep_interval_ms must be > 0".into(),
            ));
        }
        if self.outbound.policy == PolicyKind::Queue && self.outbound.capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbound.capacity must be > 0 for the queue policy".into(),
            ));
        }
        Ok(())
    }

    /// The document this session edits.
    pub fn document_key(&self) -> DocumentKey {
        DocumentKey::new(&self.document.collection, &self.document.name)
    }

    /// Interval between stale cursor sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.presence.sweep_interval_ms)
    }

    /// Settings for the core session.
    pub fn session_settings(&self) -> SessionSettings {
        let outbound = match self.outbound.policy {
            PolicyKind::Queue => OutboundPolicy::Queue {
                capacity: self.outbound.capacity,
            },
            PolicyKind::Drop => OutboundPolicy::Drop,
        };
        SessionSettings {
            stale_after: Duration::from_millis(self.presence.stale_after_ms),
            outbound,
            presence: LocalPresence {
                enabled: self.presence.enabled,
                name: self.presence.name.clone(),
                colour: self.presence.colour,
            },
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Parsed, but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.document.collection, "docs");
        assert_eq!(config.document.name, "hello2");
        assert_eq!(config.document.doc_type, "rich-text");
        assert_eq!(config.presence.stale_after_ms, 10_000);
        assert_eq!(config.presence.colour, Rgb::new(255, 0, 255));
    }

    #[test]
    fn empty_file_equals_default() {
        let config = SessionConfig::from_toml_str("").unwrap();
        let default = SessionConfig::default();
        assert_eq!(config.document_key(), default.document_key());
        assert_eq!(config.session_settings(), default.session_settings());
        assert_eq!(config.sweep_interval(), default.sweep_interval());
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r##"
[document]
collection = "notes"
name = "monday"

[presence]
name = "Ann"
colour = "#00ff80"
stale_after_ms = 5000

[outbound]
policy = "drop"
"##;

        let config = SessionConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.document_key().to_string(), "notes/monday");
        assert_eq!(config.presence.colour, Rgb::new(0, 255, 128));

        let settings = config.session_settings();
        assert_eq!(settings.stale_after, Duration::from_secs(5));
        assert_eq!(settings.outbound, OutboundPolicy::Drop);
        assert_eq!(settings.presence.name, "Ann");
    }

    #[test]
    fn css_colour_accepted() {
        let config = SessionConfig::from_toml_str(
            r#"
[presence]
colour = "rgb(10, 20, 30)"
"#,
        )
        .unwrap();
        assert_eq!(config.presence.colour, Rgb::new(10, 20, 30));
    }

    #[test]
    fn queue_capacity_flows_into_settings() {
        let config = SessionConfig::from_toml_str(
            r#"
[outbound]
policy = "queue"
capacity = 4
"#,
        )
        .unwrap();
        assert_eq!(
            config.session_settings().outbound,
            OutboundPolicy::Queue { capacity: 4 }
        );
    }

    #[test]
    fn zero_stale_after_rejected() {
        let result = SessionConfig::from_toml_str(
            r#"
[presence]
stale_after_ms = 0
"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let result = SessionConfig::from_toml_str(
            r#"
[outbound]
capacity = 0
"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_document_name_rejected() {
        let mut config = SessionConfig::default();
        config.document.name = " ".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_colour_is_parse_error() {
        let result = SessionConfig::from_toml_str(
            r#"
[presence]
colour = "mauve"
"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = SessionConfig::from_file(Path::new("/nonexistent/plume.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }
}
