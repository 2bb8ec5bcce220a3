//! Configuration file parser for the timeline store (`feedline.toml`).
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::storage::TimelineKind;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {size} bytes (max {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level store configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file, or `:memory:`.
    pub database_path: String,

    /// Upper bound on pooled connections.
    pub max_connections: u32,

    /// How long a connection waits on a competing writer, in milliseconds.
    pub busy_timeout_ms: u64,

    /// How long an operation waits for a free pooled connection, in seconds.
    pub acquire_timeout_secs: u64,

    /// Backend used for channels without a committed or configured kind.
    pub default_timeline: TimelineKind,

    /// Per-channel backend overrides. A kind committed in the database takes
    /// precedence over these.
    pub channels: HashMap<String, TimelineKind>,

    /// Report every listed item as unread, whatever its stored read flag.
    pub force_unread_listing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedline.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5000,
            acquire_timeout_secs: 10,
            default_timeline: TimelineKind::SortedSet,
            channels: HashMap::new(),
            force_unread_listing: true,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 7] = [
        "database_path",
        "max_connections",
        "busy_timeout_ms",
        "acquire_timeout_secs",
        "default_timeline",
        "channels",
        "force_unread_listing",
    ];

    /// Load configuration from a TOML file.
    ///
    /// A missing or empty file yields the defaults. Invalid TOML and unknown
    /// timeline kinds are `ConfigError::Parse`. Unknown keys only warn.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match Self::read_bounded(path)? {
            Some(content) => Self::parse(&content),
            None => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Contents of `path`, or `None` if nothing is there.
    fn read_bounded(path: &Path) -> Result<Option<String>, ConfigError> {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if size > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                size,
                limit: Self::MAX_FILE_SIZE,
            });
        }

        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            // Removed between the size check and the read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config is empty, using defaults");
            return Ok(Self::default());
        }

        // Typos would otherwise silently fall back to defaults
        if let Ok(raw) = content.parse::<toml::Table>() {
            raw.keys()
                .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
                .for_each(|key| tracing::warn!(key = %key, "Ignoring unknown config key"));
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            database = %config.database_path,
            default_timeline = %config.default_timeline,
            channel_overrides = config.channels.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Write `content` to a fresh file under a per-test temp directory.
    fn temp_config(test: &str, content: &str) -> PathBuf {
        let dir =
            std::env::temp_dir().join(format!("feedline_config_{test}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feedline.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database_path, "feedline.db");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.acquire_timeout_secs, 10);
        assert_eq!(config.default_timeline, TimelineKind::SortedSet);
        assert!(config.channels.is_empty());
        assert!(config.force_unread_listing);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir()
            .join(format!("feedline_config_absent_{}", std::process::id()))
            .join("feedline.toml");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_load_blank_file() {
        let path = temp_config("blank", "  \n\n ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        cleanup(&path);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = Config::parse("database_path = \"/var/lib/feedline/timeline.db\"\n").unwrap();
        assert_eq!(config.database_path, "/var/lib/feedline/timeline.db");
        assert_eq!(config.max_connections, 5);
        assert!(config.force_unread_listing);
    }

    #[test]
    fn test_load_every_key() {
        let path = temp_config(
            "every_key",
            r#"
database_path = "timeline.db"
max_connections = 2
busy_timeout_ms = 250
acquire_timeout_secs = 3
default_timeline = "stream"
force_unread_listing = false

[channels]
home = "sorted-set"
firehose = "stream"
"#,
        );

        let config = Config::load(&path).unwrap();
        cleanup(&path);

        assert_eq!(config.database_path, "timeline.db");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.acquire_timeout_secs, 3);
        assert_eq!(config.default_timeline, TimelineKind::Stream);
        assert!(!config.force_unread_listing);
        assert_eq!(config.channels.get("home"), Some(&TimelineKind::SortedSet));
        assert_eq!(config.channels.get("firehose"), Some(&TimelineKind::Stream));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::parse("default_timeline = [stream").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("Invalid TOML"));
    }

    #[test]
    fn test_unknown_timeline_kind_rejected() {
        for content in ["default_timeline = \"zset\"\n", "[channels]\nhome = \"log\"\n"] {
            let err = Config::parse(content).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "{content}");
        }
    }

    #[test]
    fn test_unknown_key_only_warns() {
        let config = Config::parse("database_path = \"x.db\"\ndatabse_path = \"typo.db\"\n").unwrap();
        assert_eq!(config.database_path, "x.db");
    }

    #[test]
    fn test_mistyped_value_rejected() {
        assert!(matches!(
            Config::parse("max_connections = \"many\"\n").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let path = temp_config("oversized", &"#".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        cleanup(&path);

        assert!(matches!(
            err,
            ConfigError::TooLarge { size: 1_048_577, limit: 1_048_576 }
        ));
        assert!(err.to_string().contains("too large"));
    }
}
