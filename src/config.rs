// Configuration file support
// Optional TOML settings; command-line flags override them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "coursedb.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Seed script the store is provisioned from
    #[serde(default)]
    pub store: Option<PathBuf>,

    /// Export format used when a command names none
    #[serde(default = "default_format")]
    pub format: String,

    /// Pretty-print exported documents
    #[serde(default)]
    pub pretty: bool,

    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_format() -> String {
    "json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: None,
            format: default_format(),
            pretty: false,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Load an explicit config file, or `coursedb.toml` if one exists,
    /// or the defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.format, "json");
        assert_eq!(config.log_level, "info");
        assert!(!config.pretty);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "store = \"data/school.sql\"\nformat = \"xml\"\npretty = true\nlog_level = \"debug\""
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.store, Some(PathBuf::from("data/school.sql")));
        assert_eq!(config.format, "xml");
        assert!(config.pretty);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<Config>("shards = 4").is_err());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::from_file(&dir.path().join("absent.toml")).is_err());
    }
}
