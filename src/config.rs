//! User configuration for the `cek` command.
//!
//! Configuration is optional. When present it supplies defaults that command
//! line flags override.
//!
//! # Locations
//!
//! The first existing file wins:
//! 1. an explicit path (`--config`)
//! 2. `$CEK_CONFIG`
//! 3. `$XDG_CONFIG_HOME/cek/config.toml`
//! 4. `$HOME/.config/cek/config.toml`
//!
//! # Format
//!
//! ```toml
//! [output]
//! format = "json"        # or "table"
//!
//! [tree]
//! dirs_first = true
//! show_hidden = false
//! max_depth = 3
//!
//! [log]
//! filter = "cek_rs=debug"
//! ```
//!
//! # Usage Example
//!
//! ```
//! use cek_rs::Config;
//!
//! let config = Config::from_toml("[tree]\ndirs_first = true\n")?;
//! assert!(config.tree.dirs_first);
//! assert!(!config.tree.show_hidden);
//! # Ok::<(), cek_rs::InspectError>(())
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::tree::TreeOptions;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "CEK_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Output defaults.
    pub output: OutputConfig,
    /// Tree rendering defaults.
    pub tree: TreeConfig,
    /// Logging defaults.
    pub log: LogConfig,
}

/// Output style for listings and comparisons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    #[default]
    Table,
    Json,
}

/// `[output]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputStyle,
}

/// `[tree]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// List directories before files.
    pub dirs_first: bool,
    /// Show dot-files.
    pub show_hidden: bool,
    /// Default depth limit; unlimited when unset.
    pub max_depth: Option<usize>,
}

impl TreeConfig {
    /// Tree options seeded from this section.
    pub fn options(&self) -> TreeOptions {
        TreeOptions {
            max_depth: self.max_depth,
            show_hidden: self.show_hidden,
            dirs_first: self.dirs_first,
            ..Default::default()
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` filter directive, e.g. `cek_rs=debug`.
    pub filter: Option<String>,
}

impl Config {
    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Load configuration from the first existing standard location.
    ///
    /// An explicit path must exist; the other locations are optional and a
    /// missing file yields the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        for candidate in search_paths(|k| std::env::var_os(k)) {
            if candidate.is_file() {
                tracing::debug!("loading config from {}", candidate.display());
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }
}

/// Candidate configuration files in priority order.
fn search_paths(env: impl Fn(&str) -> Option<std::ffi::OsString>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = env(CONFIG_ENV).filter(|p| !p.is_empty()) {
        paths.push(PathBuf::from(p));
    }
    if let Some(xdg) = env("XDG_CONFIG_HOME").filter(|p| !p.is_empty()) {
        paths.push(PathBuf::from(xdg).join("cek/config.toml"));
    }
    if let Some(home) = env("HOME").filter(|p| !p.is_empty()) {
        paths.push(PathBuf::from(home).join(".config/cek/config.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.output.format, OutputStyle::Table);
        assert_eq!(config.tree.max_depth, None);
        assert_eq!(config.log.filter, None);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml(
            r#"
            [output]
            format = "json"

            [tree]
            dirs_first = true
            max_depth = 2

            [log]
            filter = "cek_rs=trace"
            "#,
        )
        .unwrap();
        assert_eq!(config.output.format, OutputStyle::Json);
        assert!(config.tree.dirs_first);
        assert!(!config.tree.show_hidden);
        assert_eq!(config.tree.options().max_depth, Some(2));
        assert_eq!(config.log.filter.as_deref(), Some("cek_rs=trace"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_toml("[output]\nformat = \"yaml\"\n").is_err());
        assert!(Config::from_toml("[unknown]\n").is_err());
    }

    #[test]
    fn test_search_paths_order() {
        let env = |k: &str| -> Option<OsString> {
            match k {
                "CEK_CONFIG" => Some("/tmp/explicit.toml".into()),
                "XDG_CONFIG_HOME" => Some("/xdg".into()),
                "HOME" => Some("/home/u".into()),
                _ => None,
            }
        };
        assert_eq!(
            search_paths(env),
            [
                PathBuf::from("/tmp/explicit.toml"),
                PathBuf::from("/xdg/cek/config.toml"),
                PathBuf::from("/home/u/.config/cek/config.toml"),
            ]
        );

        assert_eq!(
            search_paths(|k| (k == "HOME").then(|| OsString::from("/root"))),
            [PathBuf::from("/root/.config/cek/config.toml")]
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tree]\nshow_hidden = true\n").unwrap();
        let config = Config::discover(Some(&path)).unwrap();
        assert!(config.tree.show_hidden);

        assert!(Config::discover(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
