//! Narrowing entry collections by path and pattern.
//!
//! Pattern syntax follows what users expect from a shell:
//!
//! | Pattern              | Meaning                                     |
//! |----------------------|---------------------------------------------|
//! | `fontconfig`         | substring anywhere in the path              |
//! | `*.conf`             | basename match at any depth                 |
//! | `**/nginx/*.conf`    | `.conf` files in any `nginx` directory      |
//! | `/etc/**/*.conf`     | `.conf` files anywhere under `/etc`         |
//!
//! `*` never crosses a `/`; `**` spans directories.

use glob::{MatchOptions, Pattern};
use serde::Serialize;

use crate::error::{InspectError, Result};
use crate::path;
use crate::scan::ArchiveEntry;

const GLOB_META: &[char] = &['*', '?', '['];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A listing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    /// `ls -l` style mode string, e.g. `-rw-r--r--`.
    pub mode: String,
    /// Size in bytes.
    pub size: u64,
    /// Normalized absolute path.
    pub path: String,
}

impl From<&ArchiveEntry> for FileInfo {
    fn from(entry: &ArchiveEntry) -> Self {
        Self {
            mode: entry.mode_string(),
            size: entry.size,
            path: entry.path.clone(),
        }
    }
}

/// Keep entries equal to `root` or below it.
///
/// `root` is normalized first, so `etc`, `/etc` and `/etc/` are equivalent.
/// An empty root or `/` keeps everything.
pub fn filter_by_path(entries: Vec<ArchiveEntry>, root: &str) -> Vec<ArchiveEntry> {
    let root = path::normalize_query_path(root);
    if root == "/" {
        return entries;
    }
    entries
        .into_iter()
        .filter(|e| path::is_within(&e.path, &root))
        .collect()
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub enum PathPattern {
    /// Plain text matched anywhere in the path.
    Substring(String),
    /// A basename glob, compiled as `**/<pattern>`.
    Basename(Pattern),
    /// A glob containing a `/`.
    Path(Pattern),
}

impl PathPattern {
    /// Compile a pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        if !pattern.contains(GLOB_META) {
            return Ok(PathPattern::Substring(pattern.to_string()));
        }
        let compile = |p: &str| {
            Pattern::new(p).map_err(|source| InspectError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        };
        if pattern.contains('/') {
            Ok(PathPattern::Path(compile(pattern)?))
        } else {
            Ok(PathPattern::Basename(compile(&format!("**/{}", pattern))?))
        }
    }

    /// Returns true if the normalized path matches.
    pub fn matches(&self, path: &str) -> bool {
        let unrooted = path.strip_prefix('/').unwrap_or(path);
        match self {
            PathPattern::Substring(s) => path.contains(s.as_str()),
            PathPattern::Basename(p) => p.matches_with(unrooted, MATCH_OPTIONS),
            PathPattern::Path(p) => {
                p.matches_with(unrooted, MATCH_OPTIONS) || p.matches_with(path, MATCH_OPTIONS)
            }
        }
    }
}

/// Keep entries whose path matches `pattern`. An empty pattern keeps everything.
pub fn filter_by_pattern(entries: Vec<ArchiveEntry>, pattern: &str) -> Result<Vec<ArchiveEntry>> {
    if pattern.is_empty() {
        return Ok(entries);
    }
    let pattern = PathPattern::new(pattern)?;
    Ok(entries
        .into_iter()
        .filter(|e| pattern.matches(&e.path))
        .collect())
}

/// Returns true if a glob matches either the basename or the full path.
///
/// Used for tree exclusion, where `*.log` and `/var/**/cache` should both work.
pub(crate) fn glob_matches_name_or_path(pattern: &Pattern, entry_path: &str) -> bool {
    pattern.matches_with(path::base_name(entry_path), MATCH_OPTIONS)
        || pattern.matches_with(entry_path, MATCH_OPTIONS)
}

pub(crate) fn compile_glob(pattern: &str) -> Result<Pattern> {
    Pattern::new(pattern).map_err(|source| InspectError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::EntryKind;

    fn entries(paths: &[&str]) -> Vec<ArchiveEntry> {
        paths
            .iter()
            .map(|p| ArchiveEntry {
                path: p.to_string(),
                kind: EntryKind::Regular,
                mode: 0o644,
                size: 1,
                link_name: None,
            })
            .collect()
    }

    fn paths(entries: &[ArchiveEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_filter_by_path() {
        let all = entries(&["/etc", "/etc/nginx.conf", "/etcx", "/etc2/foo", "/usr/bin"]);
        let kept = filter_by_path(all.clone(), "/etc");
        assert_eq!(paths(&kept), ["/etc", "/etc/nginx.conf"]);

        let kept = filter_by_path(all.clone(), "etc/");
        assert_eq!(paths(&kept), ["/etc", "/etc/nginx.conf"]);

        assert_eq!(filter_by_path(all.clone(), "").len(), 5);
        assert_eq!(filter_by_path(all, "/").len(), 5);
    }

    #[test]
    fn test_basename_glob() {
        let p = PathPattern::new("*.conf").unwrap();
        assert!(p.matches("/etc/nginx/nginx.conf"));
        assert!(p.matches("/top.conf"));
        assert!(!p.matches("/etc/nginx/mime.types"));
    }

    #[test]
    fn test_path_glob() {
        let p = PathPattern::new("etc/nginx/*.conf").unwrap();
        assert!(p.matches("/etc/nginx/nginx.conf"));
        assert!(!p.matches("/etc/other/nginx.conf"));
        assert!(!p.matches("/etc/nginx/conf.d/default.conf"));

        let p = PathPattern::new("/etc/**/*.conf").unwrap();
        assert!(p.matches("/etc/nginx/conf.d/default.conf"));
        assert!(!p.matches("/usr/etc/a.conf"));

        let p = PathPattern::new("**/fontconfig/*.conf").unwrap();
        assert!(p.matches("/usr/share/fontconfig/fonts.conf"));
    }

    #[test]
    fn test_substring() {
        let kept = filter_by_pattern(
            entries(&["/etc/fonts/fontconfig", "/usr/share/fontconfig/x", "/bin/sh"]),
            "fontconfig",
        )
        .unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathPattern::new("[abc").unwrap_err();
        assert!(matches!(err, InspectError::InvalidPattern { .. }));
        assert!(filter_by_pattern(entries(&["/a"]), "a[").is_err());
    }

    #[test]
    fn test_file_info_from_entry() {
        let entry = &entries(&["/etc/hosts"])[0];
        let info = FileInfo::from(entry);
        assert_eq!(info.mode, "-rw-r--r--");
        assert_eq!(info.size, 1);
        assert_eq!(info.path, "/etc/hosts");
    }
}
