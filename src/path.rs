//! Path normalization for archive entries and queries.
//!
//! Layer archives encode names in several ways (`etc/passwd`, `./etc/passwd`,
//! `/etc/passwd`, `etc/` for directories). Everything in this crate uses a
//! single convention: an absolute path with exactly one leading slash and no
//! trailing slash, except for the root itself which is `/`.
//!
//! This module also classifies overlay whiteout markers:
//! - `.wh.<name>` deletes the sibling `<name>` from lower layers
//! - `.wh..wh..opq` hides all lower-layer contents of its directory

/// Whiteout file prefix used by overlay filesystems.
///
/// Files named `.wh.<name>` indicate that `<name>` should be removed from lower layers.
/// For example, `.wh.passwd` in `/etc` deletes `/etc/passwd`.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// Opaque whiteout marker filename.
///
/// A file named `.wh..wh..opq` in a directory indicates that all entries in that
/// directory from lower layers should be hidden. The directory itself is preserved.
pub const OPAQUE_WHITEOUT: &str = ".wh..wh..opq";

/// A deletion marker decoded from an entry name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Whiteout {
    /// Delete this path (and anything below it).
    Path(String),
    /// Hide lower-layer contents of this directory.
    Opaque(String),
}

/// Normalize a raw archive entry name into the canonical absolute form.
///
/// Strips a leading `./`, collapses repeated slashes and drops leading or
/// trailing ones, then prefixes exactly one slash. An empty name (or `.` /
/// `./`) is the root.
pub fn normalize_entry_name(raw: &str) -> String {
    let mut name = raw;
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    if name == "." {
        name = "";
    }
    absolute(name)
}

/// Normalize a user-supplied root or query path.
///
/// `etc`, `/etc`, `/etc/` and `etc/` all become `/etc`; the empty string becomes `/`.
pub fn normalize_query_path(path: &str) -> String {
    absolute(path)
}

fn absolute(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    for segment in name.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Returns true if `path` contains `.` or `..` components.
///
/// Such names could alias another path after canonicalization and are never
/// produced by well-formed layer archives.
pub fn has_relative_components(path: &str) -> bool {
    path.split('/').any(|c| c == "." || c == "..")
}

/// Returns the final path segment (`/` for the root).
pub fn base_name(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some((_, "")) | None => path,
        Some((_, name)) => name,
    }
}

/// Returns the parent directory of a normalized path (`/` for top-level entries and the root).
pub fn parent(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// Returns true if `path` lies strictly below `dir`.
pub fn is_descendant(path: &str, dir: &str) -> bool {
    if dir == "/" {
        return path.len() > 1 && path.starts_with('/');
    }
    path.len() > dir.len() && path.starts_with(dir) && path.as_bytes()[dir.len()] == b'/'
}

/// Returns true if `path` is `root` itself or lies below it.
pub fn is_within(path: &str, root: &str) -> bool {
    path == root || is_descendant(path, root)
}

/// Number of path segments from `root` down to `path` (a direct child has depth 1).
pub fn depth_below(path: &str, root: &str) -> usize {
    let rel = if root == "/" {
        &path[1..]
    } else {
        path.strip_prefix(root).unwrap_or(path)
    };
    rel.split('/').filter(|s| !s.is_empty()).count()
}

/// Classify a normalized path as a whiteout marker.
///
/// For `/foo/bar/.wh.baz` returns `Whiteout::Path("/foo/bar/baz")`; for
/// `/foo/.wh..wh..opq` returns `Whiteout::Opaque("/foo")`.
pub fn classify_whiteout(path: &str) -> Option<Whiteout> {
    let name = base_name(path);
    let dir = parent(path);

    if name == OPAQUE_WHITEOUT {
        return Some(Whiteout::Opaque(dir.to_string()));
    }

    let target = name.strip_prefix(WHITEOUT_PREFIX)?;
    if target.is_empty() {
        return None;
    }
    Some(Whiteout::Path(join(dir, target)))
}

/// Join a directory and a single segment.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", dir, name)
    }
}
