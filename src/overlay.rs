//! Overlay resolution: folding layers into a merged filesystem snapshot.
//!
//! Layers are applied bottom-to-top. For every path the snapshot keeps the
//! entry from the highest layer that mentioned it, unless that mention was a
//! deletion. Deletions follow union-filesystem rules:
//!
//! - `.wh.<name>` removes `<name>` and everything below it
//! - `.wh..wh..opq` removes everything below its directory that came from a
//!   lower layer; the directory itself and same-layer entries stay visible
//!
//! Exactly one layer stream is open at any time, and a failure in any layer
//! aborts the whole fold.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use crate::error::Result;
use crate::image::Layer;
use crate::path;
use crate::scan::{self, ArchiveEntry, EntryKind};

/// An entry in a snapshot together with the layer that supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    /// The winning archive entry.
    pub entry: ArchiveEntry,
    /// Zero-based index of the layer the entry came from.
    pub layer: usize,
}

/// Resolved path-to-entry mapping after folding some layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<String, ResolvedEntry>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one entry from the layer at `layer`.
    ///
    /// Entries must be applied in layer order.
    pub fn apply(&mut self, entry: ArchiveEntry, layer: usize) {
        match &entry.kind {
            EntryKind::Whiteout { target } => {
                self.entries.remove(target);
                self.remove_descendants(target, |_| true);
            }
            EntryKind::OpaqueWhiteout { dir } => {
                self.remove_descendants(dir, |resolved| resolved.layer < layer);
            }
            _ => {
                self.entries
                    .insert(entry.path.clone(), ResolvedEntry { entry, layer });
            }
        }
    }

    fn remove_descendants(&mut self, dir: &str, pred: impl Fn(&ResolvedEntry) -> bool) {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        let doomed: Vec<String> = self
            .entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, v)| path::is_descendant(k.as_str(), dir) && pred(*v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in doomed {
            self.entries.remove(&key);
        }
    }

    /// Look up the resolved entry for a normalized path.
    pub fn get(&self, path: &str) -> Option<&ResolvedEntry> {
        self.entries.get(path)
    }

    /// Returns true if the path is present.
    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of visible paths.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate visible entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.values().map(|r| &r.entry)
    }

    /// Paths of all visible non-directory entries, in path order.
    pub fn file_paths(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, r)| !r.entry.is_dir())
            .map(|(k, _)| k.as_str())
    }

    /// Consume the snapshot, returning entries in path order.
    pub fn into_entries(self) -> Vec<ArchiveEntry> {
        self.entries.into_values().map(|r| r.entry).collect()
    }
}

/// Fold all layers of an image, bottom to top.
pub fn fold_layers<L: Layer>(layers: &[L]) -> Result<Snapshot> {
    fold_selected(layers, |_, _| true)
}

/// Fold only the layers for which `select(index, layer)` returns true.
///
/// Layer order is preserved and whiteouts only act on entries from the
/// selected layers.
pub fn fold_selected<L, F>(layers: &[L], mut select: F) -> Result<Snapshot>
where
    L: Layer,
    F: FnMut(usize, &L) -> bool,
{
    let mut snapshot = Snapshot::new();
    for (index, layer) in layers.iter().enumerate() {
        if !select(index, layer) {
            tracing::debug!("skipping layer {} ({})", index + 1, layer.digest());
            continue;
        }
        scan::scan_layer(layer, index, |entry, _| {
            snapshot.apply(entry, index);
            Ok(ControlFlow::Continue(()))
        })?;
    }
    tracing::debug!("folded {} layers into {} entries", layers.len(), snapshot.len());
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, kind: EntryKind) -> ArchiveEntry {
        ArchiveEntry {
            path: path.to_string(),
            kind,
            mode: 0o644,
            size: 0,
            link_name: None,
        }
    }

    fn file(path: &str) -> ArchiveEntry {
        entry(path, EntryKind::Regular)
    }

    fn dir(path: &str) -> ArchiveEntry {
        entry(path, EntryKind::Directory)
    }

    fn whiteout(path: &str) -> ArchiveEntry {
        let target = match path::classify_whiteout(path) {
            Some(path::Whiteout::Path(t)) => t,
            other => panic!("not a whiteout: {other:?}"),
        };
        entry(path, EntryKind::Whiteout { target })
    }

    fn opaque(dir_path: &str) -> ArchiveEntry {
        entry(
            &path::join(dir_path, path::OPAQUE_WHITEOUT),
            EntryKind::OpaqueWhiteout {
                dir: dir_path.to_string(),
            },
        )
    }

    #[test]
    fn test_later_layer_wins() {
        let mut snap = Snapshot::new();
        let mut lower = file("/etc/hosts");
        lower.size = 10;
        let mut upper = file("/etc/hosts");
        upper.size = 20;
        snap.apply(lower, 0);
        snap.apply(upper, 1);

        let resolved = snap.get("/etc/hosts").unwrap();
        assert_eq!(resolved.entry.size, 20);
        assert_eq!(resolved.layer, 1);
    }

    #[test]
    fn test_whiteout_removes_and_later_restores() {
        let mut snap = Snapshot::new();
        snap.apply(file("/etc/passwd"), 0);
        snap.apply(whiteout("/etc/.wh.passwd"), 1);
        assert!(!snap.contains("/etc/passwd"));
        // The marker itself is never visible
        assert!(!snap.contains("/etc/.wh.passwd"));

        snap.apply(file("/etc/passwd"), 2);
        assert_eq!(snap.get("/etc/passwd").unwrap().layer, 2);
    }

    #[test]
    fn test_whiteout_removes_subtree() {
        let mut snap = Snapshot::new();
        snap.apply(dir("/opt"), 0);
        snap.apply(dir("/opt/app"), 0);
        snap.apply(file("/opt/app/bin"), 0);
        snap.apply(file("/opt/app2"), 0);
        snap.apply(whiteout("/opt/.wh.app"), 1);

        let paths: Vec<_> = snap.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["/opt", "/opt/app2"]);
    }

    #[test]
    fn test_opaque_hides_lower_layers_only() {
        let mut snap = Snapshot::new();
        snap.apply(dir("/data"), 0);
        snap.apply(file("/data/old"), 0);
        snap.apply(file("/data-sibling"), 0);
        snap.apply(dir("/data"), 1);
        snap.apply(file("/data/new"), 1);
        snap.apply(opaque("/data"), 1);

        let paths: Vec<_> = snap.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["/data", "/data-sibling", "/data/new"]);
    }

    #[test]
    fn test_opaque_at_root() {
        let mut snap = Snapshot::new();
        snap.apply(dir("/"), 0);
        snap.apply(file("/a"), 0);
        snap.apply(opaque("/"), 1);
        snap.apply(file("/b"), 1);

        let paths: Vec<_> = snap.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["/", "/b"]);
    }

    #[test]
    fn test_type_conflict_overwrites() {
        let mut snap = Snapshot::new();
        snap.apply(dir("/x"), 0);
        snap.apply(file("/x"), 1);
        assert!(snap.get("/x").unwrap().entry.is_regular());
        assert_eq!(snap.file_paths().collect::<Vec<_>>(), ["/x"]);
    }
}
