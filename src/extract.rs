//! Single-layer extraction and file reads.
//!
//! This module answers two kinds of questions:
//!
//! - what does one layer contain on its own ([`extract_layer`]), with whiteout
//!   markers elided rather than applied
//! - what are the bytes of one file, either in the merged view or in a single
//!   layer ([`read_file`], [`copy_file`] and their `_in_layer` variants)
//!
//! Merged reads search layers from the top down and stop at the first layer
//! that decides the outcome, so a file in the topmost layer never touches the
//! lower ones. Within a layer the last record for a path wins, the same rule
//! the listing and the overlay fold use. Only the winning record's content is
//! read.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::ops::ControlFlow;

use crate::error::{InspectError, Result};
use crate::image::Layer;
use crate::overlay;
use crate::path;
use crate::scan::{self, ArchiveEntry, EntryKind};

/// Which filesystem view to operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    /// All layers folded together.
    #[default]
    Merged,
    /// Exactly one layer (zero-based), whiteouts elided.
    Layer(usize),
}

impl View {
    /// Build a view from a 1-based layer number as accepted on the command line.
    ///
    /// `None` and `Some(0)` select the merged view.
    pub fn from_layer_number(layer: Option<usize>) -> Self {
        match layer {
            Some(n) if n > 0 => View::Layer(n - 1),
            _ => View::Merged,
        }
    }
}

/// Return the entries of a single layer in path order, whiteout markers removed.
///
/// If a layer mentions the same path twice, the later record wins.
pub fn extract_layer<L: Layer>(layers: &[L], index: usize) -> Result<Vec<ArchiveEntry>> {
    let layer = layer_at(layers, index)?;
    let mut entries = BTreeMap::new();
    scan::scan_layer(layer, index, |entry, _| {
        if !entry.is_whiteout() {
            entries.insert(entry.path.clone(), entry);
        }
        Ok(ControlFlow::Continue(()))
    })?;
    Ok(entries.into_values().collect())
}

/// Return the entries visible in `view`, in path order.
pub fn entries_for_view<L: Layer>(layers: &[L], view: View) -> Result<Vec<ArchiveEntry>> {
    match view {
        View::Merged => Ok(overlay::fold_layers(layers)?.into_entries()),
        View::Layer(index) => extract_layer(layers, index),
    }
}

/// Read a regular file from the merged view.
pub fn read_file<L: Layer>(layers: &[L], path: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    copy_file(layers, path, &mut buf)?;
    Ok(buf)
}

/// Read a regular file from a single layer.
pub fn read_file_in_layer<L: Layer>(layers: &[L], index: usize, path: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    copy_file_in_layer(layers, index, path, &mut buf)?;
    Ok(buf)
}

/// Stream a regular file from `view` into `out`, returning the bytes written.
pub fn copy_view_file<L: Layer, W: Write + ?Sized>(
    layers: &[L],
    view: View,
    path: &str,
    out: &mut W,
) -> Result<u64> {
    match view {
        View::Merged => copy_file(layers, path, out),
        View::Layer(index) => copy_file_in_layer(layers, index, path, out),
    }
}

/// Outcome of looking for a path in one layer.
enum Lookup {
    /// The layer says nothing about the path.
    Absent,
    /// The path or one of its ancestors is deleted in this layer.
    Deleted,
    /// The path exists; content was copied if it is a regular file.
    Found(std::result::Result<u64, &'static str>),
}

/// Stream a regular file from the merged view into `out`.
///
/// Layers are searched top-down. A whiteout of the path or an ancestor, or an
/// opaque marker on an ancestor, in a layer above the first one holding the
/// file means the file is deleted.
pub fn copy_file<L: Layer, W: Write + ?Sized>(layers: &[L], path: &str, out: &mut W) -> Result<u64> {
    let target = path::normalize_query_path(path);
    for (index, layer) in layers.iter().enumerate().rev() {
        match lookup(layer, index, &target, true, &mut *out)? {
            Lookup::Absent => continue,
            Lookup::Deleted => {
                tracing::debug!("{} deleted in layer {}", target, index + 1);
                break;
            }
            Lookup::Found(found) => return finish(target, found),
        }
    }
    Err(InspectError::FileNotFound(target))
}

/// Stream a regular file from a single layer into `out`.
pub fn copy_file_in_layer<L: Layer, W: Write + ?Sized>(
    layers: &[L],
    index: usize,
    path: &str,
    out: &mut W,
) -> Result<u64> {
    let layer = layer_at(layers, index)?;
    let target = path::normalize_query_path(path);
    match lookup(layer, index, &target, false, &mut *out)? {
        Lookup::Found(found) => finish(target, found),
        Lookup::Absent | Lookup::Deleted => Err(InspectError::FileNotFound(target)),
    }
}

fn finish(target: String, found: std::result::Result<u64, &'static str>) -> Result<u64> {
    found.map_err(|kind| InspectError::NotRegularFile { path: target, kind })
}

fn layer_at<L: Layer>(layers: &[L], index: usize) -> Result<&L> {
    layers.get(index).ok_or(InspectError::LayerOutOfRange {
        index,
        count: layers.len(),
    })
}

/// What one layer's records leave behind for a single path.
#[derive(Debug, Default)]
struct PathState {
    /// Position and kind of the surviving record for the path.
    winner: Option<(usize, EntryKind)>,
    /// A marker in this layer hides the path in lower layers.
    deleted: bool,
}

/// Replay one layer's records for `target` in archive order.
///
/// Later records replace earlier ones. With `honor_deletions`, a whiteout of
/// the path or an ancestor drops any earlier record and marks the path
/// deleted; an opaque marker on an ancestor only affects lower layers.
fn resolve_path<L: Layer>(
    layer: &L,
    index: usize,
    target: &str,
    honor_deletions: bool,
) -> Result<PathState> {
    let mut state = PathState::default();
    let mut ordinal = 0;
    scan::scan_layer(layer, index, |entry, _| {
        if entry.path == target && !entry.is_whiteout() {
            state.winner = Some((ordinal, entry.kind));
        } else if honor_deletions && deletes(&entry.kind, target) {
            if matches!(entry.kind, EntryKind::Whiteout { .. }) {
                state.winner = None;
            }
            state.deleted = true;
        }
        ordinal += 1;
        Ok(ControlFlow::Continue(()))
    })?;
    Ok(state)
}

/// Resolve `target` in one layer, copying its content into `out` if it is a regular file.
///
/// Metadata is resolved over the whole layer first; the layer is then reopened
/// and only the surviving record's content is read.
fn lookup<L: Layer, W: Write + ?Sized>(
    layer: &L,
    index: usize,
    target: &str,
    honor_deletions: bool,
    out: &mut W,
) -> Result<Lookup> {
    let state = resolve_path(layer, index, target, honor_deletions)?;
    let Some((winner, kind)) = state.winner else {
        return Ok(if state.deleted {
            Lookup::Deleted
        } else {
            Lookup::Absent
        });
    };
    if kind != EntryKind::Regular {
        return Ok(Lookup::Found(Err(kind.as_str())));
    }

    let mut copied = None;
    let mut ordinal = 0;
    scan::scan_layer(layer, index, |_, reader| {
        if ordinal == winner {
            copied = Some(copy_content(reader, &mut *out, index, layer.digest())?);
            return Ok(ControlFlow::Break(()));
        }
        ordinal += 1;
        Ok(ControlFlow::Continue(()))
    })?;
    match copied {
        Some(n) => Ok(Lookup::Found(Ok(n))),
        None => Err(InspectError::LayerAccess {
            index,
            digest: layer.digest().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("layer changed while reading {}", target),
            ),
        }),
    }
}

/// Returns true if a marker of this kind hides `target` in lower layers.
fn deletes(kind: &EntryKind, target: &str) -> bool {
    match kind {
        EntryKind::Whiteout { target: removed } => path::is_within(target, removed),
        EntryKind::OpaqueWhiteout { dir } => path::is_descendant(target, dir),
        _ => false,
    }
}

fn copy_content<W: Write + ?Sized>(
    reader: &mut dyn Read,
    out: &mut W,
    index: usize,
    digest: &str,
) -> Result<u64> {
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|source| scan::read_error(index, digest, source))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok(total)
}
