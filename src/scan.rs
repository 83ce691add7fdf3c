//! Archive entry scanning for layer tar streams.
//!
//! A [`LayerScanner`] walks one layer's uncompressed tar stream and yields
//! [`ArchiveEntry`] records with normalized paths and explicit entry kinds.
//! Whiteout markers are classified here once, so later stages never look at
//! file names to decide whether an entry deletes something.
//!
//! Entry content is exposed to the visitor as a reader positioned at the
//! entry's data. Content that the visitor does not read is skipped by the
//! underlying [`tar::Archive`]; nothing is buffered.

use std::io::{self, Read};
use std::ops::ControlFlow;

use serde::Serialize;
use tar::EntryType;
use thiserror::Error;

use crate::error::{InspectError, Result};
use crate::image::Layer;
use crate::path::{self, Whiteout};

/// Kind of an archive entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum EntryKind {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Hard link
    Hardlink,
    /// Character device
    CharDevice,
    /// Block device
    BlockDevice,
    /// FIFO (named pipe)
    Fifo,
    /// Any other tar entry type
    Other,
    /// `.wh.<name>` marker deleting `target` from lower layers.
    Whiteout {
        /// Normalized path that is deleted.
        target: String,
    },
    /// `.wh..wh..opq` marker hiding lower-layer contents of `dir`.
    OpaqueWhiteout {
        /// Normalized path of the opaque directory.
        dir: String,
    },
}

impl EntryKind {
    fn from_entry_type(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => EntryKind::Regular,
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink => EntryKind::Symlink,
            EntryType::Link => EntryKind::Hardlink,
            EntryType::Char => EntryKind::CharDevice,
            EntryType::Block => EntryKind::BlockDevice,
            EntryType::Fifo => EntryKind::Fifo,
            _ => EntryKind::Other,
        }
    }

    /// Short human-readable name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Regular => "file",
            EntryKind::Directory => "directory",
            EntryKind::Symlink => "symlink",
            EntryKind::Hardlink => "hardlink",
            EntryKind::CharDevice => "char device",
            EntryKind::BlockDevice => "block device",
            EntryKind::Fifo => "fifo",
            EntryKind::Other => "other",
            EntryKind::Whiteout { .. } => "whiteout",
            EntryKind::OpaqueWhiteout { .. } => "opaque whiteout",
        }
    }

    fn type_char(&self) -> char {
        match self {
            EntryKind::Directory => 'd',
            EntryKind::Symlink => 'l',
            EntryKind::BlockDevice => 'b',
            EntryKind::CharDevice => 'c',
            EntryKind::Fifo => 'p',
            _ => '-',
        }
    }
}

/// One record read from a layer's archive stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Normalized absolute path (`/` for the root).
    pub path: String,
    /// Entry kind, including whiteout classification.
    pub kind: EntryKind,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    /// Content size in bytes; 0 for anything but regular files.
    pub size: u64,
    /// Target of a symlink or hardlink.
    pub link_name: Option<String>,
}

impl ArchiveEntry {
    /// Returns true for both plain and opaque whiteout markers.
    pub fn is_whiteout(&self) -> bool {
        matches!(
            self.kind,
            EntryKind::Whiteout { .. } | EntryKind::OpaqueWhiteout { .. }
        )
    }

    /// Returns true if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns true if this entry is a regular file.
    pub fn is_regular(&self) -> bool {
        self.kind == EntryKind::Regular
    }

    /// Render the mode the way `ls -l` does, e.g. `drwxr-xr-x`.
    pub fn mode_string(&self) -> String {
        let mut out = String::with_capacity(10);
        out.push(self.kind.type_char());
        for shift in [6, 3, 0] {
            let bits = (self.mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

/// Marks an error raised by the layer stream itself rather than by the tar parser.
#[derive(Debug, Error)]
#[error(transparent)]
struct StreamError(io::Error);

/// Layer stream wrapper that tags read failures with [`StreamError`].
struct StreamReader<R>(R);

impl<R: Read> Read for StreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0
            .read(buf)
            .map_err(|e| io::Error::new(e.kind(), StreamError(e)))
    }
}

fn from_stream(err: &io::Error) -> bool {
    let mut cur = err
        .get_ref()
        .map(|e| e as &(dyn std::error::Error + 'static));
    while let Some(e) = cur {
        if e.is::<StreamError>() {
            return true;
        }
        cur = e.source();
    }
    false
}

/// Label an I/O error seen while reading a layer's archive.
///
/// Failures of the underlying (possibly decompressing) stream are layer-access
/// errors; anything the tar parser rejects is a decode error.
pub(crate) fn read_error(index: usize, digest: &str, source: io::Error) -> InspectError {
    let digest = digest.to_string();
    if from_stream(&source) {
        InspectError::LayerAccess {
            index,
            digest,
            source,
        }
    } else {
        InspectError::Decode {
            index,
            digest,
            source,
        }
    }
}

/// Streaming scanner over one layer's tar archive.
///
/// The scanner is single-use: [`visit`](Self::visit) and
/// [`entries`](Self::entries) consume it.
pub struct LayerScanner<R: Read> {
    archive: tar::Archive<StreamReader<R>>,
    index: usize,
    digest: String,
}

impl<R: Read> LayerScanner<R> {
    /// Create a scanner for the layer at `index` with the given digest.
    ///
    /// The index and digest are only used to label errors.
    pub fn new(reader: R, index: usize, digest: impl Into<String>) -> Self {
        Self {
            archive: tar::Archive::new(StreamReader(reader)),
            index,
            digest: digest.into(),
        }
    }

    /// Visit every entry in archive order.
    ///
    /// The visitor receives the entry metadata and a reader over its content.
    /// Returning `ControlFlow::Break` stops the scan early.
    pub fn visit<F>(self, mut visitor: F) -> Result<()>
    where
        F: FnMut(ArchiveEntry, &mut dyn Read) -> Result<ControlFlow<()>>,
    {
        let Self {
            mut archive,
            index,
            digest,
        } = self;
        let decode = |source: io::Error| read_error(index, &digest, source);

        for entry in archive.entries().map_err(decode)? {
            let mut entry = entry.map_err(decode)?;
            let Some(record) = read_entry(&entry).map_err(decode)? else {
                continue;
            };
            tracing::trace!("layer {}: {} ({})", index, record.path, record.kind.as_str());
            if visitor(record, &mut entry)?.is_break() {
                break;
            }
        }

        Ok(())
    }

    /// Collect the metadata of every entry, skipping all content.
    pub fn entries(self) -> Result<Vec<ArchiveEntry>> {
        let mut out = Vec::new();
        self.visit(|entry, _| {
            out.push(entry);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(out)
    }
}

/// Open the layer at `index` and visit its entries.
///
/// Failure to open the stream is reported as a layer-access error. The stream
/// is dropped before this returns, on success and on error.
pub fn scan_layer<L, F>(layer: &L, index: usize, visitor: F) -> Result<()>
where
    L: Layer + ?Sized,
    F: FnMut(ArchiveEntry, &mut dyn Read) -> Result<ControlFlow<()>>,
{
    tracing::debug!("opening layer {} ({})", index + 1, layer.digest());
    let reader = layer.open().map_err(|source| InspectError::LayerAccess {
        index,
        digest: layer.digest().to_string(),
        source,
    })?;
    LayerScanner::new(reader, index, layer.digest()).visit(visitor)
}

/// Read the metadata of a tar entry, returning `None` for entries that are not surfaced.
fn read_entry<R: Read>(entry: &tar::Entry<'_, R>) -> std::io::Result<Option<ArchiveEntry>> {
    let header = entry.header();
    let entry_type = header.entry_type();
    if matches!(
        entry_type,
        EntryType::XGlobalHeader | EntryType::XHeader | EntryType::GNULongName | EntryType::GNULongLink
    ) {
        return Ok(None);
    }

    let raw = entry.path()?;
    let raw = raw.to_string_lossy();
    let path = path::normalize_entry_name(&raw);
    if path::has_relative_components(&path) {
        tracing::warn!("skipping entry with relative path components: {}", raw);
        return Ok(None);
    }

    let mut kind = EntryKind::from_entry_type(entry_type);
    if kind != EntryKind::Directory {
        match path::classify_whiteout(&path) {
            Some(Whiteout::Path(target)) => kind = EntryKind::Whiteout { target },
            Some(Whiteout::Opaque(dir)) => kind = EntryKind::OpaqueWhiteout { dir },
            None => {}
        }
    }

    let size = if kind == EntryKind::Regular {
        entry.size()
    } else {
        0
    };
    let link_name = entry
        .link_name()?
        .map(|p| p.to_string_lossy().into_owned());

    Ok(Some(ArchiveEntry {
        path,
        kind,
        mode: header.mode()? & 0o7777,
        size,
        link_name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn append(builder: &mut tar::Builder<Vec<u8>>, name: &str, entry_type: EntryType, data: &[u8]) {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(if entry_type == EntryType::Directory { 0o755 } else { 0o644 });
        header.set_size(data.len() as u64);
        // set_path would reject `..`, so write raw bytes into the name field.
        let bytes = name.as_bytes();
        header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
        header.set_cksum();
        builder.append(&header, data).unwrap();
    }

    fn build(entries: &[(&str, EntryType, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, ty, data) in entries {
            append(&mut builder, name, *ty, data);
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_scan_normalizes_and_classifies() {
        let tar = build(&[
            ("./", EntryType::Directory, b""),
            ("./etc/", EntryType::Directory, b""),
            ("./etc/passwd", EntryType::Regular, b"root:x:0:0"),
            ("etc/.wh.shadow", EntryType::Regular, b""),
            ("/usr/share/.wh..wh..opq", EntryType::Regular, b""),
            ("dev/null", EntryType::Char, b""),
        ]);

        let entries = LayerScanner::new(Cursor::new(tar), 0, "sha256:test")
            .entries()
            .unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            [
                "/",
                "/etc",
                "/etc/passwd",
                "/etc/.wh.shadow",
                "/usr/share/.wh..wh..opq",
                "/dev/null"
            ]
        );

        assert_eq!(entries[1].kind, EntryKind::Directory);
        assert_eq!(entries[2].kind, EntryKind::Regular);
        assert_eq!(entries[2].size, 10);
        assert_eq!(
            entries[3].kind,
            EntryKind::Whiteout {
                target: "/etc/shadow".to_string()
            }
        );
        assert!(entries[3].is_whiteout());
        assert_eq!(
            entries[4].kind,
            EntryKind::OpaqueWhiteout {
                dir: "/usr/share".to_string()
            }
        );
        assert_eq!(entries[5].kind, EntryKind::CharDevice);
    }

    #[test]
    fn test_scan_skips_relative_components() {
        let tar = build(&[
            ("etc/../etc/shadow", EntryType::Regular, b"x"),
            ("etc/hosts", EntryType::Regular, b"x"),
        ]);
        let entries = LayerScanner::new(Cursor::new(tar), 0, "sha256:test")
            .entries()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/etc/hosts");
    }

    #[test]
    fn test_visit_reads_content_on_demand() {
        let tar = build(&[
            ("a", EntryType::Regular, b"first"),
            ("b", EntryType::Regular, b"second"),
            ("c", EntryType::Regular, b"third"),
        ]);

        let mut seen = Vec::new();
        let mut content = String::new();
        LayerScanner::new(Cursor::new(tar), 0, "sha256:test")
            .visit(|entry, reader| {
                seen.push(entry.path.clone());
                if entry.path == "/b" {
                    reader.read_to_string(&mut content)?;
                    return Ok(ControlFlow::Break(()));
                }
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();

        assert_eq!(seen, ["/a", "/b"]);
        assert_eq!(content, "second");
    }

    #[test]
    fn test_malformed_header_is_decode_error() {
        let mut tar = build(&[("a", EntryType::Regular, b"data")]);
        // Corrupt the checksum field of the first header.
        tar[148..156].copy_from_slice(b"zzzzzzzz");

        let err = LayerScanner::new(Cursor::new(tar), 2, "sha256:bad")
            .entries()
            .unwrap_err();
        match err {
            InspectError::Decode { index, digest, .. } => {
                assert_eq!(index, 2);
                assert_eq!(digest, "sha256:bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Serves `data`, then fails the way a broken decompressor would.
    struct Truncated(Cursor<Vec<u8>>);

    impl Read for Truncated {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt deflate stream")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_stream_failure_is_layer_access_error() {
        let mut tar = build(&[
            ("a", EntryType::Regular, b"data"),
            ("b", EntryType::Regular, b"more"),
        ]);
        // Keep the first header and its data block only
        tar.truncate(1024);

        let mut seen = Vec::new();
        let err = LayerScanner::new(Truncated(Cursor::new(tar)), 1, "sha256:gz")
            .visit(|entry, _| {
                seen.push(entry.path);
                Ok(ControlFlow::Continue(()))
            })
            .unwrap_err();
        assert_eq!(seen, ["/a"]);
        match err {
            InspectError::LayerAccess { index, source, .. } => {
                assert_eq!(index, 1);
                assert!(source.to_string().contains("corrupt deflate stream"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scan_collapses_repeated_slashes() {
        let tar = build(&[
            ("usr//bin/sh", EntryType::Regular, b"elf"),
            ("usr/lib//", EntryType::Directory, b""),
        ]);
        let entries = LayerScanner::new(Cursor::new(tar), 0, "sha256:test")
            .entries()
            .unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["/usr/bin/sh", "/usr/lib"]);

        let kept = crate::query::filter_by_path(entries, "/usr/bin");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].path, "/usr/bin/sh");
    }

    #[test]
    fn test_mode_string() {
        let entry = ArchiveEntry {
            path: "/bin".to_string(),
            kind: EntryKind::Directory,
            mode: 0o755,
            size: 0,
            link_name: None,
        };
        assert_eq!(entry.mode_string(), "drwxr-xr-x");

        let entry = ArchiveEntry {
            kind: EntryKind::Regular,
            mode: 0o640,
            ..entry
        };
        assert_eq!(entry.mode_string(), "-rw-r-----");

        let entry = ArchiveEntry {
            kind: EntryKind::Symlink,
            mode: 0o777,
            ..entry
        };
        assert_eq!(entry.mode_string(), "lrwxrwxrwx");
    }
}
