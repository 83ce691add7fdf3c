//! Read-only views over layered container image filesystems.
//!
//! A container image is an ordered stack of tar archives. Each layer adds or
//! replaces files and can delete lower-layer paths with overlay whiteout
//! markers. This library turns such a stack into the views people actually
//! want to look at:
//!
//! - the merged filesystem, as seen by a running container
//! - the contents of one layer on its own
//! - the bytes of a single file
//! - the files two versions of an image disagree on
//! - filtered listings and directory trees
//!
//! # Overview
//!
//! The engine consumes images through the [`Image`] and [`Layer`] traits and
//! never talks to registries or daemons. [`OciLayout`] implements them for
//! OCI image layout directories; [`MemoryImage`] holds layers in memory.
//!
//! The pipeline is strictly sequential: layers are scanned one at a time and
//! each stream is dropped before the next one is opened. File contents are
//! only read when a caller asks for a specific file.
//!
//! # Example
//!
//! ```no_run
//! use cek_rs::{compare_images, overlay, query, Image, OciLayout};
//!
//! let layout = OciLayout::open("./alpine-oci")?;
//! let image = layout.image(Some("3.20"))?;
//!
//! // Merged filesystem, narrowed to /etc
//! let snapshot = overlay::fold_layers(image.layers())?;
//! let etc = query::filter_by_path(snapshot.into_entries(), "/etc");
//! for entry in query::filter_by_pattern(etc, "*.conf")? {
//!     println!("{} {:>8} {}", entry.mode_string(), entry.size, entry.path);
//! }
//!
//! // What changed between two tags of the same layout
//! let older = layout.image(Some("3.19"))?;
//! let diff = compare_images(&older, &image)?;
//! println!("{} added, {} removed", diff.added.len(), diff.removed.len());
//! # Ok::<(), cek_rs::InspectError>(())
//! ```
//!
//! # Command-Line Tool
//!
//! The crate ships a `cek` binary:
//! ```bash
//! cek ls ./alpine-oci:3.20 /etc --filter '*.conf'
//! cek tree ./alpine-oci:3.20 /usr -L 2 --dirsfirst
//! cek cat ./alpine-oci:3.20 /etc/os-release
//! cek compare ./alpine-oci:3.19 ./alpine-oci:3.20
//! cek layers ./alpine-oci:3.20
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod extract;
pub mod image;
pub mod oci;
pub mod overlay;
pub mod path;
pub mod query;
pub mod scan;
pub mod tree;

// Re-export commonly used types
pub use config::Config;
pub use diff::{compare_images, DiffResult, ImageSummary};
pub use error::{InspectError, Result};
pub use extract::View;
pub use image::{Image, ImageRef, Layer, MemoryImage, MemoryLayer};
pub use oci::{OciImage, OciLayout};
pub use overlay::Snapshot;
pub use query::{FileInfo, PathPattern};
pub use scan::{ArchiveEntry, EntryKind, LayerScanner};
pub use tree::{FileTree, NestedNode, TreeOptions};
