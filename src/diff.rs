//! Cross-image comparison.
//!
//! Two images from the same repository are compared by the files their
//! *unique* layers contribute. A layer is unique to an image when the other
//! image has no layer with the same digest. Shared layers are never opened.
//!
//! Files are classified as:
//! - added: only the second image's unique layers touch the path
//! - removed: only the first image's unique layers touch the path
//! - modified: both sides touch the path ("changed across a layer boundary";
//!   contents are never compared)

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;

use crate::error::{InspectError, Result};
use crate::image::{Image, Layer};
use crate::overlay;

/// Per-image figures shown alongside a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    /// Image reference as a string.
    pub reference: String,
    /// Whole-image digest.
    pub digest: String,
    /// Number of layers.
    pub layers: usize,
    /// Total layer size in bytes.
    pub size: u64,
}

impl ImageSummary {
    /// Summarize an image without touching its layer contents.
    pub fn of<I: Image>(image: &I) -> Self {
        Self {
            reference: image.reference().to_string(),
            digest: image.digest().to_string(),
            layers: image.layers().len(),
            size: image.total_size(),
        }
    }
}

/// Result of comparing two images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    /// Both images have the same digest.
    pub identical: bool,
    /// Paths present only in the second image's unique layers, sorted.
    pub added: Vec<String>,
    /// Paths present only in the first image's unique layers, sorted.
    pub removed: Vec<String>,
    /// Paths touched by unique layers of both images, sorted.
    pub modified: Vec<String>,
    /// Summary of the first image.
    pub left: ImageSummary,
    /// Summary of the second image.
    pub right: ImageSummary,
}

impl DiffResult {
    /// Returns true if no file differences were found.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Compare two images from the same repository.
///
/// Repository identity is checked before any layer is opened.
pub fn compare_images<A, B>(a: &A, b: &B) -> Result<DiffResult>
where
    A: Image,
    B: Image,
{
    if !a.reference().same_repository(b.reference()) {
        return Err(InspectError::RepositoryMismatch {
            left: a.reference().repository.clone(),
            right: b.reference().repository.clone(),
        });
    }

    let left = ImageSummary::of(a);
    let right = ImageSummary::of(b);

    if a.digest() == b.digest() {
        tracing::debug!("images share digest {}", a.digest());
        return Ok(DiffResult {
            identical: true,
            added: Vec::new(),
            removed: Vec::new(),
            modified: Vec::new(),
            left,
            right,
        });
    }

    let digests_a: HashSet<&str> = a.layers().iter().map(Layer::digest).collect();
    let digests_b: HashSet<&str> = b.layers().iter().map(Layer::digest).collect();

    let unique_a = unique_files(a.layers(), &digests_b)?;
    let unique_b = unique_files(b.layers(), &digests_a)?;

    let added = unique_b.difference(&unique_a).cloned().collect();
    let removed = unique_a.difference(&unique_b).cloned().collect();
    let modified = unique_a.intersection(&unique_b).cloned().collect();

    Ok(DiffResult {
        identical: false,
        added,
        removed,
        modified,
        left,
        right,
    })
}

/// Fold the layers whose digest is not in `other` and collect the non-directory paths.
fn unique_files<L: Layer>(layers: &[L], other: &HashSet<&str>) -> Result<BTreeSet<String>> {
    let snapshot = overlay::fold_selected(layers, |_, layer| !other.contains(layer.digest()))?;
    Ok(snapshot.file_paths().map(str::to_string).collect())
}
